//! Configuration management for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-compiler.toml)
//! - Environment variables (SCHEMA_COMPILER__*)
//!
//! ## Example config file (schema-compiler.toml):
//! ```toml
//! [compiler]
//! base_dir = "./schemas"
//!
//! [registry]
//! dirs = ["./schemas/shared"]
//! extensions = ["json"]
//!
//! [log]
//! filter = "schema_compiler=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings files looked up in the working directory
const LOCAL_FILES: [&str; 3] = ["schema-compiler.toml", ".schema-compiler.toml", "config/schema-compiler.toml"];

const ENV_PREFIX: &str = "SCHEMA_COMPILER";

/// `schema-compiler.toml` in the platform config directory
/// (`~/.config/schema-compiler/` on Linux)
pub fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "schema-compiler", "schema-compiler")
        .map(|dirs| dirs.config_dir().join("schema-compiler.toml"))
}

/// Main configuration for the schema compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Compilation settings
    #[serde(default)]
    pub compiler: CompilerSection,

    /// Sub-schema registry preloading
    #[serde(default)]
    pub registry: RegistrySection,

    /// Logging settings for the CLI
    #[serde(default)]
    pub log: LogSection,
}

/// Compilation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerSection {
    /// Base directory for relative file references from in-memory schemas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

/// Directories whose schema files are registered as sub-schemas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Directories walked at startup
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// File extensions treated as schema documents
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Layer, lowest priority first: working-directory files, the per-user
    /// file, `config_path` (which must exist), then `SCHEMA_COMPILER__*`
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for name in LOCAL_FILES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
        if let Some(user_file) = user_config_file().filter(|file| file.exists()) {
            builder = builder.add_source(File::from(user_file).required(false));
        }
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // `SCHEMA_COMPILER__REGISTRY__DIRS` maps to registry.dirs
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Write the settings as TOML, so a later `load_from` reads them back
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Registry directories, relative ones resolved against the working directory
    pub fn registry_dirs(&self) -> Vec<PathBuf> {
        self.registry.dirs.iter().map(|dir| resolve_path(dir)).collect()
    }

    /// Base directory, resolved against the working directory
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.compiler.base_dir.as_deref().map(resolve_path)
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
