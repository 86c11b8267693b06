//! Schema Loading
//!
//! The compiler never touches the file system directly. Documents are read
//! through a [`SchemaLoader`], resolved once per compile call, so reference
//! resolution can be exercised against in-memory or embedded documents.
//!
//! Loaders return `Ok(None)` when nothing exists at a path. I/O and parse
//! failures are errors; during `$ref` resolution the compiler logs those and
//! moves on to the next strategy.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use include_dir::Dir;
use serde_json::Value;
use walkdir::WalkDir;

use crate::document::{normalize_path, parse_document};
use crate::error::{CompileError, Result};

/// Source of schema documents addressed by path
pub trait SchemaLoader: Send + Sync {
    /// Load and parse the document at `path` (already absolute and normalized)
    fn load(&self, path: &Path) -> Result<Option<Value>>;
}

/// Reads documents from the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl SchemaLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<Option<Value>> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(parse_document(&content)?))
    }
}

/// Serves documents from a map, keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<PathBuf, Value>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a path
    pub fn insert(&mut self, path: impl AsRef<Path>, document: Value) {
        self.documents.insert(normalize_path(path.as_ref()), document);
    }

    /// Builder form of [`MemoryLoader::insert`]
    pub fn with(mut self, path: impl AsRef<Path>, document: Value) -> Self {
        self.insert(path, document);
        self
    }
}

impl SchemaLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Option<Value>> {
        Ok(self.documents.get(&normalize_path(path)).cloned())
    }
}

/// Serves documents bundled with `include_dir!`, mounted at a virtual path
pub struct EmbeddedLoader {
    dir: &'static Dir<'static>,
    mount: PathBuf,
}

impl EmbeddedLoader {
    /// Files of `dir` appear under `mount` (e.g. `/schemas/a.json`)
    pub fn new(dir: &'static Dir<'static>, mount: impl Into<PathBuf>) -> Self {
        Self {
            dir,
            mount: normalize_path(&mount.into()),
        }
    }
}

impl fmt::Debug for EmbeddedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedLoader")
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

impl SchemaLoader for EmbeddedLoader {
    fn load(&self, path: &Path) -> Result<Option<Value>> {
        let path = normalize_path(path);
        let Ok(relative) = path.strip_prefix(&self.mount) else {
            return Ok(None);
        };
        let Some(file) = self.dir.get_file(relative) else {
            return Ok(None);
        };
        let content = file.contents_utf8().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", path.display()),
            )
        })?;
        Ok(Some(parse_document(content)?))
    }
}

/// Collect every schema document below `schema_dir`.
///
/// Each document is returned under its path relative to `schema_dir`
/// (always `/`-separated), and additionally under its `$id` if it declares
/// one. Documents keep a `jsonRoot` pointing at their own directory unless
/// they already declare one, so relative references inside them still work
/// when they are served from the sub-schema registry.
pub fn load_directory(schema_dir: &Path, extensions: &[String]) -> Result<Vec<(String, Value)>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(schema_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| extensions.iter().any(|wanted| wanted == ext))
            .unwrap_or(false);
        if !matches_extension {
            continue;
        }

        let content = fs::read_to_string(path)?;
        let mut json = parse_document(&content).map_err(|e| {
            CompileError::invalid_schema(path.display().to_string(), e.to_string())
        })?;

        if let (Value::Object(map), Some(parent)) = (&mut json, path.parent()) {
            map.entry("jsonRoot")
                .or_insert_with(|| Value::String(parent.to_string_lossy().into_owned()));
        }

        let relative = path
            .strip_prefix(schema_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if let Some(id) = json.get("$id").and_then(Value::as_str) {
            entries.push((id.to_string(), json.clone()));
        }
        entries.push((relative, json));
    }

    Ok(entries)
}
