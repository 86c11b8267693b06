//! Schema Validate CLI
//!
//! Compiles a schema and checks a JSON document (or an absent value) against it.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use schema_compiler::{compile, document::parse_document, CompileOptions, CompilerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-validate")]
#[command(about = "Validate JSON data against a compiled schema")]
struct Cli {
    /// Schema file to compile
    #[arg(short, long)]
    schema: PathBuf,

    /// JSON document to validate
    #[arg(short, long, required_unless_present = "missing")]
    data: Option<PathBuf>,

    /// Validate an absent value instead of a document
    #[arg(long, conflicts_with = "data")]
    missing: bool,

    /// Extra sub-schema, as ID=PATH (repeatable)
    #[arg(long = "sub-schema", value_name = "ID=PATH")]
    sub_schemas: Vec<String>,

    /// Strip unknown object keys instead of rejecting them
    #[arg(long, conflicts_with = "missing")]
    strip_unknown: bool,

    /// Config file (defaults to schema-compiler.toml lookup)
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let config = match CompilerConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)))
        .init();

    match run(cli, &config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli, config: &CompilerConfig) -> Result<bool> {
    let mut options = CompileOptions::from_config(config).context("Failed to preload sub-schemas")?;

    for entry in &cli.sub_schemas {
        let Some((id, path)) = entry.split_once('=') else {
            bail!("Expected --sub-schema in ID=PATH form, got '{}'", entry);
        };
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let schema = parse_document(&content).with_context(|| format!("Failed to parse {}", path))?;
        options = options.with_sub_schema(id, schema)?;
    }

    println!("🔍 Compiling {}", cli.schema.display());
    let schema = compile(cli.schema.as_path(), &options)
        .with_context(|| format!("Failed to compile {}", cli.schema.display()))?;

    let validate_options = schema_compiler::ValidateOptions {
        strip_unknown: cli.strip_unknown,
    };

    let outcome = if cli.missing {
        schema.validate_optional(None).map(|_| None)
    } else {
        let path = cli.data.as_ref().context("No --data given")?;
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let data = parse_document(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        schema.validate_with(&data, validate_options).map(Some)
    };

    match outcome {
        Ok(accepted) => {
            println!("✅ Valid");
            if let Some(accepted) = accepted {
                println!("{}", serde_json::to_string_pretty(&accepted)?);
            }
            Ok(true)
        }
        Err(errors) => {
            println!("❌ {} violation(s):", errors.len());
            for error in &errors {
                println!("   └─ {}", error);
            }
            Ok(false)
        }
    }
}
