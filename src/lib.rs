//! Schema Compiler
//!
//! Compiles JSON-Schema-flavored documents into reusable validator graphs.
//!
//! ## Features
//!
//! - **References**: `$ref` into the same document, a sibling file, or a
//!   caller-supplied sub-schema registry, with JSON pointer fragments
//! - **Recursive Schemas**: self-referential types compile through deferred
//!   cells instead of recursing forever
//! - **Inheritance**: `extends` chains merge ancestor properties, most
//!   derived definition first, with `required`/`optional`/`forbidden` overrides
//! - **Combinators**: `anyOf`, `oneOf` and an `allOf` intersection that
//!   reports the errors of every failing branch
//! - **Custom Types**: unknown `type` names are looked up in a registry of
//!   caller-supplied validators
//!
//! ## Example
//!
//! ```
//! use schema_compiler::{compile, CompileOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "name": {"type": "string"},
//!         "children": {"type": "array", "items": {"$ref": "#"}}
//!     },
//!     "required": ["name"]
//! });
//! let tree = compile(schema, &CompileOptions::new()).unwrap();
//!
//! assert!(tree.is_valid(&json!({"name": "root", "children": [{"name": "leaf"}]})));
//! assert!(!tree.is_valid(&json!({"children": []})));
//! ```

pub mod compiler;
pub mod config;
pub mod document;
pub mod error;
pub mod loader;
pub mod validator;

pub use compiler::{compile, CompileOptions, SchemaSource};
pub use config::CompilerConfig;
pub use error::{CompileError, Result};
pub use loader::{EmbeddedLoader, FsLoader, MemoryLoader, SchemaLoader};
pub use validator::{
    CompiledSchema, FnValidator, Presence, Rule, TypeValidator, ValidateOptions, ValidationError, ValidationErrors,
    Validator, ValidatorGraph, ValidatorId,
};
