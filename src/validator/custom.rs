//! Caller-supplied validators for custom `type` names

use std::fmt;

use serde_json::Value;

use super::report::ValidationError;

/// A validator the caller registers under a custom `type` name.
///
/// Only invoked for present values; `allowNull` and requirement overrides
/// are applied around it by the compiled graph.
pub trait TypeValidator: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Check `value`, reporting violations relative to `path`
    fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError>;
}

/// Adapts a predicate closure into a [`TypeValidator`]
pub struct FnValidator<F> {
    name: String,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl<F> TypeValidator for FnValidator<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        match (self.check)(value) {
            Ok(()) => Vec::new(),
            Err(message) => vec![ValidationError::new(path, format!("{}.base", self.name), message)],
        }
    }
}
