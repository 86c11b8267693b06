//! Leaf Rules
//!
//! Constraint sets for the primitive validators. Each rule only inspects a
//! present value; presence, `null` allowance and recursion into children are
//! handled by the graph in `validator/mod.rs`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use super::report::ValidationError;
use super::ValidatorId;

/// Shape accepted for `format: email`
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Format accepted for `format: time`
pub const TIME_FORMAT: &str = "%H:%M:%S";

// =============================================================================
// Numbers
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct NumberRule {
    pub integer: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl NumberRule {
    pub(crate) fn check(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(number) = value.as_f64() else {
            return vec![ValidationError::new(path, "number.base", "must be a number")];
        };

        let mut errors = Vec::new();
        if self.integer && !is_integer(value) {
            errors.push(ValidationError::new(path, "number.integer", "must be an integer"));
        }
        if let Some(min) = self.minimum {
            if number < min {
                errors.push(ValidationError::new(
                    path,
                    "number.min",
                    format!("must be greater than or equal to {}", min),
                ));
            }
        }
        if let Some(max) = self.maximum {
            if number > max {
                errors.push(ValidationError::new(
                    path,
                    "number.max",
                    format!("must be less than or equal to {}", max),
                ));
            }
        }
        errors
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Equality by value: `1` and `1.0` are the same number
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
            (Some(x), Some(y), _, _) => x == y,
            (_, _, Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len() && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

// =============================================================================
// Strings
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct StringRule {
    pub pattern: Option<Regex>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// `""` is accepted outright, before any other constraint
    pub allow_empty: bool,
}

impl StringRule {
    pub(crate) fn check(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(text) = value.as_str() else {
            return vec![ValidationError::new(path, "string.base", "must be a string")];
        };
        if text.is_empty() {
            return if self.allow_empty {
                Vec::new()
            } else {
                vec![ValidationError::new(path, "string.empty", "is not allowed to be empty")]
            };
        }

        let mut errors = Vec::new();
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(text) {
                errors.push(ValidationError::new(
                    path,
                    "string.pattern",
                    format!("fails to match the required pattern: {}", pattern.as_str()),
                ));
            }
        }
        errors.extend(check_length(text, self.min_length, self.max_length, path));
        errors
    }
}

fn check_length(text: &str, min: Option<usize>, max: Option<usize>, path: &str) -> Vec<ValidationError> {
    let length = text.chars().count();
    let mut errors = Vec::new();
    if let Some(min) = min {
        if length < min {
            errors.push(ValidationError::new(
                path,
                "string.min",
                format!("length must be at least {} characters long", min),
            ));
        }
    }
    if let Some(max) = max {
        if length > max {
            errors.push(ValidationError::new(
                path,
                "string.max",
                format!("length must be less than or equal to {} characters long", max),
            ));
        }
    }
    errors
}

#[derive(Debug, Clone)]
pub struct EmailRule {
    pub pattern: Regex,
    pub max_length: Option<usize>,
}

impl EmailRule {
    pub(crate) fn check(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(text) = value.as_str() else {
            return vec![ValidationError::new(path, "string.base", "must be a string")];
        };
        if text.is_empty() {
            return vec![ValidationError::new(path, "string.empty", "is not allowed to be empty")];
        }
        let mut errors = Vec::new();
        if !self.pattern.is_match(text) {
            errors.push(ValidationError::new(path, "string.email", "must be a valid email"));
        }
        errors.extend(check_length(text, None, self.max_length, path));
        errors
    }
}

// =============================================================================
// Dates and times
// =============================================================================

/// A date bound; `Now` is evaluated at validation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Now,
    At(DateTime<Utc>),
}

impl DateBound {
    pub fn parse(value: &Value) -> Option<Self> {
        if value.as_str() == Some("now") {
            return Some(Self::Now);
        }
        parse_date(value).map(Self::At)
    }

    fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::Now => Utc::now(),
            Self::At(at) => *at,
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD`, naive date-times (as UTC) and epoch milliseconds
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => {
            if let Ok(at) = DateTime::parse_from_rfc3339(s) {
                return Some(at.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DateRule {
    pub min: Option<DateBound>,
    pub max: Option<DateBound>,
}

impl DateRule {
    pub(crate) fn check(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(at) = parse_date(value) else {
            return vec![ValidationError::new(path, "date.base", "must be a valid date")];
        };
        let mut errors = Vec::new();
        if let Some(min) = self.min {
            if at < min.instant() {
                errors.push(ValidationError::new(
                    path,
                    "date.min",
                    format!("must be later than or equal to {}", min.instant().to_rfc3339()),
                ));
            }
        }
        if let Some(max) = self.max {
            if at > max.instant() {
                errors.push(ValidationError::new(
                    path,
                    "date.max",
                    format!("must be earlier than or equal to {}", max.instant().to_rfc3339()),
                ));
            }
        }
        errors
    }
}

pub fn parse_time(value: &Value) -> Option<NaiveTime> {
    value
        .as_str()
        .and_then(|s| NaiveTime::parse_from_str(s, TIME_FORMAT).ok())
}

#[derive(Debug, Clone, Default)]
pub struct TimeRule {
    pub min: Option<NaiveTime>,
    pub max: Option<NaiveTime>,
}

impl TimeRule {
    pub(crate) fn check(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(at) = parse_time(value) else {
            return vec![ValidationError::new(path, "time.base", "must be a time in HH:mm:ss format")];
        };
        let mut errors = Vec::new();
        if let Some(min) = self.min {
            if at < min {
                errors.push(ValidationError::new(
                    path,
                    "time.min",
                    format!("must be later than or equal to {}", min.format(TIME_FORMAT)),
                ));
            }
        }
        if let Some(max) = self.max {
            if at > max {
                errors.push(ValidationError::new(
                    path,
                    "time.max",
                    format!("must be earlier than or equal to {}", max.format(TIME_FORMAT)),
                ));
            }
        }
        errors
    }
}

// =============================================================================
// Containers
// =============================================================================

/// What happens to object keys outside the declared property set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    /// Rejected, or silently dropped when stripping is on
    #[default]
    Reject,
    /// `allowUnknown`: never rejected, but dropped when stripping is on
    Ignore,
    /// `additionalProperties: true`: always kept
    Allow,
    /// `additionalProperties: {schema}`: kept and checked against the schema
    Schema(ValidatorId),
}

#[derive(Debug, Clone, Default)]
pub struct ObjectRule {
    /// `None` means no constrained properties: any keys pass through
    pub properties: Option<BTreeMap<String, ValidatorId>>,
    pub unknown: UnknownKeys,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
}

impl ObjectRule {
    pub(crate) fn check_count(&self, count: usize, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(min) = self.min_properties {
            if count < min {
                errors.push(ValidationError::new(
                    path,
                    "object.min",
                    format!("must have at least {} keys", min),
                ));
            }
        }
        if let Some(max) = self.max_properties {
            if count > max {
                errors.push(ValidationError::new(
                    path,
                    "object.max",
                    format!("must have less than or equal to {} keys", max),
                ));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayRule {
    /// `None` leaves items unconstrained
    pub items: Option<ValidatorId>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique: bool,
}

impl ArrayRule {
    pub(crate) fn check_items(&self, items: &[Value], path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(min) = self.min_items {
            if items.len() < min {
                errors.push(ValidationError::new(
                    path,
                    "array.min",
                    format!("must contain at least {} items", min),
                ));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                errors.push(ValidationError::new(
                    path,
                    "array.max",
                    format!("must contain less than or equal to {} items", max),
                ));
            }
        }
        if self.unique {
            for (i, item) in items.iter().enumerate() {
                if let Some(first) = items[..i].iter().position(|earlier| same_value(earlier, item)) {
                    errors.push(ValidationError::new(
                        super::report::index_path(path, i),
                        "array.unique",
                        format!("contains a duplicate of position {}", first),
                    ));
                }
            }
        }
        errors
    }
}
