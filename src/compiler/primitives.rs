//! Primitive Validator Builders
//!
//! One builder per built-in `type`. Every keyword is optional and applied
//! independently; keywords that do not apply to the type are ignored.

use regex::Regex;
use serde_json::Value;

use super::{allows_null, keyword, literal, Compiler};
use crate::document::NodeKey;
use crate::error::{CompileError, Result};
use crate::validator::rules::{parse_time, EMAIL_PATTERN};
use crate::validator::{
    ArrayRule, DateBound, DateRule, EmailRule, NumberRule, ObjectRule, Rule, StringRule, TimeRule, UnknownKeys,
    Validator, ValidatorId,
};

impl Compiler<'_> {
    /// Build the validator for a node with a `type` keyword
    pub(crate) fn resolve_type(&mut self, key: &NodeKey, node: &Value, type_name: &Value) -> Result<ValidatorId> {
        let name = type_name.as_str().unwrap_or_default();
        let rule = match name {
            "array" => self.array_rule(key, node)?,
            "boolean" => Rule::Boolean,
            "integer" => Rule::Number(number_rule(node, true)),
            "number" => Rule::Number(number_rule(node, false)),
            "object" => self.object_rule(key, node)?,
            "string" => string_rule(key, node)?,
            "file" => Rule::Object(ObjectRule::default()),
            _ => match self.options.types.get(name) {
                Some(custom) => Rule::Custom(custom.clone()),
                None => {
                    return Err(CompileError::UnknownType {
                        type_name: type_name.as_str().map(str::to_string).unwrap_or_else(|| type_name.to_string()),
                    })
                }
            },
        };

        let mut validator = Validator::new(rule);
        if allows_null(node) {
            validator = validator.allowing_null();
        }
        Ok(self.graph.push(validator))
    }

    fn array_rule(&mut self, key: &NodeKey, node: &Value) -> Result<Rule> {
        let items = match node.get("items") {
            Some(Value::Null) | None => None,
            Some(_) => Some(self.resolve(&key.child("items"))?),
        };
        Ok(Rule::Array(ArrayRule {
            items,
            min_items: count_keyword(key, node, "minItems")?,
            max_items: count_keyword(key, node, "maxItems")?,
            unique: keyword(node, "uniqueItems").is_some(),
        }))
    }

    fn object_rule(&mut self, key: &NodeKey, node: &Value) -> Result<Rule> {
        let properties = self.merge_properties(key, node)?;

        let unknown = match node.get("additionalProperties") {
            Some(Value::Bool(true)) => UnknownKeys::Allow,
            Some(Value::Object(_)) => UnknownKeys::Schema(self.resolve(&key.child("additionalProperties"))?),
            _ if keyword(node, "allowUnknown").is_some() => UnknownKeys::Ignore,
            _ => UnknownKeys::Reject,
        };

        Ok(Rule::Object(ObjectRule {
            properties,
            unknown,
            min_properties: count_keyword(key, node, "minProperties")?,
            max_properties: count_keyword(key, node, "maxProperties")?,
        }))
    }
}

fn number_rule(node: &Value, integer: bool) -> NumberRule {
    NumberRule {
        integer,
        minimum: node.get("minimum").and_then(Value::as_f64),
        maximum: node.get("maximum").and_then(Value::as_f64),
    }
}

fn string_rule(key: &NodeKey, node: &Value) -> Result<Rule> {
    if let Some(values) = keyword(node, "enum") {
        return Ok(literal(values));
    }

    match node.get("format").and_then(Value::as_str) {
        Some("date") | Some("date-time") => Ok(Rule::Date(DateRule {
            min: date_bound(key, node, "min")?,
            max: date_bound(key, node, "max")?,
        })),
        Some("time") => Ok(Rule::Time(TimeRule {
            min: time_bound(key, node, "min")?,
            max: time_bound(key, node, "max")?,
        })),
        Some("email") => Ok(Rule::Email(EmailRule {
            pattern: compile_pattern(key, EMAIL_PATTERN)?,
            max_length: count_keyword(key, node, "maxLength")?,
        })),
        _ => regular_string(key, node).map(Rule::String),
    }
}

fn regular_string(key: &NodeKey, node: &Value) -> Result<StringRule> {
    let pattern = match keyword(node, "pattern") {
        Some(Value::String(pattern)) => Some(compile_pattern(key, pattern)?),
        Some(_) => return Err(CompileError::invalid_schema(key.fragment(), "Expected pattern to be a string")),
        None => None,
    };

    // An absent minLength counts as 0, and a zero minimum admits ""
    let min_length = match node.get("minLength") {
        None => Some(0),
        Some(_) => count_keyword(key, node, "minLength")?,
    };

    Ok(StringRule {
        pattern,
        min_length,
        max_length: count_keyword(key, node, "maxLength")?,
        allow_empty: min_length == Some(0),
    })
}

fn compile_pattern(key: &NodeKey, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| CompileError::invalid_schema(key.fragment(), format!("Invalid pattern '{}': {}", pattern, e)))
}

/// A length or count keyword: ignored unless numeric, and then it must be a
/// non-negative integer
fn count_keyword(key: &NodeKey, node: &Value, name: &str) -> Result<Option<usize>> {
    let Some(Value::Number(n)) = node.get(name) else {
        return Ok(None);
    };
    if let Some(count) = n.as_u64() {
        return Ok(Some(count as usize));
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
        _ => Err(CompileError::invalid_schema(
            key.fragment(),
            format!("Expected {} to be a non-negative integer, got {}", name, n),
        )),
    }
}

fn date_bound(key: &NodeKey, node: &Value, name: &str) -> Result<Option<DateBound>> {
    match keyword(node, name) {
        None => Ok(None),
        Some(value) => DateBound::parse(value)
            .map(Some)
            .ok_or_else(|| CompileError::invalid_schema(key.fragment(), format!("Invalid date for {}: {}", name, value))),
    }
}

fn time_bound(key: &NodeKey, node: &Value, name: &str) -> Result<Option<chrono::NaiveTime>> {
    match keyword(node, name) {
        None => Ok(None),
        Some(value) => parse_time(value)
            .map(Some)
            .ok_or_else(|| CompileError::invalid_schema(key.fragment(), format!("Invalid time for {}: {}", name, value))),
    }
}
