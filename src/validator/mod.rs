//! Validator Graph
//!
//! Compiled schemas are an arena of [`Validator`] nodes addressed by
//! [`ValidatorId`]. Shared or recursive schema nodes point at the same id,
//! and self-referential schemas go through a [`Rule::Deferred`] cell that is
//! filled once the referenced node has finished compiling.
//!
//! Checking a value returns the accepted value (unknown keys removed where
//! the stripping policy applies) or the full list of violations.

pub mod custom;
pub mod intersection;
pub mod report;
pub mod rules;

pub use custom::{FnValidator, TypeValidator};
pub use intersection::{AllBranch, Intersection};
pub use report::{ValidationError, ValidationErrors};
pub use rules::{
    ArrayRule, DateBound, DateRule, EmailRule, NumberRule, ObjectRule, StringRule, TimeRule,
    UnknownKeys,
};

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use report::{index_path, member_path};

/// Index of a node in a [`ValidatorGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorId(usize);

/// Forward-reference slot used to break reference cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(usize);

/// How a validator treats an absent value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Optional,
    Required,
    /// The value must be absent
    Forbidden,
}

/// What a validator checks
#[derive(Clone)]
pub enum Rule {
    /// Accepts anything
    Any,
    Boolean,
    Number(NumberRule),
    String(StringRule),
    Email(EmailRule),
    Date(DateRule),
    Time(TimeRule),
    Object(ObjectRule),
    Array(ArrayRule),
    /// Only these exact values
    Literal(Vec<Value>),
    /// First matching branch wins (`anyOf`, `oneOf`)
    Alternatives(Vec<ValidatorId>),
    /// Every branch must match (`allOf`)
    All(Intersection),
    /// Whatever the cell holds at validation time; accepts anything while empty
    Deferred(CellId),
    Custom(Arc<dyn TypeValidator>),
}

impl Rule {
    /// Short name of the rule kind
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Any => "any",
            Rule::Boolean => "boolean",
            Rule::Number(rule) if rule.integer => "integer",
            Rule::Number(_) => "number",
            Rule::String(_) => "string",
            Rule::Email(_) => "email",
            Rule::Date(_) => "date",
            Rule::Time(_) => "time",
            Rule::Object(_) => "object",
            Rule::Array(_) => "array",
            Rule::Literal(_) => "literal",
            Rule::Alternatives(_) => "alternatives",
            Rule::All(_) => "all",
            Rule::Deferred(_) => "deferred",
            Rule::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Any => f.write_str("Any"),
            Rule::Boolean => f.write_str("Boolean"),
            Rule::Number(rule) => f.debug_tuple("Number").field(rule).finish(),
            Rule::String(rule) => f.debug_tuple("String").field(rule).finish(),
            Rule::Email(rule) => f.debug_tuple("Email").field(rule).finish(),
            Rule::Date(rule) => f.debug_tuple("Date").field(rule).finish(),
            Rule::Time(rule) => f.debug_tuple("Time").field(rule).finish(),
            Rule::Object(rule) => f.debug_tuple("Object").field(rule).finish(),
            Rule::Array(rule) => f.debug_tuple("Array").field(rule).finish(),
            Rule::Literal(values) => f.debug_tuple("Literal").field(values).finish(),
            Rule::Alternatives(branches) => f.debug_tuple("Alternatives").field(branches).finish(),
            Rule::All(all) => f.debug_tuple("All").field(all).finish(),
            Rule::Deferred(cell) => f.debug_tuple("Deferred").field(cell).finish(),
            Rule::Custom(custom) => f.debug_tuple("Custom").field(&custom.name()).finish(),
        }
    }
}

/// One compiled node
#[derive(Debug, Clone)]
pub struct Validator {
    pub rule: Rule,
    pub presence: Presence,
    /// `null` is accepted in addition to whatever the rule accepts
    pub allow_null: bool,
}

impl Validator {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            presence: Presence::Optional,
            allow_null: false,
        }
    }

    pub fn any() -> Self {
        Self::new(Rule::Any)
    }

    #[must_use]
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    #[must_use]
    pub fn allowing_null(mut self) -> Self {
        self.allow_null = true;
        self
    }
}

/// Options for a single validation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Drop undeclared object keys instead of rejecting them
    pub strip_unknown: bool,
}

pub(crate) type Checked = std::result::Result<Option<Value>, Vec<ValidationError>>;

/// Arena of compiled validators
#[derive(Debug, Default)]
pub struct ValidatorGraph {
    nodes: Vec<Validator>,
    cells: Vec<Option<ValidatorId>>,
}

impl ValidatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ValidatorId) -> &Validator {
        &self.nodes[id.0]
    }

    /// Current content of a deferred cell
    pub fn cell(&self, cell: CellId) -> Option<ValidatorId> {
        self.cells[cell.0]
    }

    pub fn push(&mut self, validator: Validator) -> ValidatorId {
        self.nodes.push(validator);
        ValidatorId(self.nodes.len() - 1)
    }

    /// Copy a node with a modification; the original stays untouched for
    /// everything else that shares it.
    pub fn derive(&mut self, id: ValidatorId, modify: impl FnOnce(&mut Validator)) -> ValidatorId {
        let mut copy = self.nodes[id.0].clone();
        modify(&mut copy);
        self.push(copy)
    }

    pub fn with_presence(&mut self, id: ValidatorId, presence: Presence) -> ValidatorId {
        if self.nodes[id.0].presence == presence {
            return id;
        }
        self.derive(id, |v| v.presence = presence)
    }

    pub fn allowing_null(&mut self, id: ValidatorId) -> ValidatorId {
        if self.nodes[id.0].allow_null {
            return id;
        }
        self.derive(id, |v| v.allow_null = true)
    }

    pub(crate) fn new_cell(&mut self) -> CellId {
        self.cells.push(None);
        CellId(self.cells.len() - 1)
    }

    /// Point a cell at its target. Refused (cell stays empty) when the target
    /// only leads back to the same cell through other deferred nodes.
    pub(crate) fn fill_cell(&mut self, cell: CellId, target: ValidatorId) -> bool {
        if self.leads_to_cell(target, cell) {
            return false;
        }
        self.cells[cell.0] = Some(target);
        true
    }

    fn leads_to_cell(&self, mut id: ValidatorId, cell: CellId) -> bool {
        for _ in 0..=self.cells.len() {
            match self.nodes[id.0].rule {
                Rule::Deferred(c) if c == cell => return true,
                Rule::Deferred(c) => match self.cells[c.0] {
                    Some(next) => id = next,
                    None => return false,
                },
                _ => return false,
            }
        }
        true
    }

    pub(crate) fn check(&self, id: ValidatorId, value: Option<&Value>, path: &str, options: ValidateOptions) -> Checked {
        let node = &self.nodes[id.0];

        let Some(value) = value else {
            return match node.presence {
                Presence::Required => Err(vec![ValidationError::new(path, "any.required", "is required")]),
                Presence::Optional | Presence::Forbidden => Ok(None),
            };
        };
        if node.presence == Presence::Forbidden {
            return Err(vec![ValidationError::new(path, "any.unknown", "is not allowed")]);
        }
        if value.is_null() && node.allow_null {
            return Ok(Some(Value::Null));
        }

        match &node.rule {
            Rule::Any => Ok(Some(value.clone())),
            Rule::Boolean => {
                if value.is_boolean() {
                    Ok(Some(value.clone()))
                } else {
                    Err(vec![ValidationError::new(path, "boolean.base", "must be a boolean")])
                }
            }
            Rule::Number(rule) => leaf(rule.check(value, path), value),
            Rule::String(rule) => leaf(rule.check(value, path), value),
            Rule::Email(rule) => leaf(rule.check(value, path), value),
            Rule::Date(rule) => leaf(rule.check(value, path), value),
            Rule::Time(rule) => leaf(rule.check(value, path), value),
            Rule::Custom(custom) => leaf(custom.validate(value, path), value),
            Rule::Literal(allowed) => {
                if allowed.iter().any(|candidate| rules::same_value(candidate, value)) {
                    Ok(Some(value.clone()))
                } else {
                    Err(vec![ValidationError::new(
                        path,
                        "any.only",
                        format!("must be one of {}", Value::Array(allowed.clone())),
                    )])
                }
            }
            Rule::Alternatives(branches) => {
                for branch in branches {
                    if let Ok(accepted) = self.check(*branch, Some(value), path, options) {
                        return Ok(accepted);
                    }
                }
                Err(vec![ValidationError::new(
                    path,
                    "alternatives.match",
                    "does not match any of the allowed alternatives",
                )])
            }
            Rule::All(all) => all.evaluate(self, value, path, options),
            Rule::Deferred(cell) => match self.cells[cell.0] {
                Some(target) => self.check(target, Some(value), path, options),
                None => Ok(Some(value.clone())),
            },
            Rule::Object(rule) => self.check_object(rule, value, path, options),
            Rule::Array(rule) => self.check_array(rule, value, path, options),
        }
    }

    fn check_object(&self, rule: &ObjectRule, value: &Value, path: &str, options: ValidateOptions) -> Checked {
        let Some(map) = value.as_object() else {
            return Err(vec![ValidationError::new(path, "object.base", "must be an object")]);
        };

        let mut errors = Vec::new();
        let mut accepted = Map::new();

        let declared = rule.properties.as_ref();
        if let Some(properties) = declared {
            for (name, property) in properties {
                match self.check(*property, map.get(name), &member_path(path, name), options) {
                    Ok(Some(v)) => {
                        accepted.insert(name.clone(), v);
                    }
                    Ok(None) => {}
                    Err(e) => errors.extend(e),
                }
            }
        }

        for (key, item) in map {
            if declared.map(|p| p.contains_key(key)).unwrap_or(false) {
                continue;
            }
            match rule.unknown {
                UnknownKeys::Schema(schema) => {
                    match self.check(schema, Some(item), &member_path(path, key), options) {
                        Ok(Some(v)) => {
                            accepted.insert(key.clone(), v);
                        }
                        Ok(None) => {}
                        Err(e) => errors.extend(e),
                    }
                }
                _ if declared.is_none() => {
                    accepted.insert(key.clone(), item.clone());
                }
                UnknownKeys::Allow => {
                    accepted.insert(key.clone(), item.clone());
                }
                UnknownKeys::Ignore => {
                    if !options.strip_unknown {
                        accepted.insert(key.clone(), item.clone());
                    }
                }
                UnknownKeys::Reject => {
                    if !options.strip_unknown {
                        errors.push(ValidationError::new(
                            member_path(path, key),
                            "object.unknown",
                            "is not allowed",
                        ));
                    }
                }
            }
        }

        errors.extend(rule.check_count(map.len(), path));

        if errors.is_empty() {
            Ok(Some(Value::Object(accepted)))
        } else {
            Err(errors)
        }
    }

    fn check_array(&self, rule: &ArrayRule, value: &Value, path: &str, options: ValidateOptions) -> Checked {
        let Some(items) = value.as_array() else {
            return Err(vec![ValidationError::new(path, "array.base", "must be an array")]);
        };

        let mut errors = Vec::new();
        let mut accepted = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match rule.items {
                Some(schema) => match self.check(schema, Some(item), &index_path(path, i), options) {
                    Ok(Some(v)) => accepted.push(v),
                    Ok(None) => {}
                    Err(e) => errors.extend(e),
                },
                None => accepted.push(item.clone()),
            }
        }
        errors.extend(rule.check_items(items, path));

        if errors.is_empty() {
            Ok(Some(Value::Array(accepted)))
        } else {
            Err(errors)
        }
    }
}

fn leaf(errors: Vec<ValidationError>, value: &Value) -> Checked {
    if errors.is_empty() {
        Ok(Some(value.clone()))
    } else {
        Err(errors)
    }
}

/// The result of compiling a schema: an immutable validator graph plus its root
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    graph: Arc<ValidatorGraph>,
    root: ValidatorId,
}

impl CompiledSchema {
    pub fn new(graph: ValidatorGraph, root: ValidatorId) -> Self {
        Self {
            graph: Arc::new(graph),
            root,
        }
    }

    pub fn graph(&self) -> &ValidatorGraph {
        &self.graph
    }

    pub fn root_id(&self) -> ValidatorId {
        self.root
    }

    /// The root validator node
    pub fn root(&self) -> &Validator {
        self.graph.get(self.root)
    }

    /// Check a present value
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationErrors> {
        self.validate_with(value, ValidateOptions::default())
    }

    pub fn validate_with(&self, value: &Value, options: ValidateOptions) -> Result<Value, ValidationErrors> {
        match self.graph.check(self.root, Some(value), "", options) {
            Ok(accepted) => Ok(accepted.unwrap_or(Value::Null)),
            Err(errors) => Err(ValidationErrors::new(errors)),
        }
    }

    /// Check a value that may be absent; an absent value is accepted unless
    /// the root is required
    pub fn validate_optional(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationErrors> {
        self.graph
            .check(self.root, value, "", ValidateOptions::default())
            .map_err(ValidationErrors::new)
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }
}

impl TypeValidator for CompiledSchema {
    fn name(&self) -> &str {
        "schema"
    }

    fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        self.graph
            .check(self.root, Some(value), path, ValidateOptions::default())
            .err()
            .unwrap_or_default()
    }
}
