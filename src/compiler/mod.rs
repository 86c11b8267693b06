//! Schema Compiler
//!
//! Turns a schema document into a [`CompiledSchema`].
//!
//! ## Resolution
//!
//! Every schema node is addressed by a [`NodeKey`] and resolved at most once
//! per compile call; the resulting [`ValidatorId`] is memoized and shared by
//! every reference to the node. Two stacks are kept while resolving:
//!
//! - the **schema stack** of documents in scope. Its top is always the
//!   document of the node being resolved, so `#/...` references resolve
//!   against the document that declared them;
//! - the **processing stack** of nodes whose resolution is in progress. A
//!   `$ref` to a node already on it is a cycle and compiles to a deferred
//!   cell, filled once the target node is done.
//!
//! ## Dispatch
//!
//! The first keyword present decides how a node compiles: `type`, `anyOf`,
//! `allOf`, `oneOf`, `$ref`, then `enum`. A node with none of them compiles
//! to an accept-anything validator with a warning.

mod inherit;
mod primitives;
mod reference;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::config::CompilerConfig;
use crate::document::{absolutize, declared_json_root, lookup, DocId, Document, DocumentOrigin, DocumentStore, NodeKey};
use crate::error::{CompileError, Result};
use crate::loader::{load_directory, FsLoader, SchemaLoader};
use crate::validator::{
    CellId, CompiledSchema, Intersection, Presence, Rule, TypeValidator, Validator, ValidatorGraph, ValidatorId,
};

// =============================================================================
// Public API
// =============================================================================

/// What to compile: an in-memory schema or the path of a schema file
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Value(Value),
    Path(PathBuf),
}

impl From<Value> for SchemaSource {
    fn from(value: Value) -> Self {
        match value {
            Value::String(path) => SchemaSource::Path(PathBuf::from(path)),
            other => SchemaSource::Value(other),
        }
    }
}

impl From<&Value> for SchemaSource {
    fn from(value: &Value) -> Self {
        SchemaSource::from(value.clone())
    }
}

impl From<PathBuf> for SchemaSource {
    fn from(path: PathBuf) -> Self {
        SchemaSource::Path(path)
    }
}

impl From<&Path> for SchemaSource {
    fn from(path: &Path) -> Self {
        SchemaSource::Path(path.to_path_buf())
    }
}

impl From<&str> for SchemaSource {
    fn from(path: &str) -> Self {
        SchemaSource::Path(PathBuf::from(path))
    }
}

/// Caller configuration for one or more compile calls
#[derive(Clone, Default)]
pub struct CompileOptions {
    sub_schemas: HashMap<String, Arc<Value>>,
    types: HashMap<String, Arc<dyn TypeValidator>>,
    base_dir: Option<PathBuf>,
    loader: Option<Arc<dyn SchemaLoader>>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from a loaded configuration, preloading every schema
    /// found in the configured registry directories
    pub fn from_config(config: &CompilerConfig) -> Result<Self> {
        let mut options = Self::new();
        if let Some(base_dir) = config.base_dir() {
            options = options.with_base_dir(base_dir);
        }
        for dir in config.registry_dirs() {
            for (id, schema) in load_directory(&dir, &config.registry.extensions)? {
                options = options.with_sub_schema(id, schema)?;
            }
        }
        tracing::debug!("Registry preloaded with {} sub-schemas", options.sub_schemas.len());
        Ok(options)
    }

    /// Register a document under an identifier usable as `$ref: "<id>#/..."`
    pub fn with_sub_schema(mut self, id: impl Into<String>, schema: Value) -> Result<Self> {
        let id = id.into();
        if !schema.is_object() {
            return Err(CompileError::InvalidArgument(format!(
                "Expected sub-schema '{}' to be an object",
                id
            )));
        }
        self.sub_schemas.insert(id, Arc::new(schema));
        Ok(self)
    }

    /// Register every member of a JSON object as a sub-schema
    pub fn with_sub_schemas_json(mut self, schemas: Value) -> Result<Self> {
        let Value::Object(map) = schemas else {
            return Err(CompileError::InvalidArgument(
                "Expected sub-schemas to be an object".to_string(),
            ));
        };
        for (id, schema) in map {
            self = self.with_sub_schema(id, schema)?;
        }
        Ok(self)
    }

    /// Register a validator for a custom `type` name
    pub fn with_type(mut self, name: impl Into<String>, validator: impl TypeValidator + 'static) -> Self {
        self.types.insert(name.into(), Arc::new(validator));
        self
    }

    /// Base directory for relative file references from an in-memory root
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn SchemaLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn sub_schema(&self, id: &str) -> Option<&Value> {
        self.sub_schemas.get(id).map(|schema| schema.as_ref())
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    fn loader(&self) -> &dyn SchemaLoader {
        match &self.loader {
            Some(loader) => loader.as_ref(),
            None => &FsLoader,
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sub_schemas: Vec<&String> = self.sub_schemas.keys().collect();
        sub_schemas.sort();
        let mut types: Vec<&String> = self.types.keys().collect();
        types.sort();
        f.debug_struct("CompileOptions")
            .field("sub_schemas", &sub_schemas)
            .field("types", &types)
            .field("base_dir", &self.base_dir)
            .field("custom_loader", &self.loader.is_some())
            .finish()
    }
}

/// Compile a schema into a reusable validator
///
/// # Example
///
/// ```
/// use schema_compiler::{compile, CompileOptions};
/// use serde_json::json;
///
/// let schema = compile(json!({"type": "integer", "minimum": 1}), &CompileOptions::new()).unwrap();
/// assert!(schema.is_valid(&json!(3)));
/// assert!(!schema.is_valid(&json!(0)));
/// ```
pub fn compile(source: impl Into<SchemaSource>, options: &CompileOptions) -> Result<CompiledSchema> {
    let mut compiler = Compiler::new(options);
    let root = compiler.load_root(source.into())?;
    let id = compiler.resolve(&NodeKey::root(root))?;

    tracing::debug!(
        "Compiled schema: {} documents, {} validators",
        compiler.store.len(),
        compiler.graph.len()
    );
    Ok(CompiledSchema::new(compiler.graph, id))
}

// =============================================================================
// Node classification
// =============================================================================

/// How a schema node compiles, decided by the first keyword present
#[derive(Debug)]
enum NodeKind<'a> {
    Typed(&'a Value),
    AnyOf(&'a [Value]),
    AllOf(&'a [Value]),
    OneOf(&'a [Value]),
    Reference(&'a str),
    Enum(&'a Value),
    Unrecognized,
}

impl<'a> NodeKind<'a> {
    fn classify(node: &'a Value, key: &NodeKey) -> Result<Self> {
        if let Some(type_name) = keyword(node, "type") {
            return Ok(NodeKind::Typed(type_name));
        }
        if let Some(branches) = keyword(node, "anyOf") {
            return branch_list(branches, "anyOf", key).map(NodeKind::AnyOf);
        }
        if let Some(branches) = keyword(node, "allOf") {
            return branch_list(branches, "allOf", key).map(NodeKind::AllOf);
        }
        if let Some(branches) = keyword(node, "oneOf") {
            return branch_list(branches, "oneOf", key).map(NodeKind::OneOf);
        }
        if let Some(reference) = keyword(node, "$ref") {
            return reference
                .as_str()
                .map(NodeKind::Reference)
                .ok_or_else(|| CompileError::invalid_schema(key.fragment(), "Expected $ref to be a string"));
        }
        if let Some(values) = keyword(node, "enum") {
            return Ok(NodeKind::Enum(values));
        }
        Ok(NodeKind::Unrecognized)
    }
}

fn branch_list<'a>(value: &'a Value, name: &str, key: &NodeKey) -> Result<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| CompileError::invalid_schema(key.fragment(), format!("Expected {} to be an array", name)))
}

/// A keyword counts as present only when its value is truthy: `null`,
/// `false`, `0` and `""` are treated as absent
pub(crate) fn keyword<'v>(node: &'v Value, name: &str) -> Option<&'v Value> {
    node.get(name).filter(|value| is_truthy(value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `allowNull` only applies when it is literally `true`
pub(crate) fn allows_null(node: &Value) -> bool {
    node.get("allowNull") == Some(&Value::Bool(true))
}

/// An `allOf` entry written as `{ "if": .., "then": .., "else": .. }`
fn is_conditional(node: &Value) -> bool {
    keyword(node, "if").is_some()
        && ["type", "anyOf", "allOf", "oneOf", "$ref", "enum"]
            .iter()
            .all(|name| keyword(node, name).is_none())
}

// =============================================================================
// Compiler
// =============================================================================

/// State of one compile call
pub(crate) struct Compiler<'o> {
    options: &'o CompileOptions,
    store: DocumentStore,
    graph: ValidatorGraph,
    schema_stack: Vec<DocId>,
    processing: Vec<NodeKey>,
    resolved: HashMap<NodeKey, ValidatorId>,
    cells: HashMap<NodeKey, CellId>,
}

impl<'o> Compiler<'o> {
    fn new(options: &'o CompileOptions) -> Self {
        Self {
            options,
            store: DocumentStore::new(),
            graph: ValidatorGraph::new(),
            schema_stack: Vec::new(),
            processing: Vec::new(),
            resolved: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    fn load_root(&mut self, source: SchemaSource) -> Result<DocId> {
        let document = match source {
            SchemaSource::Value(Value::String(path)) => return self.load_root(SchemaSource::Path(path.into())),
            SchemaSource::Value(value) => {
                if !value.is_object() {
                    return Err(CompileError::InvalidArgument(
                        "Expected schema to be an object or a path".to_string(),
                    ));
                }
                let base_dir = declared_json_root(&value).or_else(|| self.options.base_dir.clone());
                Document {
                    root: Arc::new(value),
                    base_dir,
                    origin: DocumentOrigin::Inline,
                }
            }
            SchemaSource::Path(path) => {
                let path = absolutize(&path)?;
                let value = self
                    .options
                    .loader()
                    .load(&path)?
                    .ok_or_else(|| CompileError::DocumentNotFound(path.clone()))?;
                if !value.is_object() {
                    return Err(CompileError::InvalidArgument(format!(
                        "Expected schema in {} to be an object",
                        path.display()
                    )));
                }
                let base_dir = declared_json_root(&value).or_else(|| path.parent().map(Path::to_path_buf));
                Document {
                    root: Arc::new(value),
                    base_dir,
                    origin: DocumentOrigin::File(path),
                }
            }
        };
        Ok(self.store.insert(document))
    }

    /// Run `f` with `doc` on top of the schema stack, popping it again on
    /// every exit path
    fn in_document<T>(&mut self, doc: DocId, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let pushed = self.schema_stack.last() != Some(&doc);
        if pushed {
            self.schema_stack.push(doc);
        }
        let result = f(self);
        if pushed {
            self.schema_stack.pop();
        }
        result
    }

    /// Document on top of the schema stack
    fn current_document(&self) -> Option<DocId> {
        self.schema_stack.last().copied()
    }

    /// Compile the node at `key`, reusing an earlier result for the same node
    pub(crate) fn resolve(&mut self, key: &NodeKey) -> Result<ValidatorId> {
        if let Some(&id) = self.resolved.get(key) {
            return Ok(id);
        }
        if self.processing.contains(key) {
            tracing::trace!("Deferring cyclic node {}", key);
            let cell = self.cell_for(key);
            return Ok(self.graph.push(Validator::new(Rule::Deferred(cell))));
        }

        let id = self.in_document(key.doc, |c| {
            c.processing.push(key.clone());
            let result = c.dispatch(key);
            c.processing.pop();
            result
        })?;

        self.resolved.insert(key.clone(), id);
        if let Some(&cell) = self.cells.get(key) {
            if !self.graph.fill_cell(cell, id) {
                tracing::warn!("Reference cycle at {} never reaches a schema; accepting any value", key.fragment());
            }
        }
        Ok(id)
    }

    fn dispatch(&mut self, key: &NodeKey) -> Result<ValidatorId> {
        let root = self.store.root(key.doc);
        let node = lookup(&root, &key.pointer).ok_or_else(|| CompileError::ReferenceNotFound {
            reference: key.fragment(),
        })?;

        match NodeKind::classify(node, key)? {
            NodeKind::Typed(type_name) => self.resolve_type(key, node, type_name),
            NodeKind::AnyOf(branches) => {
                let ids = self.resolve_branches(key, "anyOf", branches.len())?;
                Ok(self.graph.push(Validator::new(Rule::Alternatives(ids))))
            }
            NodeKind::OneOf(branches) => {
                let ids = self.resolve_branches(key, "oneOf", branches.len())?;
                Ok(self
                    .graph
                    .push(Validator::new(Rule::Alternatives(ids)).with_presence(Presence::Required)))
            }
            NodeKind::AllOf(branches) => self.resolve_all_of(key, branches),
            NodeKind::Reference(reference) => self.resolve_ref_node(reference, node),
            NodeKind::Enum(values) => Ok(self.graph.push(Validator::new(literal(values)))),
            NodeKind::Unrecognized => {
                tracing::warn!(
                    "Schema at {} is missing a 'type' or '$ref' or 'enum': {}",
                    key.fragment(),
                    node
                );
                Ok(self.graph.push(Validator::any()))
            }
        }
    }

    fn resolve_branches(&mut self, key: &NodeKey, keyword: &str, count: usize) -> Result<Vec<ValidatorId>> {
        let list = key.child(keyword);
        (0..count).map(|i| self.resolve(&list.index(i))).collect()
    }

    fn resolve_all_of(&mut self, key: &NodeKey, branches: &[Value]) -> Result<ValidatorId> {
        let list = key.child("allOf");
        let mut all = Intersection::new();
        for (i, branch) in branches.iter().enumerate() {
            let slot = list.index(i);
            if is_conditional(branch) {
                let is = self.resolve(&slot.child("if"))?;
                let then = self.resolve_side(&slot, branch, "then")?;
                let otherwise = self.resolve_side(&slot, branch, "else")?;
                all = all.conditional(is, then, otherwise);
            } else {
                all = all.branch(self.resolve(&slot)?);
            }
        }
        Ok(self.graph.push(Validator::new(Rule::All(all))))
    }

    fn resolve_side(&mut self, slot: &NodeKey, branch: &Value, side: &str) -> Result<Option<ValidatorId>> {
        match keyword(branch, side) {
            Some(_) => self.resolve(&slot.child(side)).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_ref_node(&mut self, reference: &str, node: &Value) -> Result<ValidatorId> {
        let target = self.resolve_reference(reference)?;

        let id = if self.processing.contains(&target) {
            tracing::trace!("Deferring cyclic reference {} to {}", reference, target);
            let cell = self.cell_for(&target);
            self.graph.push(Validator::new(Rule::Deferred(cell)))
        } else {
            self.resolve(&target)?
        };

        if allows_null(node) {
            Ok(self.graph.allowing_null(id))
        } else {
            Ok(id)
        }
    }

    fn cell_for(&mut self, target: &NodeKey) -> CellId {
        if let Some(&cell) = self.cells.get(target) {
            return cell;
        }
        let cell = self.graph.new_cell();
        self.cells.insert(target.clone(), cell);
        cell
    }
}

/// `enum` compiles to the listed literals; a non-array is a single literal
pub(crate) fn literal(values: &Value) -> Rule {
    match values {
        Value::Array(values) => Rule::Literal(values.clone()),
        other => Rule::Literal(vec![other.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::validator::ValidateOptions;
    use serde_json::json;

    fn compiled(schema: Value) -> CompiledSchema {
        compile(schema, &CompileOptions::new()).unwrap()
    }

    #[test]
    fn test_truthiness_of_keywords() {
        let node = json!({"a": 0, "b": "", "c": false, "d": null, "e": [], "f": 1});
        for absent in ["a", "b", "c", "d", "missing"] {
            assert!(keyword(&node, absent).is_none(), "{} should be absent", absent);
        }
        assert!(keyword(&node, "e").is_some());
        assert!(keyword(&node, "f").is_some());
    }

    #[test]
    fn test_dispatch_order_type_wins() {
        let node = json!({"type": "string", "enum": [1, 2], "$ref": "#/nowhere"});
        let key = NodeKey::root(DocId::default());
        assert!(matches!(NodeKind::classify(&node, &key).unwrap(), NodeKind::Typed(_)));

        let node = json!({"anyOf": [], "oneOf": []});
        assert!(matches!(NodeKind::classify(&node, &key).unwrap(), NodeKind::AnyOf(_)));
    }

    #[test]
    fn test_non_array_combinator_is_invalid() {
        let err = compile(json!({"allOf": {"type": "string"}}), &CompileOptions::new()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidSchema { .. }));
    }

    #[test]
    fn test_top_level_enum() {
        let schema = compiled(json!({"enum": ["a", "b", "c"]}));
        for ok in ["a", "b", "c"] {
            assert!(schema.is_valid(&json!(ok)));
        }
        let errors = schema.validate(&json!("d")).unwrap_err();
        assert!(errors.has_code("any.only"));
        assert!(!schema.is_valid(&json!(1)));
    }

    #[test]
    fn test_unrecognized_node_accepts_anything() {
        let schema = compiled(json!({"description": "nothing to see"}));
        assert!(schema.is_valid(&json!({"any": "thing"})));
        assert!(schema.is_valid(&json!(null)));
    }

    #[test]
    fn test_one_of_is_required_any_of_is_not() {
        let branches = json!([{"type": "string"}, {"type": "number"}]);
        let one_of = compiled(json!({"oneOf": branches}));
        let any_of = compiled(json!({"anyOf": branches}));

        assert!(one_of.validate_optional(None).unwrap_err().has_code("any.required"));
        assert_eq!(any_of.validate_optional(None), Ok(None));
        assert!(one_of.is_valid(&json!("x")));
        assert!(any_of.is_valid(&json!(2)));
        assert!(!any_of.is_valid(&json!(true)));
    }

    #[test]
    fn test_self_reference_uses_deferred_cell() {
        let schema = compiled(json!({
            "type": "object",
            "properties": {
                "value": {"type": "integer"},
                "next": {"$ref": "#", "allowNull": true}
            }
        }));
        assert!(schema.is_valid(&json!({"value": 1, "next": {"value": 2, "next": null}})));
        let errors = schema
            .validate(&json!({"value": 1, "next": {"value": "two"}}))
            .unwrap_err();
        assert_eq!(errors.errors()[0].path, "/next/value");
    }

    #[test]
    fn test_reference_to_itself_accepts_anything() {
        let schema = compiled(json!({"$ref": "#"}));
        assert!(schema.is_valid(&json!(42)));
    }

    #[test]
    fn test_shared_reference_is_resolved_once() {
        let schema = compiled(json!({
            "type": "object",
            "properties": {
                "a": {"$ref": "#/definitions/Name"},
                "b": {"$ref": "#/definitions/Name"}
            },
            "definitions": {"Name": {"type": "string", "maxLength": 3}}
        }));
        let root = schema.root();
        let Rule::Object(rule) = &root.rule else {
            panic!("expected an object rule, got {:?}", root.rule);
        };
        let properties = rule.properties.as_ref().unwrap();
        assert_eq!(properties["a"], properties["b"]);
    }

    #[test]
    fn test_conditional_all_of_entry() {
        let schema = compiled(json!({
            "allOf": [{
                "if": {"type": "string"},
                "then": {"type": "string", "maxLength": 2},
                "else": {"type": "number", "maximum": 2}
            }]
        }));
        assert!(schema.is_valid(&json!("ab")));
        assert!(!schema.is_valid(&json!("abc")));
        assert!(schema.is_valid(&json!(1)));
        assert!(!schema.is_valid(&json!(3)));
    }

    #[test]
    fn test_path_source_uses_loader() {
        let loader = MemoryLoader::new()
            .with("/virtual/root.json", json!({"$ref": "defs.json#/Flag"}))
            .with("/virtual/defs.json", json!({"Flag": {"type": "boolean"}}));
        let options = CompileOptions::new().with_loader(Arc::new(loader));

        let schema = compile(Path::new("/virtual/root.json"), &options).unwrap();
        assert!(schema.is_valid(&json!(true)));
        assert!(!schema.is_valid(&json!("true")));
    }

    #[test]
    fn test_missing_root_file() {
        let options = CompileOptions::new().with_loader(Arc::new(MemoryLoader::new()));
        let err = compile(Path::new("/virtual/none.json"), &options).unwrap_err();
        assert!(matches!(err, CompileError::DocumentNotFound(_)));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            compile(json!(5), &CompileOptions::new()),
            Err(CompileError::InvalidArgument(_))
        ));
        assert!(CompileOptions::new().with_sub_schema("x", json!([1])).is_err());
        assert!(CompileOptions::new().with_sub_schemas_json(json!("nope")).is_err());
        assert!(CompileOptions::new()
            .with_sub_schemas_json(json!({"a": {"type": "string"}, "b": 3}))
            .is_err());
    }

    #[test]
    fn test_strip_unknown_applies_through_graph() {
        let schema = compiled(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}}
        }));
        let value = json!({"a": "x", "b": 1});
        assert!(schema.validate(&value).is_err());
        assert_eq!(
            schema.validate_with(&value, ValidateOptions { strip_unknown: true }),
            Ok(json!({"a": "x"}))
        );
    }
}
