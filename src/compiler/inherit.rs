//! Inheritance Merger
//!
//! Object properties are assembled from the `extends` chain before the
//! node's own `properties`:
//!
//! - each ancestor's properties are added only when the name is not claimed
//!   yet, so the most derived definition wins;
//! - each ancestor's `optional`/`required`/`forbidden` lists are applied right
//!   after its properties;
//! - the node's own properties then overwrite unconditionally, and its own
//!   requirement lists are applied last.

use std::collections::BTreeMap;

use serde_json::Value;

use super::Compiler;
use crate::document::{lookup, NodeKey};
use crate::error::{CompileError, Result};
use crate::validator::{Presence, ValidatorGraph, ValidatorId};

/// Property name to compiled validator
pub(crate) type PropertyMap = BTreeMap<String, ValidatorId>;

impl Compiler<'_> {
    /// Properties of the object node at `key`, inherited ones included.
    ///
    /// `None` when the node neither declares nor inherits any properties.
    pub(crate) fn merge_properties(&mut self, key: &NodeKey, node: &Value) -> Result<Option<PropertyMap>> {
        let mut merged = PropertyMap::new();
        let mut constrained = false;
        let mut visited = vec![key.clone()];
        let mut link = key.child("extends");

        loop {
            let link_root = self.store.root(link.doc);
            let Some(reference) = lookup(&link_root, &link.pointer).and_then(|l| l.get("$ref")) else {
                break;
            };
            let reference = reference.as_str().ok_or_else(|| {
                CompileError::invalid_schema(link.fragment(), "Expected extends.$ref to be a string")
            })?;

            // Resolved in the scope of the document that declared the link
            let ancestor = self.in_document(link.doc, |c| c.resolve_reference(reference))?;
            if visited.contains(&ancestor) {
                tracing::warn!("Cyclic extends chain at {}; ignoring {}", link.fragment(), reference);
                break;
            }
            visited.push(ancestor.clone());

            let ancestor_root = self.store.root(ancestor.doc);
            let ancestor_node = lookup(&ancestor_root, &ancestor.pointer).ok_or_else(|| {
                CompileError::ReferenceNotFound {
                    reference: reference.to_string(),
                }
            })?;

            if let Some(properties) = ancestor_node.get("properties").and_then(Value::as_object) {
                constrained = true;
                let declared = ancestor.child("properties");
                for name in properties.keys() {
                    let id = self.resolve(&declared.child(name))?;
                    merged.entry(name.clone()).or_insert(id);
                }
            }
            apply_requirements(&mut self.graph, &mut merged, ancestor_node);

            link = ancestor.child("extends");
        }

        if let Some(properties) = node.get("properties").and_then(Value::as_object) {
            constrained = true;
            let declared = key.child("properties");
            for name in properties.keys() {
                let id = self.resolve(&declared.child(name))?;
                merged.insert(name.clone(), id);
            }
        }
        apply_requirements(&mut self.graph, &mut merged, node);

        Ok(constrained.then_some(merged))
    }
}

/// Apply a node's `optional`, then `required`, then `forbidden` lists.
///
/// Names missing from `properties` are ignored. Overrides derive new
/// validator nodes; the shared originals keep their presence.
pub(crate) fn apply_requirements(graph: &mut ValidatorGraph, properties: &mut PropertyMap, node: &Value) {
    match node.get("optional") {
        Some(Value::String(all)) if all == "*" => {
            for id in properties.values_mut() {
                *id = graph.with_presence(*id, Presence::Optional);
            }
        }
        Some(Value::Array(names)) => mark(graph, properties, names, Presence::Optional),
        _ => {}
    }
    if let Some(Value::Array(names)) = node.get("required") {
        mark(graph, properties, names, Presence::Required);
    }
    if let Some(Value::Array(names)) = node.get("forbidden") {
        mark(graph, properties, names, Presence::Forbidden);
    }
}

fn mark(graph: &mut ValidatorGraph, properties: &mut PropertyMap, names: &[Value], presence: Presence) {
    for name in names.iter().filter_map(Value::as_str) {
        if let Some(id) = properties.get_mut(name) {
            *id = graph.with_presence(*id, presence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompileOptions};
    use crate::validator::{Rule, Validator};
    use serde_json::json;

    fn with_props(graph: &mut ValidatorGraph, names: &[&str]) -> PropertyMap {
        names
            .iter()
            .map(|name| (name.to_string(), graph.push(Validator::any())))
            .collect()
    }

    #[test]
    fn test_required_wins_over_optional_wildcard() {
        let mut graph = ValidatorGraph::new();
        let mut props = with_props(&mut graph, &["a", "b"]);
        let shared = props["a"];

        apply_requirements(
            &mut graph,
            &mut props,
            &json!({"optional": "*", "required": ["a", "missing"], "forbidden": ["b"]}),
        );
        assert_eq!(graph.get(props["a"]).presence, Presence::Required);
        assert_eq!(graph.get(props["b"]).presence, Presence::Forbidden);
        assert_eq!(graph.get(shared).presence, Presence::Optional);
        assert!(!props.contains_key("missing"));
    }

    #[test]
    fn test_child_property_overrides_parent() {
        let schema = compile(
            json!({
                "type": "object",
                "extends": {"$ref": "#/definitions/Parent"},
                "properties": {"id": {"type": "string"}},
                "definitions": {
                    "Parent": {
                        "type": "object",
                        "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
                        "required": ["id", "name"]
                    }
                }
            }),
            &CompileOptions::new(),
        )
        .unwrap();

        assert!(schema.is_valid(&json!({"id": "abc", "name": "n"})));
        assert!(!schema.is_valid(&json!({"id": 1, "name": "n"})));
        // Parent's requirement still applies to the inherited property
        assert!(schema.validate(&json!({"id": "abc"})).unwrap_err().has_code("any.required"));
    }

    #[test]
    fn test_inherited_only_properties_constrain_object() {
        let schema = compile(
            json!({
                "type": "object",
                "extends": {"$ref": "#/definitions/Base"},
                "definitions": {"Base": {"properties": {"flag": {"type": "boolean"}}}}
            }),
            &CompileOptions::new(),
        )
        .unwrap();
        assert!(schema.is_valid(&json!({"flag": true})));
        assert!(!schema.is_valid(&json!({"flag": true, "other": 1})));
    }

    #[test]
    fn test_chain_walks_every_ancestor() {
        let schema = compile(
            json!({
                "type": "object",
                "extends": {"$ref": "#/definitions/B"},
                "properties": {"c": {"type": "string"}},
                "definitions": {
                    "A": {"properties": {"a": {"type": "string"}}, "required": ["a"]},
                    "B": {
                        "extends": {"$ref": "#/definitions/A"},
                        "properties": {"b": {"type": "string"}, "a": {"type": "number"}}
                    }
                }
            }),
            &CompileOptions::new(),
        )
        .unwrap();

        let root = schema.root();
        let Rule::Object(rule) = &root.rule else {
            panic!("expected an object rule");
        };
        let names: Vec<&str> = rule.properties.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        // `a` comes from B (number), made required by A
        assert!(schema.is_valid(&json!({"a": 1})));
        assert!(!schema.is_valid(&json!({"a": "x"})));
        assert!(!schema.is_valid(&json!({"b": "x"})));
    }

    #[test]
    fn test_cyclic_extends_terminates() {
        let schema = compile(
            json!({
                "type": "object",
                "extends": {"$ref": "#/definitions/A"},
                "definitions": {
                    "A": {"extends": {"$ref": "#/definitions/B"}, "properties": {"a": {"type": "string"}}},
                    "B": {"extends": {"$ref": "#/definitions/A"}, "properties": {"b": {"type": "string"}}}
                }
            }),
            &CompileOptions::new(),
        )
        .unwrap();
        assert!(schema.is_valid(&json!({"a": "x", "b": "y"})));
    }

    #[test]
    fn test_property_extending_its_enclosing_definition() {
        let schema = compile(
            json!({
                "$ref": "#/definitions/Node",
                "definitions": {
                    "Node": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "child": {"type": "object", "extends": {"$ref": "#/definitions/Node"}}
                        }
                    }
                }
            }),
            &CompileOptions::new(),
        )
        .unwrap();
        assert!(schema.is_valid(&json!({"name": "a", "child": {"name": "b", "child": {"name": "c"}}})));
        assert!(!schema.is_valid(&json!({"name": "a", "child": {"name": 1}})));
        assert!(!schema.is_valid(&json!({"child": {"child": {"name": 2}}})));
        assert!(!schema.is_valid(&json!({"child": {"extra": true}})));
    }
}
