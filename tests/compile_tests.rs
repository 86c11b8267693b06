//! End-to-end compile and validate tests
//!
//! Schemas on disk live under tests/fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use include_dir::{include_dir, Dir};
use serde_json::{json, Value};

use schema_compiler::{
    compile, CompileError, CompileOptions, CompilerConfig, EmbeddedLoader, FnValidator, ValidateOptions,
};

static FIXTURES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures");

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(relative)
}

fn compiled(schema: Value) -> schema_compiler::CompiledSchema {
    compile(schema, &CompileOptions::new()).unwrap()
}

// =============================================================================
// Primitives and combinators
// =============================================================================

#[test]
fn test_acyclic_schema_accepts_conforming_and_rejects_wrong_types() {
    let schema = compiled(json!({
        "type": "object",
        "properties": {
            "id": {"type": "integer", "minimum": 1},
            "email": {"type": "string", "format": "email"},
            "tags": {"type": "array", "items": {"type": "string"}, "uniqueItems": true},
            "born": {"type": "string", "format": "date"}
        },
        "required": ["id"]
    }));

    let conforming = json!({"id": 7, "email": "a@b.io", "tags": ["x", "y"], "born": "1990-04-01"});
    assert_eq!(schema.validate(&conforming), Ok(conforming.clone()));

    let errors = schema.validate(&json!({"id": "7"})).unwrap_err();
    assert!(!errors.is_empty());
    assert!(errors.has_code("number.base"));
}

#[test]
fn test_enum_accepts_exactly_listed_values() {
    let schema = compiled(json!({"enum": ["a", "b", "c"]}));

    for value in [json!("a"), json!("b"), json!("c")] {
        assert!(schema.is_valid(&value), "{} should be accepted", value);
    }
    for value in [json!("d"), json!(1), json!(null), json!({}), json!(["a"])] {
        assert!(!schema.is_valid(&value), "{} should be rejected", value);
    }
}

#[test]
fn test_all_of_reports_every_branch() {
    let schema = compiled(json!({
        "allOf": [
            {"type": "object", "properties": {"x": {"type": "number"}}, "required": ["x"]},
            {"type": "object", "properties": {"y": {"type": "number"}}, "required": ["y"]}
        ]
    }));

    assert!(!schema.is_valid(&json!({"x": 1})));
    assert!(!schema.is_valid(&json!({"y": 1})));
    assert_eq!(schema.validate(&json!({"x": 1, "y": 2})), Ok(json!({"x": 1, "y": 2})));

    let errors = schema.validate(&json!({})).unwrap_err();
    assert_eq!(errors.at("/x").count(), 1);
    assert_eq!(errors.at("/y").count(), 1);
}

#[test]
fn test_one_of_rejects_absent_value_any_of_accepts_it() {
    let branches = json!([{"type": "string"}, {"type": "number"}]);
    let one_of = compiled(json!({"oneOf": branches.clone()}));
    let any_of = compiled(json!({"anyOf": branches}));

    assert!(one_of.validate_optional(None).is_err());
    assert_eq!(any_of.validate_optional(None), Ok(None));

    // Same rule inside an object
    let holder = compiled(json!({
        "type": "object",
        "properties": {"choice": {"oneOf": [{"type": "string"}, {"type": "number"}]}}
    }));
    assert!(holder.validate(&json!({})).unwrap_err().has_code("any.required"));
    assert!(holder.is_valid(&json!({"choice": 3})));
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn test_self_referential_tree_three_levels_deep() {
    let schema = compile(fixture("tree.json"), &CompileOptions::new()).unwrap();

    let tree = json!({
        "name": "root",
        "parent": null,
        "children": [
            {"name": "child", "children": [
                {"name": "grandchild", "children": []}
            ]}
        ]
    });
    assert!(schema.is_valid(&tree));

    let broken = json!({
        "name": "root",
        "children": [{"name": "child", "children": [{"children": []}]}]
    });
    let errors = schema.validate(&broken).unwrap_err();
    assert_eq!(errors.errors()[0].path, "/children/0/children/0/name");
    assert_eq!(errors.errors()[0].code, "any.required");
}

#[test]
fn test_cross_file_cycle_compiles() {
    let schema = compile(fixture("cycle/a.json"), &CompileOptions::new()).unwrap();

    assert!(schema.is_valid(&json!({"label": "top", "b": {"count": 1, "a": {"label": "again", "b": {"count": 2}}}})));
    assert!(!schema.is_valid(&json!({"b": {"a": {"label": 5}}})));
}

// =============================================================================
// Inheritance
// =============================================================================

#[test]
fn test_extends_child_constraint_wins() {
    let schema = compiled(json!({
        "type": "object",
        "extends": {"$ref": "#/definitions/Parent"},
        "properties": {"id": {"type": "string", "pattern": "^[a-z]+$"}},
        "definitions": {
            "Parent": {
                "type": "object",
                "properties": {"id": {"type": "integer"}, "created": {"type": "string", "format": "date-time"}}
            }
        }
    }));

    assert!(schema.is_valid(&json!({"id": "abc", "created": "2020-01-01T00:00:00Z"})));
    assert!(!schema.is_valid(&json!({"id": 12})));
    assert!(!schema.is_valid(&json!({"id": "ABC"})));
}

#[test]
fn test_optional_wildcard_then_required() {
    let schema = compiled(json!({
        "type": "object",
        "extends": {"$ref": "#/definitions/Base"},
        "optional": "*",
        "required": ["a"],
        "definitions": {
            "Base": {
                "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
                "required": ["a", "b"]
            }
        }
    }));

    assert!(schema.is_valid(&json!({"a": "x"})));
    assert!(schema.validate(&json!({"b": "y"})).unwrap_err().has_code("any.required"));
}

#[test]
fn test_forbidden_property() {
    let schema = compiled(json!({
        "type": "object",
        "properties": {"secret": {"type": "string"}, "name": {"type": "string"}},
        "forbidden": ["secret"]
    }));
    assert!(schema.is_valid(&json!({"name": "n"})));
    assert!(schema.validate(&json!({"secret": "s"})).unwrap_err().has_code("any.unknown"));
}

// =============================================================================
// References across documents
// =============================================================================

#[test]
fn test_relative_file_reference_resolves_against_declaring_directory() {
    let schema = compile(fixture("dir/root.json"), &CompileOptions::new()).unwrap();

    assert!(schema.is_valid(&json!({"foo": "ok"})));
    assert!(!schema.is_valid(&json!({"foo": "x"})));
    assert!(!schema.is_valid(&json!({})));

    // nested/bar.json is BOM-prefixed and refers back up with ../
    assert!(schema.is_valid(&json!({"foo": "ok", "bar": {"back": 3}})));
    assert!(!schema.is_valid(&json!({"foo": "ok", "bar": {"back": "3"}})));
}

#[test]
fn test_in_memory_root_with_base_dir() {
    let options = CompileOptions::new().with_base_dir(fixture("dir"));
    let schema = compile(json!({"$ref": "other.json#/Bar"}), &options).unwrap();
    assert!(schema.is_valid(&json!(4)));
    assert!(!schema.is_valid(&json!(4.5)));

    // jsonRoot on the document takes precedence
    let declared = json!({"jsonRoot": fixture("dir").to_string_lossy(), "$ref": "other.json#/Foo"});
    let schema = compile(declared, &CompileOptions::new()).unwrap();
    assert!(schema.is_valid(&json!("ab")));
}

#[test]
fn test_string_source_is_a_path() {
    let path = fixture("dir/other.json");
    let source = Value::String(path.to_string_lossy().into_owned());
    // other.json has no discriminator at its root: accept-anything fallback
    let schema = compile(source, &CompileOptions::new()).unwrap();
    assert!(schema.is_valid(&json!({"whatever": true})));
}

#[test]
fn test_sub_schema_registry() {
    let options = CompileOptions::new()
        .with_sub_schemas_json(json!({
            "shapes": {
                "Point": {
                    "type": "object",
                    "properties": {"x": {"type": "number"}, "y": {"type": "number"}},
                    "required": ["x", "y"]
                },
                "Polygon": {"type": "array", "items": {"$ref": "#/Point"}, "minItems": 3}
            }
        }))
        .unwrap();

    let schema = compile(json!({"$ref": "shapes#/Polygon"}), &options).unwrap();
    assert!(schema.is_valid(&json!([{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 0, "y": 1}])));
    assert!(schema.validate(&json!([{"x": 0}])).unwrap_err().has_code("array.min"));
}

#[test]
fn test_unresolvable_reference_fails_compilation() {
    let err = compile(json!({"$ref": "#/definitions/Missing"}), &CompileOptions::new()).unwrap_err();
    assert!(matches!(err, CompileError::ReferenceNotFound { .. }));
}

#[test]
fn test_embedded_loader() {
    let options = CompileOptions::new().with_loader(Arc::new(EmbeddedLoader::new(&FIXTURES, "/bundle")));
    let schema = compile(Path::new("/bundle/dir/root.json"), &options).unwrap();

    assert!(schema.is_valid(&json!({"foo": "ok", "bar": {"back": 1}})));
    assert!(!schema.is_valid(&json!({"foo": 1})));
}

// =============================================================================
// Custom types, stripping and configuration
// =============================================================================

#[test]
fn test_custom_type_inside_object() {
    let options = CompileOptions::new().with_type(
        "uppercase",
        FnValidator::new("uppercase", |v: &Value| match v.as_str() {
            Some(s) if s.chars().all(|c| !c.is_lowercase()) => Ok(()),
            _ => Err("must be an uppercase string".to_string()),
        }),
    );
    let schema = compile(
        json!({"type": "object", "properties": {"code": {"type": "uppercase"}}, "required": ["code"]}),
        &options,
    )
    .unwrap();

    assert!(schema.is_valid(&json!({"code": "ABC"})));
    let errors = schema.validate(&json!({"code": "abc"})).unwrap_err();
    assert_eq!(errors.errors()[0].path, "/code");
    assert_eq!(errors.errors()[0].code, "uppercase.base");
}

#[test]
fn test_strip_unknown_keeps_additional_properties() {
    let schema = compiled(json!({
        "type": "object",
        "properties": {
            "strict": {"type": "object", "properties": {"a": {"type": "number"}}},
            "open": {"type": "object", "properties": {"a": {"type": "number"}}, "additionalProperties": true}
        }
    }));
    let value = json!({"strict": {"a": 1, "z": 0}, "open": {"a": 1, "z": 0}});

    let errors = schema.validate(&value).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors()[0].path, "/strict/z");

    let stripped = schema.validate_with(&value, ValidateOptions { strip_unknown: true }).unwrap();
    assert_eq!(stripped, json!({"strict": {"a": 1}, "open": {"a": 1, "z": 0}}));
}

#[test]
fn test_options_from_config_preload_registry() {
    let dir = tempfile::tempdir().unwrap();
    let shared = dir.path().join("shared");
    fs::create_dir_all(shared.join("geo")).unwrap();
    fs::write(
        shared.join("geo/zip.json"),
        r#"{"$id": "urn:zip", "type": "string", "pattern": "^[0-9]{5}$"}"#,
    )
    .unwrap();
    fs::write(
        shared.join("address.json"),
        r#"{"type": "object", "properties": {"zip": {"$ref": "geo/zip.json"}}, "required": ["zip"]}"#,
    )
    .unwrap();

    let mut config = CompilerConfig::default();
    config.registry.dirs = vec![shared.clone()];
    let options = CompileOptions::from_config(&config).unwrap();
    assert!(options.sub_schema("urn:zip").is_some());
    assert!(options.sub_schema("geo/zip.json").is_some());

    let by_id = compile(json!({"$ref": "urn:zip#"}), &options).unwrap();
    assert!(by_id.is_valid(&json!("12345")));
    assert!(!by_id.is_valid(&json!("1234")));

    // address.json keeps a jsonRoot, so its relative file reference still works
    let address = compile(json!({"$ref": "address.json#"}), &options).unwrap();
    assert!(address.is_valid(&json!({"zip": "12345"})));
    assert!(!address.is_valid(&json!({"zip": "abc"})));
}
