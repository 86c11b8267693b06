//! Reference Resolver
//!
//! A `$ref` is split at its first `#` into a document identifier (which
//! keeps the `#`) and a JSON pointer. The document is looked up, in order:
//!
//! 1. in the sub-schema registry, under the identifier with or without its
//!    trailing `#`;
//! 2. as a file relative to the base directory of the document on top of
//!    the schema stack (the whole reference is the file name when it has no
//!    `#`). Load failures are logged and skipped;
//! 3. otherwise the document on top of the schema stack.
//!
//! The pointer, if the reference had a `#`, is then walked from that
//! document's root.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::Compiler;
use crate::document::{
    declared_json_root, normalize_path, unescape_segment, DocId, Document, DocumentOrigin, NodeKey,
};
use crate::error::{CompileError, Result};

/// Split a reference into `(id, pointer)`.
///
/// `id` includes the `#` and is empty when there is none; `pointer` is
/// `None` when the reference has no `#` at all.
pub(crate) fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.find('#') {
        Some(at) => (&reference[..at + 1], Some(&reference[at + 1..])),
        None => ("", None),
    }
}

impl Compiler<'_> {
    /// Resolve a `$ref` string to the key of the node it points at
    pub(crate) fn resolve_reference(&mut self, reference: &str) -> Result<NodeKey> {
        let (id, pointer) = split_reference(reference);

        let mut doc = None;
        if !id.is_empty() {
            doc = self.registry_document(id);
        }
        if doc.is_none() && (id.is_empty() || id.len() > 1) {
            let file_name = id.strip_suffix('#').filter(|name| !name.is_empty()).unwrap_or(reference);
            doc = self.file_document(file_name);
        }
        let doc = doc
            .or_else(|| self.current_document())
            .ok_or_else(|| not_found(reference))?;

        let key = match pointer {
            Some(pointer) => self.walk_pointer(doc, pointer).ok_or_else(|| not_found(reference))?,
            None => NodeKey::root(doc),
        };
        tracing::debug!("Resolved reference {} to {}", reference, key);
        Ok(key)
    }

    fn registry_document(&mut self, id: &str) -> Option<DocId> {
        let bare = id.strip_suffix('#').unwrap_or(id);
        let name = [id, bare]
            .into_iter()
            .find(|name| self.options.sub_schemas.contains_key(*name))?;

        if let Some(doc) = self.store.by_registry_id(name) {
            return Some(doc);
        }
        let root = Arc::clone(&self.options.sub_schemas[name]);
        let base_dir = declared_json_root(&root);
        Some(self.store.insert(Document {
            root,
            base_dir,
            origin: DocumentOrigin::Registry(name.to_string()),
        }))
    }

    fn file_document(&mut self, file_name: &str) -> Option<DocId> {
        let base_dir = self.current_document().and_then(|doc| self.store.base_dir(doc))?;
        let path = normalize_path(&base_dir.join(file_name));

        if let Some(doc) = self.store.by_path(&path) {
            return Some(doc);
        }
        match self.options.loader().load(&path) {
            Ok(Some(root)) => {
                let base_dir = path.parent().map(Path::to_path_buf);
                Some(self.store.insert(Document {
                    root: Arc::new(root),
                    base_dir,
                    origin: DocumentOrigin::File(path),
                }))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to load schema file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Walk a `/`-separated pointer from a document root. The leading
    /// (empty) segment is skipped, so `#` and `#/` both reach the root.
    fn walk_pointer(&self, doc: DocId, pointer: &str) -> Option<NodeKey> {
        let root = self.store.root(doc);
        let mut key = NodeKey::root(doc);
        let mut current: &Value = &root;

        for raw in pointer.split('/').skip(1) {
            if raw.is_empty() {
                continue;
            }
            let segment = unescape_segment(raw);
            match current {
                Value::Object(map) => {
                    current = map.get(&segment)?;
                    key = key.child(&segment);
                }
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                    key = key.index(index);
                }
                _ => return None,
            }
        }
        Some(key)
    }
}

fn not_found(reference: &str) -> CompileError {
    CompileError::ReferenceNotFound {
        reference: reference.to_string(),
    }
}
