//! Schema Documents
//!
//! Every schema node is addressed by a [`NodeKey`]: the document it lives in
//! plus a JSON pointer into that document. Keys are the identity used for
//! memoizing compiled validators and for detecting reference cycles, so the
//! input JSON is never annotated or mutated.
//!
//! Each document is stored once per compilation. Files are indexed by their
//! normalized absolute path and registry entries by the identifier they were
//! found under.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

/// Key a caller can set on a document to override its base directory
pub const JSON_ROOT_KEY: &str = "jsonRoot";

/// Index of a document inside a [`DocumentStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(usize);

/// Identity of one schema node: owning document + JSON pointer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub doc: DocId,
    pub pointer: String,
}

impl NodeKey {
    /// Key of a document root
    pub fn root(doc: DocId) -> Self {
        Self {
            doc,
            pointer: String::new(),
        }
    }

    /// Key of a named child (object member)
    pub fn child(&self, segment: &str) -> Self {
        Self {
            doc: self.doc,
            pointer: format!("{}/{}", self.pointer, escape_segment(segment)),
        }
    }

    /// Key of an array element
    pub fn index(&self, index: usize) -> Self {
        Self {
            doc: self.doc,
            pointer: format!("{}/{}", self.pointer, index),
        }
    }

    /// Pointer in `#/a/b` form, for diagnostics
    pub fn fragment(&self) -> String {
        format!("#{}", self.pointer)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc{}#{}", self.doc.0, self.pointer)
    }
}

/// Where a document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Supplied in memory by the caller
    Inline,
    /// Loaded from a file
    File(PathBuf),
    /// Taken from the sub-schema registry under this identifier
    Registry(String),
}

/// A document root together with its base directory (`jsonRoot`)
#[derive(Debug, Clone)]
pub struct Document {
    pub root: Arc<Value>,
    pub base_dir: Option<PathBuf>,
    pub origin: DocumentOrigin,
}

/// All documents reached during one compilation
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: Vec<Document>,
    by_path: HashMap<PathBuf, DocId>,
    by_registry_id: HashMap<String, DocId>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, reusing the existing entry for an already known
    /// file path or registry identifier.
    pub fn insert(&mut self, document: Document) -> DocId {
        match &document.origin {
            DocumentOrigin::File(path) => {
                if let Some(&id) = self.by_path.get(path) {
                    return id;
                }
            }
            DocumentOrigin::Registry(name) => {
                if let Some(&id) = self.by_registry_id.get(name) {
                    return id;
                }
            }
            DocumentOrigin::Inline => {}
        }

        let id = DocId(self.docs.len());
        match &document.origin {
            DocumentOrigin::File(path) => {
                self.by_path.insert(path.clone(), id);
            }
            DocumentOrigin::Registry(name) => {
                self.by_registry_id.insert(name.clone(), id);
            }
            DocumentOrigin::Inline => {}
        }
        self.docs.push(document);
        id
    }

    pub fn get(&self, id: DocId) -> &Document {
        &self.docs[id.0]
    }

    /// Shared handle on a document's JSON, independent of `&self`
    pub fn root(&self, id: DocId) -> Arc<Value> {
        Arc::clone(&self.docs[id.0].root)
    }

    pub fn base_dir(&self, id: DocId) -> Option<&Path> {
        self.docs[id.0].base_dir.as_deref()
    }

    pub fn by_path(&self, path: &Path) -> Option<DocId> {
        self.by_path.get(path).copied()
    }

    pub fn by_registry_id(&self, name: &str) -> Option<DocId> {
        self.by_registry_id.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// `jsonRoot` declared on the document itself, if any
pub fn declared_json_root(value: &Value) -> Option<PathBuf> {
    value
        .get(JSON_ROOT_KEY)
        .and_then(Value::as_str)
        .map(PathBuf::from)
}

/// Remove a single leading byte-order mark
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Parse document text, tolerating a leading BOM
pub fn parse_document(text: &str) -> serde_json::Result<Value> {
    serde_json::from_str(strip_bom(text))
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_parent = matches!(normalized.components().next_back(), Some(Component::ParentDir));
                if at_parent || !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Make a path absolute against the working directory, then normalize it
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_path(path))
    } else {
        Ok(normalize_path(&std::env::current_dir()?.join(path)))
    }
}

/// Escape one JSON pointer segment (RFC 6901)
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Unescape one JSON pointer segment (RFC 6901)
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Look a canonical pointer up inside a document
pub fn lookup<'v>(root: &'v Value, pointer: &str) -> Option<&'v Value> {
    if pointer.is_empty() {
        Some(root)
    } else {
        root.pointer(pointer)
    }
}
