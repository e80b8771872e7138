use crate::name::{covers, namespace_of, Namespace};
use std::collections::BTreeMap;

/// Value payload of a key: text or raw binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Binary(Vec<u8>),
}

impl Value {
    /// The text payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Binary(_) => None,
        }
    }
}

/// One configuration entry: a hierarchical name, an optional value,
/// string metadata and a dirty flag.
///
/// The name is the key's immutable identity; values and metadata are
/// mutable. Every mutation marks the key dirty until the next successful
/// Set (or a Get that re-read it) clears the flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    name: String,
    value: Option<Value>,
    meta: BTreeMap<String, String>,
    dirty: bool,
}

impl Key {
    /// Create a new key without a value. New keys start dirty.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            meta: BTreeMap::new(),
            dirty: true,
        }
    }

    /// Create a new key with a text value.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut key = Self::new(name);
        key.value = Some(Value::Text(value.into()));
        key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Namespace {
        namespace_of(&self.name)
    }

    /// Whether this key is `parent` itself or below it.
    pub fn is_below(&self, parent: &str) -> bool {
        covers(parent, &self.name)
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The text value, if any.
    pub fn string(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }

    pub fn set_string(&mut self, value: impl Into<String>) {
        self.value = Some(Value::Text(value.into()));
        self.dirty = true;
    }

    pub fn set_binary(&mut self, value: Vec<u8>) {
        self.value = Some(Value::Binary(value));
        self.dirty = true;
    }

    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
        self.dirty = true;
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    pub fn set_meta(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(name.into(), value.into());
        self.dirty = true;
    }

    /// Iterate over all metadata entries in name order.
    pub fn meta_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.meta.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the key was modified since the last successful Get/Set.
    pub fn needs_sync(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
