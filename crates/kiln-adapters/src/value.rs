//! `serde_json`-backed [`StructuredValue`].
//!
//! A [`JsonValue`] is a shared document root plus a JSON pointer to the node
//! it stands for, so lookups and field iteration never copy subtrees.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use kiln_core::domain::{SharedValue, StructuredValue, ValueError};

static NULL: Value = Value::Null;

#[derive(Clone)]
pub struct JsonValue {
    root: Arc<Value>,
    pointer: String,
}

impl JsonValue {
    /// Wrap a whole document.
    pub fn new(value: Value) -> Self {
        Self {
            root: Arc::new(value),
            pointer: String::new(),
        }
    }

    /// Wrap a whole document as a shared handle.
    pub fn shared(value: Value) -> SharedValue {
        Arc::new(Self::new(value))
    }

    /// The node this value points at.
    pub fn node(&self) -> &Value {
        self.root.pointer(&self.pointer).unwrap_or(&NULL)
    }

    fn child(&self, pointer: String) -> SharedValue {
        Arc::new(Self {
            root: Arc::clone(&self.root),
            pointer,
        })
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: kind_of(self.node()).into(),
        }
    }
}

/// Escape one path segment as a JSON pointer token.
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "struct",
    }
}

impl StructuredValue for JsonValue {
    /// Dot-separated lookup; numeric segments index into lists.
    fn lookup(&self, path: &str) -> Option<SharedValue> {
        let mut pointer = self.pointer.clone();
        for segment in path.split('.') {
            pointer.push('/');
            pointer.push_str(&escape(segment));
        }
        self.root.pointer(&pointer)?;
        Some(self.child(pointer))
    }

    fn as_string(&self) -> Result<String, ValueError> {
        match self.node() {
            Value::String(s) => Ok(s.clone()),
            _ => Err(self.mismatch("string")),
        }
    }

    fn as_list(&self) -> Result<Vec<SharedValue>, ValueError> {
        match self.node() {
            Value::Array(items) => Ok((0..items.len())
                .map(|i| self.child(format!("{}/{i}", self.pointer)))
                .collect()),
            _ => Err(self.mismatch("list")),
        }
    }

    fn fields(&self) -> Result<Box<dyn Iterator<Item = (String, SharedValue)> + '_>, ValueError> {
        match self.node() {
            Value::Object(map) => Ok(Box::new(map.keys().map(|key| {
                let pointer = format!("{}/{}", self.pointer, escape(key));
                (key.clone(), self.child(pointer))
            }))),
            _ => Err(self.mismatch("struct")),
        }
    }

    fn to_canonical(&self) -> Result<Value, ValueError> {
        Ok(self.node().clone())
    }
}

impl fmt::Debug for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonValue")
            .field("pointer", &self.pointer)
            .field("value", self.node())
            .finish()
    }
}
