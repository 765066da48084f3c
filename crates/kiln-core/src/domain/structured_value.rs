//! The opaque structured value seam.
//!
//! Element schemas, component data, transformer templates and produced
//! resources are all values owned by an external evaluation engine. The
//! core reaches into them only through [`StructuredValue`]; it never parses
//! or unifies anything itself.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to an engine-owned value.
pub type SharedValue = Arc<dyn StructuredValue>;

/// Failure to read a structured value as the requested shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("value is not concrete: {0}")]
    Incomplete(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Capability set the pipeline needs from an evaluated value tree.
///
/// Implemented by:
/// - `kiln_adapters::value::JsonValue` (serde_json tree)
///
/// Paths are dot-separated field names relative to `self`
/// (e.g. `"#metadata.name"`).
pub trait StructuredValue: fmt::Debug + Send + Sync {
    /// Look up a nested value.
    fn lookup(&self, path: &str) -> Option<SharedValue>;

    /// Whether a nested value exists.
    fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Read this value as a string scalar.
    fn as_string(&self) -> Result<String, ValueError>;

    /// Read this value as a list.
    fn as_list(&self) -> Result<Vec<SharedValue>, ValueError>;

    /// Iterate the fields of a struct value in the engine's field order.
    fn fields(&self) -> Result<Box<dyn Iterator<Item = (String, SharedValue)> + '_>, ValueError>;

    /// Export the value into the serde data model.
    fn to_canonical(&self) -> Result<serde_json::Value, ValueError>;
}

impl<'a> dyn StructuredValue + 'a {
    /// Decode the value into a typed record through its canonical export.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ValueError> {
        let exported = self.to_canonical()?;
        serde_json::from_value(exported).map_err(|e| ValueError::Decode(e.to_string()))
    }

    /// Deterministic byte encoding: object keys sorted, no whitespace.
    ///
    /// Semantically identical values produce identical bytes regardless of
    /// the engine's field order.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ValueError> {
        let sorted = sort_keys(self.to_canonical()?);
        serde_json::to_vec(&sorted).map_err(|e| ValueError::Decode(e.to_string()))
    }

    /// Read a list of string scalars.
    pub fn as_string_list(&self) -> Result<Vec<String>, ValueError> {
        self.as_list()?.iter().map(|item| item.as_string()).collect()
    }

    /// Read a struct of string scalars.
    pub fn as_string_map(&self) -> Result<BTreeMap<String, String>, ValueError> {
        self.fields()?
            .map(|(key, value)| value.as_string().map(|v| (key, v)))
            .collect()
    }
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        scalar => scalar,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal serde_json-backed value for unit tests inside this crate.

    use super::*;
    use serde_json::Value;

    #[derive(Debug, Clone)]
    pub struct TestValue(pub Value);

    pub fn value(json: Value) -> SharedValue {
        Arc::new(TestValue(json))
    }

    fn kind_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "struct",
        }
    }

    impl StructuredValue for TestValue {
        fn lookup(&self, path: &str) -> Option<SharedValue> {
            let mut current = &self.0;
            for segment in path.split('.') {
                current = current.as_object()?.get(segment)?;
            }
            Some(value(current.clone()))
        }

        fn as_string(&self) -> Result<String, ValueError> {
            self.0
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| ValueError::TypeMismatch {
                    expected: "string",
                    found: kind_of(&self.0).into(),
                })
        }

        fn as_list(&self) -> Result<Vec<SharedValue>, ValueError> {
            match &self.0 {
                Value::Array(items) => Ok(items.iter().cloned().map(value).collect()),
                other => Err(ValueError::TypeMismatch {
                    expected: "list",
                    found: kind_of(other).into(),
                }),
            }
        }

        fn fields(
            &self,
        ) -> Result<Box<dyn Iterator<Item = (String, SharedValue)> + '_>, ValueError> {
            match &self.0 {
                Value::Object(map) => Ok(Box::new(
                    map.iter().map(|(k, v)| (k.clone(), value(v.clone()))),
                )),
                other => Err(ValueError::TypeMismatch {
                    expected: "struct",
                    found: kind_of(other).into(),
                }),
            }
        }

        fn to_canonical(&self) -> Result<Value, ValueError> {
            Ok(self.0.clone())
        }
    }
}
