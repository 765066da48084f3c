//! Optional-field readers shared by the resolver and the provider loader.
//!
//! A missing field is `Ok(None)` / empty; a present field of the wrong
//! shape is an error.

use std::collections::BTreeMap;

use crate::domain::{StructuredValue, ValueError};

pub(crate) fn string(value: &dyn StructuredValue, path: &str) -> Result<Option<String>, ValueError> {
    value.lookup(path).map(|v| v.as_string()).transpose()
}

pub(crate) fn string_or_default(value: &dyn StructuredValue, path: &str) -> Result<String, ValueError> {
    string(value, path).map(Option::unwrap_or_default)
}

pub(crate) fn string_list(value: &dyn StructuredValue, path: &str) -> Result<Vec<String>, ValueError> {
    value
        .lookup(path)
        .map(|v| v.as_string_list())
        .transpose()
        .map(Option::unwrap_or_default)
}

pub(crate) fn string_map(
    value: &dyn StructuredValue,
    path: &str,
) -> Result<BTreeMap<String, String>, ValueError> {
    value
        .lookup(path)
        .map(|v| v.as_string_map())
        .transpose()
        .map(Option::unwrap_or_default)
}
