//! Context and record key derivation.

use serde_json::{Map, Value};

/// Caller-supplied request parameters.
pub type Params = Map<String, Value>;

/// Derive the context key from the delimiter fields of `params`.
///
/// Each present field renders as `name=<json>`, joined by `;` in delimiter
/// order. Fields missing from `params` are skipped, so requests differing
/// only in non-delimiter params share a context.
pub fn context_key(delimiter: &[String], params: &Params) -> String {
    delimiter
        .iter()
        .filter_map(|name| params.get(name).map(|value| format!("{name}={value}")))
        .collect::<Vec<_>>()
        .join(";")
}

/// Key of one record inside a context.
pub fn record_key(context_key: &str, id: &str) -> String {
    format!("{context_key}::{id}")
}
