//! Resolver response parsing.
//!
//! Turns a raw resolver response into an id → value map restricted to the
//! requested ids. Ids that are requested but missing from the map resolve
//! as absent.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::batch::keys::Params;
use crate::error::ParseError;

/// Parsed values keyed by id.
pub type Parsed = HashMap<String, Value>;

pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: Value, ids: &[String], params: &Params) -> Result<Parsed, ParseError>;
}

impl<F> ResponseParser for F
where
    F: Fn(Value, &[String], &Params) -> Result<Parsed, ParseError> + Send + Sync,
{
    fn parse(&self, raw: Value, ids: &[String], params: &Params) -> Result<Parsed, ParseError> {
        self(raw, ids, params)
    }
}

/// Accepts `null`, an array of records with an `id` field, or an object
/// keyed by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicParser;

impl ResponseParser for BasicParser {
    fn parse(&self, raw: Value, ids: &[String], _params: &Params) -> Result<Parsed, ParseError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        match raw {
            Value::Null => Ok(Parsed::new()),
            Value::Array(records) => Ok(records
                .into_iter()
                .filter_map(|record| {
                    let id = record_id(&record)?;
                    wanted.contains(id.as_str()).then_some((id, record))
                })
                .collect()),
            Value::Object(map) => Ok(map
                .into_iter()
                .filter(|(id, value)| wanted.contains(id.as_str()) && !value.is_null())
                .collect()),
            Value::Bool(_) => Err(ParseError::UnexpectedShape("a boolean")),
            Value::Number(_) => Err(ParseError::UnexpectedShape("a number")),
            Value::String(_) => Err(ParseError::UnexpectedShape("a string")),
        }
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
