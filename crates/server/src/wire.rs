//! Wire-format parsing for the create endpoint.
//!
//! The create body is coerced field by field from a raw JSON value so
//! that a missing `code` or a wrong-typed field surfaces as a client
//! error with a named field, not as a framework rejection.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("{0} value can't be empty")]
    MissingField(&'static str),
    #[error("{field} value should be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Clone, Debug, Default)]
pub struct CreateSnippetParams {
    pub code: String,
    pub header: Option<String>,
    pub views_limit: Option<u32>,
    pub minutes_limit: Option<i64>,
}

impl CreateSnippetParams {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, WireError> {
        Ok(Self {
            code: required_string(value, "code")?,
            header: optional_string(value, "header")?,
            views_limit: optional_uint(value, "viewsLimit")?.map(|n| n as u32),
            minutes_limit: optional_uint(value, "minutesLimit")?.map(|n| n as i64),
        })
    }
}

fn required_string(value: &serde_json::Value, field: &'static str) -> Result<String, WireError> {
    match value.get(field) {
        None | Some(serde_json::Value::Null) => Err(WireError::MissingField(field)),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(WireError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn optional_string(
    value: &serde_json::Value,
    field: &'static str,
) -> Result<Option<String>, WireError> {
    match value.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(WireError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn optional_uint(value: &serde_json::Value, field: &'static str) -> Result<Option<u64>, WireError> {
    match value.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => match n.as_u64() {
            Some(v) if v <= u32::MAX as u64 => Ok(Some(v)),
            _ => Err(WireError::WrongType {
                field,
                expected: "a non-negative integer",
            }),
        },
        Some(_) => Err(WireError::WrongType {
            field,
            expected: "a non-negative integer",
        }),
    }
}
