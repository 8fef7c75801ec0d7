//! Unwrapping of the `{ "d": ... }` response envelope.

use serde_json::Value;

use crate::error::ClientError;

/// Result of a GET.
#[derive(Debug, Clone, PartialEq)]
pub enum GetResult {
    /// The query asked for `$count`
    Count(u64),
    /// The query named an id; `None` when nothing matched
    One(Option<Value>),
    Many(Vec<Value>),
}

impl GetResult {
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        match self {
            GetResult::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// The single row of an id lookup.
    #[must_use]
    pub fn into_one(self) -> Option<Value> {
        match self {
            GetResult::One(row) => row,
            _ => None,
        }
    }

    /// Rows of a collection query. A found single row is returned as a
    /// one-element list.
    #[must_use]
    pub fn into_many(self) -> Vec<Value> {
        match self {
            GetResult::Many(rows) => rows,
            GetResult::One(row) => row.into_iter().collect(),
            GetResult::Count(_) => Vec::new(),
        }
    }
}

/// What shape the caller expects inside `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Count,
    One,
    Many,
}

/// Validate a GET response and take its payload out of the envelope.
///
/// # Errors
/// Returns `InvalidResponse` for anything that is not an object with a
/// non-null `d`, and `MultipleResults` when a single row was expected but `d`
/// holds more than one.
pub fn unwrap_get(data: Value, expect: Expect) -> Result<GetResult, ClientError> {
    let d = match data {
        Value::Object(mut map) => map.remove("d"),
        // `typeof []` is "object" and has no `d`
        Value::Array(_) => None,
        other => {
            return Err(ClientError::InvalidResponse(format!(
                "Response was not a JSON object: '{}'",
                js_type(&other)
            )));
        }
    };
    let d = d.filter(|d| !d.is_null()).ok_or_else(|| {
        ClientError::InvalidResponse("Invalid response received, the 'd' property is missing.".into())
    })?;

    match expect {
        Expect::Count => d
            .as_u64()
            .map(GetResult::Count)
            .ok_or_else(|| ClientError::InvalidResponse(format!("Expected a count, got: {d}"))),
        Expect::One => match d {
            Value::Array(rows) if rows.len() > 1 => Err(ClientError::MultipleResults),
            Value::Array(rows) => Ok(GetResult::One(rows.into_iter().next())),
            other => Ok(GetResult::One(Some(other))),
        },
        Expect::Many => match d {
            Value::Array(rows) => Ok(GetResult::Many(rows)),
            other => Ok(GetResult::Many(vec![other])),
        },
    }
}

fn js_type(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}
