//! Report contract and the fallback builder.
//!
//! A report is always a JSON object, never null, and conforms to the agent's
//! output schema. When a run is interrupted the fallback builder produces the
//! smallest report that still satisfies the schema's structural requirements,
//! so downstream consumers never have to null-check a top-level shape.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{FieldKind, Schema};

/// Sentinel written into required string fields of a fallback report.
pub const UNAVAILABLE: &str = "Information unavailable";

/// The structured result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything but an object is refused.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => bail!("report must be a JSON object, got {}", type_of(&other)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build the minimal report satisfying `schema`'s structural requirements.
///
/// Required collections become empty sequences (or, under a declared item
/// minimum, that many placeholder entries), required strings the
/// [`UNAVAILABLE`] sentinel, required numerics their declared minimum (or
/// zero), required objects are built recursively. Optional fields are
/// omitted. A schema that requires a value with no structural placeholder
/// (a URL or a date) cannot be degraded — that is a descriptor bug and is
/// reported as an error for the engine to surface as internal.
pub fn fallback_report(schema: &Schema) -> Result<Report> {
    Ok(Report(fallback_object(schema)?))
}

fn fallback_object(schema: &Schema) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for spec in &schema.fields {
        if !spec.required {
            continue;
        }
        let floor = spec.min_items.unwrap_or(0);
        let value = match &spec.kind {
            FieldKind::Text => Value::String(UNAVAILABLE.to_string()),
            FieldKind::Integer { min, .. } => Value::from(min.unwrap_or(0)),
            FieldKind::Float => Value::from(0.0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::TextList => Value::Array(vec![
                Value::String(UNAVAILABLE.to_string());
                floor
            ]),
            FieldKind::ObjectList(item) => {
                let entry = fallback_object(item)?;
                Value::Array(vec![Value::Object(entry); floor])
            }
            FieldKind::Object(inner) => Value::Object(fallback_object(inner)?),
            FieldKind::FreeMap => Value::Object(Map::new()),
            FieldKind::Url | FieldKind::Date => bail!(
                "output schema requires '{}' ({:?}) which has no structural placeholder",
                spec.name,
                spec.kind
            ),
        };
        out.insert(spec.name.clone(), value);
    }
    Ok(out)
}
