//! Declarative input/output schemas for agent descriptors.
//!
//! Every agent describes its input and output as a list of [`FieldSpec`]s and
//! one generic validator enforces the description — there are no per-agent
//! hand-written checks. Input validation materializes declared defaults and
//! reports every violation it finds, not just the first one, so a caller can
//! fix a bad payload in one round trip.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use url::Url;

/// One violation of a declared constraint, anchored to a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub problem: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// All violations found in one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ViolationSet(Vec<FieldViolation>);

impl ViolationSet {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self(violations)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldViolation> {
        self.0.iter()
    }
}

impl fmt::Display for ViolationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// The value kinds a field can declare.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Free-form string.
    Text,
    /// Absolute http(s) URL.
    Url,
    /// Calendar date, `YYYY-MM-DD` or `YYYY/MM/DD`.
    Date,
    /// Whole number, optionally bounded inclusively on either side.
    Integer { min: Option<i64>, max: Option<i64> },
    /// Any JSON number.
    Float,
    Bool,
    /// Array of strings.
    TextList,
    /// Array of objects, each conforming to the nested schema.
    ObjectList(Schema),
    /// Single nested object.
    Object(Schema),
    /// Free-form JSON object, no declared shape.
    FreeMap,
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Url => "url",
            FieldKind::Date => "date",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "boolean",
            FieldKind::TextList => "list[text]",
            FieldKind::ObjectList(_) => "list[object]",
            FieldKind::Object(_) => "object",
            FieldKind::FreeMap => "map",
        }
    }
}

/// Declaration of a single field: name, kind, requiredness, default.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    /// Minimum item count, list kinds only. Checked for report conformance;
    /// the fallback builder pads the list with placeholder entries to meet it.
    pub min_items: Option<usize>,
    pub description: Option<String>,
}

impl FieldSpec {
    fn with_kind(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            min_items: None,
            description: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Text)
    }

    pub fn url(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Url)
    }

    pub fn date(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Date)
    }

    pub fn integer(name: &str) -> Self {
        Self::with_kind(
            name,
            FieldKind::Integer {
                min: None,
                max: None,
            },
        )
    }

    pub fn float(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Bool)
    }

    pub fn text_list(name: &str) -> Self {
        Self::with_kind(name, FieldKind::TextList)
    }

    pub fn object(name: &str, schema: Schema) -> Self {
        Self::with_kind(name, FieldKind::Object(schema))
    }

    pub fn object_list(name: &str, item: Schema) -> Self {
        Self::with_kind(name, FieldKind::ObjectList(item))
    }

    pub fn free_map(name: &str) -> Self {
        Self::with_kind(name, FieldKind::FreeMap)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Inclusive bounds; applies to `Integer` fields only.
    pub fn bounds(mut self, lo: i64, hi: i64) -> Self {
        if let FieldKind::Integer { min, max } = &mut self.kind {
            *min = Some(lo);
            *max = Some(hi);
        }
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn at_least(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }
}

/// An ordered set of field declarations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn of(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a raw caller payload. Declared defaults are materialized;
    /// undeclared fields are ignored. `Null` is treated as an empty object so
    /// an agent whose inputs all carry defaults can be run with no body.
    pub fn validate_input(&self, raw: &Value) -> Result<ValidatedInput, ViolationSet> {
        let empty = Map::new();
        let object = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ViolationSet::new(vec![FieldViolation::new(
                    "input",
                    "expected a JSON object",
                )]))
            }
        };

        let mut violations = Vec::new();
        let values = walk_object(self, object, "", true, &mut violations);
        if violations.is_empty() {
            Ok(ValidatedInput { values })
        } else {
            Err(ViolationSet::new(violations))
        }
    }

    /// Check a produced report against this schema. Returns every violation;
    /// an empty result means the report conforms. Extra fields are allowed.
    pub fn check_report(&self, report: &Value) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        match report {
            Value::Object(map) => {
                walk_object(self, map, "", false, &mut violations);
            }
            _ => violations.push(FieldViolation::new("report", "expected a JSON object")),
        }
        violations
    }

    /// JSON description of this schema for the public metadata surface.
    pub fn summary(&self) -> Value {
        Value::Array(self.fields.iter().map(field_summary).collect())
    }
}

fn field_summary(spec: &FieldSpec) -> Value {
    let mut entry = Map::new();
    entry.insert("name".into(), json!(spec.name));
    entry.insert("type".into(), json!(spec.kind.type_name()));
    entry.insert("required".into(), json!(spec.required));
    if let Some(default) = &spec.default {
        entry.insert("default".into(), default.clone());
    }
    if let FieldKind::Integer { min, max } = &spec.kind {
        if let Some(min) = min {
            entry.insert("min".into(), json!(min));
        }
        if let Some(max) = max {
            entry.insert("max".into(), json!(max));
        }
    }
    if let Some(n) = spec.min_items {
        entry.insert("min_items".into(), json!(n));
    }
    match &spec.kind {
        FieldKind::Object(inner) | FieldKind::ObjectList(inner) => {
            entry.insert("fields".into(), inner.summary());
        }
        _ => {}
    }
    if let Some(text) = &spec.description {
        entry.insert("description".into(), json!(text));
    }
    Value::Object(entry)
}

/// Walk one object level, accumulating violations. With `fill_defaults` the
/// returned map carries every declared field that was present or defaulted
/// (input mode); without it only violations matter (report mode).
fn walk_object(
    schema: &Schema,
    object: &Map<String, Value>,
    prefix: &str,
    fill_defaults: bool,
    violations: &mut Vec<FieldViolation>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for spec in &schema.fields {
        let path = if prefix.is_empty() {
            spec.name.clone()
        } else {
            format!("{prefix}.{}", spec.name)
        };
        let value = object.get(&spec.name).filter(|v| !v.is_null());
        match value {
            None => {
                if fill_defaults {
                    if let Some(default) = &spec.default {
                        out.insert(spec.name.clone(), default.clone());
                        continue;
                    }
                }
                if spec.required {
                    violations.push(FieldViolation::new(&path, "missing required field"));
                }
            }
            Some(value) => {
                check_value(spec, value, &path, fill_defaults, violations);
                if fill_defaults {
                    out.insert(spec.name.clone(), value.clone());
                }
            }
        }
    }
    out
}

fn check_value(
    spec: &FieldSpec,
    value: &Value,
    path: &str,
    fill_defaults: bool,
    violations: &mut Vec<FieldViolation>,
) {
    match &spec.kind {
        FieldKind::Text => {
            if !value.is_string() {
                violations.push(FieldViolation::new(path, "expected a string"));
            }
        }
        FieldKind::Url => match value.as_str() {
            Some(s) => {
                if !is_http_url(s) {
                    violations.push(FieldViolation::new(path, "not a valid http(s) URL"));
                }
            }
            None => violations.push(FieldViolation::new(path, "expected a string")),
        },
        FieldKind::Date => match value.as_str() {
            Some(s) => {
                if parse_date(s).is_none() {
                    violations.push(FieldViolation::new(
                        path,
                        "expected YYYY-MM-DD or YYYY/MM/DD",
                    ));
                }
            }
            None => violations.push(FieldViolation::new(path, "expected a string")),
        },
        FieldKind::Integer { min, max } => match value.as_i64() {
            Some(n) => match (min, max) {
                (Some(lo), Some(hi)) if n < *lo || n > *hi => {
                    violations.push(FieldViolation::new(
                        path,
                        format!("must be between {lo} and {hi}"),
                    ));
                }
                (Some(lo), None) if n < *lo => {
                    violations.push(FieldViolation::new(path, format!("must be at least {lo}")));
                }
                (None, Some(hi)) if n > *hi => {
                    violations.push(FieldViolation::new(path, format!("must be at most {hi}")));
                }
                _ => {}
            },
            None => violations.push(FieldViolation::new(path, "expected an integer")),
        },
        FieldKind::Float => {
            if value.as_f64().is_none() {
                violations.push(FieldViolation::new(path, "expected a number"));
            }
        }
        FieldKind::Bool => {
            if !value.is_boolean() {
                violations.push(FieldViolation::new(path, "expected a boolean"));
            }
        }
        FieldKind::TextList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        violations
                            .push(FieldViolation::new(format!("{path}[{i}]"), "expected a string"));
                    }
                }
            }
            None => violations.push(FieldViolation::new(path, "expected an array of strings")),
        },
        FieldKind::ObjectList(item_schema) => match value.as_array() {
            Some(items) => {
                if let Some(n) = spec.min_items {
                    if items.len() < n {
                        violations.push(FieldViolation::new(
                            path,
                            format!("must contain at least {n} item(s)"),
                        ));
                    }
                }
                for (i, item) in items.iter().enumerate() {
                    match item.as_object() {
                        Some(map) => {
                            walk_object(
                                item_schema,
                                map,
                                &format!("{path}[{i}]"),
                                fill_defaults,
                                violations,
                            );
                        }
                        None => violations.push(FieldViolation::new(
                            format!("{path}[{i}]"),
                            "expected an object",
                        )),
                    }
                }
            }
            None => violations.push(FieldViolation::new(path, "expected an array of objects")),
        },
        FieldKind::Object(inner) => match value.as_object() {
            Some(map) => {
                walk_object(inner, map, path, fill_defaults, violations);
            }
            None => violations.push(FieldViolation::new(path, "expected an object")),
        },
        FieldKind::FreeMap => {
            if !value.is_object() {
                violations.push(FieldViolation::new(path, "expected an object"));
            }
        }
    }
}

fn is_http_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Accepts the two date spellings the leaderboard sources use.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .ok()
}

/// Caller input after validation: every declared field present or defaulted,
/// every constraint honored. Runners read from this, never from raw JSON.
#[derive(Debug, Clone)]
pub struct ValidatedInput {
    values: Map<String, Value>,
}

impl ValidatedInput {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_i64())
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    /// Required-field accessor. Absence after validation is an engine
    /// invariant break, so this is an error, not a panic.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.str(name)
            .ok_or_else(|| anyhow!("field '{name}' missing after validation"))
    }

    pub fn require_i64(&self, name: &str) -> Result<i64> {
        self.integer(name)
            .ok_or_else(|| anyhow!("field '{name}' missing after validation"))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    #[cfg(test)]
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_input_schema() -> Schema {
        Schema::of(vec![
            FieldSpec::url("url").required(),
            FieldSpec::integer("max_startups").bounds(1, 1000).default_value(12),
            FieldSpec::text("output_path"),
        ])
    }

    #[test]
    fn defaults_are_materialized() {
        let schema = listing_input_schema();
        let input = schema
            .validate_input(&json!({"url": "https://example.com/startups"}))
            .unwrap();
        assert_eq!(input.integer("max_startups"), Some(12));
        assert_eq!(input.str("url"), Some("https://example.com/startups"));
        assert!(input.str("output_path").is_none());
    }

    #[test]
    fn out_of_range_integer_is_a_violation() {
        let schema = listing_input_schema();
        let err = schema
            .validate_input(&json!({"url": "https://example.com", "max_startups": 5000}))
            .unwrap_err();
        assert_eq!(err.len(), 1);
        let text = err.to_string();
        assert!(text.contains("max_startups"));
        assert!(text.contains("between 1 and 1000"));
    }

    #[test]
    fn missing_required_and_bad_type_are_both_reported() {
        let schema = listing_input_schema();
        let err = schema
            .validate_input(&json!({"max_startups": "twelve"}))
            .unwrap_err();
        assert_eq!(err.len(), 2);
        let fields: Vec<&str> = err.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"url"));
        assert!(fields.contains(&"max_startups"));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let schema = listing_input_schema();
        for bad in ["not a url", "ftp://example.com", "example.com/startups"] {
            let err = schema.validate_input(&json!({ "url": bad })).unwrap_err();
            assert!(err.iter().any(|v| v.field == "url"), "accepted {bad:?}");
        }
    }

    #[test]
    fn null_body_means_defaults_only() {
        let schema = Schema::of(vec![
            FieldSpec::url("url").default_value("https://betalist.com/"),
            FieldSpec::integer("last_days").bounds(1, 30).default_value(3),
        ]);
        let input = schema.validate_input(&Value::Null).unwrap();
        assert_eq!(input.str("url"), Some("https://betalist.com/"));
        assert_eq!(input.integer("last_days"), Some(3));
    }

    #[test]
    fn date_accepts_both_spellings() {
        let schema = Schema::of(vec![FieldSpec::date("date").required()]);
        assert!(schema.validate_input(&json!({"date": "2026-03-14"})).is_ok());
        assert!(schema.validate_input(&json!({"date": "2026/03/14"})).is_ok());
        let err = schema
            .validate_input(&json!({"date": "14/03/2026"}))
            .unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn report_check_walks_nested_lists() {
        let schema = Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "startups",
                Schema::of(vec![
                    FieldSpec::text("name").required(),
                    FieldSpec::text("description"),
                ]),
            )
            .required(),
        ]);

        let good = json!({
            "source_url": "https://example.com",
            "startups": [{"name": "Acme"}, {"name": "Globex", "description": "widgets"}]
        });
        assert!(schema.check_report(&good).is_empty());

        let bad = json!({
            "source_url": "https://example.com",
            "startups": [{"description": "no name"}]
        });
        let violations = schema.check_report(&bad);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "startups[0].name");
    }

    #[test]
    fn report_check_enforces_min_items() {
        let schema = Schema::of(vec![FieldSpec::object_list(
            "products",
            Schema::of(vec![FieldSpec::text("product_name").required()]),
        )
        .required()
        .at_least(1)]);

        let violations = schema.check_report(&json!({"products": []}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].problem.contains("at least 1"));
    }

    #[test]
    fn extra_report_fields_are_allowed() {
        let schema = Schema::of(vec![FieldSpec::text("source_url").required()]);
        let report = json!({"source_url": "x", "unexpected": [1, 2, 3]});
        assert!(schema.check_report(&report).is_empty());
    }

    #[test]
    fn summary_carries_bounds_and_defaults() {
        let schema = listing_input_schema();
        let summary = schema.summary();
        let fields = summary.as_array().unwrap();
        let max = fields
            .iter()
            .find(|f| f["name"] == "max_startups")
            .unwrap();
        assert_eq!(max["type"], "integer");
        assert_eq!(max["default"], 12);
        assert_eq!(max["min"], 1);
        assert_eq!(max["max"], 1000);
    }
}
