//! Salvage structured records out of model-produced markdown.
//!
//! Completion backends are asked for JSON but frequently answer with a
//! markdown table or a bold-keyed bullet list instead. Rather than discard
//! those answers, this module lifts records out of both shapes.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

/// One record recovered from markdown. `fields` holds every keyed value with
/// lowercased keys, so `record.fields["description"]` works regardless of the
/// casing the model chose.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownRecord {
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

impl MarkdownRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// First URL-ish field, checking the usual column names.
    pub fn url(&self) -> Option<&str> {
        ["url", "link", "website", "listing url", "site"]
            .iter()
            .find_map(|key| self.field(key))
            .filter(|v| v.starts_with("http"))
    }

    pub fn description(&self) -> Option<&str> {
        ["description", "summary", "notes", "about"]
            .iter()
            .find_map(|key| self.field(key))
    }
}

const NAME_KEYS: &[&str] = &[
    "name",
    "product_name",
    "company",
    "startup",
    "tool",
    "product",
    "title",
];

/// Parse pipe tables and `**Key:** value` bullet blocks into records.
/// Records without a recognizable name are dropped, and names are
/// deduplicated case-insensitively with the first occurrence winning.
pub fn parse_markdown_records(text: &str) -> Vec<MarkdownRecord> {
    let mut records = parse_tables(text);
    records.extend(parse_bold_blocks(text));

    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.name.to_lowercase()))
        .collect()
}

fn parse_tables(text: &str) -> Vec<MarkdownRecord> {
    let mut records = Vec::new();
    let mut header: Option<Vec<String>> = None;

    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('|') {
            header = None;
            continue;
        }
        let cells: Vec<&str> = line
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim())
            .collect();

        if is_separator_row(&cells) {
            continue;
        }
        match &header {
            None => {
                header = Some(cells.iter().map(|c| c.to_lowercase()).collect());
            }
            Some(columns) => {
                if let Some(record) = row_to_record(columns, &cells) {
                    records.push(record);
                }
            }
        }
    }
    records
}

fn is_separator_row(cells: &[&str]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
}

fn row_to_record(columns: &[String], cells: &[&str]) -> Option<MarkdownRecord> {
    let mut fields = BTreeMap::new();
    let mut link_url = None;

    for (column, cell) in columns.iter().zip(cells) {
        let (value, url) = split_markdown_link(cell);
        if url.is_some() && link_url.is_none() {
            link_url = url;
        }
        if !value.is_empty() {
            fields.insert(column.clone(), value);
        }
    }
    if let Some(url) = link_url {
        fields.entry("url".to_string()).or_insert(url);
    }

    let name = NAME_KEYS.iter().find_map(|key| fields.remove(*key))?;
    if name.is_empty() || name.eq_ignore_ascii_case("n/a") {
        return None;
    }
    Some(MarkdownRecord { name, fields })
}

fn parse_bold_blocks(text: &str) -> Vec<MarkdownRecord> {
    let pair_re =
        Regex::new(r"^[-*]?\s*\*\*([^:*]+):?\*\*:?\s*(.*)$").expect("bold pair regex is valid");

    let mut records = Vec::new();
    let mut current: Option<MarkdownRecord> = None;

    for line in text.lines() {
        let Some(caps) = pair_re.captures(line.trim()) else {
            continue;
        };
        let key = caps[1].trim().to_lowercase();
        let (value, url) = split_markdown_link(caps[2].trim());

        if NAME_KEYS.contains(&key.as_str()) {
            if let Some(record) = current.take() {
                records.push(record);
            }
            if !value.is_empty() {
                current = Some(MarkdownRecord {
                    name: value,
                    fields: BTreeMap::new(),
                });
            }
        } else if let Some(record) = current.as_mut() {
            let value = url.unwrap_or(value);
            if !value.is_empty() {
                record.fields.insert(key, value);
            }
        }
    }
    if let Some(record) = current.take() {
        records.push(record);
    }
    records
}

/// `[text](href)` becomes `(text, Some(href))`; plain text passes through.
fn split_markdown_link(cell: &str) -> (String, Option<String>) {
    let link_re = Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").expect("markdown link regex is valid");
    if let Some(caps) = link_re.captures(cell) {
        let text = caps[1].trim().to_string();
        let href = caps[2].trim().to_string();
        let text = if text.is_empty() { href.clone() } else { text };
        return (text, Some(href));
    }
    (cell.trim().to_string(), None)
}

/// Records from a JSON answer: an array of objects, or an object wrapping
/// one under the usual collection keys. Scalar field values are stringified,
/// string arrays joined with commas, and nested structures skipped.
pub fn records_from_json(value: &Value) -> Vec<MarkdownRecord> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => {
            let nested = ["items", "records", "startups", "companies", "products", "tools"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_array()));
            match nested {
                Some(items) => items.as_slice(),
                None => std::slice::from_ref(value),
            }
        }
        _ => return Vec::new(),
    };

    let mut records = Vec::new();
    for item in items {
        let Value::Object(map) = item else {
            continue;
        };
        let mut fields = BTreeMap::new();
        for (key, field_value) in map {
            let rendered = match field_value {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(parts) => parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => continue,
            };
            if !rendered.is_empty() {
                fields.insert(key.to_lowercase(), rendered);
            }
        }
        let Some(name) = NAME_KEYS.iter().find_map(|key| fields.remove(*key)) else {
            continue;
        };
        if !name.is_empty() {
            records.push(MarkdownRecord { name, fields });
        }
    }
    records
}

/// Pull the first parseable JSON value out of a completion. Tries the whole
/// text first, then each fenced code block.
pub fn extract_json_block(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let fence_re =
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("code fence regex is valid");
    for caps in fence_re.captures_iter(text) {
        if let Ok(value) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_table_rows_become_records() {
        let text = "\
Here are the companies:

| Rank | Name | URL | Description |
|------|------|-----|-------------|
| 1 | Acme | [site](https://acme.dev) | Anvils as a service |
| 2 | Globex | https://globex.io | Global exports |
";
        let records = parse_markdown_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Acme");
        assert_eq!(records[0].url(), Some("https://acme.dev"));
        assert_eq!(records[0].description(), Some("Anvils as a service"));
        assert_eq!(records[1].field("url"), Some("https://globex.io"));
    }

    #[test]
    fn bold_key_blocks_become_records() {
        let text = "\
**Name:** Initech
**Website:** [initech.example](https://initech.example)
**Description:** TPS report automation.

- **Name:** Hooli
- **Description:** Making the world a better place.
";
        let records = parse_markdown_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Initech");
        assert_eq!(records[0].url(), Some("https://initech.example"));
        assert_eq!(records[1].name, "Hooli");
        assert!(records[1].url().is_none());
    }

    #[test]
    fn duplicate_names_across_shapes_are_collapsed() {
        let text = "\
| Name | Description |
|------|-------------|
| Acme | from table |

**Name:** ACME
**Description:** from bullets
";
        let records = parse_markdown_records(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description(), Some("from table"));
    }

    #[test]
    fn json_arrays_and_wrapped_collections_become_records() {
        let wrapped = serde_json::json!({
            "startups": [
                { "name": "Acme", "website": "https://acme.dev", "employees": 12 },
                { "description": "no name, dropped" },
            ]
        });
        let records = records_from_json(&wrapped);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Acme");
        assert_eq!(records[0].field("employees"), Some("12"));
        assert_eq!(records[0].url(), Some("https://acme.dev"));
    }

    #[test]
    fn json_is_recovered_from_fences_or_raw_text() {
        assert_eq!(
            extract_json_block(r#"{"ok": true}"#),
            Some(serde_json::json!({"ok": true}))
        );
        let fenced = "Sure, here is the data:\n```json\n{\"items\": []}\n```\nHope that helps!";
        assert_eq!(
            extract_json_block(fenced),
            Some(serde_json::json!({"items": []}))
        );
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn prose_without_structure_yields_nothing() {
        let records = parse_markdown_records("I could not find any startups on this page.");
        assert!(records.is_empty());
    }
}
