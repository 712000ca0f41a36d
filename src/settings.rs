// src/settings.rs

use std::{fs, path::Path};

use serde_json::Value as Json;
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value, value};
use tracing::{info, warn};

use crate::error::{IntakeError, Result};
use crate::group::{DEFAULT_PREFIXES, MergeOrder};

const PREFIX_ORDER: &str = "prefixOrder";
const CUSTOMS_ONLY_FIRST: &str = "customsOnlyFirst";

/// Fields whose type we check on override; everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    List,
    Flag,
    Map,
}

const KNOWN_FIELDS: [(&str, FieldKind); 9] = [
    (PREFIX_ORDER, FieldKind::List),
    (CUSTOMS_ONLY_FIRST, FieldKind::Flag),
    ("completedGroups", FieldKind::Map),
    ("feeOrderMap", FieldKind::Map),
    ("feeHiddenMap", FieldKind::Map),
    ("feeManualMap", FieldKind::Map),
    ("feeOverrideMap", FieldKind::Map),
    ("listOrderMap", FieldKind::Map),
    ("feeAttachmentMap", FieldKind::Map),
];

/// Shared UI settings, kept as an editable TOML document so unknown keys,
/// comments and layout survive a save.
pub struct Settings {
    doc: DocumentMut,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, starting empty");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(Self {
            doc: content.parse::<DocumentMut>()?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.doc.to_string())?;
        Ok(())
    }

    /// Apply the fields of a JSON object. Known fields must have the right
    /// type; unknown fields and nulls are ignored.
    pub fn apply_overrides(&mut self, overrides: &Json) -> Result<usize> {
        let Json::Object(fields) = overrides else {
            return Err(IntakeError::validation("settings must be a JSON object"));
        };

        // Check everything first so a bad field leaves the document untouched.
        let mut updates = Vec::new();
        for (key, kind) in KNOWN_FIELDS {
            let Some(raw) = fields.get(key) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let ok = match kind {
                FieldKind::List => raw.is_array(),
                FieldKind::Flag => raw.is_boolean(),
                FieldKind::Map => raw.is_object(),
            };
            if !ok {
                warn!(field = key, "Settings override has the wrong type");
                return Err(IntakeError::validation(format!("settings field {key} has the wrong type")));
            }
            updates.push((key, to_item(raw)));
        }

        let applied = updates.len();
        for (key, item) in updates {
            self.doc[key] = item;
        }
        for key in fields.keys() {
            if !KNOWN_FIELDS.iter().any(|(k, _)| *k == key.as_str()) {
                info!(field = %key, "Ignoring unknown settings field");
            }
        }
        Ok(applied)
    }

    /// Whole document as JSON, for display.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.doc
                .as_table()
                .iter()
                .map(|(k, item)| (k.to_string(), item_to_json(item)))
                .collect(),
        )
    }

    /// Merge-order hints, with defaults for anything missing or malformed.
    pub fn merge_order(&self) -> MergeOrder {
        let mut order = MergeOrder::default();
        if let Some(flag) = self.doc.get(CUSTOMS_ONLY_FIRST).and_then(Item::as_bool) {
            order.customs_only_first = flag;
        }
        if let Some(list) = self.doc.get(PREFIX_ORDER).and_then(Item::as_array) {
            let prefixes: Vec<String> = list
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(s) => Some(s.value().trim().to_uppercase()),
                    Value::InlineTable(t) => t
                        .get("prefix")
                        .and_then(Value::as_str)
                        .map(|p| p.trim().to_uppercase()),
                    _ => None,
                })
                .filter(|p| !p.is_empty())
                .collect();
            if !prefixes.is_empty() {
                order.prefix_order = prefixes;
            }
        }
        order
    }

    /// Display name for a document prefix, e.g. `IMP` -> `수입신고필증`.
    pub fn document_name(&self, prefix: &str) -> Option<String> {
        let from_settings = self
            .doc
            .get(PREFIX_ORDER)
            .and_then(Item::as_array)
            .and_then(|list| {
                list.iter().find_map(|entry| {
                    let t = entry.as_inline_table()?;
                    let p = t.get("prefix")?.as_str()?;
                    if !p.trim().eq_ignore_ascii_case(prefix) {
                        return None;
                    }
                    t.get("documentName")?
                        .as_str()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                })
            });
        from_settings.or_else(|| {
            DEFAULT_PREFIXES
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, n)| n.to_string())
        })
    }
}

fn to_value(json: &Json) -> Option<Value> {
    Some(match json {
        Json::Null => return None,
        Json::Bool(b) => Value::from(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64()?),
        },
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => {
            let mut arr = Array::new();
            for v in items.iter().filter_map(to_value) {
                arr.push(v);
            }
            Value::Array(arr)
        }
        Json::Object(map) => {
            let mut table = InlineTable::new();
            for (k, v) in map {
                if let Some(v) = to_value(v) {
                    table.insert(k.as_str(), v);
                }
            }
            Value::InlineTable(table)
        }
    })
}

fn to_item(json: &Json) -> Item {
    match json {
        // Top-level maps become regular tables so they read well on disk.
        Json::Object(map) => {
            let mut table = Table::new();
            for (k, v) in map {
                if let Some(v) = to_value(v) {
                    table.insert(k.as_str(), value(v));
                }
            }
            Item::Table(table)
        }
        other => to_value(other).map(value).unwrap_or(Item::None),
    }
}

fn value_to_json(v: &Value) -> Json {
    match v {
        Value::String(s) => Json::from(s.value().as_str()),
        Value::Integer(i) => Json::from(*i.value()),
        Value::Float(f) => Json::from(*f.value()),
        Value::Boolean(b) => Json::from(*b.value()),
        Value::Datetime(d) => Json::from(d.value().to_string()),
        Value::Array(a) => Json::Array(a.iter().map(value_to_json).collect()),
        Value::InlineTable(t) => Json::Object(
            t.iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn item_to_json(item: &Item) -> Json {
    match item {
        Item::None => Json::Null,
        Item::Value(v) => value_to_json(v),
        Item::Table(t) => Json::Object(
            t.iter()
                .map(|(k, i)| (k.to_string(), item_to_json(i)))
                .collect(),
        ),
        Item::ArrayOfTables(arr) => Json::Array(
            arr.iter()
                .map(|t| {
                    Json::Object(
                        t.iter()
                            .map(|(k, i)| (k.to_string(), item_to_json(i)))
                            .collect(),
                    )
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"# shared settings
prefixOrder = ["IMP", "JS"]
customsOnlyFirst = false
theme = "dark" # kept as is

[completedGroups]
"12345-67-890123M" = true
"#;

    #[test]
    fn test_round_trip_is_verbatim() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.doc.to_string(), SAMPLE);
    }

    #[test]
    fn test_merge_order_from_document() {
        let order = Settings::parse(SAMPLE).unwrap().merge_order();
        assert_eq!(order.prefix_order, vec!["IMP", "JS"]);
        assert!(!order.customs_only_first);

        let empty = Settings::parse("").unwrap().merge_order();
        assert_eq!(empty, MergeOrder::default());
    }

    #[test]
    fn test_prefix_entries_as_tables() {
        let doc = r#"prefixOrder = [{ prefix = "vt", documentName = "세금계산서" }, "nb"]"#;
        let settings = Settings::parse(doc).unwrap();
        assert_eq!(settings.merge_order().prefix_order, vec!["VT", "NB"]);
        assert_eq!(settings.document_name("VT").as_deref(), Some("세금계산서"));
        assert_eq!(settings.document_name("IMP").as_deref(), Some("수입신고필증"));
        assert_eq!(settings.document_name("ZZ"), None);
    }

    #[test]
    fn test_overrides_keep_unrelated_fields() {
        let mut settings = Settings::parse(SAMPLE).unwrap();
        let applied = settings
            .apply_overrides(&json!({
                "customsOnlyFirst": true,
                "completedGroups": {"55555-66-777777M": true},
                "somethingElse": 1,
                "feeOrderMap": null
            }))
            .unwrap();
        assert_eq!(applied, 2);

        let out = settings.doc.to_string();
        assert!(out.contains("theme = \"dark\" # kept as is"));
        assert!(out.contains("prefixOrder = [\"IMP\", \"JS\"]"));
        assert!(!out.contains("somethingElse"));
        assert!(settings.merge_order().customs_only_first);

        let as_json = settings.to_json();
        assert_eq!(as_json["completedGroups"], json!({"55555-66-777777M": true}));
        assert_eq!(as_json["theme"], json!("dark"));
    }

    #[test]
    fn test_wrong_type_rejected_without_changes() {
        let mut settings = Settings::parse(SAMPLE).unwrap();
        let err = settings
            .apply_overrides(&json!({"customsOnlyFirst": true, "prefixOrder": "IMP"}))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(settings.doc.to_string(), SAMPLE);

        assert!(settings.apply_overrides(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let mut settings = Settings::load(&path).unwrap();
        settings
            .apply_overrides(&json!({"prefixOrder": ["NB", "JS"]}))
            .unwrap();
        settings.save(&path).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.merge_order().prefix_order, vec!["NB", "JS"]);
    }
}
