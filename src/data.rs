use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::schema::{FIELD_TITLE, FIELD_VALUE, FieldType, RESERVED_FIELDS};

/// Small category tag attached to every document.
pub type ObjectType = u8;

/// The value type for fields in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// Text content to be analyzed and full-text indexed.
    Text(String),

    /// String content indexed as a single, untokenized term.
    Keyword(String),

    Integer(i64),

    Float(f64),

    /// Date and time in UTC.
    Date(DateTime<Utc>),
}

impl DataValue {
    /// Returns the string content for `Text` and `Keyword` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) | DataValue::Keyword(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric value for `Float` and `Integer` values.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(f) => Some(*f),
            DataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            DataValue::Date(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The field type this value indexes as when the schema declares nothing else.
    pub fn natural_type(&self) -> FieldType {
        match self {
            DataValue::Text(_) => FieldType::Text,
            DataValue::Keyword(_) => FieldType::Keyword,
            DataValue::Integer(_) => FieldType::Integer,
            DataValue::Float(_) => FieldType::Float,
            DataValue::Date(_) => FieldType::Date,
        }
    }

    /// Render the value the way it is exposed in result dictionaries.
    pub fn to_display_string(&self) -> String {
        match self {
            DataValue::Text(s) | DataValue::Keyword(s) => s.clone(),
            DataValue::Integer(i) => i.to_string(),
            DataValue::Float(f) => f.to_string(),
            DataValue::Date(dt) => format_timestamp(dt),
        }
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Integer(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Integer(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float(v)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(dt: DateTime<Utc>) -> Self {
        DataValue::Date(dt)
    }
}

/// Format a timestamp in the compact `yyyyMMddHHmmss` form used for date terms.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// Parse a date from `yyyyMMddHHmmss`, `yyyyMMdd` or RFC 3339.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y%m%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A document to be indexed.
///
/// A document is identified by a caller-chosen identifier, tagged with an
/// object type, and carries a collection of named fields plus a timestamp.
/// Field names are case-insensitive: a document holding both `Title` and
/// `title` fails validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier. Indexing a second document with the same
    /// identifier replaces the first.
    pub id: String,

    pub object_type: ObjectType,

    /// Field data.
    pub fields: HashMap<String, DataValue>,

    /// Indexing timestamp, "now" unless set explicitly.
    pub timestamp: DateTime<Utc>,
}

impl Document {
    /// Create a new empty document with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: 0,
            fields: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a field to the document.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the title field.
    pub fn add_title(self, title: impl Into<String>) -> Self {
        self.add_text(FIELD_TITLE, title)
    }

    /// Set the value (main content) field.
    pub fn add_value(self, value: impl Into<String>) -> Self {
        self.add_text(FIELD_VALUE, value)
    }

    /// Add a text field.
    pub fn add_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name.into(), DataValue::Text(text.into()));
        self
    }

    /// Add an untokenized keyword field.
    pub fn add_keyword(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), DataValue::Keyword(text.into()));
        self
    }

    pub fn add_integer(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields.insert(name.into(), DataValue::Integer(value));
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), DataValue::Float(value));
        self
    }

    pub fn add_date(mut self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.fields.insert(name.into(), DataValue::Date(value));
        self
    }

    /// Get a field's value, matching the name case-insensitively.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.get(name).or_else(|| {
            let lower = name.to_lowercase();
            self.fields
                .iter()
                .find(|(k, _)| k.to_lowercase() == lower)
                .map(|(_, v)| v)
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.get(FIELD_TITLE).and_then(|v| v.as_text())
    }

    pub fn value(&self) -> Option<&str> {
        self.get(FIELD_VALUE).and_then(|v| v.as_text())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the structural rules every indexed document must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(QuarryError::validation("document identifier must not be empty"));
        }

        let mut seen = ahash::AHashSet::with_capacity(self.fields.len());
        for name in self.fields.keys() {
            let lower = name.to_lowercase();
            if lower.is_empty() || lower.contains('\0') {
                return Err(QuarryError::validation(format!(
                    "invalid field name {name:?} in document {}",
                    self.id
                )));
            }
            if RESERVED_FIELDS.contains(&lower.as_str()) {
                return Err(QuarryError::validation(format!(
                    "field name {name:?} is reserved"
                )));
            }
            if !seen.insert(lower) {
                return Err(QuarryError::validation(format!(
                    "duplicate field {name:?} in document {} (field names are case-insensitive)",
                    self.id
                )));
            }
        }

        for (name, value) in &self.fields {
            if let DataValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(QuarryError::validation(format!(
                        "field {name:?} holds a non-finite number"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_case_insensitive_lookup() {
        let doc = Document::new("1").add_text("Category", "CategoryA");
        assert_eq!(doc.get("category").and_then(|v| v.as_text()), Some("CategoryA"));
        assert!(doc.has_field("CATEGORY"));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let doc = Document::new("1")
            .add_text("Title2", "a")
            .add_text("title2", "b");
        assert!(matches!(doc.validate(), Err(QuarryError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_reserved_and_empty_id() {
        let doc = Document::new("1").add_text("id", "x");
        assert!(doc.validate().is_err());

        let doc = Document::new("  ").add_value("hello");
        assert!(doc.validate().is_err());

        let doc = Document::new("1").add_float("score", f64::NAN);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(format_timestamp(&dt), "20240309140507");
        assert_eq!(parse_timestamp("20240309140507"), Some(dt));
        assert_eq!(parse_timestamp("2024-03-09T14:05:07Z"), Some(dt));
        assert_eq!(
            parse_timestamp("20240309"),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
