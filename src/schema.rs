//! Field schema: reserved field names, field types and value coercion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{DataValue, parse_timestamp};
use crate::error::{QuarryError, Result};

/// Field holding the document identifier.
pub const FIELD_IDENTIFIER: &str = "id";
/// Field holding the document object type.
pub const FIELD_OBJECT_TYPE: &str = "s";
/// Title text field.
pub const FIELD_TITLE: &str = "t";
/// Value (main content) text field.
pub const FIELD_VALUE: &str = "v";
/// Field holding the document timestamp.
pub const FIELD_TIMESTAMP: &str = "m";

/// Names callers may not use for their own fields.
pub const RESERVED_FIELDS: &[&str] = &[FIELD_IDENTIFIER, FIELD_OBJECT_TYPE, FIELD_TIMESTAMP];

/// How a field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed into terms with positions.
    Text,
    /// Indexed verbatim as one term.
    Keyword,
    Integer,
    Float,
    Date,
}

impl FieldType {
    /// Whether values of this type are analyzed into multiple terms.
    pub fn is_tokenized(&self) -> bool {
        matches!(self, FieldType::Text)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Date)
    }
}

/// Declared field types, keyed by lowercased field name.
///
/// Fields not declared here take the type implied by their value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: HashMap<String, FieldType>,
}

impl Schema {
    /// Create a schema declaring the title and value fields as text.
    pub fn new() -> Self {
        let mut fields = HashMap::new();
        fields.insert(FIELD_TITLE.to_string(), FieldType::Text);
        fields.insert(FIELD_VALUE.to_string(), FieldType::Text);
        fields.insert(FIELD_IDENTIFIER.to_string(), FieldType::Keyword);
        fields.insert(FIELD_OBJECT_TYPE.to_string(), FieldType::Integer);
        fields.insert(FIELD_TIMESTAMP.to_string(), FieldType::Date);
        Self { fields }
    }

    /// Declare (or redeclare) the type of a user field.
    pub fn add_field(mut self, name: impl AsRef<str>, field_type: FieldType) -> Self {
        self.fields
            .insert(name.as_ref().to_lowercase(), field_type);
        self
    }

    /// The declared type of a field, if any.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(&name.to_lowercase()).copied()
    }

    /// Names of all declared fields, lowercased.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Resolve a document value against the schema, coercing it into the
    /// declared type.
    pub fn coerce(&self, name: &str, value: &DataValue) -> Result<(FieldType, DataValue)> {
        let declared = match self.field_type(name) {
            Some(t) => t,
            None => return Ok((value.natural_type(), value.clone())),
        };

        let coerced = match (declared, value) {
            (FieldType::Text, DataValue::Text(_)) => value.clone(),
            (FieldType::Text, other) => DataValue::Text(other.to_display_string()),
            (FieldType::Keyword, DataValue::Keyword(_)) => value.clone(),
            (FieldType::Keyword, other) => DataValue::Keyword(other.to_display_string()),
            (FieldType::Integer, DataValue::Integer(_)) => value.clone(),
            (FieldType::Integer, DataValue::Text(s) | DataValue::Keyword(s)) => {
                DataValue::Integer(s.trim().parse::<i64>().map_err(|_| {
                    QuarryError::validation(format!(
                        "field {name:?} expects an integer, got {s:?}"
                    ))
                })?)
            }
            (FieldType::Float, DataValue::Float(_)) => value.clone(),
            (FieldType::Float, DataValue::Integer(i)) => DataValue::Float(*i as f64),
            (FieldType::Float, DataValue::Text(s) | DataValue::Keyword(s)) => {
                let f = s.trim().parse::<f64>().map_err(|_| {
                    QuarryError::validation(format!("field {name:?} expects a number, got {s:?}"))
                })?;
                if !f.is_finite() {
                    return Err(QuarryError::validation(format!(
                        "field {name:?} holds a non-finite number"
                    )));
                }
                DataValue::Float(f)
            }
            (FieldType::Date, DataValue::Date(_)) => value.clone(),
            (FieldType::Date, DataValue::Text(s) | DataValue::Keyword(s)) => {
                DataValue::Date(parse_timestamp(s).ok_or_else(|| {
                    QuarryError::validation(format!("field {name:?} expects a date, got {s:?}"))
                })?)
            }
            (declared, other) => {
                return Err(QuarryError::validation(format!(
                    "field {name:?} is declared {declared:?} but holds {:?}",
                    other.natural_type()
                )));
            }
        };

        Ok((declared, coerced))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_fields_use_natural_type() {
        let schema = Schema::new();
        let (t, v) = schema.coerce("category", &DataValue::from("CategoryA")).unwrap();
        assert_eq!(t, FieldType::Text);
        assert_eq!(v, DataValue::Text("CategoryA".into()));
    }

    #[test]
    fn test_declared_types_coerce_strings() {
        let schema = Schema::new()
            .add_field("Length", FieldType::Integer)
            .add_field("published", FieldType::Date);

        let (t, v) = schema.coerce("length", &DataValue::from("512")).unwrap();
        assert_eq!(t, FieldType::Integer);
        assert_eq!(v, DataValue::Integer(512));

        let (_, v) = schema
            .coerce("published", &DataValue::from("20240101120000"))
            .unwrap();
        assert!(v.as_date().is_some());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let schema = Schema::new()
            .add_field("length", FieldType::Integer)
            .add_field("published", FieldType::Date);

        assert!(matches!(
            schema.coerce("length", &DataValue::from("many")),
            Err(QuarryError::Validation(_))
        ));
        assert!(schema.coerce("published", &DataValue::from("soon")).is_err());
        assert!(schema.coerce("length", &DataValue::Float(1.5)).is_err());
    }
}
