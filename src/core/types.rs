use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::core::error::{Error, Result};
use crate::schema::schema::{FieldType, Schema};

/// Internal record identifier, assigned on first insert and kept across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u32);

impl From<u32> for RecordId {
    fn from(id: u32) -> Self {
        RecordId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Time(DateTime<Utc>),
}

impl Scalar {
    /// Parse a textual value according to the declared field type.
    pub fn parse_as(field_type: FieldType, raw: &str) -> Result<Scalar> {
        let raw = raw.trim();
        match field_type {
            FieldType::Text => Ok(Scalar::Text(raw.to_string())),
            FieldType::Integer => raw
                .parse::<i64>()
                .map(Scalar::Integer)
                .map_err(|_| Error::parse(format!("'{}' is not an integer", raw))),
            FieldType::Float => raw
                .parse::<f64>()
                .map(Scalar::Float)
                .map_err(|_| Error::parse(format!("'{}' is not a number", raw))),
            FieldType::Time => {
                if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
                    return Ok(Scalar::Time(time.with_timezone(&Utc)));
                }
                raw.parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(Scalar::Time)
                    .ok_or_else(|| Error::parse(format!("'{}' is not a time value", raw)))
            }
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Scalar::Text(_) => FieldType::Text,
            Scalar::Integer(_) => FieldType::Integer,
            Scalar::Float(_) => FieldType::Float,
            Scalar::Time(_) => FieldType::Time,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by range facets and sorting. Time maps to epoch seconds.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Text(_) => None,
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Time(t) => Some(t.timestamp() as f64),
        }
    }

    /// Total order over scalars: numbers numerically, text lexicographically,
    /// mixed kinds by kind.
    pub fn compare(&self, other: &Scalar) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (None, None) => self.as_text().cmp(&other.as_text()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
        }
    }

    fn from_json(value: &Value, field_type: FieldType, field: &str) -> Result<Scalar> {
        let mismatch = || {
            Error::invalid_input(format!(
                "attribute '{}' expects {:?}, got {}",
                field, field_type, value
            ))
        };

        match (field_type, value) {
            (FieldType::Text, Value::String(s)) => Ok(Scalar::Text(s.clone())),
            (FieldType::Text, Value::Number(n)) => Ok(Scalar::Text(n.to_string())),
            (FieldType::Text, Value::Bool(b)) => Ok(Scalar::Text(b.to_string())),
            (FieldType::Integer, Value::Number(n)) => n.as_i64().map(Scalar::Integer).ok_or_else(mismatch),
            (FieldType::Float, Value::Number(n)) => n.as_f64().map(Scalar::Float).ok_or_else(mismatch),
            (FieldType::Time, Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(Scalar::Time)
                .ok_or_else(mismatch),
            (_, Value::String(s)) => Scalar::parse_as(field_type, s).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Integer(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Time(t) => Value::String(t.to_rfc3339()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(t: DateTime<Utc>) -> Self {
        Scalar::Time(t)
    }
}

/// A single value or the ordered values of a multi-valued attribute.
/// Each value of a `Multi` is an independent segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Single(Scalar),
    Multi(Vec<Scalar>),
}

impl AttributeValue {
    pub fn values(&self) -> &[Scalar] {
        match self {
            AttributeValue::Single(value) => std::slice::from_ref(value),
            AttributeValue::Multi(values) => values,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, AttributeValue::Multi(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub primary_key: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Record {
            primary_key: primary_key.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.set(name, AttributeValue::Single(value.into()));
        self
    }

    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.set(name, AttributeValue::Multi(values));
        self
    }

    pub fn set(&mut self, name: &str, value: AttributeValue) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// All values of an attribute, empty when absent.
    pub fn values(&self, name: &str) -> &[Scalar] {
        self.attributes.get(name).map(|v| v.values()).unwrap_or(&[])
    }

    /// Build a record from a JSON object. Attributes the schema does not
    /// declare are ignored; nulls are treated as absent.
    pub fn from_json(value: &Value, schema: &Schema) -> Result<Record> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_input("record payload must be a JSON object"))?;

        let primary_key = match object.get(&schema.primary_key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        if primary_key.is_empty() {
            return Err(Error::invalid_input(format!(
                "record is missing primary key '{}'",
                schema.primary_key
            )));
        }

        let mut record = Record::new(primary_key);
        for field in &schema.fields {
            let Some(raw) = object.get(&field.name) else {
                continue;
            };
            let value = match raw {
                Value::Null => continue,
                Value::Array(items) => {
                    if !field.multi_valued {
                        return Err(Error::invalid_input(format!(
                            "attribute '{}' is single-valued but got {} values",
                            field.name,
                            items.len()
                        )));
                    }
                    let values = items
                        .iter()
                        .filter(|item| !item.is_null())
                        .map(|item| Scalar::from_json(item, field.field_type, &field.name))
                        .collect::<Result<Vec<_>>>()?;
                    AttributeValue::Multi(values)
                }
                scalar => {
                    let value = Scalar::from_json(scalar, field.field_type, &field.name)?;
                    if field.multi_valued {
                        AttributeValue::Multi(vec![value])
                    } else {
                        AttributeValue::Single(value)
                    }
                }
            };
            record.set(&field.name, value);
        }

        Ok(record)
    }

    pub fn to_json(&self, schema: &Schema) -> Value {
        let mut object = Map::new();
        object.insert(schema.primary_key.clone(), Value::String(self.primary_key.clone()));
        for (name, value) in &self.attributes {
            let json = match value {
                AttributeValue::Single(scalar) => scalar.to_json(),
                AttributeValue::Multi(values) => {
                    Value::Array(values.iter().map(Scalar::to_json).collect())
                }
            };
            object.insert(name.clone(), json);
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::schema::schema::FieldDefinition;

    fn schema() -> Schema {
        Schema::new("id")
            .add_field(FieldDefinition::text("title"))
            .add_field(FieldDefinition::text("model").multi_valued())
            .add_field(FieldDefinition::integer("price"))
    }

    #[test]
    fn from_json_reads_schema_fields() {
        let payload = json!({
            "id": 7,
            "title": "Garden tools",
            "model": ["bmw", "toyota"],
            "price": "42",
            "ignored": "x"
        });
        let record = Record::from_json(&payload, &schema()).unwrap();

        assert_eq!(record.primary_key, "7");
        assert_eq!(record.values("model").len(), 2);
        assert_eq!(record.values("price"), &[Scalar::Integer(42)]);
        assert!(record.get("ignored").is_none());
    }

    #[test]
    fn from_json_rejects_missing_key_and_bad_types() {
        let no_key = json!({"title": "x"});
        assert!(Record::from_json(&no_key, &schema()).is_err());

        let bad_price = json!({"id": "1", "price": "cheap"});
        assert!(Record::from_json(&bad_price, &schema()).is_err());

        let many_titles = json!({"id": "1", "title": ["a", "b"]});
        assert!(Record::from_json(&many_titles, &schema()).is_err());
    }

    #[test]
    fn to_json_keeps_multi_values_as_arrays() {
        let record = Record::new("1")
            .with("title", "t")
            .with_values("model", ["a", "b"]);
        let json = record.to_json(&schema());
        assert_eq!(json["id"], "1");
        assert_eq!(json["model"], json!(["a", "b"]));
    }

    #[test]
    fn scalars_compare_numerically() {
        assert_eq!(Scalar::Integer(10).compare(&Scalar::Float(9.5)), Ordering::Greater);
        assert_eq!(Scalar::from("b").compare(&Scalar::from("a")), Ordering::Greater);
        assert_eq!(Scalar::Integer(1).compare(&Scalar::from("a")), Ordering::Less);
    }
}
