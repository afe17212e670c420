use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Time,
}

impl FieldType {
    pub fn is_ordered(&self) -> bool {
        !matches!(self, FieldType::Text)
    }
}

/// Analyzer applied to every searchable field and to query keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerKind {
    Standard,   // unicode words + lowercase
    StopWords,  // standard + english stop words
    English,    // stop words + snowball stemming
}

/// Index of a searchable field, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub u16);

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub multi_valued: bool,
    pub searchable: bool,
    pub positional: bool,
    pub boost: f32,
}

impl FieldDefinition {
    fn new(name: &str, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.to_string(),
            field_type,
            multi_valued: false,
            searchable: field_type == FieldType::Text,
            positional: false,
            boost: 1.0,
        }
    }

    /// Searchable text field.
    pub fn text(name: &str) -> Self {
        FieldDefinition::new(name, FieldType::Text)
    }

    pub fn integer(name: &str) -> Self {
        FieldDefinition::new(name, FieldType::Integer)
    }

    pub fn float(name: &str) -> Self {
        FieldDefinition::new(name, FieldType::Float)
    }

    pub fn time(name: &str) -> Self {
        FieldDefinition::new(name, FieldType::Time)
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Keep token positions so phrase queries can run against this field.
    pub fn positional(mut self) -> Self {
        self.positional = true;
        self.searchable = true;
        self
    }

    /// Stored and facetable, but not in the inverted index.
    pub fn stored_only(mut self) -> Self {
        self.searchable = false;
        self.positional = false;
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub primary_key: String,
    pub fields: Vec<FieldDefinition>,
    pub analyzer: AnalyzerKind,
}

impl Schema {
    pub fn new(primary_key: &str) -> Self {
        Schema {
            primary_key: primary_key.to_string(),
            fields: Vec::new(),
            analyzer: AnalyzerKind::Standard,
        }
    }

    pub fn add_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerKind) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_key.trim().is_empty() {
            return Err(Error::schema("primary key field name is empty"));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains([':', '.', '+', '*', ' ', '"']) {
                return Err(Error::schema(format!("invalid field name '{}'", field.name)));
            }
            if field.name == self.primary_key {
                return Err(Error::schema(format!(
                    "field '{}' collides with the primary key",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::schema(format!("duplicate field '{}'", field.name)));
            }
            if field.searchable && field.field_type != FieldType::Text {
                return Err(Error::schema(format!(
                    "field '{}' is searchable but not of type Text",
                    field.name
                )));
            }
            if !(field.boost > 0.0) {
                return Err(Error::schema(format!("field '{}' has a non-positive boost", field.name)));
            }
        }

        if self.searchable_fields().count() > u16::MAX as usize {
            return Err(Error::schema("too many searchable fields"));
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.searchable)
    }

    pub fn attribute_id(&self, name: &str) -> Option<AttributeId> {
        self.searchable_fields()
            .position(|f| f.name == name)
            .map(|i| AttributeId(i as u16))
    }

    pub fn attribute(&self, id: AttributeId) -> Option<&FieldDefinition> {
        self.searchable_fields().nth(id.0 as usize)
    }

    pub fn attribute_ids(&self) -> Vec<AttributeId> {
        (0..self.searchable_fields().count())
            .map(|i| AttributeId(i as u16))
            .collect()
    }

    /// Stable checksum of the schema, stored in snapshots to detect
    /// an index built under a different field layout.
    pub fn fingerprint(&self) -> Result<u32> {
        let bytes = bincode::serialize(self)?;
        Ok(crc32fast::hash(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new("id")
            .add_field(FieldDefinition::text("title").boost(2.0))
            .add_field(FieldDefinition::integer("price"))
            .add_field(FieldDefinition::text("authors").multi_valued().positional())
    }

    #[test]
    fn attribute_ids_follow_searchable_declaration_order() {
        let schema = schema();
        assert_eq!(schema.attribute_id("title"), Some(AttributeId(0)));
        assert_eq!(schema.attribute_id("authors"), Some(AttributeId(1)));
        assert_eq!(schema.attribute_id("price"), None);
        assert_eq!(schema.attribute(AttributeId(1)).map(|f| f.name.as_str()), Some("authors"));
    }

    #[test]
    fn validate_rejects_bad_layouts() {
        assert!(schema().validate().is_ok());

        let dup = schema().add_field(FieldDefinition::text("title"));
        assert!(dup.validate().is_err());

        let mut searchable_number = FieldDefinition::integer("year");
        searchable_number.searchable = true;
        assert!(schema().add_field(searchable_number).validate().is_err());

        let pk = schema().add_field(FieldDefinition::text("id"));
        assert!(pk.validate().is_err());
    }

    #[test]
    fn fingerprint_changes_with_layout() {
        let a = schema().fingerprint().unwrap();
        let b = schema()
            .add_field(FieldDefinition::text("body"))
            .fingerprint()
            .unwrap();
        assert_eq!(a, schema().fingerprint().unwrap());
        assert_ne!(a, b);
    }
}
