use std::collections::BTreeMap;
use std::sync::Arc;
use rayon::prelude::*;
use crate::analysis::analyzer::Analyzer;
use crate::core::error::{Error, Result};
use crate::core::types::{Record, Scalar};
use crate::index::posting::{FieldHit, Position};
use crate::schema::schema::{AttributeId, Schema};

/// Tokens of one searchable attribute, grouped by term.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedField {
    pub attribute: AttributeId,
    pub length: u32,
    pub terms: BTreeMap<String, FieldHit>,
}

/// A record turned into index input. Produced outside any lock.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzedRecord {
    pub fields: Vec<AnalyzedField>,
}

impl AnalyzedRecord {
    pub fn term_count(&self) -> usize {
        self.fields.iter().map(|f| f.terms.len()).sum()
    }
}

/// Validates records against the schema and analyzes their searchable attributes.
#[derive(Debug, Clone)]
pub struct Indexer {
    schema: Arc<Schema>,
    analyzer: Analyzer,
}

impl Indexer {
    pub fn new(schema: Arc<Schema>) -> Self {
        let analyzer = Analyzer::for_kind(schema.analyzer);
        Indexer { schema, analyzer }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.primary_key.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "record is missing primary key '{}'",
                self.schema.primary_key
            )));
        }

        for (name, value) in &record.attributes {
            let field = self
                .schema
                .field(name)
                .ok_or_else(|| Error::schema(format!("unknown attribute '{}'", name)))?;

            if value.is_multi() && !field.multi_valued {
                return Err(Error::invalid_input(format!(
                    "attribute '{}' is single-valued but got several values",
                    name
                )));
            }
            if let Some(bad) = value.values().iter().find(|v| v.field_type() != field.field_type) {
                return Err(Error::invalid_input(format!(
                    "attribute '{}' expects {:?}, got {:?}",
                    name,
                    field.field_type,
                    bad.field_type()
                )));
            }
        }
        Ok(())
    }

    /// Validate and analyze one record.
    pub fn prepare(&self, record: &Record) -> Result<AnalyzedRecord> {
        self.validate(record)?;

        let mut fields = Vec::new();
        for (index, field) in self.schema.searchable_fields().enumerate() {
            let values = record.values(&field.name);
            if values.is_empty() {
                continue;
            }

            let attribute = AttributeId(index as u16);
            let mut analyzed = AnalyzedField {
                attribute,
                length: 0,
                terms: BTreeMap::new(),
            };

            for (segment, value) in values.iter().enumerate() {
                let Scalar::Text(text) = value else {
                    continue;
                };
                for token in self.analyzer.analyze(text) {
                    analyzed.length += 1;
                    let hit = analyzed
                        .terms
                        .entry(token.text)
                        .or_insert_with(|| FieldHit {
                            attribute,
                            term_freq: 0,
                            positions: Vec::new(),
                        });
                    hit.term_freq += 1;
                    if field.positional {
                        hit.positions.push(Position::new(segment as u32, token.position));
                    }
                }
            }

            if analyzed.length > 0 {
                fields.push(analyzed);
            }
        }

        Ok(AnalyzedRecord { fields })
    }

    /// Prepare a batch, on the rayon pool when it is at least `parallel_threshold` long.
    /// Results keep input order.
    pub fn prepare_batch(&self, records: &[Record], parallel_threshold: usize) -> Vec<Result<AnalyzedRecord>> {
        if records.len() >= parallel_threshold.max(1) {
            records.par_iter().map(|r| self.prepare(r)).collect()
        } else {
            records.iter().map(|r| self.prepare(r)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::schema::FieldDefinition;

    fn indexer() -> Indexer {
        let schema = Schema::new("id")
            .add_field(FieldDefinition::text("title"))
            .add_field(FieldDefinition::text("authors").multi_valued().positional())
            .add_field(FieldDefinition::integer("year"));
        Indexer::new(Arc::new(schema))
    }

    #[test]
    fn positions_restart_per_segment() {
        let record = Record::new("1").with_values("authors", ["John Smith", "George Orwell"]);
        let analyzed = indexer().prepare(&record).unwrap();

        let authors = &analyzed.fields[0];
        assert_eq!(authors.attribute, AttributeId(1));
        assert_eq!(authors.length, 4);
        assert_eq!(authors.terms["smith"].positions, vec![Position::new(0, 1)]);
        assert_eq!(authors.terms["george"].positions, vec![Position::new(1, 0)]);
    }

    #[test]
    fn non_positional_fields_only_count() {
        let record = Record::new("1").with("title", "to be or not to be");
        let analyzed = indexer().prepare(&record).unwrap();
        let hit = &analyzed.fields[0].terms["be"];
        assert_eq!(hit.term_freq, 2);
        assert!(hit.positions.is_empty());
    }

    #[test]
    fn validation_catches_schema_violations() {
        let unknown = Record::new("1").with("colour", "red");
        assert_eq!(indexer().prepare(&unknown).unwrap_err().kind, ErrorKind::Schema);

        let wrong_type = Record::new("1").with("year", "nineteen");
        assert_eq!(indexer().prepare(&wrong_type).unwrap_err().kind, ErrorKind::InvalidInput);

        let multi_title = Record::new("1").with_values("title", ["a", "b"]);
        assert!(indexer().prepare(&multi_title).is_err());
    }

    #[test]
    fn batch_keeps_order_in_parallel() {
        let records: Vec<_> = (0..10)
            .map(|i| Record::new(i.to_string()).with("title", format!("word{}", i)))
            .collect();
        let results = indexer().prepare_batch(&records, 2);
        for (i, result) in results.iter().enumerate() {
            let fields = &result.as_ref().unwrap().fields;
            assert!(fields[0].terms.contains_key(&format!("word{}", i)));
        }
    }
}
