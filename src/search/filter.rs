use std::borrow::Cow;
use crate::core::types::{Record, Scalar};
use crate::query::ast::BooleanOperator;
use crate::query::validator::ResolvedFilter;

/// Post-match conditions on stored values. A multi-valued attribute passes
/// when any one of its values does; a record without the attribute fails.
pub struct RecordFilter<'a> {
    filters: &'a [ResolvedFilter],
    operator: BooleanOperator,
    primary_key: &'a str,
}

impl<'a> RecordFilter<'a> {
    pub fn new(filters: &'a [ResolvedFilter], operator: BooleanOperator, primary_key: &'a str) -> Self {
        RecordFilter {
            filters,
            operator,
            primary_key,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn accepts(&self, record: &Record) -> bool {
        let mut results = self.filters.iter().map(|f| self.check(f, record));
        match self.operator {
            BooleanOperator::And => results.all(|ok| ok),
            BooleanOperator::Or => self.filters.is_empty() || results.any(|ok| ok),
        }
    }

    fn check(&self, filter: &ResolvedFilter, record: &Record) -> bool {
        match filter {
            ResolvedFilter::Equals { field, value } => self
                .values(record, field)
                .iter()
                .any(|v| equal(v, value)),
            ResolvedFilter::Range { field, start, end } => self.values(record, field).iter().any(|v| {
                start.as_ref().is_none_or(|s| v.compare(s).is_ge())
                    && end.as_ref().is_none_or(|e| v.compare(e).is_le())
            }),
        }
    }

    fn values<'r>(&self, record: &'r Record, field: &str) -> Cow<'r, [Scalar]> {
        if field == self.primary_key {
            return Cow::Owned(vec![Scalar::Text(record.primary_key.clone())]);
        }
        Cow::Borrowed(record.values(field))
    }
}

/// Text compares without regard to case, everything else by value.
fn equal(stored: &Scalar, wanted: &Scalar) -> bool {
    match (stored, wanted) {
        (Scalar::Text(a), Scalar::Text(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => stored.compare(wanted).is_eq(),
    }
}
