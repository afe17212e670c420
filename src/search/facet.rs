use std::collections::{BTreeSet, HashMap};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::core::types::RecordId;
use crate::query::validator::ResolvedFacet;
use crate::schema::schema::FieldType;
use crate::store::record_store::RecordStore;

/// Upper bound on the buckets of one range facet.
pub const MAX_RANGE_BUCKETS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetKind {
    Categorical,
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,
    pub kind: FacetKind,
    pub buckets: Vec<FacetBucket>,
}

impl FacetResult {
    pub fn count(&self, label: &str) -> Option<usize> {
        self.buckets.iter().find(|b| b.label == label).map(|b| b.count)
    }
}

/// Counts candidate records per category or per range bucket.
///
/// A record counts once in every bucket one of its values falls into, never
/// more than once per bucket.
pub struct FacetAggregator<'a> {
    store: &'a RecordStore,
}

impl<'a> FacetAggregator<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        FacetAggregator { store }
    }

    pub fn aggregate(&self, candidates: &[RecordId], facets: &[ResolvedFacet]) -> Vec<FacetResult> {
        facets
            .iter()
            .map(|facet| match facet {
                ResolvedFacet::Categorical { field, max_groups } => {
                    self.categorical(candidates, field, *max_groups)
                }
                ResolvedFacet::Range {
                    field,
                    field_type,
                    start,
                    end,
                    gap,
                } => self.range(candidates, field, *field_type, *start, *end, *gap),
            })
            .collect()
    }

    fn categorical(&self, candidates: &[RecordId], field: &str, max_groups: Option<usize>) -> FacetResult {
        let mut counts: HashMap<String, usize> = HashMap::new();

        for id in candidates {
            let Some(record) = self.store.get(*id) else {
                continue;
            };
            let distinct: BTreeSet<String> = record.values(field).iter().map(|v| v.to_string()).collect();
            for label in distinct {
                *counts.entry(label).or_insert(0) += 1;
            }
        }

        let mut buckets: Vec<FacetBucket> = counts
            .into_iter()
            .map(|(label, count)| FacetBucket { label, count })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        if let Some(max) = max_groups {
            buckets.truncate(max);
        }

        FacetResult {
            field: field.to_string(),
            kind: FacetKind::Categorical,
            buckets,
        }
    }

    /// Missing bounds come from the candidates' values. A derived bound never
    /// crosses the given one: with every value below a given `start` the facet
    /// is a single empty bucket at `start`.
    fn range(
        &self,
        candidates: &[RecordId],
        field: &str,
        field_type: FieldType,
        start: Option<f64>,
        end: Option<f64>,
        gap: f64,
    ) -> FacetResult {
        let values: Vec<Vec<f64>> = candidates
            .iter()
            .filter_map(|id| self.store.get(*id))
            .map(|record| record.values(field).iter().filter_map(|v| v.as_number()).collect())
            .collect();

        let observed = || values.iter().flatten().copied();
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (Some(s), Some(e)),
            (Some(s), None) => (Some(s), observed().reduce(f64::max).map(|e| e.max(s))),
            (None, Some(e)) => (observed().reduce(f64::min).map(|s| s.min(e)), Some(e)),
            (None, None) => (observed().reduce(f64::min), observed().reduce(f64::max)),
        };

        let (Some(start), Some(mut end)) = (start, end) else {
            return FacetResult {
                field: field.to_string(),
                kind: FacetKind::Range,
                buckets: Vec::new(),
            };
        };

        let mut span = ((end - start) / gap).ceil().max(1.0);
        if span > MAX_RANGE_BUCKETS as f64 {
            // only reachable with a derived bound; explicit ones are checked up front
            debug!(field = %field, buckets = span, "range facet truncated");
            span = MAX_RANGE_BUCKETS as f64;
            end = start + span * gap;
        }
        let bucket_count = span as usize;

        let mut counts = vec![0usize; bucket_count];
        for record_values in &values {
            let hit: BTreeSet<usize> = record_values
                .iter()
                .filter(|v| **v >= start && **v <= end)
                .map(|v| (((v - start) / gap).floor() as usize).min(bucket_count - 1))
                .collect();
            for bucket in hit {
                counts[bucket] += 1;
            }
        }

        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| FacetBucket {
                label: range_label(field_type, start + i as f64 * gap),
                count,
            })
            .collect();

        FacetResult {
            field: field.to_string(),
            kind: FacetKind::Range,
            buckets,
        }
    }
}

fn range_label(field_type: FieldType, lower: f64) -> String {
    match field_type {
        FieldType::Integer => format!("{}", lower.round() as i64),
        FieldType::Time => Utc
            .timestamp_opt(lower.floor() as i64, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| lower.to_string()),
        FieldType::Float | FieldType::Text => format!("{}", lower),
    }
}
