use std::cmp::Ordering;
use std::collections::BinaryHeap;
use serde::Serialize;
use serde_json::{json, Value};
use crate::core::types::{Record, RecordId};
use crate::schema::schema::Schema;
use crate::search::facet::FacetResult;

/// Search results container
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total_hits: usize,
    pub max_score: f32,
    pub facets: Vec<FacetResult>,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record_id: RecordId,
    pub score: f32,
    pub record: Record,
}

impl SearchResults {
    pub fn primary_keys(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.record.primary_key.as_str()).collect()
    }

    pub fn facet(&self, field: &str) -> Option<&FacetResult> {
        self.facets.iter().find(|f| f.field == field)
    }

    /// Response body: `{"results": [{"record": .., "score": ..}], "facets": [..]}`.
    pub fn to_json(&self, schema: &Schema) -> Value {
        let results: Vec<Value> = self
            .hits
            .iter()
            .map(|hit| json!({ "record": hit.record.to_json(schema), "score": hit.score }))
            .collect();

        let mut body = json!({
            "results": results,
            "results_found": self.total_hits,
        });
        if !self.facets.is_empty() {
            body["facets"] = json!(self.facets);
        }
        body
    }
}

/// Record with relevance score. Orders best first: higher score, then the
/// older (lower) record id.
#[derive(Debug, Clone, Copy)]
pub struct ScoredRecord {
    pub record_id: RecordId,
    pub score: f32,
}

impl ScoredRecord {
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.record_id.cmp(&other.record_id))
    }
}

impl PartialEq for ScoredRecord {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for ScoredRecord {}

impl PartialOrd for ScoredRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredRecord {
    // heap top is the worst-ranked record kept
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// Top-K collector for efficient result collection
pub struct TopKCollector {
    pub heap: BinaryHeap<ScoredRecord>,
    pub k: usize,
    pub total_collected: usize,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, scored: ScoredRecord) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(scored);
        } else if let Some(worst) = self.heap.peek() {
            if scored.rank(worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(scored);
            }
        }
    }

    pub fn max_score(&self) -> f32 {
        self.heap.iter().map(|s| s.score).fold(0.0, f32::max)
    }

    /// Kept records, best first.
    pub fn into_sorted(self) -> Vec<ScoredRecord> {
        self.heap.into_sorted_vec()
    }
}
