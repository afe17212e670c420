use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use fst::{Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::RecordId;
use crate::index::indexer::AnalyzedRecord;
use crate::index::posting::{Posting, PostingList};
use crate::schema::schema::AttributeId;

/// Token totals of one searchable attribute, for length normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub total_tokens: u64,
    pub doc_count: u32,
}

impl FieldStats {
    pub fn avg_length(&self) -> f32 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_tokens as f32 / self.doc_count as f32
        }
    }
}

/// What a record contributed to the index, so it can be purged exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub terms: Vec<String>,
    pub field_lengths: Vec<(AttributeId, u32)>,
}

impl ForwardEntry {
    pub fn field_length(&self, attribute: AttributeId) -> u32 {
        self.field_lengths
            .iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }
}

/// Serialized form of the index stored inside snapshots. Terms live in an
/// fst map whose values index into `postings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub term_dictionary: Vec<u8>,
    pub postings: Vec<PostingList>,
    pub forward: Vec<(RecordId, ForwardEntry)>,
    pub field_stats: Vec<(AttributeId, FieldStats)>,
}

/// Inverted index structure.
///
/// Posting lists and forward entries sit behind `Arc` and mutation goes
/// through `Arc::make_mut`. A clone still rebuilds both maps, one key and one
/// pointer per term and per record, but shares every list; a writer then
/// copies only the lists it touches while the clone is alive.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: BTreeMap<String, Arc<PostingList>>,
    forward: HashMap<RecordId, Arc<ForwardEntry>>,
    field_stats: BTreeMap<AttributeId, FieldStats>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    pub fn doc_count(&self) -> usize {
        self.forward.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn contains_record(&self, record_id: RecordId) -> bool {
        self.forward.contains_key(&record_id)
    }

    /// Index a record, replacing whatever it contributed before.
    pub fn add_record(&mut self, record_id: RecordId, analyzed: &AnalyzedRecord) {
        self.remove_record(record_id);

        let mut grouped: BTreeMap<&str, Posting> = BTreeMap::new();
        let mut field_lengths = Vec::with_capacity(analyzed.fields.len());

        for field in &analyzed.fields {
            field_lengths.push((field.attribute, field.length));
            let stats = self.field_stats.entry(field.attribute).or_default();
            stats.total_tokens += field.length as u64;
            stats.doc_count += 1;

            for (term, hit) in &field.terms {
                grouped
                    .entry(term.as_str())
                    .or_insert_with(|| Posting {
                        record_id,
                        hits: Vec::new(),
                    })
                    .hits
                    .push(hit.clone());
            }
        }

        let mut terms = Vec::with_capacity(grouped.len());
        for (term, mut posting) in grouped {
            posting.hits.sort_by_key(|h| h.attribute);
            let list = self.postings.entry(term.to_string()).or_default();
            Arc::make_mut(list).add_posting(posting);
            terms.push(term.to_string());
        }

        self.forward.insert(
            record_id,
            Arc::new(ForwardEntry {
                terms,
                field_lengths,
            }),
        );
    }

    /// Purge every posting of a record. Returns false when it was not indexed.
    pub fn remove_record(&mut self, record_id: RecordId) -> bool {
        let Some(entry) = self.forward.remove(&record_id) else {
            return false;
        };

        for term in &entry.terms {
            let emptied = match self.postings.get_mut(term) {
                Some(list) => {
                    let list = Arc::make_mut(list);
                    list.remove(record_id);
                    list.is_empty()
                }
                None => false,
            };
            if emptied {
                self.postings.remove(term);
            }
        }

        for (attribute, length) in &entry.field_lengths {
            if let Some(stats) = self.field_stats.get_mut(attribute) {
                stats.total_tokens = stats.total_tokens.saturating_sub(*length as u64);
                stats.doc_count = stats.doc_count.saturating_sub(1);
            }
        }
        true
    }

    pub fn posting_list(&self, term: &str) -> Option<&PostingList> {
        self.postings.get(term).map(|l| l.as_ref())
    }

    pub fn doc_freq(&self, term: &str) -> u32 {
        self.posting_list(term).map(|l| l.doc_freq()).unwrap_or(0)
    }

    /// All terms starting with `prefix`, in lexicographic order.
    pub fn terms_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a PostingList)> + 'a {
        self.postings
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, list)| (term.as_str(), list.as_ref()))
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &PostingList)> {
        self.postings.iter().map(|(t, l)| (t.as_str(), l.as_ref()))
    }

    pub fn field_stats(&self, attribute: AttributeId) -> FieldStats {
        self.field_stats.get(&attribute).copied().unwrap_or_default()
    }

    pub fn field_length(&self, record_id: RecordId, attribute: AttributeId) -> u32 {
        self.forward
            .get(&record_id)
            .map(|e| e.field_length(attribute))
            .unwrap_or(0)
    }

    pub fn to_persisted(&self) -> Result<PersistedIndex> {
        let mut builder = MapBuilder::memory();
        let mut postings = Vec::with_capacity(self.postings.len());

        // BTreeMap iteration is already in the byte order fst requires.
        for (ordinal, (term, list)) in self.postings.iter().enumerate() {
            builder.insert(term, ordinal as u64)?;
            postings.push(PostingList::clone(list));
        }

        let mut forward: Vec<_> = self
            .forward
            .iter()
            .map(|(id, entry)| (*id, ForwardEntry::clone(entry)))
            .collect();
        forward.sort_by_key(|(id, _)| *id);

        Ok(PersistedIndex {
            term_dictionary: builder.into_inner()?,
            postings,
            forward,
            field_stats: self.field_stats.iter().map(|(a, s)| (*a, *s)).collect(),
        })
    }

    pub fn from_persisted(persisted: PersistedIndex) -> Result<Self> {
        let dictionary = Map::new(persisted.term_dictionary)?;
        if dictionary.len() != persisted.postings.len() {
            return Err(Error::persistence(format!(
                "term dictionary has {} terms but {} posting lists were stored",
                dictionary.len(),
                persisted.postings.len()
            )));
        }

        let mut lists: Vec<Option<PostingList>> = persisted.postings.into_iter().map(Some).collect();
        let mut postings = BTreeMap::new();
        let mut stream = dictionary.stream();
        while let Some((term, ordinal)) = stream.next() {
            let term = std::str::from_utf8(term)
                .map_err(|_| Error::persistence("term dictionary holds invalid UTF-8"))?;
            let list = lists
                .get_mut(ordinal as usize)
                .and_then(Option::take)
                .ok_or_else(|| Error::persistence(format!("dangling posting ordinal {}", ordinal)))?;
            postings.insert(term.to_string(), Arc::new(list));
        }

        Ok(InvertedIndex {
            postings,
            forward: persisted
                .forward
                .into_iter()
                .map(|(id, entry)| (id, Arc::new(entry)))
                .collect(),
            field_stats: persisted.field_stats.into_iter().collect(),
        })
    }
}
