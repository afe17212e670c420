use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::types::RecordId;
use crate::schema::schema::AttributeId;

/// Location of one token: which value of the attribute, and the word offset
/// inside that value. Offsets restart at 0 for every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub segment: u32,
    pub offset: u32,
}

impl Position {
    pub fn new(segment: u32, offset: u32) -> Self {
        Position { segment, offset }
    }
}

/// Occurrences of a term inside one attribute of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHit {
    pub attribute: AttributeId,
    pub term_freq: u32,
    pub positions: Vec<Position>,  // empty unless the attribute is positional
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub record_id: RecordId,
    pub hits: Vec<FieldHit>,  // sorted by attribute
}

impl Posting {
    pub fn hit(&self, attribute: AttributeId) -> Option<&FieldHit> {
        self.hits
            .binary_search_by_key(&attribute, |h| h.attribute)
            .ok()
            .map(|i| &self.hits[i])
    }

    pub fn term_freq(&self) -> u32 {
        self.hits.iter().map(|h| h.term_freq).sum()
    }
}

/// Posting list for a term, sorted by record id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingList {
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    /// Insert or replace the posting of a record, keeping the list sorted.
    pub fn add_posting(&mut self, posting: Posting) {
        match self
            .postings
            .binary_search_by_key(&posting.record_id, |p| p.record_id)
        {
            Ok(pos) => self.postings[pos] = posting,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn remove(&mut self, record_id: RecordId) -> bool {
        match self.postings.binary_search_by_key(&record_id, |p| p.record_id) {
            Ok(pos) => {
                self.postings.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, record_id: RecordId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&record_id, |p| p.record_id)
            .ok()
            .map(|i| &self.postings[i])
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    /// Records holding the term in at least one of `attributes`
    /// (all attributes when `None`).
    pub fn records(&self, attributes: Option<&[AttributeId]>) -> RoaringBitmap {
        self.postings
            .iter()
            .filter(|p| match attributes {
                None => true,
                Some(attrs) => p.hits.iter().any(|h| attrs.contains(&h.attribute)),
            })
            .map(|p| p.record_id.0)
            .collect()
    }
}
