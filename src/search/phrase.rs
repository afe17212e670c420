use std::collections::VecDeque;
use crate::core::types::RecordId;
use crate::index::inverted::InvertedIndex;
use crate::index::posting::{PostingList, Position};
use crate::query::validator::{PhraseTerm, ResolvedPhrase};
use crate::schema::schema::AttributeId;

/// A phrase occurrence inside one attribute of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseHit {
    pub attribute: AttributeId,
    pub slop: u32,  // smallest total extra gap among the occurrences found
}

/// Records matching a phrase, with the attributes it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatch {
    pub record_id: RecordId,
    pub hits: Vec<PhraseHit>,
}

/// Positional phrase matching. An occurrence never spans two values of a
/// multi-valued attribute: every term must sit in the same segment.
pub struct PhraseMatcher<'a> {
    index: &'a InvertedIndex,
}

impl<'a> PhraseMatcher<'a> {
    pub fn new(index: &'a InvertedIndex) -> Self {
        PhraseMatcher { index }
    }

    pub fn find(&self, phrase: &ResolvedPhrase) -> Vec<PhraseMatch> {
        let lists: Option<Vec<&PostingList>> = phrase
            .terms
            .iter()
            .map(|t| self.index.posting_list(&t.term))
            .collect();
        let Some(lists) = lists else {
            return Vec::new();
        };

        let Some((first, rest)) = lists.split_first() else {
            return Vec::new();
        };
        let mut candidates = first.records(Some(&phrase.attributes));
        for list in rest {
            if candidates.is_empty() {
                break;
            }
            candidates &= list.records(Some(&phrase.attributes));
        }

        let mut matches = Vec::new();
        for record_id in candidates.iter().map(RecordId) {
            let postings: Option<Vec<_>> = lists.iter().map(|l| l.get(record_id)).collect();
            let Some(postings) = postings else {
                continue;
            };

            let mut hits = Vec::new();
            for &attribute in &phrase.attributes {
                let positions: Option<Vec<&[Position]>> = postings
                    .iter()
                    .map(|p| p.hit(attribute).map(|h| h.positions.as_slice()))
                    .collect();
                let slop = positions.and_then(|positions| best_slop(&positions, &phrase.terms, phrase.slop));
                match slop {
                    Some(slop) => hits.push(PhraseHit { attribute, slop }),
                    None if phrase.require_all => {
                        hits.clear();
                        break;
                    }
                    None => {}
                }
            }

            if !hits.is_empty() {
                matches.push(PhraseMatch { record_id, hits });
            }
        }
        matches
    }
}

/// Smallest total slop of an in-order occurrence of `terms` within one
/// segment, or `None` when no segment holds the phrase within `max_slop`
/// per gap. `positions[i]` are the sorted positions of `terms[i]`.
///
/// Runs term by term: for every position of term `i` it keeps the smallest
/// slop of a partial occurrence ending there. The predecessors of a position
/// form a window over the sorted positions of term `i - 1` that only moves
/// forward, so a monotonic queue yields each minimum in amortized O(1).
pub fn best_slop(positions: &[&[Position]], terms: &[PhraseTerm], max_slop: u32) -> Option<u32> {
    let first = positions.first()?;
    let mut reach: Vec<Option<u32>> = vec![Some(0); first.len()];

    for i in 1..positions.len() {
        let gap = i64::from(terms[i].offset.saturating_sub(terms[i - 1].offset));
        let previous = positions[i - 1];

        // (index into `previous`, slop so far minus its offset), increasing values
        let mut window: VecDeque<(usize, i64)> = VecDeque::new();
        let mut next = 0;

        let current: Vec<Option<u32>> = positions[i]
            .iter()
            .map(|p| {
                let newest = shifted(p, gap);
                let oldest = shifted(p, gap + i64::from(max_slop));

                while next < previous.len() && shifted(&previous[next], 0) <= newest {
                    if let Some(used) = reach[next] {
                        let value = i64::from(used) - i64::from(previous[next].offset);
                        while window.back().is_some_and(|&(_, v)| v >= value) {
                            window.pop_back();
                        }
                        window.push_back((next, value));
                    }
                    next += 1;
                }
                while window.front().is_some_and(|&(j, _)| shifted(&previous[j], 0) < oldest) {
                    window.pop_front();
                }

                window
                    .front()
                    .map(|&(_, value)| (value + i64::from(p.offset) - gap) as u32)
            })
            .collect();

        if current.iter().all(Option::is_none) {
            return None;
        }
        reach = current;
    }

    reach.into_iter().flatten().min()
}

/// Sort key of `position` moved `back` places towards the segment start.
fn shifted(position: &Position, back: i64) -> (u32, i64) {
    (position.segment, i64::from(position.offset) - back)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::core::types::Record;
    use crate::index::indexer::Indexer;
    use crate::schema::schema::{FieldDefinition, Schema};

    fn phrase(words: &[(&str, u32)], slop: u32) -> ResolvedPhrase {
        ResolvedPhrase {
            terms: words
                .iter()
                .map(|(term, offset)| PhraseTerm {
                    term: term.to_string(),
                    offset: *offset,
                })
                .collect(),
            attributes: vec![AttributeId(0)],
            require_all: false,
            slop,
            boost: 1.0,
        }
    }

    fn index(records: &[(u32, &[&str])]) -> InvertedIndex {
        let schema = Schema::new("id").add_field(FieldDefinition::text("authors").multi_valued().positional());
        let indexer = Indexer::new(Arc::new(schema));
        let mut index = InvertedIndex::new();
        for (id, values) in records {
            let record = Record::new(id.to_string()).with_values("authors", values.iter().copied());
            index.add_record(RecordId(*id), &indexer.prepare(&record).unwrap());
        }
        index
    }

    #[test]
    fn phrase_never_crosses_segments() {
        let index = index(&[(1, &["John Smith", "George Orwell"][..])]);
        let matcher = PhraseMatcher::new(&index);

        let inside = matcher.find(&phrase(&[("john", 0), ("smith", 1)], 0));
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].hits[0].slop, 0);

        let across = matcher.find(&phrase(&[("smith", 0), ("george", 1)], 0));
        assert!(across.is_empty());

        let across_with_slop = matcher.find(&phrase(&[("smith", 0), ("george", 1)], 50));
        assert!(across_with_slop.is_empty());
    }

    #[test]
    fn slop_allows_gaps_in_order_only() {
        let index = index(&[(1, &["alpha beta gamma delta"][..])]);
        let matcher = PhraseMatcher::new(&index);

        assert!(matcher.find(&phrase(&[("alpha", 0), ("gamma", 1)], 0)).is_empty());
        let loose = matcher.find(&phrase(&[("alpha", 0), ("gamma", 1)], 1));
        assert_eq!(loose[0].hits[0].slop, 1);

        assert!(matcher.find(&phrase(&[("gamma", 0), ("alpha", 1)], 5)).is_empty());
    }

    #[test]
    fn tightest_occurrence_is_not_the_greedy_one() {
        // taking the first "b" leaves "c" out of reach
        let a = [Position::new(0, 0)];
        let b = [Position::new(0, 1), Position::new(0, 2)];
        let c = [Position::new(0, 4)];
        let terms = [
            PhraseTerm { term: "a".into(), offset: 0 },
            PhraseTerm { term: "b".into(), offset: 1 },
            PhraseTerm { term: "c".into(), offset: 2 },
        ];
        assert_eq!(best_slop(&[&a[..], &b[..], &c[..]], &terms, 1), Some(2));
        assert_eq!(best_slop(&[&a[..], &b[..], &c[..]], &terms, 0), None);
    }

    #[test]
    fn repeated_terms_without_a_match_finish_quickly() {
        let body = format!("b {}", vec!["a"; 200].join(" "));
        let index = index(&[(1, &[body.as_str()][..])]);
        let matcher = PhraseMatcher::new(&index);

        let words: Vec<(&str, u32)> = ["a", "a", "a", "a", "a", "a", "b"]
            .iter()
            .enumerate()
            .map(|(i, w)| (*w, i as u32))
            .collect();
        let started = std::time::Instant::now();
        assert!(matcher.find(&phrase(&words, 40)).is_empty());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let words: Vec<(&str, u32)> = (0..7).map(|i| ("a", i)).collect();
        let found = matcher.find(&phrase(&words, 40));
        assert_eq!(found[0].hits[0].slop, 0);
    }

    #[test]
    fn slop_is_summed_over_gaps() {
        let a = [Position::new(0, 0), Position::new(1, 0)];
        let b = [Position::new(0, 2), Position::new(1, 1)];
        let c = [Position::new(0, 4), Position::new(1, 5)];
        let terms = [
            PhraseTerm { term: "a".into(), offset: 0 },
            PhraseTerm { term: "b".into(), offset: 1 },
            PhraseTerm { term: "c".into(), offset: 2 },
        ];
        // segment 0 costs 1 + 1, segment 1 costs 0 + 3
        assert_eq!(best_slop(&[&a[..], &b[..], &c[..]], &terms, 3), Some(2));
        assert_eq!(best_slop(&[&a[..], &b[..], &c[..]], &terms, 1), Some(2));
        assert_eq!(best_slop(&[&a[..], &b[..], &c[..]], &terms, 0), None);
    }

    #[test]
    fn missing_term_matches_nothing() {
        let index = index(&[(1, &["john smith"][..])]);
        let matcher = PhraseMatcher::new(&index);
        assert!(matcher.find(&phrase(&[("john", 0), ("doe", 1)], 3)).is_empty());
    }
}
