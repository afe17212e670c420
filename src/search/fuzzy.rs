use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder};
use crate::index::inverted::InvertedIndex;
use crate::search::prefix::TermMatch;

/// Edit-distance term expansion over the index dictionary.
///
/// Building the parametric automaton for a distance is the expensive part,
/// so one builder per distance is made up front and reused for every keyword.
pub struct FuzzyMatcher {
    builders: Vec<LevenshteinAutomatonBuilder>,  // index = distance - 1
}

impl FuzzyMatcher {
    pub fn new(max_edit_distance: u8) -> Self {
        // Transpositions count as one edit.
        FuzzyMatcher {
            builders: (1..=max_edit_distance)
                .map(|d| LevenshteinAutomatonBuilder::new(d, true))
                .collect(),
        }
    }

    pub fn max_edit_distance(&self) -> u8 {
        self.builders.len() as u8
    }

    /// Indexed terms within `edits` of `term` (of a prefix of the indexed
    /// term when `prefix` is set), closest first, at most `limit`.
    pub fn expand<'a>(
        &self,
        index: &'a InvertedIndex,
        term: &str,
        edits: u8,
        prefix: bool,
        limit: usize,
    ) -> Vec<TermMatch<'a>> {
        let edits = edits.min(self.max_edit_distance());
        if edits == 0 {
            return Vec::new();
        }

        let builder = &self.builders[edits as usize - 1];
        let dfa = if prefix {
            builder.build_prefix_dfa(term)
        } else {
            builder.build_dfa(term)
        };
        let term_chars = term.chars().count();

        let mut matches: Vec<TermMatch<'a>> = index
            .terms()
            .filter_map(|(candidate, list)| match dfa.eval(candidate) {
                Distance::Exact(distance) => Some(TermMatch {
                    term: candidate,
                    list,
                    edits: distance,
                    completion: prefix && candidate.chars().count() > term_chars,
                }),
                Distance::AtLeast(_) => None,
            })
            .collect();

        matches.sort_by(|a, b| a.edits.cmp(&b.edits).then_with(|| a.term.cmp(b.term)));
        matches.truncate(limit);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::core::types::{Record, RecordId};
    use crate::index::indexer::Indexer;
    use crate::schema::schema::{FieldDefinition, Schema};

    fn index(text: &str) -> InvertedIndex {
        let indexer = Indexer::new(Arc::new(Schema::new("id").add_field(FieldDefinition::text("title"))));
        let mut index = InvertedIndex::new();
        index.add_record(RecordId(1), &indexer.prepare(&Record::new("1").with("title", text)).unwrap());
        index
    }

    #[test]
    fn finds_terms_within_distance() {
        let index = index("garden warden gardener xyz");
        let matcher = FuzzyMatcher::new(2);

        let found: Vec<_> = matcher
            .expand(&index, "gardn", 1, false, 10)
            .iter()
            .map(|m| (m.term, m.edits))
            .collect();
        assert_eq!(found, vec![("garden", 1)]);

        let wider: Vec<_> = matcher
            .expand(&index, "gardn", 2, false, 10)
            .iter()
            .map(|m| m.term)
            .collect();
        assert_eq!(wider, vec!["garden", "warden"]);
    }

    #[test]
    fn prefix_mode_matches_completions_with_typos() {
        let index = index("gardener kitchen");
        let matcher = FuzzyMatcher::new(2);
        let found = matcher.expand(&index, "gadr", 1, true, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].term, "gardener");
        assert!(found[0].completion);
    }

    #[test]
    fn zero_edits_expands_nothing() {
        let index = index("garden");
        assert!(FuzzyMatcher::new(2).expand(&index, "garden", 0, false, 10).is_empty());
    }
}
