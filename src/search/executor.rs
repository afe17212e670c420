use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{Record, RecordId, Scalar};
use crate::index::posting::FieldHit;
use crate::mvcc::controller::IndexState;
use crate::query::ast::{BooleanOperator, SortOrder};
use crate::query::validator::{AttributeFilter, ResolvedClause, ResolvedKeyword, ResolvedPhrase, ResolvedQuery, ResolvedSort};
use crate::schema::schema::{AttributeId, Schema};
use crate::scoring::scorer::{Scorer, TermStats};
use crate::search::facet::FacetAggregator;
use crate::search::filter::RecordFilter;
use crate::search::fuzzy::FuzzyMatcher;
use crate::search::phrase::PhraseMatcher;
use crate::search::prefix::{expand_exact, expand_prefix, TermMatch};
use crate::search::results::{ScoredRecord, SearchHit, SearchResults, TopKCollector};

type Scores = HashMap<RecordId, f32>;

/// Evaluates a resolved query against one consistent view of the state.
pub struct SearchExecutor<'a> {
    state: &'a IndexState,
    schema: &'a Schema,
    config: &'a Config,
    scorer: &'a dyn Scorer,
    fuzzy: &'a FuzzyMatcher,
}

impl<'a> SearchExecutor<'a> {
    pub fn new(
        state: &'a IndexState,
        schema: &'a Schema,
        config: &'a Config,
        scorer: &'a dyn Scorer,
        fuzzy: &'a FuzzyMatcher,
    ) -> Self {
        SearchExecutor {
            state,
            schema,
            config,
            scorer,
            fuzzy,
        }
    }

    pub fn execute(&self, query: &ResolvedQuery) -> Result<SearchResults> {
        let started = Instant::now();

        let mut scores = self.evaluate(&query.clauses, query.operator);

        let filter = RecordFilter::new(&query.filters, query.filter_operator, &self.schema.primary_key);
        if !filter.is_empty() {
            let store = &self.state.store;
            scores.retain(|id, _| store.get(*id).is_some_and(|record| filter.accepts(record)));
        }

        let mut candidates: Vec<ScoredRecord> = scores
            .into_iter()
            .map(|(record_id, score)| ScoredRecord { record_id, score })
            .collect();

        let ids: Vec<RecordId> = candidates.iter().map(|c| c.record_id).collect();
        let facets = FacetAggregator::new(&self.state.store).aggregate(&ids, &query.facets);

        let total_hits = candidates.len();
        let max_score = candidates.iter().map(|c| c.score).fold(0.0, f32::max);
        let wanted = query.offset.saturating_add(query.rows);

        let ranked = match &query.sort {
            None => {
                let mut collector = TopKCollector::new(wanted);
                for candidate in candidates {
                    collector.collect(candidate);
                }
                collector.into_sorted()
            }
            Some(sort) => {
                self.sort_by_field(&mut candidates, sort);
                candidates.truncate(wanted);
                candidates
            }
        };

        let hits = ranked
            .into_iter()
            .skip(query.offset)
            .filter_map(|scored| {
                self.state.store.get(scored.record_id).map(|record| SearchHit {
                    record_id: scored.record_id,
                    score: scored.score,
                    record: Record::clone(record),
                })
            })
            .collect();

        Ok(SearchResults {
            hits,
            total_hits,
            max_score,
            facets,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn evaluate(&self, clauses: &[ResolvedClause], operator: BooleanOperator) -> Scores {
        let mut combined: Option<Scores> = None;

        for clause in clauses {
            let matches = self.evaluate_clause(clause);
            combined = Some(match (combined, operator) {
                (None, _) => matches,
                (Some(mut acc), BooleanOperator::And) => {
                    acc.retain(|id, score| match matches.get(id) {
                        Some(s) => {
                            *score += s;
                            true
                        }
                        None => false,
                    });
                    acc
                }
                (Some(mut acc), BooleanOperator::Or) => {
                    for (id, s) in matches {
                        acc.entry(id)
                            .and_modify(|score| *score = score.max(s))
                            .or_insert(s);
                    }
                    acc
                }
            });

            if operator == BooleanOperator::And && combined.as_ref().is_some_and(|c| c.is_empty()) {
                break;
            }
        }

        combined.unwrap_or_default()
    }

    fn evaluate_clause(&self, clause: &ResolvedClause) -> Scores {
        match clause {
            ResolvedClause::Keyword(keyword) => self.keyword(keyword),
            ResolvedClause::Phrase(phrase) => self.phrase(phrase),
            ResolvedClause::MatchAll => self.state.store.iter().map(|(id, _)| (id, 0.0)).collect(),
            ResolvedClause::Nothing => Scores::new(),
        }
    }

    fn expand<'s>(&'s self, keyword: &'s ResolvedKeyword) -> Vec<TermMatch<'s>> {
        let index = &self.state.index;
        let limit = self.config.max_prefix_expansions;

        match (keyword.max_edits > 0, keyword.prefix) {
            (false, false) => expand_exact(index, &keyword.term),
            (false, true) => expand_prefix(index, &keyword.term, limit),
            (true, prefix) => self.fuzzy.expand(index, &keyword.term, keyword.max_edits, prefix, limit),
        }
    }

    /// Score of one term in one attribute before query-time penalties.
    fn static_score(&self, record_id: RecordId, hit: &FieldHit, doc_freq: u32) -> f32 {
        let index = &self.state.index;
        let stats = TermStats {
            term_freq: hit.term_freq,
            field_length: index.field_length(record_id, hit.attribute),
            avg_field_length: index.field_stats(hit.attribute).avg_length(),
            doc_freq,
            total_docs: index.doc_count(),
        };
        let boost = self.schema.attribute(hit.attribute).map(|f| f.boost).unwrap_or(1.0);
        self.scorer.score(&stats) * boost
    }

    fn runtime_factor(&self, keyword: &ResolvedKeyword, matched: &TermMatch) -> f32 {
        let length = keyword.term.chars().count().max(1) as f32;
        let edits = matched.edits as f32;

        let mut factor = (1.0 - edits / length).max(0.0)
            * self.config.fuzzy_similarity_boost.powi(matched.edits as i32);
        if matched.completion {
            factor *= self.config.prefix_match_penalty;
        }
        factor * keyword.boost
    }

    fn keyword(&self, keyword: &ResolvedKeyword) -> Scores {
        let expansions = self.expand(keyword);
        if expansions.len() > 1 {
            debug!(term = %keyword.term, expansions = expansions.len(), "keyword expanded");
        }

        let mut scores = Scores::new();
        let mut coverage: HashMap<RecordId, Vec<AttributeId>> = HashMap::new();
        let every = matches!(keyword.filter, AttributeFilter::EveryOf(_));

        for matched in &expansions {
            let factor = self.runtime_factor(keyword, matched);
            let doc_freq = matched.list.doc_freq();

            for posting in matched.list.iter() {
                let mut static_score = 0.0;
                let mut found = false;
                for hit in posting.hits.iter().filter(|h| keyword.filter.allows(h.attribute)) {
                    found = true;
                    static_score += self.static_score(posting.record_id, hit, doc_freq);
                    if every {
                        coverage.entry(posting.record_id).or_default().push(hit.attribute);
                    }
                }
                if !found {
                    continue;
                }

                let score = static_score * factor;
                scores
                    .entry(posting.record_id)
                    .and_modify(|best| *best = best.max(score))
                    .or_insert(score);
            }
        }

        if let AttributeFilter::EveryOf(required) = &keyword.filter {
            scores.retain(|id, _| {
                coverage
                    .get(id)
                    .is_some_and(|seen| required.iter().all(|a| seen.contains(a)))
            });
        }
        scores
    }

    fn phrase(&self, phrase: &ResolvedPhrase) -> Scores {
        let index = &self.state.index;
        let mut scores = Scores::new();

        for found in PhraseMatcher::new(index).find(phrase) {
            let per_attribute = found.hits.iter().map(|hit| {
                let terms: f32 = phrase
                    .terms
                    .iter()
                    .filter_map(|t| {
                        let list = index.posting_list(&t.term)?;
                        let field_hit = list.get(found.record_id)?.hit(hit.attribute)?;
                        Some(self.static_score(found.record_id, field_hit, list.doc_freq()))
                    })
                    .sum();
                terms / (1.0 + hit.slop as f32)
            });

            let score = if phrase.require_all {
                per_attribute.sum::<f32>()
            } else {
                per_attribute.fold(0.0, f32::max)
            };
            scores.insert(found.record_id, score * phrase.boost);
        }
        scores
    }

    fn sort_key(&self, record_id: RecordId, sort: &ResolvedSort) -> Option<Scalar> {
        let record = self.state.store.get(record_id)?;
        if sort.field == self.schema.primary_key {
            return Some(Scalar::Text(record.primary_key.clone()));
        }

        let values = record.values(&sort.field).iter();
        match sort.order {
            SortOrder::Asc => values.min_by(|a, b| a.compare(b)).cloned(),
            SortOrder::Desc => values.max_by(|a, b| a.compare(b)).cloned(),
        }
    }

    /// Field order first, records without the field last, then relevance.
    fn sort_by_field(&self, candidates: &mut [ScoredRecord], sort: &ResolvedSort) {
        let mut keyed: Vec<(Option<Scalar>, ScoredRecord)> = candidates
            .iter()
            .map(|c| (self.sort_key(c.record_id, sort), *c))
            .collect();

        keyed.sort_by(|(ka, a), (kb, b)| {
            let by_field = match (ka, kb) {
                (Some(x), Some(y)) => match sort.order {
                    SortOrder::Asc => x.compare(y),
                    SortOrder::Desc => y.compare(x),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_field.then_with(|| a.rank(b))
        });

        for (slot, (_, scored)) in candidates.iter_mut().zip(keyed) {
            *slot = scored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::analysis::analyzer::Analyzer;
    use crate::core::types::Record;
    use crate::index::indexer::Indexer;
    use crate::query::ast::Query;
    use crate::query::validator::QueryValidator;
    use crate::schema::schema::FieldDefinition;
    use crate::scoring::scorer::BM25Scorer;

    struct Fixture {
        schema: Schema,
        config: Config,
        state: IndexState,
        fuzzy: FuzzyMatcher,
    }

    impl Fixture {
        fn new(records: Vec<Record>) -> Self {
            let schema = Schema::new("id")
                .add_field(FieldDefinition::text("title").boost(2.0))
                .add_field(FieldDefinition::text("body").positional())
                .add_field(FieldDefinition::integer("rank"));
            let indexer = Indexer::new(Arc::new(schema.clone()));
            let mut state = IndexState::default();
            for record in records {
                let analyzed = indexer.prepare(&record).unwrap();
                let id = state.store.insert(record).unwrap();
                state.index.add_record(id, &analyzed);
            }
            Fixture {
                schema,
                config: Config::default(),
                state,
                fuzzy: FuzzyMatcher::new(2),
            }
        }

        fn search(&self, query: Query) -> SearchResults {
            let analyzer = Analyzer::standard();
            let resolved = QueryValidator::new(&self.schema, &analyzer, &self.config)
                .validate(&query)
                .unwrap();
            let scorer = BM25Scorer::default();
            SearchExecutor::new(&self.state, &self.schema, &self.config, &scorer, &self.fuzzy)
                .execute(&resolved)
                .unwrap()
        }
    }

    fn fixture() -> Fixture {
        Fixture::new(vec![
            Record::new("a").with("title", "garden tools").with("body", "rake and spade").with("rank", 3i64),
            Record::new("b").with("title", "kitchen").with("body", "garden herbs").with("rank", 9i64),
            Record::new("c").with("title", "gar").with("body", "short word").with("rank", 1i64),
        ])
    }

    #[test]
    fn keywords_are_conjunctive_by_default() {
        let results = fixture().search(Query::parse("garden herbs").unwrap());
        assert_eq!(results.primary_keys(), vec!["b"]);
    }

    #[test]
    fn or_takes_either_clause() {
        let results = fixture().search(Query::parse("tools OR herbs").unwrap());
        assert_eq!(results.total_hits, 2);
    }

    #[test]
    fn prefix_completion_widens_only_the_last_keyword() {
        let fixture = fixture();
        let exact = fixture.search(Query::keywords(&["gar"]));
        assert_eq!(exact.primary_keys(), vec!["c"]);

        let completed = fixture.search(Query::keywords(&["gar"]).with_prefix_complete(true));
        assert_eq!(completed.total_hits, 3);
        // the exact term beats the penalized completions
        assert_eq!(completed.hits[0].record.primary_key, "c");
    }

    #[test]
    fn fuzzy_matches_typos_with_a_penalty() {
        let fixture = fixture();
        assert_eq!(fixture.search(Query::keywords(&["gardne"])).total_hits, 0);

        let fuzzy = fixture.search(Query::keywords(&["gardne"]).with_fuzzy(true));
        assert_eq!(fuzzy.total_hits, 2);
        let exact = fixture.search(Query::keywords(&["garden"]));
        assert!(fuzzy.max_score < exact.max_score);
    }

    #[test]
    fn field_boost_ranks_title_hits_first() {
        let results = fixture().search(Query::keywords(&["garden"]));
        assert_eq!(results.primary_keys(), vec!["a", "b"]);
    }

    #[test]
    fn field_scope_restricts_matching() {
        let results = fixture().search(Query::parse("body:garden").unwrap());
        assert_eq!(results.primary_keys(), vec!["b"]);

        let nothing = fixture().search(Query::parse("colour:garden").unwrap());
        assert_eq!(nothing.total_hits, 0);
    }

    #[test]
    fn explicit_sort_overrides_relevance() {
        let results = fixture().search(Query::match_all().sort_by("rank", SortOrder::Desc));
        assert_eq!(results.primary_keys(), vec!["b", "a", "c"]);

        let paged = fixture().search(Query::match_all().sort_by("rank", SortOrder::Asc).rows(1).offset(1));
        assert_eq!(paged.primary_keys(), vec!["a"]);
        assert_eq!(paged.total_hits, 3);
    }

    #[test]
    fn match_all_ties_break_on_record_age() {
        let results = fixture().search(Query::match_all());
        assert_eq!(results.primary_keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn filters_narrow_hits_before_paging() {
        let fixture = fixture();
        let query = Query::match_all()
            .with_filter_expression("rank:[2 TO *]")
            .unwrap()
            .sort_by("rank", SortOrder::Asc)
            .rows(1);
        let results = fixture.search(query);
        assert_eq!(results.total_hits, 2);
        assert_eq!(results.primary_keys(), vec!["a"]);

        let keyed = fixture.search(Query::keywords(&["garden"]).with_filter_expression("id:b").unwrap());
        assert_eq!(keyed.primary_keys(), vec!["b"]);
    }

    #[test]
    fn phrase_clause_requires_adjacency() {
        let fixture = fixture();
        assert_eq!(fixture.search(Query::parse("\"garden herbs\"").unwrap()).total_hits, 1);
        assert_eq!(fixture.search(Query::parse("\"herbs garden\"").unwrap()).total_hits, 0);
        assert_eq!(fixture.search(Query::parse("\"rake spade\"~1").unwrap()).total_hits, 1);
    }
}
