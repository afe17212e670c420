use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::query::parser::QueryParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,   // 0 → 9, A → Z
    Desc,  // 9 → 0, Z → A
}

/// Which fields a clause is matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldScope {
    All,                  // no scope, or `*:`
    AnyOf(Vec<String>),   // `title:` or `title+body:`
    AllOf(Vec<String>),   // `title.body:`
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordClause {
    pub term: String,
    pub scope: FieldScope,
    pub prefix: bool,
    pub fuzzy: bool,
    pub similarity: Option<f32>,  // overrides the configured threshold
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseClause {
    pub text: String,
    pub scope: FieldScope,
    pub slop: u32,  // extra gap allowed between consecutive terms
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Keyword(KeywordClause),
    Phrase(PhraseClause),
    MatchAll,
}

impl Clause {
    pub fn keyword(term: &str) -> Self {
        Clause::Keyword(KeywordClause {
            term: term.to_string(),
            scope: FieldScope::All,
            prefix: false,
            fuzzy: false,
            similarity: None,
            boost: None,
        })
    }

    /// Keyword restricted to one field, as `field:term` parses.
    pub fn field_keyword(field: &str, term: &str) -> Self {
        Clause::Keyword(KeywordClause {
            term: term.to_string(),
            scope: FieldScope::AnyOf(vec![field.to_string()]),
            prefix: false,
            fuzzy: false,
            similarity: None,
            boost: None,
        })
    }

    pub fn phrase(field: Option<&str>, text: &str, slop: u32) -> Self {
        Clause::Phrase(PhraseClause {
            text: text.to_string(),
            scope: field
                .map(|f| FieldScope::AnyOf(vec![f.to_string()]))
                .unwrap_or(FieldScope::All),
            slop,
            boost: None,
        })
    }
}

/// Facet request over one attribute. Range bounds and gap are raw strings,
/// parsed against the field type during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FacetSpec {
    Categorical {
        field: String,
        max_groups: Option<usize>,
    },
    Range {
        field: String,
        start: Option<String>,
        end: Option<String>,
        gap: Option<String>,
    },
}

impl FacetSpec {
    pub fn categorical(field: &str) -> Self {
        FacetSpec::Categorical {
            field: field.to_string(),
            max_groups: None,
        }
    }

    pub fn range(field: &str, start: Option<&str>, end: Option<&str>, gap: Option<&str>) -> Self {
        FacetSpec::Range {
            field: field.to_string(),
            start: start.map(String::from),
            end: end.map(String::from),
            gap: gap.map(String::from),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FacetSpec::Categorical { field, .. } | FacetSpec::Range { field, .. } => field,
        }
    }
}

/// Condition on a stored attribute value. Filters only remove records, they
/// never add to a score. Values are raw strings parsed against the field
/// type during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterSpec {
    Equals {
        field: String,
        value: String,
    },
    Range {
        field: String,
        start: Option<String>,  // inclusive, `None` is open
        end: Option<String>,    // inclusive, `None` is open
    },
}

impl FilterSpec {
    pub fn equals(field: &str, value: &str) -> Self {
        FilterSpec::Equals {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn range(field: &str, start: Option<&str>, end: Option<&str>) -> Self {
        FilterSpec::Range {
            field: field.to_string(),
            start: start.map(String::from),
            end: end.map(String::from),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FilterSpec::Equals { field, .. } | FilterSpec::Range { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// Typed query descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub clauses: Vec<Clause>,
    pub operator: BooleanOperator,
    pub prefix_complete: bool,  // last keyword clause matches as a prefix
    pub fuzzy: bool,            // every keyword also matches within an edit bound
    pub filters: Vec<FilterSpec>,
    pub filter_operator: BooleanOperator,
    pub facets: Vec<FacetSpec>,
    pub sort: Option<SortSpec>,
    pub rows: Option<usize>,
    pub offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            clauses: Vec::new(),
            operator: BooleanOperator::And,
            prefix_complete: false,
            fuzzy: false,
            filters: Vec::new(),
            filter_operator: BooleanOperator::And,
            facets: Vec::new(),
            sort: None,
            rows: None,
            offset: 0,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    /// Build a query from a keyword expression such as `title:gar* AND "john smith"~1`.
    pub fn parse(expression: &str) -> Result<Self> {
        QueryParser::new().parse(expression)
    }

    pub fn match_all() -> Self {
        Query::new().clause(Clause::MatchAll)
    }

    pub fn keywords(terms: &[&str]) -> Self {
        terms
            .iter()
            .fold(Query::new(), |query, term| query.clause(Clause::keyword(term)))
    }

    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn with_operator(mut self, operator: BooleanOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_prefix_complete(mut self, enabled: bool) -> Self {
        self.prefix_complete = enabled;
        self
    }

    pub fn with_fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy = enabled;
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add the conditions of a filter expression such as
    /// `price:[10 TO 100] AND model:bmw`.
    pub fn with_filter_expression(mut self, expression: &str) -> Result<Self> {
        let (filters, operator) = QueryParser::new().parse_filters(expression)?;
        if !self.filters.is_empty() && operator != self.filter_operator {
            return Err(Error::parse("filter expression joins its conditions differently from the query's filters"));
        }
        self.filters.extend(filters);
        self.filter_operator = operator;
        Ok(self)
    }

    pub fn facet(mut self, facet: FacetSpec) -> Self {
        self.facets.push(facet);
        self
    }

    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            order,
        });
        self
    }

    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
