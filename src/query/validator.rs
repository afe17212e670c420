use tracing::debug;
use crate::analysis::analyzer::Analyzer;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::Scalar;
use crate::query::ast::{BooleanOperator, Clause, FacetSpec, FieldScope, FilterSpec, KeywordClause, PhraseClause, Query, SortOrder};
use crate::schema::schema::{AttributeId, FieldType, Schema};
use crate::search::facet::MAX_RANGE_BUCKETS;

/// Attributes a resolved clause may match in.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeFilter {
    All,
    AnyOf(Vec<AttributeId>),
    EveryOf(Vec<AttributeId>),
}

impl AttributeFilter {
    pub fn allows(&self, attribute: AttributeId) -> bool {
        match self {
            AttributeFilter::All => true,
            AttributeFilter::AnyOf(ids) | AttributeFilter::EveryOf(ids) => ids.contains(&attribute),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedKeyword {
    pub term: String,
    pub filter: AttributeFilter,
    pub prefix: bool,
    pub max_edits: u8,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseTerm {
    pub term: String,
    pub offset: u32,  // relative to the first term
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPhrase {
    pub terms: Vec<PhraseTerm>,
    pub attributes: Vec<AttributeId>,  // positional attributes only
    pub require_all: bool,
    pub slop: u32,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedClause {
    Keyword(ResolvedKeyword),
    Phrase(ResolvedPhrase),
    MatchAll,
    Nothing,  // references only fields the schema does not know
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFacet {
    Categorical {
        field: String,
        max_groups: Option<usize>,
    },
    Range {
        field: String,
        field_type: FieldType,
        start: Option<f64>,
        end: Option<f64>,
        gap: f64,
    },
}

/// A filter condition with its values parsed against the field type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFilter {
    Equals {
        field: String,
        value: Scalar,
    },
    Range {
        field: String,
        start: Option<Scalar>,
        end: Option<Scalar>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSort {
    pub field: String,
    pub order: SortOrder,
}

/// A query checked against the schema, with keywords analyzed and limits applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub clauses: Vec<ResolvedClause>,
    pub operator: BooleanOperator,
    pub filters: Vec<ResolvedFilter>,
    pub filter_operator: BooleanOperator,
    pub facets: Vec<ResolvedFacet>,
    pub sort: Option<ResolvedSort>,
    pub rows: usize,
    pub offset: usize,
}

pub struct QueryValidator<'a> {
    schema: &'a Schema,
    analyzer: &'a Analyzer,
    config: &'a Config,
}

impl<'a> QueryValidator<'a> {
    pub fn new(schema: &'a Schema, analyzer: &'a Analyzer, config: &'a Config) -> Self {
        QueryValidator {
            schema,
            analyzer,
            config,
        }
    }

    pub fn validate(&self, query: &Query) -> Result<ResolvedQuery> {
        if query.clauses.len() > self.config.max_clauses {
            return Err(Error::parse(format!(
                "query has {} clauses, the limit is {}",
                query.clauses.len(),
                self.config.max_clauses
            )));
        }

        let filters = query
            .filters
            .iter()
            .map(|f| self.resolve_filter(f))
            .collect::<Result<Vec<_>>>()?;

        let facets = query
            .facets
            .iter()
            .map(|f| self.resolve_facet(f))
            .collect::<Result<Vec<_>>>()?;

        let sort = match &query.sort {
            Some(sort) => {
                if self.schema.field(&sort.field).is_none() && sort.field != self.schema.primary_key {
                    return Err(Error::schema(format!("cannot sort by unknown field '{}'", sort.field)));
                }
                Some(ResolvedSort {
                    field: sort.field.clone(),
                    order: sort.order,
                })
            }
            None => None,
        };

        let last_keyword = query
            .clauses
            .iter()
            .rposition(|c| matches!(c, Clause::Keyword(_)));

        let mut clauses = Vec::with_capacity(query.clauses.len());
        for (i, clause) in query.clauses.iter().enumerate() {
            match clause {
                Clause::Keyword(keyword) => {
                    let completes = query.prefix_complete && Some(i) == last_keyword;
                    self.resolve_keyword(keyword, completes, query.fuzzy, &mut clauses);
                }
                Clause::Phrase(phrase) => {
                    if let Some(resolved) = self.resolve_phrase(phrase)? {
                        clauses.push(resolved);
                    }
                }
                Clause::MatchAll => clauses.push(ResolvedClause::MatchAll),
            }
        }

        Ok(ResolvedQuery {
            clauses,
            operator: query.operator,
            filters,
            filter_operator: query.filter_operator,
            facets,
            sort,
            rows: query
                .rows
                .unwrap_or(self.config.default_rows)
                .min(self.config.max_rows),
            offset: query.offset,
        })
    }

    fn resolve_scope(&self, scope: &FieldScope) -> Option<AttributeFilter> {
        match scope {
            FieldScope::All => Some(AttributeFilter::All),
            FieldScope::AnyOf(fields) => {
                let ids: Vec<_> = fields
                    .iter()
                    .filter_map(|f| {
                        let id = self.schema.attribute_id(f);
                        if id.is_none() {
                            debug!(field = %f, "query references a field that is not searchable");
                        }
                        id
                    })
                    .collect();
                (!ids.is_empty()).then_some(AttributeFilter::AnyOf(ids))
            }
            FieldScope::AllOf(fields) => {
                let ids: Option<Vec<_>> = fields.iter().map(|f| self.schema.attribute_id(f)).collect();
                if ids.is_none() {
                    debug!(?fields, "query requires a field that is not searchable");
                }
                ids.map(AttributeFilter::EveryOf)
            }
        }
    }

    fn resolve_keyword(
        &self,
        keyword: &KeywordClause,
        completes: bool,
        fuzzy: bool,
        out: &mut Vec<ResolvedClause>,
    ) {
        let Some(filter) = self.resolve_scope(&keyword.scope) else {
            out.push(ResolvedClause::Nothing);
            return;
        };

        let prefix = keyword.prefix || completes;
        let tokens = if prefix {
            self.analyzer.analyze_prefix(&keyword.term)
        } else {
            self.analyzer.analyze(&keyword.term)
        };
        let last = tokens.len().saturating_sub(1);

        for (i, token) in tokens.into_iter().enumerate() {
            let max_edits = if keyword.fuzzy || fuzzy {
                let similarity = keyword
                    .similarity
                    .unwrap_or(self.config.fuzzy_similarity_threshold);
                edit_bound(&token.text, similarity, self.config.max_edit_distance)
            } else {
                0
            };

            out.push(ResolvedClause::Keyword(ResolvedKeyword {
                term: token.text,
                filter: filter.clone(),
                prefix: prefix && i == last,
                max_edits,
                boost: keyword.boost.unwrap_or(1.0),
            }));
        }
    }

    fn resolve_phrase(&self, phrase: &PhraseClause) -> Result<Option<ResolvedClause>> {
        if phrase.slop > self.config.max_phrase_slop {
            return Err(Error::parse(format!(
                "phrase slop {} exceeds the limit of {}",
                phrase.slop, self.config.max_phrase_slop
            )));
        }

        let tokens = self.analyzer.analyze(&phrase.text);
        let Some(first) = tokens.first().map(|t| t.position) else {
            return Ok(None);
        };
        let terms = tokens
            .into_iter()
            .map(|t| PhraseTerm {
                offset: t.position - first,
                term: t.text,
            })
            .collect();

        let positional = |id: &AttributeId| {
            self.schema
                .attribute(*id)
                .map(|f| f.positional)
                .unwrap_or(false)
        };

        let (attributes, require_all) = match self.resolve_scope(&phrase.scope) {
            None => return Ok(Some(ResolvedClause::Nothing)),
            Some(AttributeFilter::All) => (
                self.schema.attribute_ids().into_iter().filter(positional).collect(),
                false,
            ),
            Some(AttributeFilter::AnyOf(ids)) => (ids.into_iter().filter(positional).collect(), false),
            Some(AttributeFilter::EveryOf(ids)) => {
                if !ids.iter().all(positional) {
                    return Ok(Some(ResolvedClause::Nothing));
                }
                (ids, true)
            }
        };

        let attributes: Vec<AttributeId> = attributes;
        if attributes.is_empty() {
            return Ok(Some(ResolvedClause::Nothing));
        }

        Ok(Some(ResolvedClause::Phrase(ResolvedPhrase {
            terms,
            attributes,
            require_all,
            slop: phrase.slop,
            boost: phrase.boost.unwrap_or(1.0),
        })))
    }

    /// Filters may name any schema field or the primary key. Unlike keyword
    /// scopes, an unknown field fails the request.
    fn resolve_filter(&self, filter: &FilterSpec) -> Result<ResolvedFilter> {
        let name = filter.field();
        let field_type = if name == self.schema.primary_key {
            FieldType::Text
        } else {
            self.schema
                .field(name)
                .map(|f| f.field_type)
                .ok_or_else(|| Error::schema(format!("filter on unknown field '{}'", name)))?
        };
        let parse = |raw: &str| Scalar::parse_as(field_type, raw);

        match filter {
            FilterSpec::Equals { value, .. } => Ok(ResolvedFilter::Equals {
                field: name.to_string(),
                value: parse(value)?,
            }),
            FilterSpec::Range { start, end, .. } => {
                let start = start.as_deref().map(parse).transpose()?;
                let end = end.as_deref().map(parse).transpose()?;
                if let (Some(s), Some(e)) = (&start, &end) {
                    if s.compare(e).is_gt() {
                        return Err(Error::parse(format!("filter range on '{}' starts after it ends", name)));
                    }
                }
                Ok(ResolvedFilter::Range {
                    field: name.to_string(),
                    start,
                    end,
                })
            }
        }
    }

    fn resolve_facet(&self, facet: &FacetSpec) -> Result<ResolvedFacet> {
        let field = self
            .schema
            .field(facet.field())
            .ok_or_else(|| Error::schema(format!("facet on unknown field '{}'", facet.field())))?;

        match facet {
            FacetSpec::Categorical { field, max_groups } => Ok(ResolvedFacet::Categorical {
                field: field.clone(),
                max_groups: *max_groups,
            }),
            FacetSpec::Range {
                field: name,
                start,
                end,
                gap,
            } => {
                if !field.field_type.is_ordered() {
                    return Err(Error::schema(format!(
                        "range facet needs a numeric or time field, '{}' is {:?}",
                        name, field.field_type
                    )));
                }
                let gap = gap
                    .as_deref()
                    .ok_or_else(|| Error::config(format!("range facet on '{}' has no gap", name)))?;

                let gap = parse_gap(field.field_type, gap)?;
                let start = start
                    .as_deref()
                    .map(|s| parse_bound(field.field_type, s))
                    .transpose()?;
                let end = end
                    .as_deref()
                    .map(|s| parse_bound(field.field_type, s))
                    .transpose()?;

                if let (Some(s), Some(e)) = (start, end) {
                    if s > e {
                        return Err(Error::parse(format!(
                            "range facet on '{}' starts after it ends",
                            name
                        )));
                    }
                    if (e - s) / gap > MAX_RANGE_BUCKETS as f64 {
                        return Err(Error::parse(format!(
                            "range facet on '{}' would produce more than {} buckets",
                            name, MAX_RANGE_BUCKETS
                        )));
                    }
                }

                Ok(ResolvedFacet::Range {
                    field: name.clone(),
                    field_type: field.field_type,
                    start,
                    end,
                    gap,
                })
            }
        }
    }
}

/// Edit-distance bound for a keyword of `term`'s length at the given similarity.
pub fn edit_bound(term: &str, similarity: f32, max_edit_distance: u8) -> u8 {
    let len = term.chars().count() as f32;
    let bound = ((1.0 - similarity) * len).floor().max(0.0) as u32;
    bound.min(max_edit_distance as u32) as u8
}

fn parse_bound(field_type: FieldType, raw: &str) -> Result<f64> {
    Scalar::parse_as(field_type, raw)?
        .as_number()
        .ok_or_else(|| Error::parse(format!("'{}' is not an ordered value", raw)))
}

fn parse_gap(field_type: FieldType, raw: &str) -> Result<f64> {
    // gaps are plain numbers; for time fields they count seconds
    let gap_type = if field_type == FieldType::Integer {
        FieldType::Integer
    } else {
        FieldType::Float
    };
    let gap = parse_bound(gap_type, raw)?;
    if !(gap.is_finite() && gap > 0.0) {
        return Err(Error::parse(format!("facet gap must be positive, got '{}'", raw)));
    }
    Ok(gap)
}
