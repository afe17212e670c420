use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, not, opt, value, verify};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};
use crate::query::ast::{BooleanOperator, Clause, FieldScope, FilterSpec, KeywordClause, PhraseClause, Query};

/// Parser for keyword expressions.
///
/// ```text
/// expression := clause ((ws | ws OP ws) clause)*
/// clause     := '*' | scope? '"' words '"' ('~' slop)? ('^' boost)?
///             | scope? keyword '*'? ('~' similarity?)? ('^' boost)?
/// scope      := field ':' | field ('.' field)+ ':' | field ('+' field)+ ':' | '*:'
/// ```
///
/// Filter expressions have their own small grammar:
///
/// ```text
/// filters    := condition ((ws | ws OP ws) condition)*
/// condition  := field ':' ( '[' bound ws 'TO' ws bound ']' | value )
/// bound      := '*' | value
/// value      := '"' text '"' | word
/// ```
pub struct QueryParser {
    pub default_operator: BooleanOperator,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser::new()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        QueryParser {
            default_operator: BooleanOperator::And,
        }
    }

    pub fn parse(&self, input: &str) -> Result<Query> {
        let (clauses, operator) = self.parse_clauses(input)?;
        Ok(Query {
            clauses,
            operator,
            ..Query::default()
        })
    }

    /// Clauses in input order plus the operator joining them.
    pub fn parse_clauses(&self, input: &str) -> Result<(Vec<Clause>, BooleanOperator)> {
        if input.trim().is_empty() {
            return Err(Error::parse("empty query"));
        }

        let (_, (first, rest)) = expression(input).map_err(|err| malformed("query", err))?;
        let (clauses, operator) = self.join(first, rest)?;

        for clause in &clauses {
            check_modifiers(clause)?;
        }
        Ok((clauses, operator))
    }

    /// Conditions of a filter expression plus the operator joining them.
    pub fn parse_filters(&self, input: &str) -> Result<(Vec<FilterSpec>, BooleanOperator)> {
        if input.trim().is_empty() {
            return Err(Error::parse("empty filter expression"));
        }

        let (_, (first, rest)) = filter_expression(input).map_err(|err| malformed("filter", err))?;
        self.join(first, rest)
    }

    fn join<T>(&self, first: T, rest: Vec<(Option<BooleanOperator>, T)>) -> Result<(Vec<T>, BooleanOperator)> {
        let mut operator: Option<BooleanOperator> = None;
        let mut items = vec![first];
        for (connector, item) in rest {
            let op = connector.unwrap_or(self.default_operator);
            match operator {
                Some(previous) if previous != op => {
                    return Err(Error::parse("AND and OR cannot be mixed in one expression"));
                }
                _ => operator = Some(op),
            }
            items.push(item);
        }
        Ok((items, operator.unwrap_or(self.default_operator)))
    }
}

fn malformed(what: &str, err: nom::Err<nom::error::Error<&str>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            Error::parse(format!("malformed {} near '{}'", what, truncate(e.input)))
        }
        nom::Err::Incomplete(_) => Error::parse(format!("incomplete {}", what)),
    }
}

fn truncate(input: &str) -> &str {
    match input.char_indices().nth(24) {
        Some((end, _)) => &input[..end],
        None => input,
    }
}

fn check_modifiers(clause: &Clause) -> Result<()> {
    let boost = match clause {
        Clause::Keyword(keyword) => {
            if let Some(similarity) = keyword.similarity {
                if !(similarity > 0.0 && similarity <= 1.0) {
                    return Err(Error::parse(format!(
                        "similarity for '{}' must be within (0, 1], got {}",
                        keyword.term, similarity
                    )));
                }
            }
            keyword.boost
        }
        Clause::Phrase(phrase) => phrase.boost,
        Clause::MatchAll => None,
    };

    match boost {
        Some(b) if !(b.is_finite() && b > 0.0) => {
            Err(Error::parse(format!("boost must be a positive number, got {}", b)))
        }
        _ => Ok(()),
    }
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_keyword_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '"' | ':' | '*' | '~' | '^')
}

fn field_scope(raw: &str) -> std::result::Result<FieldScope, &'static str> {
    let every = raw.contains('.');
    let any = raw.contains('+');
    if every && any {
        return Err("field scope mixes '.' and '+'");
    }

    let separator = if every { '.' } else { '+' };
    let fields: Vec<String> = raw.split(separator).map(String::from).collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err("empty field name in scope");
    }

    Ok(if every {
        FieldScope::AllOf(fields)
    } else {
        FieldScope::AnyOf(fields)
    })
}

fn scope(input: &str) -> IResult<&str, FieldScope> {
    alt((
        value(FieldScope::All, tag("*:")),
        map_res(
            terminated(
                take_while1(|c: char| is_field_char(c) || c == '.' || c == '+'),
                char(':'),
            ),
            field_scope,
        ),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, f32> {
    map_res(
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        |raw: &str| raw.parse::<f32>(),
    )
    .parse(input)
}

fn keyword_text(input: &str) -> IResult<&str, &str> {
    verify(take_while1(is_keyword_char), |word: &str| {
        word != "AND" && word != "OR"
    })
    .parse(input)
}

fn keyword_clause(input: &str) -> IResult<&str, Clause> {
    map(
        (
            opt(scope),
            keyword_text,
            opt(char('*')),
            opt(preceded(char('~'), opt(number))),
            opt(preceded(char('^'), number)),
        ),
        |(scope, term, star, fuzzy, boost)| {
            Clause::Keyword(KeywordClause {
                term: term.to_string(),
                scope: scope.unwrap_or(FieldScope::All),
                prefix: star.is_some(),
                fuzzy: fuzzy.is_some(),
                similarity: fuzzy.flatten(),
                boost,
            })
        },
    )
    .parse(input)
}

fn phrase_clause(input: &str) -> IResult<&str, Clause> {
    map(
        (
            opt(scope),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            opt(preceded(char('~'), map_res(digit1, |d: &str| d.parse::<u32>()))),
            opt(preceded(char('^'), number)),
        ),
        |(scope, text, slop, boost)| {
            Clause::Phrase(PhraseClause {
                text: text.to_string(),
                scope: scope.unwrap_or(FieldScope::All),
                slop: slop.unwrap_or(0),
                boost,
            })
        },
    )
    .parse(input)
}

fn match_all(input: &str) -> IResult<&str, Clause> {
    value(Clause::MatchAll, terminated(char('*'), not(char(':')))).parse(input)
}

fn clause(input: &str) -> IResult<&str, Clause> {
    alt((phrase_clause, keyword_clause, match_all)).parse(input)
}

fn connector(input: &str) -> IResult<&str, Option<BooleanOperator>> {
    alt((
        value(
            Some(BooleanOperator::And),
            delimited(multispace1, tag("AND"), multispace1),
        ),
        value(
            Some(BooleanOperator::Or),
            delimited(multispace1, tag("OR"), multispace1),
        ),
        value(None, multispace1),
    ))
    .parse(input)
}

type Expression = (Clause, Vec<(Option<BooleanOperator>, Clause)>);

fn expression(input: &str) -> IResult<&str, Expression> {
    all_consuming(delimited(
        multispace0,
        pair(clause, many0(pair(connector, clause))),
        multispace0,
    ))
    .parse(input)
}

fn filter_value(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        verify(
            take_while1(|c: char| !c.is_whitespace() && !matches!(c, '"' | '[' | ']')),
            |word: &str| word != "AND" && word != "OR" && word != "TO",
        ),
    ))
    .parse(input)
}

fn bound(input: &str) -> IResult<&str, Option<&str>> {
    alt((value(None, terminated(char('*'), not(filter_value))), map(filter_value, Some))).parse(input)
}

fn condition(input: &str) -> IResult<&str, FilterSpec> {
    let (input, field) = terminated(take_while1(is_field_char), char(':')).parse(input)?;
    alt((
        map(
            delimited(
                pair(char('['), multispace0),
                (bound, delimited(multispace1, tag("TO"), multispace1), bound),
                pair(multispace0, char(']')),
            ),
            |(start, _, end)| FilterSpec::range(field, start, end),
        ),
        map(filter_value, |v| FilterSpec::equals(field, v)),
    ))
    .parse(input)
}

type FilterExpression = (FilterSpec, Vec<(Option<BooleanOperator>, FilterSpec)>);

fn filter_expression(input: &str) -> IResult<&str, FilterExpression> {
    all_consuming(delimited(
        multispace0,
        pair(condition, many0(pair(connector, condition))),
        multispace0,
    ))
    .parse(input)
}
