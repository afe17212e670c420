use crate::index::inverted::InvertedIndex;
use crate::index::posting::PostingList;

/// An indexed term a keyword expanded to.
#[derive(Debug, Clone, Copy)]
pub struct TermMatch<'a> {
    pub term: &'a str,
    pub list: &'a PostingList,
    pub edits: u8,
    pub completion: bool,  // the term extends the keyword rather than equalling it
}

/// The keyword itself, when indexed.
pub fn expand_exact<'a>(index: &'a InvertedIndex, term: &'a str) -> Vec<TermMatch<'a>> {
    index
        .posting_list(term)
        .map(|list| TermMatch {
            term,
            list,
            edits: 0,
            completion: false,
        })
        .into_iter()
        .collect()
}

/// Every indexed term starting with `prefix`, at most `limit` of them,
/// in lexicographic order.
pub fn expand_prefix<'a>(index: &'a InvertedIndex, prefix: &'a str, limit: usize) -> Vec<TermMatch<'a>> {
    if prefix.is_empty() {
        return Vec::new();
    }

    index
        .terms_with_prefix(prefix)
        .take(limit)
        .map(|(term, list)| TermMatch {
            term,
            list,
            edits: 0,
            completion: term.len() > prefix.len(),
        })
        .collect()
}
