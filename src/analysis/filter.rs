use crate::analysis::token::Token;

/// One step of an analysis chain. Filters edit the token stream in place;
/// positions are never renumbered.
pub trait TokenFilter: Send + Sync {
    fn apply(&self, tokens: &mut Vec<Token>);

    fn name(&self) -> &str;

    /// True for filters that turn a term into another surface form. Those are
    /// skipped for prefix keywords.
    fn rewrites_terms(&self) -> bool {
        false
    }
}
