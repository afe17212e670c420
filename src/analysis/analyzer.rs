use std::sync::Arc;
use rust_stemmers::Algorithm;
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::schema::schema::AnalyzerKind;

/// Text analysis pipeline: one tokenizer followed by filters in order.
/// Cloning shares the tokenizer and filters.
#[derive(Clone)]
pub struct Analyzer {
    tokenizer: Arc<dyn Tokenizer>,
    filters: Vec<Arc<dyn TokenFilter>>,
    name: String,
}

impl Analyzer {
    pub fn new(name: &str, tokenizer: impl Tokenizer + 'static) -> Self {
        Analyzer {
            tokenizer: Arc::new(tokenizer),
            filters: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn add_filter(mut self, filter: impl TokenFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            filter.apply(&mut tokens);
        }
        tokens
    }

    /// Analysis for a keyword that will be expanded as a prefix: the partial
    /// word must not be stemmed into something that is no longer its prefix.
    pub fn analyze_prefix(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in self.filters.iter().filter(|f| !f.rewrites_terms()) {
            filter.apply(&mut tokens);
        }
        tokens
    }

    pub fn for_kind(kind: AnalyzerKind) -> Self {
        match kind {
            AnalyzerKind::Standard => Analyzer::standard(),
            AnalyzerKind::StopWords => Analyzer::standard()
                .add_filter(StopWordFilter::english()),
            AnalyzerKind::English => Analyzer::english(),
        }
    }

    pub fn standard() -> Self {
        Analyzer::new("standard", StandardTokenizer::default())
            .add_filter(LowercaseFilter)
    }

    pub fn english() -> Self {
        Analyzer::new("english", StandardTokenizer::default())
            .add_filter(LowercaseFilter)
            .add_filter(StopWordFilter::english())
            .add_filter(StemmerFilter::new(Algorithm::English))
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filters: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("tokenizer", &self.tokenizer.name())
            .field("filters", &filters)
            .finish()
    }
}
