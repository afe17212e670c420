use crate::core::config::ScorerKind;

/// Statistics of one term inside one attribute of one record.
#[derive(Debug, Clone, Copy)]
pub struct TermStats {
    pub term_freq: u32,
    pub field_length: u32,      // tokens in the attribute
    pub avg_field_length: f32,  // average over records holding the attribute
    pub doc_freq: u32,          // records holding the term
    pub total_docs: usize,
}

/// Scorer trait
pub trait Scorer: Send + Sync {
    fn score(&self, stats: &TermStats) -> f32;

    fn name(&self) -> &str;
}

pub fn scorer_for(kind: ScorerKind) -> Box<dyn Scorer> {
    match kind {
        ScorerKind::Bm25 => Box::new(BM25Scorer::default()),
        ScorerKind::TfIdf => Box::new(TfIdfScorer::new(true)),
    }
}

/// TF-IDF Scorer
pub struct TfIdfScorer {
    pub normalize: bool,
}

impl TfIdfScorer {
    pub fn new(normalize: bool) -> Self {
        TfIdfScorer { normalize }
    }

    /// Smoothed so a term present in every record still scores above zero.
    pub fn idf(doc_freq: u32, total_docs: usize) -> f32 {
        ((total_docs as f32 + 1.0) / (doc_freq as f32 + 1.0)).ln() + 1.0
    }
}

impl Scorer for TfIdfScorer {
    fn score(&self, stats: &TermStats) -> f32 {
        let tf = if self.normalize && stats.field_length > 0 {
            stats.term_freq as f32 / stats.field_length as f32
        } else {
            stats.term_freq as f32
        };

        tf * Self::idf(stats.doc_freq, stats.total_docs)
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

/// BM25 Scorer
pub struct BM25Scorer {
    pub k1: f32,  // term frequency saturation
    pub b: f32,   // length normalization strength
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl BM25Scorer {
    pub fn idf(doc_freq: u32, total_docs: usize) -> f32 {
        let n = total_docs as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

impl Scorer for BM25Scorer {
    fn score(&self, stats: &TermStats) -> f32 {
        let tf = stats.term_freq as f32;
        let length_ratio = if stats.avg_field_length > 0.0 {
            stats.field_length as f32 / stats.avg_field_length
        } else {
            1.0
        };

        let numerator = Self::idf(stats.doc_freq, stats.total_docs) * tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * length_ratio);

        numerator / denominator
    }

    fn name(&self) -> &str {
        "bm25"
    }
}
