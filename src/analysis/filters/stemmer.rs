use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::{Token, TokenType};

/// Snowball stemming of word tokens. Numbers pass through.
pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter {
            stemmer: Stemmer::create(algorithm),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn apply(&self, tokens: &mut Vec<Token>) {
        for token in tokens.iter_mut().filter(|t| t.token_type == TokenType::Word) {
            let stemmed = self.stemmer.stem(&token.text);
            if stemmed != token.text.as_str() {
                token.text = stemmed.into_owned();
            }
        }
    }

    fn name(&self) -> &str {
        "stemmer"
    }

    fn rewrites_terms(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_words_and_leaves_numbers() {
        let mut tokens = vec![Token::new("running", 0, 0), Token::new("1984", 1, 8)];
        StemmerFilter::new(Algorithm::English).apply(&mut tokens);
        assert_eq!(tokens[0].text, "run");
        assert_eq!(tokens[1].text, "1984");
    }
}
