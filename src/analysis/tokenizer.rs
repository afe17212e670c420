use unicode_segmentation::UnicodeSegmentation;
use crate::analysis::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Splits on Unicode word boundaries (UAX #29).
#[derive(Debug, Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut position = 0u32;

        text.unicode_word_indices()
            .filter_map(|(offset, word)| {
                // over-long tokens are skipped but still occupy a position
                let token = (word.len() <= self.max_token_length)
                    .then(|| Token::new(word, position, offset));
                position += 1;
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_byte_offsets_and_positions() {
        let tokens = StandardTokenizer::default().tokenize("Café, au lait!");
        let words: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["Café", "au", "lait"]);
        assert_eq!(tokens[1].offset, 7);
        assert_eq!(tokens[2].position, 2);
    }

    #[test]
    fn long_tokens_leave_a_gap() {
        let tokenizer = StandardTokenizer { max_token_length: 4 };
        let tokens = tokenizer.tokenize("tiny enormous word");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].position, 2);
    }
}
