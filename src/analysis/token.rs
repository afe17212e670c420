use serde::{Deserialize, Serialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub position: u32,     // word position within the analyzed value, gaps kept
    pub offset: usize,     // byte offset in the original text
    pub length: usize,     // byte length in the original text
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Word,
    Number,
}

impl Token {
    pub fn new(text: &str, position: u32, offset: usize) -> Self {
        let token_type = if text.chars().all(|c| c.is_numeric() || c == '.' || c == ',') {
            TokenType::Number
        } else {
            TokenType::Word
        };
        Token {
            text: text.to_string(),
            position,
            offset,
            length: text.len(),
            token_type,
        }
    }
}
