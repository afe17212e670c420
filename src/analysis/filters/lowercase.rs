use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn apply(&self, tokens: &mut Vec<Token>) {
        for token in tokens.iter_mut().filter(|t| t.text.chars().any(char::is_uppercase)) {
            token.text = token.text.to_lowercase();
        }
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_unicode_case() {
        let mut tokens = vec![Token::new("ÉCOLE", 0, 0), Token::new("déjà", 1, 7)];
        LowercaseFilter.apply(&mut tokens);
        assert_eq!(tokens[0].text, "école");
        assert_eq!(tokens[1].text, "déjà");
    }
}
