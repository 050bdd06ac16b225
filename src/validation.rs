use std::fmt::{self, Display, Formatter};

/// Length of an ipinfo.io access token.
pub const TOKEN_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("no ipinfo.io token given (use -t or IPINFO_TOKEN)")]
    Empty,
    #[error("invalid token length {0}, expected {len} characters", len = TOKEN_LEN)]
    Length(usize),
}

#[derive(Debug, Clone)]
pub struct Token {
    token: String,
}

impl Token {
    pub fn new(token: String) -> Result<Self, TokenError> {
        let token = token.trim().to_string();
        match token.chars().count() {
            0 => Err(TokenError::Empty),
            TOKEN_LEN => Ok(Self { token }),
            len => Err(TokenError::Length(len)),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let hidden = self.token.chars().count().saturating_sub(4);
        let tail: String = self.token.chars().skip(hidden).collect();
        write!(f, "{}{}", "*".repeat(hidden), tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_token() {
        let token = Token::new(" abcdef12345678\n".to_string()).unwrap();
        assert_eq!(token.token(), "abcdef12345678");
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert_eq!(Token::new(String::new()).unwrap_err(), TokenError::Empty);
        assert_eq!(Token::new("   ".to_string()).unwrap_err(), TokenError::Empty);
        assert_eq!(
            Token::new("short".to_string()).unwrap_err(),
            TokenError::Length(5)
        );
    }

    #[test]
    fn test_display_masks_token() {
        let token = Token::new("abcdef12345678".to_string()).unwrap();
        assert_eq!(token.to_string(), "**********5678");
    }
}
