use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
};

/// Source of opaque, unguessable tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate_friendly_token(&self) -> String;
}

/// 15 random bytes from the thread RNG, URL-safe base64 without padding
/// (20 characters).
#[derive(Debug, Clone, Copy, Default)]
pub struct FriendlyTokenGenerator;

impl TokenGenerator for FriendlyTokenGenerator {
    fn generate_friendly_token(&self) -> String {
        let mut bytes = [0u8; 15];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Constant-time string comparison for token lookups.
pub(crate) fn tokens_match(given: &str, stored: &str) -> bool {
    if given.len() != stored.len() {
        return false;
    }
    given
        .bytes()
        .zip(stored.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn friendly_tokens_are_url_safe() {
        let token = FriendlyTokenGenerator.generate_friendly_token();
        assert_eq!(token.len(), 20);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn friendly_tokens_do_not_repeat() {
        let tokens: HashSet<_> = (0..256)
            .map(|_| FriendlyTokenGenerator.generate_friendly_token())
            .collect();
        assert_eq!(tokens.len(), 256);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(tokens_match("", ""));
    }
}
