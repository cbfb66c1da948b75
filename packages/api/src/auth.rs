//! Stream access tokens.

use std::collections::HashSet;

/// Decides whether an access token may open a live stream.
///
/// Token issuance lives elsewhere; this only checks a token that was
/// already handed to the client.
pub trait TokenValidator: Send + Sync + 'static {
    fn validate(&self, token: &str) -> bool;
}

/// Accepts a fixed set of tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashSet<String>,
}

impl StaticTokenValidator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_tokens() {
        let validator = StaticTokenValidator::new(["alpha", "", "beta"]);
        assert!(validator.validate("alpha"));
        assert!(validator.validate("beta"));
        assert!(!validator.validate(""));
        assert!(!validator.validate("gamma"));
        assert!(StaticTokenValidator::default().is_empty());
    }
}
