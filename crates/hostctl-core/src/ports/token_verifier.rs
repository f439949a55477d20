//! Authentication port.
//!
//! Session and token mechanics live outside this workspace; adapters only
//! ask whether a presented token is acceptable.

/// Decides whether a bearer token grants access.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Accepts exactly one configured token.
#[derive(Clone)]
pub struct StaticTokenVerifier {
    token: String,
}

impl StaticTokenVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> bool {
        // Length is not secret; contents are compared without early exit.
        let expected = self.token.as_bytes();
        let given = token.as_bytes();
        if expected.is_empty() || expected.len() != given.len() {
            return false;
        }
        expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_configured_token() {
        let verifier = StaticTokenVerifier::new("s3cret");
        assert!(verifier.verify("s3cret"));
        assert!(!verifier.verify("s3cres"));
        assert!(!verifier.verify("s3cret2"));
        assert!(!verifier.verify(""));
    }

    #[test]
    fn empty_configured_token_rejects_everything() {
        assert!(!StaticTokenVerifier::new("").verify(""));
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", StaticTokenVerifier::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
