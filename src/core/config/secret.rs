use std::fmt;

/// Bearer credential for the exam backend. Never printed in logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct BearerToken(String);

impl BearerToken {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("BearerToken(<empty>)")
        } else {
            f.write_str("BearerToken(<redacted>)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_token() {
        let token = BearerToken::new("eyJhbGciOiJIUzI1NiJ9.payload.sig");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("payload"));
        assert_eq!(rendered, "BearerToken(<redacted>)");
        assert_eq!(token.expose(), "eyJhbGciOiJIUzI1NiJ9.payload.sig");
    }
}
