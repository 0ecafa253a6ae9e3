//! Version token for optimistic concurrency on the authoritative snapshot.

use serde::{Deserialize, Serialize};

/// Monotonic version of a destination's draft state.
///
/// The store bumps it by one on every successful mutation. Only equality
/// matters to callers: a checked write is rejected when the token it was
/// computed against is no longer current.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Version of a destination that was never written.
    pub const INITIAL: VersionToken = VersionToken(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (silent autosave).
    Any,
    /// Require the stored state to be at an exact version.
    Exact(VersionToken),
}

impl ExpectedVersion {
    pub fn from_option(token: Option<VersionToken>) -> Self {
        match token {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Any,
        }
    }

    pub fn matches(self, actual: VersionToken) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(VersionToken::INITIAL));
        assert!(ExpectedVersion::Any.matches(VersionToken::new(42)));
    }

    #[test]
    fn exact_rejects_stale_token() {
        let expected = ExpectedVersion::from_option(Some(VersionToken::new(3)));
        assert_eq!(expected, ExpectedVersion::Exact(VersionToken::new(3)));
        assert!(expected.matches(VersionToken::new(3)));
        assert!(!expected.matches(VersionToken::new(4)));
        assert_eq!(ExpectedVersion::from_option(None), ExpectedVersion::Any);
    }

    #[test]
    fn token_serializes_as_bare_number() {
        let json = serde_json::to_string(&VersionToken::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
