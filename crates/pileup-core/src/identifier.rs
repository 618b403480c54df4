//! Case-normalized station identifiers (callsigns).
//!
//! Every identifier entering the client is trimmed and upper-cased, so the
//! normalized string doubles as the dedup key for queue reconciliation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// ITU amateur-radio callsign formats:
/// 1-2 letters + 1-2 digits + 1-4 letters (`W1AW`, `EI0IRTS`), or the UK
/// numeric-prefix form digit + letter + digit + 1-3 letters (`2E0JFS`).
static CALLSIGN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,2}[0-9]{1,2}[A-Z]{1,4}|[0-9][A-Z][0-9][A-Z]{1,3})$")
        .unwrap_or_else(|e| panic!("callsign pattern must compile: {e}"))
});

/// A normalized station identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Normalize raw user or wire input (trim, upper-case).
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// The normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether normalization left nothing behind.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the identifier is a well-formed ITU callsign.
    pub fn is_valid_callsign(&self) -> bool {
        CALLSIGN_PATTERN.is_match(&self.0)
    }
}

impl From<String> for Identifier {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let id = Identifier::normalize("  k1abc \n");
        assert_eq!(id.as_str(), "K1ABC");
        assert_eq!(id, Identifier::from("K1ABC"));
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(Identifier::normalize("   ").is_empty());
    }

    #[test]
    fn deserialize_normalizes() {
        let id: Identifier = serde_json::from_str(r#"" w1aw ""#).unwrap();
        assert_eq!(id.as_str(), "W1AW");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""W1AW""#);
    }

    #[test]
    fn accepts_itu_formats() {
        for call in ["KC1ABC", "W1AW", "EI0IRTS", "2E0JFS", "VK2ABC", "G4A"] {
            assert!(Identifier::from(call).is_valid_callsign(), "{call} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_callsigns() {
        for call in ["", "ABC", "123", "K1ABCDE", "K1-ABC", "KKK1ABC", "K/1ABC"] {
            assert!(!Identifier::from(call).is_valid_callsign(), "{call} should be invalid");
        }
    }

    #[test]
    fn lowercase_input_validates_after_normalizing() {
        assert!(Identifier::normalize("2e0jfs").is_valid_callsign());
    }
}
