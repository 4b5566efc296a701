//! Language codes as exchanged with the translation gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The language the semantic anchor is expressed in.
pub const ANCHOR_LANGUAGE: &str = "en";

/// A normalized language code.
///
/// Normalization trims whitespace, lowercases and drops any region or
/// script subtag, so `"hi-IN"`, `" HI "` and `"hi_in"` all compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let primary = trimmed
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self(primary)
    }

    /// English, the language of the semantic anchor.
    pub fn anchor() -> Self {
        Self(ANCHOR_LANGUAGE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anchor(&self) -> bool {
        self.0 == ANCHOR_LANGUAGE
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same language after normalization.
    pub fn matches(&self, other: &LanguageCode) -> bool {
        self.0 == other.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LanguageCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for LanguageCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<LanguageCode> for String {
    fn from(value: LanguageCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_region_and_case() {
        assert_eq!(LanguageCode::new("hi-IN"), LanguageCode::new("hi"));
        assert_eq!(LanguageCode::new(" HI "), LanguageCode::new("hi"));
        assert_eq!(LanguageCode::new("pt_BR").as_str(), "pt");
    }

    #[test]
    fn test_anchor_detection() {
        assert!(LanguageCode::new("en-US").is_anchor());
        assert!(!LanguageCode::new("ta").is_anchor());
    }

    #[test]
    fn test_serde_normalizes_on_read() {
        let code: LanguageCode = serde_json::from_str("\"Te-IN\"").unwrap();
        assert_eq!(code.as_str(), "te");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"te\"");
    }
}
