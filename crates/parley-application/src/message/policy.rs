//! Outgoing message content rules.
//!
//! Messages must be non-empty, within the length limit, and free of contact
//! details that would let the parties move off-platform.

use once_cell::sync::Lazy;
use parley_core::ValidationError;
use regex::Regex;

/// Contact-detail patterns, checked in order; the first hit is reported.
static RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("email", r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}"),
        // Seven or more digits, optionally separated by spaces, dots or dashes.
        ("phone", r"\+?\d(?:[\s.\-()]*\d){6,}"),
        (
            "url",
            // Bare domains only in lower case, so "Hi.Me too" is not a link.
            r"(?i:\b(?:https?://|www\.)\S+)|\b[a-z0-9\-]+\.(?:com|net|org|io|in|me|co)\b",
        ),
        (
            "social_handle",
            r"(?i)\b(?:whatsapp|telegram|insta(?:gram)?|snapchat|signal\s+me)\b|(?:^|\s)@[A-Za-z0-9_.]{3,}",
        ),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| match Regex::new(pattern) {
        Ok(re) => Some((name, re)),
        Err(e) => {
            tracing::error!("[Pipeline] Contact rule {} does not compile: {}", name, e);
            None
        }
    })
    .collect()
});

#[derive(Debug, Clone, Copy)]
pub struct ContentPolicy {
    max_chars: usize,
}

impl ContentPolicy {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Returns the trimmed text if it may be sent.
    pub fn validate<'a>(&self, text: &'a str) -> Result<&'a str, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let length = trimmed.chars().count();
        if length > self.max_chars {
            return Err(ValidationError::TooLong {
                length,
                max: self.max_chars,
            });
        }

        if let Some((name, _)) = RULES.iter().find(|(_, re)| re.is_match(trimmed)) {
            return Err(ValidationError::ContactInfo {
                pattern: (*name).to_string(),
            });
        }
        Ok(trimmed)
    }
}
