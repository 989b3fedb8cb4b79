//! Language detection
//!
//! Prompt wording throughout the pipeline is chosen by one binary decision:
//! text containing any Hangul jamo or syllable is Korean, anything else is
//! treated as English.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Hangul compatibility jamo (U+3131..U+3163) and syllables (U+AC00..U+D7A3)
static HANGUL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{3131}-\x{3163}\x{AC00}-\x{D7A3}]").expect("valid hangul pattern"));

/// Returns true if `text` contains at least one Hangul codepoint
pub fn is_korean(text: &str) -> bool {
    HANGUL.is_match(text)
}

/// Number of Hangul codepoints in `text`
pub fn hangul_count(text: &str) -> usize {
    HANGUL.find_iter(text).count()
}

/// Prompt language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    #[default]
    English,
}

impl Language {
    /// Classify text with the shared Hangul predicate
    pub fn detect(text: &str) -> Self {
        if is_korean(text) {
            Self::Korean
        } else {
            Self::English
        }
    }

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Korean => "ko",
            Self::English => "en",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hangul_syllable_is_korean() {
        assert!(is_korean("환불 정책이 뭐야?"));
        assert!(is_korean("what does 안 mean"));
        assert_eq!(Language::detect("가"), Language::Korean);
    }

    #[test]
    fn test_jamo_is_korean() {
        assert!(is_korean("ㅋㅋ"));
        assert!(is_korean("\u{3163}"));
    }

    #[test]
    fn test_ascii_is_english() {
        assert!(!is_korean("What is the refund policy?"));
        assert_eq!(Language::detect("plain ascii"), Language::English);
        assert_eq!(Language::detect(""), Language::English);
    }

    #[test]
    fn test_range_edges() {
        assert!(is_korean("\u{AC00}"));
        assert!(is_korean("\u{D7A3}"));
        assert!(!is_korean("\u{D7A4}"));
        assert!(!is_korean("\u{3130}"));
        assert!(!is_korean("日本語"));
    }

    #[test]
    fn test_hangul_count() {
        assert_eq!(hangul_count("환불 policy ㅋ"), 3);
        assert_eq!(hangul_count("refund"), 0);
    }
}
