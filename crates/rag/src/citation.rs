//! Reference block rendering
//!
//! Kept documents become a numbered list appended to the answer. Each line
//! names the backend and the assessed score; the link style depends on the
//! document's origin.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::document::{DocumentOrigin, IndexHit, RankedDocument};

const BLOCK_PREFIX: &str = "\n\nFrom\n";

/// Percent-encode everything outside the unreserved set and `/`
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}

/// Renders kept documents as a reference block
///
/// Holds the process-wide reference switch; when it is off every block is
/// empty.
#[derive(Debug)]
pub struct CitationFormatter {
    base_uri: String,
    enabled: AtomicBool,
}

impl CitationFormatter {
    pub fn new(base_uri: impl Into<String>, enabled: bool) -> Self {
        Self {
            base_uri: base_uri.into(),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Numbered reference block, or the empty string
    pub fn format(&self, documents: &[RankedDocument]) -> String {
        if documents.is_empty() || !self.is_enabled() {
            return String::new();
        }

        let mut block = String::from(BLOCK_PREFIX);
        for (i, document) in documents.iter().enumerate() {
            block.push_str(&self.format_line(i + 1, document));
            block.push('\n');
        }
        block
    }

    fn format_line(&self, number: usize, ranked: &RankedDocument) -> String {
        let doc = &ranked.document;
        let suffix = format!("{} ({})", ranked.backend_id(), ranked.assessed_score);

        match doc.origin {
            DocumentOrigin::ManagedIndex(IndexHit::Retrieved) => format!(
                "{}. <a href={} target=_blank>{}</a>, {}",
                number, doc.uri, doc.title, suffix
            ),
            DocumentOrigin::ManagedIndex(IndexHit::Faq) => format!(
                "{}. <a href=\"#\" onClick=\"alert(`{}`)\">FAQ ({})</a>, {}",
                number,
                doc.excerpt.replace('"', " "),
                doc.confidence,
                suffix
            ),
            DocumentOrigin::ManagedIndex(IndexHit::Excerpt) => {
                let uri = if doc.title.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", self.base_uri, quote(&doc.title))
                };
                match doc.page {
                    Some(page) => format!(
                        "{}. {}page in <a href={} target=_blank>{}({})</a>, {}",
                        number, page, uri, doc.title, doc.confidence, suffix
                    ),
                    None => format!(
                        "{}. <a href={} target=_blank>{} ({})</a>, {}",
                        number, uri, doc.title, doc.confidence, suffix
                    ),
                }
            }
            DocumentOrigin::Faiss | DocumentOrigin::Opensearch => match doc.page {
                Some(page) => format!(
                    "{}. {}page in <a href={} target=_blank>{}</a>, {}",
                    number, page, doc.uri, doc.title, suffix
                ),
                None => format!(
                    "{}. <a href={} target=_blank>{}</a>, {}",
                    number, doc.uri, doc.title, suffix
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Confidence, RetrievedDocument};
    use ragchat_config::ConfidenceLevel;

    fn ranked(origin: DocumentOrigin, title: &str, page: Option<u32>, score: i64) -> RankedDocument {
        RankedDocument {
            document: RetrievedDocument {
                origin,
                title: title.to_string(),
                excerpt: "Q: \"refund\"? A: yes".to_string(),
                uri: "https://docs.example.com/a.pdf".to_string(),
                page,
                confidence: Confidence::Tier(ConfidenceLevel::High),
                ordinal: 0,
                assessed_score: None,
            },
            assessed_score: score,
            retained: true,
        }
    }

    #[test]
    fn test_empty_and_disabled() {
        let formatter = CitationFormatter::new("", true);
        assert_eq!(formatter.format(&[]), "");

        formatter.set_enabled(false);
        let docs = vec![ranked(DocumentOrigin::Faiss, "a.pdf", None, 10)];
        assert_eq!(formatter.format(&docs), "");
        assert!(!formatter.is_enabled());
    }

    #[test]
    fn test_vector_lines() {
        let formatter = CitationFormatter::new("", true);
        let docs = vec![
            ranked(DocumentOrigin::Faiss, "a.pdf", Some(3), 42),
            ranked(DocumentOrigin::Opensearch, "b.pdf", None, 7),
        ];
        assert_eq!(
            formatter.format(&docs),
            "\n\nFrom\n\
             1. 3page in <a href=https://docs.example.com/a.pdf target=_blank>a.pdf</a>, faiss (42)\n\
             2. <a href=https://docs.example.com/a.pdf target=_blank>b.pdf</a>, opensearch (7)\n"
        );
    }

    #[test]
    fn test_managed_index_lines() {
        let formatter = CitationFormatter::new("https://cdn.example.com/docs/", true);
        let docs = vec![
            ranked(DocumentOrigin::ManagedIndex(IndexHit::Retrieved), "a.pdf", None, 120),
            ranked(DocumentOrigin::ManagedIndex(IndexHit::Faq), "faq", None, 30),
            ranked(DocumentOrigin::ManagedIndex(IndexHit::Excerpt), "환불 안내.pdf", Some(2), 88),
            ranked(DocumentOrigin::ManagedIndex(IndexHit::Excerpt), "plain.txt", None, 90),
        ];
        let block = formatter.format(&docs);
        let lines: Vec<&str> = block.lines().collect();

        assert_eq!(lines[2], "From");
        assert_eq!(
            lines[3],
            "1. <a href=https://docs.example.com/a.pdf target=_blank>a.pdf</a>, kendra (120)"
        );
        assert_eq!(
            lines[4],
            "2. <a href=\"#\" onClick=\"alert(`Q:  refund ? A: yes`)\">FAQ (HIGH)</a>, kendra (30)"
        );
        assert_eq!(
            lines[5],
            "3. 2page in <a href=https://cdn.example.com/docs/%ED%99%98%EB%B6%88%20%EC%95%88%EB%82%B4.pdf target=_blank>환불 안내.pdf(HIGH)</a>, kendra (88)"
        );
        assert_eq!(
            lines[6],
            "4. <a href=https://cdn.example.com/docs/plain.txt target=_blank>plain.txt (HIGH)</a>, kendra (90)"
        );
    }

    #[test]
    fn test_output_is_stable() {
        let formatter = CitationFormatter::new("", true);
        let docs = vec![ranked(DocumentOrigin::Faiss, "a.pdf", None, 1)];
        assert_eq!(formatter.format(&docs), formatter.format(&docs));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a b/c.pdf"), "a%20b/c.pdf");
        assert_eq!(quote("x&y"), "x%26y");
    }
}
