//! Uploaded document summaries

use ragchat_core::{DocumentStore, Language};
use ragchat_llm::{LlmBackend, PromptBuilder, PromptTemplates};

use crate::AgentError;

/// How an uploaded file is handled, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Rendered row by row as `column: value` lines
    Csv,
    /// pdf, txt, pptx or docx; the store holds the extracted text
    Extracted,
    /// Acknowledged without reading
    Unsupported,
}

impl DocumentKind {
    pub fn from_name(name: &str) -> Self {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match extension {
            "csv" => Self::Csv,
            "pdf" | "txt" | "pptx" | "docx" => Self::Extracted,
            _ => Self::Unsupported,
        }
    }
}

/// Split CSV text into records, honouring quoted fields
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => record.push(std::mem::take(&mut field)),
            '\n' if !quoted => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\r' if !quoted => {}
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    records
}

/// One `column: value` block per data row
pub fn csv_rows(text: &str) -> Vec<String> {
    let mut records = parse_csv(text).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };

    records
        .map(|record| {
            header
                .iter()
                .zip(record.iter())
                .map(|(column, value)| format!("{}: {}", column.trim(), value.trim()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSummarizer;

impl DocumentSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Reply to a document upload
    pub async fn summarize(
        &self,
        name: &str,
        store: &dyn DocumentStore,
        model: &dyn LlmBackend,
    ) -> Result<String, AgentError> {
        let text = match DocumentKind::from_name(name) {
            DocumentKind::Csv => csv_rows(&store.load_text(name).await?).join("\n"),
            DocumentKind::Extracted => store.load_text(name).await?,
            DocumentKind::Unsupported => return Ok(format!("uploaded file: {}", name)),
        };

        tracing::debug!(
            name,
            namespace = store.namespace(),
            chars = text.chars().count(),
            "Summarizing document"
        );
        self.summarize_text(&text, model).await
    }

    pub async fn summarize_text(
        &self,
        text: &str,
        model: &dyn LlmBackend,
    ) -> Result<String, AgentError> {
        let language = Language::detect(text);
        let messages = PromptBuilder::new()
            .system(PromptTemplates::summary_system(language))
            .user_message(PromptTemplates::summary_user(text))
            .build();

        Ok(model.generate(&messages).await?.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapStore(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl DocumentStore for MapStore {
        async fn load_text(&self, name: &str) -> ragchat_core::Result<String> {
            self.0
                .get(name)
                .map(|s| s.to_string())
                .ok_or_else(|| ragchat_core::Error::Document(name.to_string()))
        }

        fn namespace(&self) -> &str {
            "docs"
        }
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(DocumentKind::from_name("faq.csv"), DocumentKind::Csv);
        assert_eq!(DocumentKind::from_name("a.b.pdf"), DocumentKind::Extracted);
        assert_eq!(DocumentKind::from_name("deck.pptx"), DocumentKind::Extracted);
        assert_eq!(DocumentKind::from_name("photo.png"), DocumentKind::Unsupported);
        assert_eq!(DocumentKind::from_name("README"), DocumentKind::Unsupported);
    }

    #[test]
    fn test_csv_rows() {
        let text = "Category,Information\r\nrefund,\"Within 14 days, with receipt\"\n\nshipping, \"Free over \"\"50\"\"\"\n";
        assert_eq!(
            csv_rows(text),
            vec![
                "Category: refund\nInformation: Within 14 days, with receipt".to_string(),
                "Category: shipping\nInformation: Free over \"50\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_csv_multiline_field() {
        let rows = csv_rows("q,a\nhow?,\"line one\nline two\"");
        assert_eq!(rows, vec!["q: how?\na: line one\nline two".to_string()]);
        assert!(csv_rows("").is_empty());
    }

    #[tokio::test]
    async fn test_summarize_dispatch() {
        let store = MapStore(HashMap::from([
            ("notes.txt", "Rust is a systems language."),
            ("faq.csv", "q,a\nrefund?,yes"),
        ]));
        let model = ScriptedModel::new(vec!["A summary."]);
        let summarizer = DocumentSummarizer::new();

        let reply = summarizer.summarize("notes.txt", &store, &model).await.unwrap();
        assert_eq!(reply, "A summary.");
        assert_eq!(
            model.last_prompt()[1].content,
            "<article>Rust is a systems language.</article>"
        );

        summarizer.summarize("faq.csv", &store, &model).await.unwrap();
        assert_eq!(model.last_prompt()[1].content, "<article>q: refund?\na: yes</article>");

        let reply = summarizer.summarize("image.png", &store, &model).await.unwrap();
        assert_eq!(reply, "uploaded file: image.png");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_errors() {
        let store = MapStore(HashMap::new());
        let result = DocumentSummarizer::new()
            .summarize("gone.pdf", &store, &ScriptedModel::new(vec!["x"]))
            .await;
        assert!(matches!(result, Err(AgentError::Document(_))));
    }
}
