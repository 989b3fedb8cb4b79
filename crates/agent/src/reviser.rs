//! Follow-up question rewriting

use ragchat_core::Language;
use ragchat_llm::{extract_tagged, LlmBackend, LlmError, PromptBuilder, PromptTemplates};

use crate::memory::Session;
use crate::AgentError;

const RESULT_TAG: &str = "result";

/// Outcome of one revision call
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    /// Standalone question
    pub question: String,
    /// True when the model output had no usable `<result>` block
    pub fell_back: bool,
    /// Length of the conversation window as rendered text
    pub history_chars: usize,
    pub history_tokens: usize,
}

impl Revision {
    /// Diagnostic line sent when debug output is enabled
    pub fn debug_message(&self) -> String {
        format!(
            "새로운 질문: {}\n * 대화이력({}자, {} Tokens)을 활용하였습니다.",
            self.question, self.history_chars, self.history_tokens
        )
    }
}

/// Rewrites a follow-up into a self-contained question
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryReviser;

impl QueryReviser {
    pub fn new() -> Self {
        Self
    }

    pub async fn revise(
        &self,
        session: &Session,
        raw_query: &str,
        model: &dyn LlmBackend,
    ) -> Result<Revision, AgentError> {
        let language = Language::detect(raw_query);
        let messages = PromptBuilder::new()
            .with_history(session.turns())
            .user_message(PromptTemplates::revision_request(language, raw_query))
            .build();

        let response = model.generate(&messages).await?;

        let (question, fell_back) = match extract_tagged(&response.text, RESULT_TAG) {
            Ok(question) => (question, false),
            Err(LlmError::MalformedOutput(reason)) => {
                tracing::warn!(
                    model = model.model_name(),
                    reason = %reason,
                    "Revision output malformed, using the original question"
                );
                (raw_query.to_string(), true)
            }
            Err(e) => return Err(e.into()),
        };

        let transcript = session.transcript();
        let history_tokens = if transcript.is_empty() {
            0
        } else {
            model.estimate_tokens(&transcript)
        };

        tracing::debug!(%question, fell_back, "Question revised");

        Ok(Revision {
            question,
            fell_back,
            history_chars: transcript.chars().count(),
            history_tokens,
        })
    }
}
