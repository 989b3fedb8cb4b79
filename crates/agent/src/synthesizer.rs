//! Answer synthesis with streamed partial output
//!
//! The model streams chunks into an mpsc channel while a relay task forwards
//! the cumulative text to the client as `proceeding` messages. Both halves
//! run under one `tokio::join!`; when the relay fails to deliver, it drops
//! the receiver and the model stream stops at its next chunk.

use ragchat_core::{Language, MessageSink, OutboundMessage};
use ragchat_llm::{LlmBackend, Message, PromptBuilder, PromptTemplates};
use tokio::sync::mpsc;

use crate::memory::Session;
use crate::AgentError;

const STREAM_BUFFER: usize = 32;

/// What the answer is grounded on
#[derive(Debug, Clone, Copy)]
pub enum SynthesisMode<'a> {
    /// Persona instruction plus the conversation window
    Conversational { session: &'a Session },
    /// Retrieved excerpts only; the question is already standalone
    Grounded { context: &'a str },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerSynthesizer;

impl AnswerSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Prompt for `query` in `mode`
    pub fn prompt(&self, mode: SynthesisMode<'_>, query: &str) -> Vec<Message> {
        let language = Language::detect(query);
        match mode {
            SynthesisMode::Conversational { session } => PromptBuilder::new()
                .system(PromptTemplates::conversation_system(language))
                .with_history(session.turns())
                .user_message(query)
                .build(),
            SynthesisMode::Grounded { context } => PromptBuilder::new()
                .system(PromptTemplates::grounded_system(language, context))
                .user_message(query)
                .build(),
        }
    }

    /// Generate the answer, streaming cumulative partials to `sink`
    pub async fn answer(
        &self,
        mode: SynthesisMode<'_>,
        query: &str,
        model: &dyn LlmBackend,
        sink: &dyn MessageSink,
        request_id: &str,
    ) -> Result<String, AgentError> {
        let messages = self.prompt(mode, query);
        let (tx, mut rx) = mpsc::channel::<String>(STREAM_BUFFER);

        let generation = model.generate_stream(&messages, tx);
        let relay = async move {
            let mut partial = String::new();
            while let Some(chunk) = rx.recv().await {
                partial.push_str(&chunk);
                sink.send(OutboundMessage::proceeding(request_id, partial.clone()))
                    .await?;
            }
            Ok::<usize, AgentError>(partial.len())
        };

        let (generated, relayed) = tokio::join!(generation, relay);
        relayed?;
        let result = generated?;

        tracing::debug!(
            model = model.model_name(),
            chunks = result.tokens,
            ttft_ms = result.time_to_first_token_ms,
            total_ms = result.total_time_ms,
            "Answer generated"
        );
        Ok(result.text)
    }
}
