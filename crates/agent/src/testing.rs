//! Test doubles shared by the unit tests of this crate

use async_trait::async_trait;
use parking_lot::Mutex;
use ragchat_llm::{FinishReason, GenerationResult, LlmBackend, LlmError, Message};
use tokio::sync::mpsc;

/// Replays canned responses in order, repeating the last one
pub struct ScriptedModel {
    responses: Vec<String>,
    calls: Mutex<usize>,
    prompts: Mutex<Vec<Vec<Message>>>,
    fail: bool,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: responses.into_iter().map(str::to_string).collect(),
            calls: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn last_prompt(&self) -> Vec<Message> {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    fn next(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.prompts.lock().push(messages.to_vec());
        let mut calls = self.calls.lock();
        *calls += 1;
        if self.fail {
            return Err(LlmError::Api("scripted failure".to_string()));
        }
        let index = (*calls - 1).min(self.responses.len().saturating_sub(1));
        Ok(self.responses.get(index).cloned().unwrap_or_default())
    }
}

fn result(text: String, tokens: usize) -> GenerationResult {
    GenerationResult {
        text,
        tokens,
        time_to_first_token_ms: 0,
        total_time_ms: 0,
        finish_reason: FinishReason::Stop,
    }
}

#[async_trait]
impl LlmBackend for ScriptedModel {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let text = self.next(messages)?;
        Ok(result(text, 1))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let text = self.next(messages)?;
        let chunks: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
        for chunk in &chunks {
            if tx.send(chunk.clone()).await.is_err() {
                break;
            }
        }
        Ok(result(text, chunks.len()))
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
