//! Per-request orchestration
//!
//! ```text
//! text, command   -> switch / reset / listing          -> reply
//! text, normal    -> window + question                 -> AnswerSynthesizer
//! text, qa        -> QueryReviser -> RetrieverFanout -> Reranker
//!                    -> AnswerSynthesizer (grounded) -> CitationFormatter
//! document        -> DocumentSummarizer
//! ```
//!
//! Every completed request is written to the conversation log, answered
//! with a `completed` message and then advances the model rotation. Any
//! failure is reported with one `error` message and returned to the caller;
//! the rotation stays where it was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragchat_config::{BackendKind, Settings};
use ragchat_core::{
    ConversationType, DocumentStore, HistoryEntry, HistoryStore, InteractionType, MessageSink,
    ModelProfile, OutboundMessage, RequestContext, Turn,
};
use ragchat_llm::{LlmBackend, ModelRouter};
use ragchat_rag::{context_from, CitationFormatter, Reranker, RetrieverFanout};

use crate::clients::ModelClients;
use crate::commands::{model_listing, Command};
use crate::memory::{ConversationMemory, Session};
use crate::reviser::QueryReviser;
use crate::summarizer::DocumentSummarizer;
use crate::synthesizer::{AnswerSynthesizer, SynthesisMode};
use crate::AgentError;

const AVAILABILITY_PROBE: Duration = Duration::from_secs(2);

/// Final output of one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub answer: String,
    /// Citation block, empty when nothing was kept or references are off
    pub reference: String,
}

impl Reply {
    fn plain(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            reference: String::new(),
        }
    }

    /// Text sent to the client and written to the log
    pub fn message(&self) -> String {
        format!("{}{}", self.answer, self.reference)
    }
}

pub struct RequestHandler {
    router: Arc<ModelRouter>,
    memory: ConversationMemory,
    clients: Arc<dyn ModelClients>,
    fanout: RetrieverFanout,
    reranker: Reranker,
    citations: CitationFormatter,
    reviser: QueryReviser,
    synthesizer: AnswerSynthesizer,
    summarizer: DocumentSummarizer,
    history: Arc<dyn HistoryStore>,
    documents: Arc<dyn DocumentStore>,
    debug: AtomicBool,
    top_k: usize,
    capabilities: Vec<BackendKind>,
}

impl RequestHandler {
    pub fn new(
        settings: &Settings,
        router: Arc<ModelRouter>,
        clients: Arc<dyn ModelClients>,
        fanout: RetrieverFanout,
        history: Arc<dyn HistoryStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        let rag = &settings.rag;
        Self {
            router,
            memory: ConversationMemory::new(settings.memory.clone(), history.clone()),
            clients,
            fanout,
            reranker: Reranker::from_config(rag),
            citations: CitationFormatter::new(&rag.citation_base_uri, rag.reference_enabled),
            reviser: QueryReviser::new(),
            synthesizer: AnswerSynthesizer::new(),
            summarizer: DocumentSummarizer::new(),
            history,
            documents,
            debug: AtomicBool::new(rag.debug_enabled),
            top_k: rag.top_k,
            capabilities: rag.capabilities.clone(),
        }
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn fanout(&self) -> &RetrieverFanout {
        &self.fanout
    }

    pub fn history_store_name(&self) -> &str {
        self.history.name()
    }

    /// Probe the endpoint serving `profile`
    pub async fn model_available(&self, profile: &ModelProfile) -> bool {
        match self.clients.chat(profile) {
            Ok(model) => tokio::time::timeout(AVAILABILITY_PROBE, model.is_available())
                .await
                .unwrap_or(false),
            Err(e) => {
                tracing::warn!(model = %profile, error = %e, "No client for model");
                false
            }
        }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn reference_enabled(&self) -> bool {
        self.citations.is_enabled()
    }

    /// Run one request to completion
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        body: &str,
        sink: &dyn MessageSink,
    ) -> Result<Reply, AgentError> {
        let start = Instant::now();
        metrics::counter!("ragchat_requests_total", "conv_type" => ctx.conversation.as_str())
            .increment(1);

        let outcome = match self.process(ctx, body, sink).await {
            Ok(reply) => sink
                .send(OutboundMessage::completed(&ctx.request_id, reply.message()))
                .await
                .map(|_| reply)
                .map_err(AgentError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(reply) => {
                let next = self.router.advance();
                metrics::histogram!("ragchat_request_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    request_id = %ctx.request_id,
                    user_id = %ctx.user_id,
                    next_model = next,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request completed"
                );
                Ok(reply)
            }
            Err(e) => {
                metrics::counter!("ragchat_request_errors_total").increment(1);
                tracing::error!(
                    request_id = %ctx.request_id,
                    user_id = %ctx.user_id,
                    error = %e,
                    "Request failed"
                );
                if let Err(send_err) = sink
                    .send(OutboundMessage::error(&ctx.request_id, e.to_string()))
                    .await
                {
                    tracing::warn!(error = %send_err, "Could not deliver error message");
                }
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        body: &str,
        sink: &dyn MessageSink,
    ) -> Result<Reply, AgentError> {
        let handle = self.memory.get_or_create(&ctx.user_id).await?;
        let mut session = handle.lock().await;

        let profile = self.router.current();
        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %ctx.user_id,
            model = %profile,
            interaction = ctx.interaction.as_str(),
            conv_type = ctx.conversation.as_str(),
            language = %ctx.language,
            "Processing request"
        );

        let reply = match ctx.interaction {
            InteractionType::Text => match Command::parse(body) {
                Some(command) => self.run_command(command, &profile, &mut session),
                None => {
                    sink.send(OutboundMessage::typing(&ctx.request_id)).await?;
                    let model = self.clients.chat(&profile)?;
                    let reply = match ctx.conversation {
                        ConversationType::Normal => {
                            let answer = self
                                .synthesizer
                                .answer(
                                    SynthesisMode::Conversational { session: &session },
                                    body,
                                    model.as_ref(),
                                    sink,
                                    &ctx.request_id,
                                )
                                .await?;
                            Reply::plain(answer)
                        }
                        ConversationType::Qa => {
                            self.answer_with_retrieval(
                                ctx,
                                body,
                                &session,
                                &profile,
                                model.as_ref(),
                                sink,
                            )
                            .await?
                        }
                    };
                    session.push_exchange(Turn::user(body), Turn::assistant(&reply.answer));
                    reply
                }
            },
            InteractionType::Document => {
                sink.send(OutboundMessage::typing(&ctx.request_id)).await?;
                let model = self.clients.chat(&profile)?;
                let summary = self
                    .summarizer
                    .summarize(body, self.documents.as_ref(), model.as_ref())
                    .await?;
                Reply::plain(summary)
            }
        };
        drop(session);

        self.history
            .append(HistoryEntry {
                user_id: ctx.user_id.clone(),
                request_id: ctx.request_id.clone(),
                request_time: ctx.request_time,
                kind: ctx.interaction,
                body: body.to_string(),
                msg: reply.message(),
            })
            .await?;

        Ok(reply)
    }

    fn run_command(&self, command: Command, current: &ModelProfile, session: &mut Session) -> Reply {
        tracing::info!(command = ?command, user_id = session.user_id(), "Command received");
        match command {
            Command::EnableReference => self.citations.set_enabled(true),
            Command::DisableReference => self.citations.set_enabled(false),
            Command::EnableDebug => self.debug.store(true, Ordering::Relaxed),
            Command::DisableDebug => self.debug.store(false, Ordering::Relaxed),
            Command::ClearMemory => session.clear(),
            Command::ListModels => {
                return Reply::plain(model_listing(self.router.profiles(), current))
            }
        }
        Reply::plain(command.reply().unwrap_or_default())
    }

    async fn answer_with_retrieval(
        &self,
        ctx: &RequestContext,
        query: &str,
        session: &Session,
        profile: &ModelProfile,
        model: &dyn LlmBackend,
        sink: &dyn MessageSink,
    ) -> Result<Reply, AgentError> {
        let revision = self.reviser.revise(session, query, model).await?;
        if self.debug_enabled() {
            sink.send(OutboundMessage::debug(&ctx.request_id, revision.debug_message()))
                .await?;
            sink.send(OutboundMessage::debug(
                &ctx.request_id,
                format!("[Debug]: {}", revision.question),
            ))
            .await?;
        }

        let enabled = self.backends_for(ctx.rag_type.as_deref());
        let candidates = self
            .fanout
            .fetch(&revision.question, self.top_k, &enabled)
            .await?;

        let kept = if candidates.is_empty() {
            Vec::new()
        } else {
            let embedder = self.clients.embedder(profile)?;
            self.reranker
                .rerank(&revision.question, &candidates, embedder.as_ref())
                .await?
        };
        tracing::info!(
            request_id = %ctx.request_id,
            candidates = candidates.len(),
            kept = kept.len(),
            "Retrieval finished"
        );

        let context = context_from(&kept);
        let answer = self
            .synthesizer
            .answer(
                SynthesisMode::Grounded { context: &context },
                &revision.question,
                model,
                sink,
                &ctx.request_id,
            )
            .await?;

        Ok(Reply {
            answer,
            reference: self.citations.format(&kept),
        })
    }

    /// Backends to query; a selector naming one configured backend narrows the set
    fn backends_for(&self, selector: Option<&str>) -> Vec<BackendKind> {
        let Some(selector) = selector.filter(|s| !s.eq_ignore_ascii_case("all")) else {
            return self.capabilities.clone();
        };

        match BackendKind::from_selector(selector) {
            Some(kind) if self.capabilities.contains(&kind) => vec![kind],
            _ => {
                tracing::warn!(selector, "Unknown or unconfigured backend selector, using all");
                self.capabilities.clone()
            }
        }
    }
}
