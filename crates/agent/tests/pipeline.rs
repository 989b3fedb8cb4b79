//! End-to-end tests for the request pipeline
//!
//! Real fan-out, reranker, citation formatter and in-memory conversation log;
//! the model, the embedder and the retrieval backends are scripted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ragchat_agent::{AgentError, ModelClients, RequestHandler};
use ragchat_config::{BackendKind, FanoutStrategy, Settings};
use ragchat_core::{
    ConversationType, DocumentStore, HistoryEntry, HistoryStore, InteractionType, Language,
    MessageSink, MessageStatus, ModelProfile, OutboundMessage, RecordingSink, RequestContext,
};
use ragchat_llm::{FinishReason, GenerationResult, LlmBackend, LlmError, Message, ModelRouter};
use ragchat_persistence::InMemoryHistoryStore;
use ragchat_rag::{
    Embedder, RagError, RawHit, RetrievalBackend, RetrieverFanout, VectorHit,
};

/// Revises every question to `revised` and answers with `answer`
struct ScriptedModel {
    revised: String,
    answer: String,
    calls: AtomicUsize,
    /// System instruction of every streamed (answer) call
    answer_systems: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(revised: &str, answer: &str) -> Self {
        Self {
            revised: revised.to_string(),
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            answer_systems: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn result(text: &str) -> GenerationResult {
        GenerationResult {
            text: text.to_string(),
            tokens: 1,
            time_to_first_token_ms: 0,
            total_time_ms: 0,
            finish_reason: FinishReason::Stop,
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedModel {
    async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::result(&format!("<result>{}</result>", self.revised)))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(system) = messages.first() {
            self.answer_systems.lock().push(system.content.clone());
        }
        let _ = tx.send(self.answer.clone()).await;
        Ok(Self::result(&self.answer))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Squared L2 distance from the query vector (origin) is an exact integer
struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

impl TableEmbedder {
    fn new() -> Self {
        Self(HashMap::from([
            ("close", vec![7.0, 1.0, 0.0, 0.0]),
            ("far", vec![15.0, 5.0, 0.0, 0.0]),
            ("just inside", vec![13.0, 5.0, 2.0, 1.0]),
            ("on the line", vec![14.0, 2.0, 0.0, 0.0]),
        ]))
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.0.get(text).cloned().unwrap_or_else(|| vec![0.0; 4]))
    }

    fn dim(&self) -> usize {
        4
    }
}

struct Clients {
    model: Arc<ScriptedModel>,
    seen: parking_lot::Mutex<Vec<String>>,
    /// Profile behind every embedder handed out
    embedded: parking_lot::Mutex<Vec<String>>,
}

impl ModelClients for Clients {
    fn chat(&self, profile: &ModelProfile) -> Result<Arc<dyn LlmBackend>, AgentError> {
        self.seen.lock().push(profile.model_id.clone());
        Ok(self.model.clone())
    }

    fn embedder(&self, profile: &ModelProfile) -> Result<Arc<dyn Embedder>, AgentError> {
        self.embedded.lock().push(profile.model_id.clone());
        Ok(Arc::new(TableEmbedder::new()))
    }
}

/// Vector backend returning fixed hits after an optional delay
struct StaticBackend {
    kind: BackendKind,
    excerpts: Vec<&'static str>,
    delay: Duration,
}

#[async_trait]
impl RetrievalBackend for StaticBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<RawHit>, RagError> {
        tokio::time::sleep(self.delay).await;
        Ok(self
            .excerpts
            .iter()
            .take(top_k)
            .map(|excerpt| {
                let hit = VectorHit {
                    name: format!("{}.txt", excerpt.replace(' ', "_")),
                    excerpt: excerpt.to_string(),
                    page: None,
                    uri: None,
                    distance: 0.0,
                };
                match self.kind {
                    BackendKind::Opensearch => RawHit::Opensearch(hit),
                    _ => RawHit::Faiss(hit),
                }
            })
            .collect())
    }
}

/// Finishes another request's rotation step while this one is retrieving
struct RotatingBackend {
    router: Arc<ModelRouter>,
}

#[async_trait]
impl RetrievalBackend for RotatingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Faiss
    }

    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RawHit>, RagError> {
        self.router.advance();
        Ok(vec![RawHit::Faiss(VectorHit {
            name: "close.txt".to_string(),
            excerpt: "close".to_string(),
            page: None,
            uri: None,
            distance: 0.0,
        })])
    }
}

struct NoDocuments;

#[async_trait]
impl DocumentStore for NoDocuments {
    async fn load_text(&self, name: &str) -> ragchat_core::Result<String> {
        Err(ragchat_core::Error::Document(name.to_string()))
    }

    fn namespace(&self) -> &str {
        "docs"
    }
}

struct ClosedSink;

#[async_trait]
impl MessageSink for ClosedSink {
    async fn send(&self, _message: OutboundMessage) -> ragchat_core::Result<()> {
        Err(ragchat_core::Error::Transport("closed".to_string()))
    }
}

struct Harness {
    handler: RequestHandler,
    model: Arc<ScriptedModel>,
    clients: Arc<Clients>,
    history: Arc<InMemoryHistoryStore>,
}

fn three_models() -> Arc<ModelRouter> {
    Arc::new(
        ModelRouter::new(vec![
            ModelProfile::new("r1", "model-a", 256),
            ModelProfile::new("r2", "model-b", 256),
            ModelProfile::new("r3", "model-c", 256),
        ])
        .unwrap(),
    )
}

fn harness(
    settings: Settings,
    backends: Vec<Arc<dyn RetrievalBackend>>,
    history: Arc<InMemoryHistoryStore>,
) -> Harness {
    harness_on(three_models(), settings, backends, history)
}

fn harness_on(
    router: Arc<ModelRouter>,
    settings: Settings,
    backends: Vec<Arc<dyn RetrievalBackend>>,
    history: Arc<InMemoryHistoryStore>,
) -> Harness {
    let model = Arc::new(ScriptedModel::new("refund window?", "Within 14 days."));
    let clients = Arc::new(Clients {
        model: model.clone(),
        seen: parking_lot::Mutex::new(Vec::new()),
        embedded: parking_lot::Mutex::new(Vec::new()),
    });
    let fanout = RetrieverFanout::from_config(backends, &settings.rag);
    let handler = RequestHandler::new(
        &settings,
        router,
        clients.clone(),
        fanout,
        history.clone(),
        Arc::new(NoDocuments),
    );
    Harness {
        handler,
        model,
        clients,
        history,
    }
}

fn faiss(excerpts: Vec<&'static str>) -> Arc<dyn RetrievalBackend> {
    Arc::new(StaticBackend {
        kind: BackendKind::Faiss,
        excerpts,
        delay: Duration::ZERO,
    })
}

fn request(id: &str, conversation: ConversationType) -> RequestContext {
    RequestContext {
        connection_id: "conn-1".to_string(),
        user_id: "user-1".to_string(),
        request_id: id.to_string(),
        request_time: chrono::Utc::now(),
        interaction: InteractionType::Text,
        conversation,
        rag_type: None,
        language: Language::English,
    }
}

#[tokio::test]
async fn test_qa_keeps_close_documents_and_cites_them() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec!["close", "far"])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let sink = RecordingSink::new();

    let reply = h
        .handler
        .handle(&request("r-1", ConversationType::Qa), "how long?", &sink)
        .await
        .unwrap();

    assert_eq!(reply.answer, "Within 14 days.");
    assert_eq!(
        reply.reference,
        "\n\nFrom\n1. <a href= target=_blank>close.txt</a>, faiss (50)\n"
    );

    let sent = sink.messages();
    assert_eq!(sent[0].status, MessageStatus::Istyping);
    assert!(sent.iter().all(|m| m.status != MessageStatus::Debug));
    let last = sent.last().unwrap();
    assert_eq!(last.status, MessageStatus::Completed);
    assert_eq!(last.msg, reply.message());

    let logged = h.history.entries_for("user-1");
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].body, "how long?");
    assert_eq!(logged[0].msg, reply.message());
}

#[tokio::test]
async fn test_refund_scenario_grounds_on_the_close_document_only() {
    let backends: Vec<Arc<dyn RetrievalBackend>> = vec![
        faiss(vec!["close"]),
        Arc::new(StaticBackend {
            kind: BackendKind::Opensearch,
            excerpts: vec!["far"],
            delay: Duration::ZERO,
        }),
    ];
    let h = harness(Settings::default(), backends, Arc::new(InMemoryHistoryStore::new()));

    let reply = h
        .handler
        .handle(
            &request("r-1", ConversationType::Qa),
            "What is the refund policy?",
            &RecordingSink::new(),
        )
        .await
        .unwrap();

    let systems = h.model.answer_systems.lock().clone();
    assert_eq!(systems.len(), 1);
    assert!(systems[0].contains("<context>\nclose\n\n\n</context>"));
    assert!(!systems[0].contains("far"));
    assert_eq!(reply.reference.matches(" target=_blank>").count(), 1);
    assert!(reply.reference.contains("close.txt</a>, faiss (50)"));
}

#[tokio::test]
async fn test_relevance_cutoff_is_strict() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec!["on the line", "just inside"])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let reply = h
        .handler
        .handle(&request("r-1", ConversationType::Qa), "q", &RecordingSink::new())
        .await
        .unwrap();

    assert!(reply.reference.contains("just_inside.txt</a>, faiss (199)"));
    assert!(!reply.reference.contains("on_the_line"));
}

#[tokio::test]
async fn test_no_candidates_means_no_reference() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec![])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let reply = h
        .handler
        .handle(&request("r-1", ConversationType::Qa), "q", &RecordingSink::new())
        .await
        .unwrap();

    assert_eq!(reply.answer, "Within 14 days.");
    assert!(reply.reference.is_empty());
}

#[tokio::test]
async fn test_debug_messages_follow_the_switch() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec!["close"])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let sink = RecordingSink::new();

    h.handler
        .handle(&request("r-1", ConversationType::Qa), "enableDebug", &sink)
        .await
        .unwrap();
    sink.clear();

    h.handler
        .handle(&request("r-2", ConversationType::Qa), "how long?", &sink)
        .await
        .unwrap();

    let debug: Vec<_> = sink
        .messages()
        .into_iter()
        .filter(|m| m.status == MessageStatus::Debug)
        .map(|m| m.msg)
        .collect();
    assert_eq!(debug.len(), 2);
    assert!(debug[0].starts_with("새로운 질문: refund window?"));
    assert_eq!(debug[1], "[Debug]: refund window?");
}

#[tokio::test]
async fn test_rotation_advances_only_on_success() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec!["close"])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let sink = RecordingSink::new();

    for i in 0..4 {
        h.handler
            .handle(&request(&format!("r-{}", i), ConversationType::Normal), "hi", &sink)
            .await
            .unwrap();
    }
    assert_eq!(
        *h.clients.seen.lock(),
        vec!["model-a", "model-b", "model-c", "model-a"]
    );
    assert_eq!(h.handler.router().current_index(), 1);

    let failed = h
        .handler
        .handle(&request("r-x", ConversationType::Normal), "hi", &ClosedSink)
        .await;
    assert!(matches!(failed, Err(AgentError::Transport(_))));
    assert_eq!(h.handler.router().current_index(), 1);
}

#[tokio::test]
async fn test_clear_memory_never_reaches_the_model() {
    let h = harness(
        Settings::default(),
        vec![faiss(vec!["close"])],
        Arc::new(InMemoryHistoryStore::new()),
    );
    let sink = RecordingSink::new();

    h.handler
        .handle(&request("r-1", ConversationType::Normal), "hello", &sink)
        .await
        .unwrap();
    let calls = h.model.calls();

    let reply = h
        .handler
        .handle(&request("r-2", ConversationType::Normal), "clearMemory", &sink)
        .await
        .unwrap();

    assert_eq!(reply.answer, "The chat memory was intialized in this session.");
    assert_eq!(h.model.calls(), calls);
    let session = h.handler.memory().get_or_create("user-1").await.unwrap();
    assert!(session.lock().await.is_empty());
    assert_eq!(h.history.entries_for("user-1").len(), 2);
}

#[tokio::test]
async fn test_memory_is_hydrated_from_the_log() {
    let history = Arc::new(InMemoryHistoryStore::new());
    history
        .append(HistoryEntry {
            user_id: "user-1".to_string(),
            request_id: "old".to_string(),
            request_time: chrono::Utc::now() - chrono::Duration::hours(1),
            kind: InteractionType::Text,
            body: "What is the refund policy?".to_string(),
            msg: "x".repeat(300),
        })
        .await
        .unwrap();
    history
        .append(HistoryEntry {
            user_id: "user-1".to_string(),
            request_id: "upload".to_string(),
            request_time: chrono::Utc::now() - chrono::Duration::minutes(30),
            kind: InteractionType::Document,
            body: "faq.csv".to_string(),
            msg: "summary".to_string(),
        })
        .await
        .unwrap();

    let h = harness(Settings::default(), vec![faiss(vec!["close"])], history);
    let session = h.handler.memory().get_or_create("user-1").await.unwrap();
    let session = session.lock().await;

    let turns: Vec<_> = session.turns().map(|t| t.content.clone()).collect();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], "What is the refund policy?");
    assert_eq!(turns[1].chars().count(), 100);
}

#[tokio::test]
async fn test_fanout_strategies_agree() {
    let backends = || -> Vec<Arc<dyn RetrievalBackend>> {
        vec![
            Arc::new(StaticBackend {
                kind: BackendKind::Faiss,
                excerpts: vec!["close", "just inside"],
                delay: Duration::from_millis(30),
            }),
            Arc::new(StaticBackend {
                kind: BackendKind::Opensearch,
                excerpts: vec!["far", "close"],
                delay: Duration::ZERO,
            }),
        ]
    };

    let mut references = Vec::new();
    for strategy in [FanoutStrategy::Sequential, FanoutStrategy::Concurrent] {
        let mut settings = Settings::default();
        settings.rag.fanout = strategy;
        let h = harness(settings, backends(), Arc::new(InMemoryHistoryStore::new()));
        let reply = h
            .handler
            .handle(&request("r-1", ConversationType::Qa), "q", &RecordingSink::new())
            .await
            .unwrap();
        references.push(reply.reference);
    }

    assert_eq!(references[0], references[1]);
    assert!(references[0].contains("faiss (50)"));
    assert!(references[0].contains("opensearch (50)"));
}

#[tokio::test]
async fn test_rerank_uses_the_model_chosen_at_request_start() {
    let router = three_models();
    let backends: Vec<Arc<dyn RetrievalBackend>> = vec![Arc::new(RotatingBackend {
        router: router.clone(),
    })];
    let h = harness_on(router, Settings::default(), backends, Arc::new(InMemoryHistoryStore::new()));

    let reply = h
        .handler
        .handle(&request("r-1", ConversationType::Qa), "how long?", &RecordingSink::new())
        .await
        .unwrap();

    assert!(reply.reference.contains("close.txt</a>, faiss (50)"));
    assert_eq!(*h.clients.seen.lock(), vec!["model-a"]);
    assert_eq!(*h.clients.embedded.lock(), vec!["model-a"]);
}
