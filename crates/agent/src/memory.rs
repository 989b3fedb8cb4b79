//! Conversation memory
//!
//! One bounded window of turns per user. A session is created on the user's
//! first request and hydrated once from the durable conversation log; after
//! that it only changes through [`Session::push_exchange`] and
//! [`Session::clear`].
//!
//! Sessions are handed out as `Arc<tokio::sync::Mutex<Session>>`. The request
//! handler holds the lock for the whole request, so two overlapping requests
//! from one user are serialized while other users proceed independently.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use ragchat_config::MemoryConfig;
use ragchat_core::{HistoryStore, InteractionType, Turn, TurnRole};
use tokio::sync::Mutex;

use crate::AgentError;

/// Shared handle to one user's session
pub type SessionHandle = Arc<Mutex<Session>>;

/// Bounded window of recent turns
#[derive(Debug, Clone)]
pub struct Session {
    user_id: String,
    turns: VecDeque<Turn>,
    window_pairs: usize,
    hydrated: bool,
}

impl Session {
    pub fn new(user_id: impl Into<String>, window_pairs: usize) -> Self {
        Self {
            user_id: user_id.into(),
            turns: VecDeque::with_capacity(window_pairs * 2),
            window_pairs,
            hydrated: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Turns oldest first
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Maximum number of turns the window holds
    pub fn capacity(&self) -> usize {
        self.window_pairs * 2
    }

    /// Append one user/assistant exchange, evicting the oldest turns beyond the window
    pub fn push_exchange(&mut self, user: Turn, assistant: Turn) {
        self.turns.push_back(user);
        self.turns.push_back(assistant);
        while self.turns.len() > self.capacity() {
            self.turns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The window rendered as `"{role}: {content}\n"` lines
    pub fn transcript(&self) -> String {
        self.turns.iter().map(Turn::transcript_line).collect()
    }
}

/// Process-wide session registry
pub struct ConversationMemory {
    config: MemoryConfig,
    history: Arc<dyn HistoryStore>,
    sessions: DashMap<String, SessionHandle>,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            config,
            history,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Session for `user_id`, created and hydrated on first use
    ///
    /// If hydration fails the session stays registered but unhydrated, and
    /// the next call retries it.
    pub async fn get_or_create(&self, user_id: &str) -> Result<SessionHandle, AgentError> {
        let handle = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id, self.config.window_pairs))))
            .clone();

        {
            let mut session = handle.lock().await;
            if !session.hydrated {
                self.hydrate(&mut session).await?;
                session.hydrated = true;
            }
        }

        Ok(handle)
    }

    async fn hydrate(&self, session: &mut Session) -> Result<(), AgentError> {
        let since = Utc::now() - Duration::days(self.config.history_days);
        let entries = self.history.load_since(&session.user_id, since).await?;

        let mut replayed = 0;
        for entry in entries.into_iter().filter(|e| e.kind == InteractionType::Text) {
            let answer = truncate_chars(&entry.msg, self.config.replay_max_chars);
            session.push_exchange(
                Turn::at(TurnRole::User, entry.body, entry.request_time),
                Turn::at(TurnRole::Assistant, answer, entry.request_time),
            );
            replayed += 1;
        }

        tracing::info!(
            user_id = %session.user_id,
            store = self.history.name(),
            replayed,
            kept = session.len() / 2,
            "Session hydrated from history"
        );
        Ok(())
    }

    /// Record one completed exchange
    pub async fn append(&self, session: &SessionHandle, user_text: &str, assistant_text: &str) {
        session
            .lock()
            .await
            .push_exchange(Turn::user(user_text), Turn::assistant(assistant_text));
    }

    pub async fn clear(&self, session: &SessionHandle) {
        let mut session = session.lock().await;
        session.clear();
        tracing::info!(user_id = %session.user_id, "Session memory cleared");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use ragchat_core::HistoryEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FixedHistory {
        entries: Vec<HistoryEntry>,
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HistoryStore for FixedHistory {
        async fn load_since(
            &self,
            user_id: &str,
            since: DateTime<Utc>,
        ) -> ragchat_core::Result<Vec<HistoryEntry>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ragchat_core::Error::Persistence("offline".to_string()));
            }
            Ok(self
                .entries
                .iter()
                .filter(|e| e.user_id == user_id && e.request_time > since)
                .cloned()
                .collect())
        }

        async fn append(&self, _entry: HistoryEntry) -> ragchat_core::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn entry(kind: InteractionType, body: &str, msg: &str, age: Duration) -> HistoryEntry {
        HistoryEntry {
            user_id: "u1".to_string(),
            request_id: body.to_string(),
            request_time: Utc::now() - age,
            kind,
            body: body.to_string(),
            msg: msg.to_string(),
        }
    }

    fn memory_with(history: FixedHistory) -> (ConversationMemory, Arc<FixedHistory>) {
        let history = Arc::new(history);
        let memory = ConversationMemory::new(MemoryConfig::default(), history.clone());
        (memory, history)
    }

    #[test]
    fn test_window_keeps_most_recent_exchanges() {
        let mut session = Session::new("u", 10);
        for i in 0..13 {
            session.push_exchange(Turn::user(format!("q{}", i)), Turn::assistant(format!("a{}", i)));
        }

        assert_eq!(session.len(), 20);
        let first: Vec<_> = session.turns().take(2).map(|t| t.content.as_str()).collect();
        assert_eq!(first, vec!["q3", "a3"]);
        assert_eq!(session.turns().last().unwrap().content, "a12");
    }

    #[test]
    fn test_transcript() {
        let mut session = Session::new("u", 2);
        session.push_exchange(Turn::user("hi"), Turn::assistant("hello"));
        assert_eq!(session.transcript(), "human: hi\nai: hello\n");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("환불정책", 2), "환불");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[tokio::test]
    async fn test_hydration_replays_text_entries() {
        let long_answer = "x".repeat(150);
        let (memory, history) = memory_with(FixedHistory {
            entries: vec![
                entry(InteractionType::Text, "old", "stale", Duration::days(3)),
                entry(InteractionType::Text, "q1", &long_answer, Duration::hours(2)),
                entry(InteractionType::Document, "a.pdf", "summary", Duration::hours(1)),
                entry(InteractionType::Text, "q2", "short", Duration::minutes(5)),
            ],
            ..Default::default()
        });

        let handle = memory.get_or_create("u1").await.unwrap();
        let session = handle.lock().await;
        let contents: Vec<_> = session.turns().map(|t| t.content.clone()).collect();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0], "q1");
        assert_eq!(contents[1].chars().count(), 100);
        assert_eq!(contents[2], "q2");
        assert_eq!(contents[3], "short");
        drop(session);

        memory.get_or_create("u1").await.unwrap();
        assert_eq!(history.loads.load(Ordering::SeqCst), 1);
        assert_eq!(memory.session_count(), 1);
    }

    #[tokio::test]
    async fn test_hydration_failure_is_retried() {
        let (memory, history) = memory_with(FixedHistory {
            fail: true,
            ..Default::default()
        });

        assert!(matches!(
            memory.get_or_create("u1").await,
            Err(AgentError::Persistence(_))
        ));
        assert!(memory.get_or_create("u1").await.is_err());
        assert_eq!(history.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_append_and_clear() {
        let (memory, _) = memory_with(FixedHistory::default());
        let handle = memory.get_or_create("u1").await.unwrap();

        memory.append(&handle, "question", "answer").await;
        assert_eq!(handle.lock().await.len(), 2);

        memory.clear(&handle).await;
        assert!(handle.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_hydrate_once() {
        let (memory, history) = memory_with(FixedHistory::default());
        let memory = Arc::new(memory);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let memory = memory.clone();
                tokio::spawn(async move { memory.get_or_create("u1").await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(history.loads.load(Ordering::SeqCst), 1);
        assert_eq!(memory.session_count(), 1);
    }
}
