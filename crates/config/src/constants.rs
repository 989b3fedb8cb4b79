//! Centralized constants
//!
//! Single source of truth for default values used across the workspace.
//! Settings fall back to these when a field is absent from every layer.

/// Conversation memory defaults
pub mod memory {
    /// Exchanges (user + assistant pairs) kept in a session window
    pub const WINDOW_PAIRS: usize = 10;

    /// How far back durable history is replayed when a session is created
    pub const HISTORY_DAYS: i64 = 2;

    /// Assistant text longer than this is cut when replayed into memory
    pub const REPLAY_MAX_CHARS: usize = 100;
}

/// Retrieval and reranking defaults
pub mod rag {
    /// Documents requested from each backend and kept after reranking
    pub const DEFAULT_TOP_K: usize = 10;

    /// A reranked document is kept only if its distance is strictly below this
    pub const RELEVANCE_THRESHOLD: i64 = 200;

    /// Page size of the FAQ lookup that follows a successful retrieve call
    pub const FAQ_PAGE_SIZE: usize = 4;

    /// Value of the language attribute filter sent to the managed index
    pub const INDEX_LANGUAGE_CODE: &str = "ko";

    /// Default Qdrant collection searched by the remote vector backend
    pub const DEFAULT_COLLECTION: &str = "rag-index";

    /// Embedding dimension of the default embedding model
    pub const DEFAULT_VECTOR_DIM: usize = 768;
}

/// Model invocation defaults
pub mod llm {
    pub const TEMPERATURE: f32 = 0.1;
    pub const TOP_P: f32 = 0.9;
    pub const TOP_K: u32 = 250;

    /// Stop sequence appended to every chat request
    pub const STOP_SEQUENCE: &str = "\n\nHuman:";

    /// Retry attempts after the first failed call
    pub const MAX_RETRIES: u32 = 5;

    /// First retry delay; doubles on every further attempt
    pub const INITIAL_BACKOFF_MS: u64 = 200;

    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 8196;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Managed document index endpoint
    pub const MANAGED_INDEX_DEFAULT: &str = "http://127.0.0.1:8081";
}

/// In-band text commands and their fixed replies
pub mod commands {
    pub const ENABLE_REFERENCE: &str = "enableReference";
    pub const DISABLE_REFERENCE: &str = "disableReference";
    pub const ENABLE_DEBUG: &str = "enableDebug";
    pub const DISABLE_DEBUG: &str = "disableDebug";
    pub const CLEAR_MEMORY: &str = "clearMemory";

    /// Matched as a prefix of the message body
    pub const LIST_MODELS_PREFIX: &str = "list models";

    pub const REFERENCE_ENABLED_REPLY: &str = "Referece is enabled";
    pub const REFERENCE_DISABLED_REPLY: &str = "Reference is disabled";
    pub const DEBUG_ENABLED_REPLY: &str = "Debug messages will be delivered to the client.";
    pub const DEBUG_DISABLED_REPLY: &str = "Debug messages will not be delivered to the client.";
    pub const MEMORY_CLEARED_REPLY: &str = "The chat memory was intialized in this session.";
}
