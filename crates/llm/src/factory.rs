//! Backend construction
//!
//! Maps a model profile to the client for its wire protocol.

use std::sync::Arc;

use ragchat_config::LlmSettings;
use ragchat_core::{ModelProfile, ModelProvider};

use crate::backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::LlmError;

/// Create the chat backend for `profile`
pub fn create_backend(
    profile: &ModelProfile,
    settings: &LlmSettings,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let config = LlmConfig::from_profile(profile, settings);

    tracing::debug!(
        provider = ?profile.provider,
        model = %profile.model_id,
        region = %profile.region,
        "Creating LLM backend"
    );

    match profile.provider {
        ModelProvider::Ollama => Ok(Arc::new(OllamaBackend::new(config)?)),
        ModelProvider::OpenAi => Ok(Arc::new(OpenAIBackend::new(OpenAIConfig::from(&config))?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_backend() {
        let profile = ModelProfile::new("local", "llama3.1:8b", 1024);
        let backend = create_backend(&profile, &LlmSettings::default()).unwrap();
        assert_eq!(backend.model_name(), "llama3.1:8b");
    }

    #[test]
    fn test_create_openai_backend() {
        let profile = ModelProfile::new("us-west-2", "gpt-4o-mini", 2048)
            .with_endpoint(ModelProvider::OpenAi, "http://localhost:8000/v1");
        let backend = create_backend(&profile, &LlmSettings::default()).unwrap();
        assert_eq!(backend.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_remote_openai_requires_key() {
        let profile = ModelProfile::new("us-west-2", "gpt-4o", 2048)
            .with_endpoint(ModelProvider::OpenAi, "https://api.openai.com/v1");
        assert!(matches!(
            create_backend(&profile, &LlmSettings::default()),
            Err(LlmError::Configuration(_))
        ));
    }
}
