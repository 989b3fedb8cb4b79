//! In-band text commands
//!
//! Checked before a text request is dispatched. A command never reaches the
//! reviser, the retrieval stage or the model.

use ragchat_config::constants::commands::*;
use ragchat_core::ModelProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EnableReference,
    DisableReference,
    EnableDebug,
    DisableDebug,
    ClearMemory,
    ListModels,
}

impl Command {
    /// Recognize a command; the five switches must match the whole body
    pub fn parse(body: &str) -> Option<Self> {
        match body {
            ENABLE_REFERENCE => Some(Self::EnableReference),
            DISABLE_REFERENCE => Some(Self::DisableReference),
            ENABLE_DEBUG => Some(Self::EnableDebug),
            DISABLE_DEBUG => Some(Self::DisableDebug),
            CLEAR_MEMORY => Some(Self::ClearMemory),
            _ if body.starts_with(LIST_MODELS_PREFIX) => Some(Self::ListModels),
            _ => None,
        }
    }

    /// Fixed acknowledgement; `None` for commands whose reply depends on state
    pub fn reply(&self) -> Option<&'static str> {
        match self {
            Self::EnableReference => Some(REFERENCE_ENABLED_REPLY),
            Self::DisableReference => Some(REFERENCE_DISABLED_REPLY),
            Self::EnableDebug => Some(DEBUG_ENABLED_REPLY),
            Self::DisableDebug => Some(DEBUG_DISABLED_REPLY),
            Self::ClearMemory => Some(MEMORY_CLEARED_REPLY),
            Self::ListModels => None,
        }
    }
}

/// Reply to `list models`
pub fn model_listing(profiles: &[ModelProfile], current: &ModelProfile) -> String {
    let mut msg = String::from("The list of models: \n");
    for profile in profiles {
        msg.push_str(&profile.model_id);
        msg.push('\n');
    }
    msg.push_str("current model: ");
    msg.push_str(&current.model_id);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_commands() {
        assert_eq!(Command::parse("clearMemory"), Some(Command::ClearMemory));
        assert_eq!(Command::parse("enableDebug"), Some(Command::EnableDebug));
        assert_eq!(Command::parse("clearMemory please"), None);
        assert_eq!(Command::parse(" enableReference"), None);
        assert_eq!(Command::parse("what is clearMemory?"), None);
    }

    #[test]
    fn test_list_models_prefix() {
        assert_eq!(Command::parse("list models"), Some(Command::ListModels));
        assert_eq!(Command::parse("list models now"), Some(Command::ListModels));
        assert_eq!(Command::parse("list model"), None);
        assert_eq!(Command::ListModels.reply(), None);
    }

    #[test]
    fn test_replies() {
        assert_eq!(
            Command::ClearMemory.reply(),
            Some("The chat memory was intialized in this session.")
        );
        assert_eq!(Command::EnableReference.reply(), Some("Referece is enabled"));
    }

    #[test]
    fn test_model_listing() {
        let profiles = vec![
            ModelProfile::new("us-west-2", "claude-v2", 8196),
            ModelProfile::new("us-east-1", "claude-instant", 8196),
        ];
        assert_eq!(
            model_listing(&profiles, &profiles[1]),
            "The list of models: \nclaude-v2\nclaude-instant\ncurrent model: claude-instant"
        );
    }
}
