//! Round-robin model selection
//!
//! The router hands out the current model profile and moves to the next one
//! only when a request has completed successfully. Every connection shares
//! one router, so the rotation is process-wide.

use std::sync::atomic::{AtomicUsize, Ordering};

use ragchat_core::ModelProfile;

use crate::LlmError;

/// Process-wide cursor over the configured model profiles
#[derive(Debug)]
pub struct ModelRouter {
    profiles: Vec<ModelProfile>,
    cursor: AtomicUsize,
}

impl ModelRouter {
    /// Create a router starting at the first profile
    pub fn new(profiles: Vec<ModelProfile>) -> Result<Self, LlmError> {
        if profiles.is_empty() {
            return Err(LlmError::Configuration(
                "at least one model profile is required".to_string(),
            ));
        }
        Ok(Self {
            profiles,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Profile the next request should use
    pub fn current(&self) -> ModelProfile {
        self.profiles[self.current_index()].clone()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::Acquire) % self.profiles.len()
    }

    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }

    /// Move to the next profile, wrapping at the end of the list
    ///
    /// Returns the index that is now current.
    pub fn advance(&self) -> usize {
        let len = self.profiles.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        let next = (previous + 1) % len;
        tracing::debug!(
            index = next,
            model = %self.profiles[next],
            "Model rotation advanced"
        );
        next
    }
}
