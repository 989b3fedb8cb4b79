//! Filesystem document store
//!
//! Uploaded documents live under `{root}/{namespace}/{file name}`. Binary
//! formats are expected next to their extracted text, so every read returns
//! UTF-8 text.

use async_trait::async_trait;
use ragchat_config::PersistenceConfig;
use ragchat_core::DocumentStore;
use std::path::{Component, Path, PathBuf};

use crate::PersistenceError;

#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
    namespace: String,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(&config.document_root, &config.document_namespace)
    }

    /// Resolve a client-supplied name inside the namespace directory
    ///
    /// Only plain relative paths are accepted.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(PersistenceError::InvalidData(format!(
                "invalid document name: {}",
                name
            )));
        }
        Ok(self.root.join(&self.namespace).join(relative))
    }

    async fn read(&self, name: &str) -> Result<String, PersistenceError> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn load_text(&self, name: &str) -> ragchat_core::Result<String> {
        let text = self.read(name).await?;
        tracing::debug!(name, bytes = text.len(), "Document loaded");
        Ok(text)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
