//! Uploaded document access

use async_trait::async_trait;

use crate::Result;

/// Object store holding uploaded documents
///
/// Documents are addressed by the store's namespace prefix plus the file
/// name the client sent. Binary formats are expected to be stored with their
/// extracted text; the store hands back text only.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Load the text content of `name`
    async fn load_text(&self, name: &str) -> Result<String>;

    /// Namespace prefix this store resolves names under
    fn namespace(&self) -> &str;
}
