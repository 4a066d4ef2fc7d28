use crate::error::{ChatError, EmbeddingError, SearchError};
use crate::models::{ChatTurn, CompletionParams, SearchDocument};
use crate::schema::IndexDefinition;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
pub trait ChatCompletion {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        params: &CompletionParams,
    ) -> Result<String, ChatError>;
}

#[async_trait]
pub trait Retriever {
    /// Ranked `line` values of the documents matching `query`.
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, SearchError>;
}

#[async_trait]
pub trait IndexAdmin {
    async fn create_or_update_index(&self, definition: &IndexDefinition) -> Result<(), SearchError>;

    async fn upload_documents(
        &self,
        documents: &[SearchDocument],
    ) -> Result<UploadSummary, SearchError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: Vec<FailedDocument>,
}

impl UploadSummary {
    pub fn merge(&mut self, other: UploadSummary) {
        self.uploaded += other.uploaded;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub key: String,
    pub reason: String,
}
