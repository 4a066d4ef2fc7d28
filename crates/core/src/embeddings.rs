use crate::models::{DocumentChunk, EmbeddedChunk};
use crate::traits::EmbeddingClient;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub id: String,
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingReport {
    pub embedded: Vec<EmbeddedChunk>,
    pub skipped: Vec<SkippedChunk>,
}

/// Requests one embedding per chunk, in order, awaiting each call before the
/// next. Chunks whose request fails are reported in `skipped` and left out of
/// `embedded`; nothing is retried.
pub async fn embed_chunks<E>(client: &E, chunks: Vec<DocumentChunk>) -> EmbeddingReport
where
    E: EmbeddingClient + Sync + ?Sized,
{
    let mut report = EmbeddingReport::default();

    for chunk in chunks {
        match client.embed(&chunk.line).await {
            Ok(embedding) => {
                debug!(file = %chunk.filename, chunk = %chunk.id, "generated embedding");
                report.embedded.push(EmbeddedChunk::new(chunk, embedding));
            }
            Err(error) => {
                warn!(
                    file = %chunk.filename,
                    chunk = %chunk.id,
                    %error,
                    "embedding request failed, skipping chunk"
                );
                report.skipped.push(SkippedChunk {
                    id: chunk.id,
                    filename: chunk.filename,
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}
