use crate::error::{PublishError, SearchError};
use crate::ingest::load_embedded_chunks;
use crate::models::SearchDocument;
use crate::schema::IndexDefinition;
use crate::traits::{IndexAdmin, UploadSummary};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug)]
pub struct PublishReport {
    pub index_name: String,
    pub document_count: usize,
    pub upload: UploadSummary,
}

/// Create-or-update of the index definition. Applying the same definition
/// again leaves the index unchanged.
pub async fn apply_schema<A>(admin: &A, definition: &IndexDefinition) -> Result<(), SearchError>
where
    A: IndexAdmin + Sync + ?Sized,
{
    admin.create_or_update_index(definition).await
}

/// Applies `definition`, then uploads every embedded chunk found in
/// `output_dir` under its file-qualified key.
pub async fn publish_embeddings<A>(
    admin: &A,
    definition: &IndexDefinition,
    output_dir: &Path,
) -> Result<PublishReport, PublishError>
where
    A: IndexAdmin + Sync + ?Sized,
{
    apply_schema(admin, definition).await?;

    let documents: Vec<SearchDocument> = load_embedded_chunks(output_dir)?
        .into_iter()
        .map(SearchDocument::from)
        .collect();

    if documents.is_empty() {
        warn!(dir = %output_dir.display(), "no embedded chunks to upload");
    }

    let upload = admin.upload_documents(&documents).await?;
    for failed in &upload.failed {
        warn!(key = %failed.key, reason = %failed.reason, "document rejected by index");
    }
    info!(
        index = %definition.name,
        uploaded = upload.uploaded,
        failed = upload.failed.len(),
        "uploaded documents"
    );

    Ok(PublishReport {
        index_name: definition.name.clone(),
        document_count: documents.len(),
        upload,
    })
}
