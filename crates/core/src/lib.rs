pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexing;
pub mod ingest;
pub mod models;
pub mod openai;
pub mod orchestrator;
pub mod schema;
pub mod stores;
pub mod traits;

pub use chat::{
    build_user_content, split_user_content, ChatSession, TranscriptEntry, DEFAULT_QNA_WINDOW,
    QNA_SYSTEM_PROMPT, RAG_SYSTEM_PROMPT,
};
pub use chunking::{
    build_document_chunks, chunk_text, normalize_text, ChunkingConfig, DEFAULT_CHUNK_LENGTH,
};
pub use config::{OpenAiConfig, SearchServiceConfig};
pub use embeddings::{embed_chunks, EmbeddingReport, SkippedChunk};
pub use error::{ChatError, ConfigError, EmbeddingError, IngestError, PublishError, SearchError};
pub use extractor::{extract_pdf_text, LopdfExtractor, PdfExtractor};
pub use indexing::{apply_schema, publish_embeddings, PublishReport};
pub use ingest::{
    discover_pdf_files, embed_folder, load_embedded_chunks, EmbeddedFile, IngestionReport,
    SkippedPdf,
};
pub use models::{
    document_key, ChatRole, ChatTurn, CompletionParams, DocumentChunk, EmbeddedChunk,
    RetrievalMode, RetrievalOptions, SearchDocument,
};
pub use openai::AzureOpenAiClient;
pub use orchestrator::{ask, ChatOrchestrator};
pub use schema::{IndexDefinition, DEFAULT_EMBEDDING_DIMENSIONS};
pub use stores::AzureSearchStore;
pub use traits::{
    ChatCompletion, EmbeddingClient, FailedDocument, IndexAdmin, Retriever, UploadSummary,
};
