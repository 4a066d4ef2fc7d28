use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub line: String,
    pub filename: String,
}

/// A chunk together with the vector returned by the embedding deployment.
///
/// This is the record written to `<pdf file name>.json`; `id` is the ordinal
/// of the chunk inside its source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: String,
    pub line: String,
    pub embedding: Vec<f32>,
    pub filename: String,
}

impl EmbeddedChunk {
    pub fn new(chunk: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            line: chunk.line,
            embedding,
            filename: chunk.filename,
        }
    }
}

/// Record uploaded to the search index. Same fields as [`EmbeddedChunk`], but
/// `id` is unique across files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub line: String,
    pub embedding: Vec<f32>,
    pub filename: String,
}

impl From<EmbeddedChunk> for SearchDocument {
    fn from(chunk: EmbeddedChunk) -> Self {
        Self {
            id: document_key(&chunk.filename, &chunk.id),
            line: chunk.line,
            embedding: chunk.embedding,
            filename: chunk.filename,
        }
    }
}

/// Index keys may only hold letters, digits, `_`, `-` and `=`, so the
/// `(filename, ordinal)` pair is hashed.
pub fn document_key(filename: &str, local_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(local_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub stop: Option<Vec<String>>,
}

impl CompletionParams {
    pub fn rag() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 3000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: None,
        }
    }

    pub fn qna() -> Self {
        Self {
            temperature: 0.9,
            ..Self::rag()
        }
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self::rag()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Simple,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top: usize,
    pub mode: RetrievalMode,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top: 3,
            mode: RetrievalMode::Simple,
        }
    }
}
