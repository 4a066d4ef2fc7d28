use crate::error::IngestError;
use crate::models::DocumentChunk;
use regex::Regex;

pub const DEFAULT_CHUNK_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Upper bound of a chunk, in characters.
    pub chunk_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_length: DEFAULT_CHUNK_LENGTH,
        }
    }
}

/// Flattens extracted PDF text into one cleaned-up line.
pub fn normalize_text(text: &str) -> Result<String, IngestError> {
    let whitespace_re = Regex::new(r"\s+")?;
    let before_comma_re = Regex::new(r"[. ]+,")?;

    let collapsed = whitespace_re.replace_all(text, " ");
    let collapsed = collapsed.trim();
    // Only the spaces and periods in front of a comma go; the comma stays.
    let comma_fixed = before_comma_re.replace_all(collapsed, ",");

    let normalized = comma_fixed
        .replace("..", ".")
        .replace(". .", ".")
        .replace('\n', "");

    Ok(normalized.trim().to_string())
}

/// Splits `text` into pieces of at most `chunk_length` characters, cutting
/// after the last period of each window when there is one.
///
/// The pieces concatenate back to `text`.
pub fn chunk_text(text: &str, chunk_length: usize) -> Result<Vec<String>, IngestError> {
    if chunk_length == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "chunk_length must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some((window_end, _)) = rest.char_indices().nth(chunk_length) {
        let window = &rest[..window_end];
        let cut = match window.rfind('.') {
            Some(period) => period + 1,
            None => window_end,
        };

        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    Ok(chunks)
}

/// Normalizes and chunks one document, numbering chunks from zero.
pub fn build_document_chunks(
    filename: &str,
    raw_text: &str,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let normalized = normalize_text(raw_text)?;

    Ok(chunk_text(&normalized, config.chunk_length)?
        .into_iter()
        .enumerate()
        .map(|(index, line)| DocumentChunk {
            id: index.to_string(),
            line,
            filename: filename.to_string(),
        })
        .collect())
}
