use crate::chunking::{build_document_chunks, ChunkingConfig};
use crate::embeddings::{embed_chunks, SkippedChunk};
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::EmbeddedChunk;
use crate::traits::EmbeddingClient;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// PDF files directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}

/// Embedding JSON files directly inside `folder`, sorted by path.
pub fn discover_embedding_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}

pub fn ensure_output_dir(path: &Path) -> Result<(), IngestError> {
    if path.is_dir() {
        info!(dir = %path.display(), "output directory already exists");
    } else {
        fs::create_dir_all(path)?;
        info!(dir = %path.display(), "created output directory");
    }
    Ok(())
}

/// Output path for a source PDF: the full file name plus `.json`.
pub fn output_path_for(output_dir: &Path, filename: &str) -> PathBuf {
    output_dir.join(format!("{filename}.json"))
}

pub fn write_embeddings(path: &Path, chunks: &[EmbeddedChunk]) -> Result<(), IngestError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, chunks).map_err(|source| IngestError::Json {
        path: path.display().to_string(),
        source,
    })?;
    writer.flush()?;
    Ok(())
}

pub fn read_embeddings(path: &Path) -> Result<Vec<EmbeddedChunk>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|source| IngestError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Concatenates every embedding file of `output_dir` in file-name order.
pub fn load_embedded_chunks(output_dir: &Path) -> Result<Vec<EmbeddedChunk>, IngestError> {
    let mut chunks = Vec::new();
    for path in discover_embedding_files(output_dir) {
        let file_chunks = read_embeddings(&path)?;
        info!(file = %path.display(), count = file_chunks.len(), "loaded embeddings");
        chunks.extend(file_chunks);
    }
    Ok(chunks)
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct EmbeddedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub skipped_chunks: Vec<SkippedChunk>,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub files: Vec<EmbeddedFile>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn embedded_total(&self) -> usize {
        self.files.iter().map(|file| file.embedded_count).sum()
    }

    pub fn skipped_chunk_total(&self) -> usize {
        self.files.iter().map(|file| file.skipped_chunks.len()).sum()
    }
}

/// Extracts, normalizes, chunks, and embeds every PDF in `data_dir`, one file
/// and one chunk at a time, writing `<name>.pdf.json` into `output_dir`.
///
/// An unreadable PDF is recorded in `skipped_files` and written out as an
/// empty document. Failing chunks are left out of that file's output.
pub async fn embed_folder<X, E>(
    extractor: &X,
    client: &E,
    data_dir: &Path,
    output_dir: &Path,
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError>
where
    X: PdfExtractor + ?Sized,
    E: EmbeddingClient + Sync + ?Sized,
{
    if !data_dir.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "data directory does not exist: {}",
            data_dir.display()
        )));
    }

    let files = discover_pdf_files(data_dir);
    info!(dir = %data_dir.display(), count = files.len(), "found pdf files");
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            data_dir.display()
        )));
    }

    ensure_output_dir(output_dir)?;
    let mut report = IngestionReport::default();

    for path in files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();

        let raw_text = match extractor.extract_text(&path) {
            Ok(text) => {
                info!(file = %path.display(), "extracted text");
                text
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "could not read pdf, treating as empty");
                report.skipped_files.push(SkippedPdf {
                    path: path.clone(),
                    reason: error.to_string(),
                });
                String::new()
            }
        };

        let chunks = build_document_chunks(&filename, &raw_text, config)?;
        let chunk_count = chunks.len();
        let embedded = embed_chunks(client, chunks).await;

        let output = output_path_for(output_dir, &filename);
        write_embeddings(&output, &embedded.embedded)?;
        info!(
            file = %output.display(),
            embedded = embedded.embedded.len(),
            skipped = embedded.skipped.len(),
            "embeddings written"
        );

        report.files.push(EmbeddedFile {
            source: path,
            output,
            chunk_count,
            embedded_count: embedded.embedded.len(),
            skipped_chunks: embedded.skipped,
        });
    }

    Ok(report)
}
