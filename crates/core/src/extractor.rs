use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor {
    /// Returns the text of every page, concatenated in page order.
    fn extract_text(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut full_text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => full_text.push_str(&text),
                Err(error) => warn!(
                    file = %path.display(),
                    page = page_no,
                    %error,
                    "page text unreadable, treating as empty"
                ),
            }
        }

        debug!(file = %path.display(), chars = full_text.len(), "extracted pdf text");
        Ok(full_text)
    }
}

pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    LopdfExtractor.extract_text(path)
}
