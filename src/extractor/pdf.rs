/// Per-page text extraction via `lopdf`.
use std::path::Path;

use lopdf::Document;
use tracing::{debug, info};

use super::ExtractError;

/// Extract the text of every page, returning `(page_number, text)` pairs in
/// page order. Page numbers are 1-based.
pub fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>, ExtractError> {
    std::fs::metadata(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loading PDF: {}", path.display());
    let doc = Document::load(path).map_err(|source| ExtractError::Pdf {
        path: path.to_path_buf(),
        source,
    })?;

    let pages = doc.get_pages();
    let mut out = Vec::with_capacity(pages.len());
    for &page_number in pages.keys() {
        let text = doc
            .extract_text(&[page_number])
            .map_err(|source| ExtractError::Pdf {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Page {page_number}: {} chars", text.len());
        out.push((page_number, text));
    }

    Ok(out)
}
