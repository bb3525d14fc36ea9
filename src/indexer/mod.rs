pub mod chunker;
pub mod extractor;
pub mod walker;

use std::path::Path;

use anyhow::Result;

use crate::models::DocumentChunk;
use self::chunker::RecursiveSplitter;
use self::extractor::{extract_pages, PageText};

/// Load a PDF and split it into chunks numbered across the whole document.
pub fn process_pdf(path: &Path, file_name: &str, splitter: &RecursiveSplitter) -> Result<Vec<DocumentChunk>> {
    let pages = extract_pages(path)?;
    tracing::debug!("Extracted {} non-empty pages from {}", pages.len(), file_name);
    Ok(chunk_pages(&pages, file_name, splitter))
}

pub fn chunk_pages(pages: &[PageText], file_name: &str, splitter: &RecursiveSplitter) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for text in splitter.split(&page.text) {
            chunks.push(DocumentChunk::new(file_name, chunks.len(), page.page, text));
        }
    }
    chunks
}
