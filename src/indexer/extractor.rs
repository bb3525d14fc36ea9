use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const PDF_MAGIC: &[u8] = b"%PDF-";

// 3つ以上の連続改行
static BLANK_LINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").unwrap());

// 行末の空白
static TRAILING_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extract the text of every page that has any. Page numbers start at 1.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>> {
    let mut header = [0u8; 5];
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open PDF: {}", path.display()))?;
    let read = file.read(&mut header)?;
    if !is_pdf(&header[..read]) {
        anyhow::bail!("Not a PDF file: {}", path.display());
    }

    let pages = pdf_extract::extract_text_by_pages(path)
        .with_context(|| format!("Failed to extract PDF text: {}", path.display()))?;

    Ok(number_pages(pages))
}

fn number_pages(pages: Vec<String>) -> Vec<PageText> {
    pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = normalize_page_text(&raw);
            if text.is_empty() {
                None
            } else {
                Some(PageText {
                    page: i as u32 + 1,
                    text,
                })
            }
        })
        .collect()
}

pub fn normalize_page_text(raw: &str) -> String {
    let text = raw.replace('\u{a0}', " ").replace("\r\n", "\n").replace('\r', "\n");
    let text = TRAILING_SPACES.replace_all(&text, "");
    let text = BLANK_LINE_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
