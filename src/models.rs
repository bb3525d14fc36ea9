use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// HTTP request/response schemas

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfUploadResponse {
    pub message: String,
    pub file_name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDocumentResponse {
    pub message: String,
    pub file_name: String,
    pub deleted_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub vector_backend: String,
    pub llm_model: String,
}

// Indexed content

/// One chunk of a PDF page, as stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// `"{source}_chunk_{chunk_index}"`
    pub id: String,
    pub text: String,
    /// File name of the uploaded document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    pub chunk_index: usize,
}

impl DocumentChunk {
    pub fn new(source: &str, chunk_index: usize, page: u32, text: String) -> Self {
        Self {
            id: chunk_id(source, chunk_index),
            text,
            source: source.to_string(),
            page,
            chunk_index,
        }
    }

    /// Citation label used in QA prompts and answer sources.
    pub fn source_label(&self) -> String {
        format!("{}#page={}", self.source, self.page)
    }
}

pub fn chunk_id(source: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", source, chunk_index)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}
