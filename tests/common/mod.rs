#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use parking_lot::Mutex;

use pdf_qa::api::AppState;
use pdf_qa::config::Settings;
use pdf_qa::indexer::chunker::RecursiveSplitter;
use pdf_qa::llm::{ChatMessage, CompletionModel, LlmError};
use pdf_qa::rag::embeddings::Embedder;
use pdf_qa::rag::local_index::LocalIndex;
use pdf_qa::rag::qa::QAChain;
use pdf_qa::rag::RAGEngine;
use pdf_qa::tempfiles::TempStorage;

pub const DIM: usize = 64;

/// Hashes each word into a bucket, so texts sharing words score close.
pub struct WordHashEmbedder;

impl Embedder for WordHashEmbedder {
    fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                for word in text.split_whitespace() {
                    let word = word.to_lowercase();
                    let hash = word
                        .bytes()
                        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
                    v[hash as usize % DIM] += 1.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Returns a fixed reply, or a 503 when `fail` is set.
pub struct StubLlm {
    pub reply: String,
    pub fail: bool,
    pub calls: Mutex<usize>,
}

impl StubLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail: false,
            calls: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail: true,
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl CompletionModel for StubLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(LlmError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

pub fn test_settings(root: &Path, max_upload_mb: usize) -> Settings {
    let source = config::Config::builder()
        .set_override("openai_api_key", "test-key")
        .unwrap()
        .set_override("temp_dir", root.join("uploads").to_string_lossy().to_string())
        .unwrap()
        .set_override("local_index_path", root.join("index").to_string_lossy().to_string())
        .unwrap()
        .set_override("max_upload_mb", max_upload_mb as i64)
        .unwrap()
        .set_override("top_k", 3i64)
        .unwrap()
        .build()
        .unwrap();
    Settings::from_config(source).unwrap()
}

pub fn test_state(root: &Path, llm: Arc<StubLlm>) -> Arc<AppState> {
    test_state_with_limit(root, llm, 50)
}

pub fn test_state_with_limit(root: &Path, llm: Arc<StubLlm>, max_upload_mb: usize) -> Arc<AppState> {
    let settings = test_settings(root, max_upload_mb);
    let store = Arc::new(LocalIndex::open(&settings.local_index_path, DIM).unwrap());
    let rag = Arc::new(RAGEngine::new(Arc::new(WordHashEmbedder), store));
    let qa = QAChain::new(Arc::clone(&rag), llm, settings.top_k);
    let temp = TempStorage::new(&settings.temp_dir);
    let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap).unwrap();

    Arc::new(AppState {
        settings,
        rag,
        qa,
        temp,
        splitter,
    })
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn multipart_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "pdfqaboundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload_pdf")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Minimal PDF with one Helvetica text line per page. An empty string gives a
/// page with an empty content stream.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    );

    for (i, text) in pages.iter().enumerate() {
        let content = if text.is_empty() {
            String::new()
        } else {
            format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text)
        };
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

pub fn upload_dir_entries(state: &AppState) -> usize {
    std::fs::read_dir(state.temp.dir()).map(|d| d.count()).unwrap_or(0)
}
