use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path as UrlPath, State,
    },
    http::Method,
    response::Html,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::error::AppError;
use crate::indexer::chunker::RecursiveSplitter;
use crate::indexer::extractor::is_pdf;
use crate::indexer::process_pdf;
use crate::models::{
    AnswerRequest, AnswerResponse, DeleteDocumentResponse, HealthResponse, MessageResponse,
    PdfUploadResponse, SearchRequest, SearchResult,
};
use crate::rag::qa::QAChain;
use crate::rag::RAGEngine;
use crate::tempfiles::{sanitize_file_name, TempStorage};

pub struct AppState {
    pub settings: Settings,
    pub rag: Arc<RAGEngine>,
    pub qa: QAChain,
    pub temp: TempStorage,
    pub splitter: RecursiveSplitter,
}

pub fn router(state: Arc<AppState>) -> Router {
    // CORS設定
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_page))
        .route("/upload_pdf", post(upload_pdf_handler))
        .route("/search", post(search_handler))
        .route("/answer", post(answer_handler))
        .route("/documents", delete(reset_index_handler))
        .route("/documents/:file_name", delete(delete_document_handler))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn require_query(query: &str) -> Result<&str, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query must not be empty".to_string()));
    }
    Ok(query)
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PdfUploadResponse>, AppError> {
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = sanitize_file_name(field.file_name().unwrap_or_default());
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| {
        AppError::BadRequest("No file uploaded; expected a multipart field named 'file'".to_string())
    })?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest(format!("Uploaded file {} is empty", file_name)));
    }
    if !is_pdf(&bytes) {
        return Err(AppError::BadRequest(format!("Uploaded file {} is not a PDF", file_name)));
    }

    let temp_path = state
        .temp
        .save(&bytes, &file_name)
        .await
        .map_err(|e| AppError::internal("Error processing PDF", e))?;

    let result = ingest_pdf(&state, &temp_path, &file_name).await;
    state.temp.delete(&temp_path).await;
    let chunks = result?;

    Ok(Json(PdfUploadResponse {
        message: "PDF processed and indexed successfully".to_string(),
        file_name,
        chunks,
    }))
}

async fn ingest_pdf(state: &AppState, path: &Path, file_name: &str) -> Result<usize, AppError> {
    let splitter = state.splitter;
    let path_owned = path.to_path_buf();
    let name = file_name.to_string();

    // pdf-extract panics on some malformed files; the join error turns that into a 500.
    let chunks = tokio::task::spawn_blocking(move || process_pdf(&path_owned, &name, &splitter))
        .await
        .map_err(|e| AppError::internal("Error processing PDF", anyhow::anyhow!("PDF extraction panicked: {}", e)))?
        .map_err(|e| AppError::internal("Error processing PDF", e))?;

    if chunks.is_empty() {
        return Err(AppError::Unprocessable(format!(
            "No extractable text found in {}",
            file_name
        )));
    }

    state
        .rag
        .replace_document(file_name, &chunks)
        .await
        .map_err(|e| AppError::internal("Error processing PDF", e))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResult>, AppError> {
    let Json(request) = payload?;
    let query = require_query(&request.query)?;

    let results = state
        .rag
        .search(query, state.settings.top_k)
        .await
        .map_err(|e| AppError::internal("Error searching documents", e))?;

    Ok(Json(SearchResult { results }))
}

async fn answer_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(request) = payload?;
    let query = require_query(&request.query)?;

    let answer = state
        .qa
        .answer_question(query)
        .await
        .map_err(|e| AppError::internal("Error answering question", e))?;

    Ok(Json(answer))
}

async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(file_name): UrlPath<String>,
) -> Result<Json<DeleteDocumentResponse>, AppError> {
    let file_name = sanitize_file_name(&file_name);
    let deleted_chunks = state
        .rag
        .delete_document(&file_name)
        .await
        .map_err(|e| AppError::internal("Error deleting document", e))?;

    let message = if deleted_chunks > 0 {
        "Document deleted successfully".to_string()
    } else {
        "No indexed chunks found for this document".to_string()
    };

    Ok(Json(DeleteDocumentResponse {
        message,
        file_name,
        deleted_chunks,
    }))
}

async fn reset_index_handler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, AppError> {
    state
        .rag
        .reset()
        .await
        .map_err(|e| AppError::internal("Error resetting index", e))?;

    Ok(Json(MessageResponse {
        message: "Index reset successfully".to_string(),
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        vector_backend: state.rag.backend_name().to_string(),
        llm_model: state.qa.model_name().to_string(),
    })
}
