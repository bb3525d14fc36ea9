use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pdf_qa::api::{self, AppState};
use pdf_qa::config::Settings;
use pdf_qa::indexer::chunker::RecursiveSplitter;
use pdf_qa::llm::OpenAIChat;
use pdf_qa::rag::qa::QAChain;
use pdf_qa::rag::RAGEngine;
use pdf_qa::tempfiles::TempStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // 設定読み込み (.env を含む)
    let settings = Settings::load().context("Invalid configuration")?;

    // ロギング初期化
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if settings.debug_mode {
        tracing::info!("Configuration:\n{}", settings.summary());
    }

    // コンポーネント初期化
    let rag = Arc::new(RAGEngine::from_settings(&settings).await?);
    tracing::info!("RAG engine initialized ({} backend)", rag.backend_name());

    let llm = Arc::new(OpenAIChat::new(
        &settings.llm_base_url,
        &settings.openai_api_key,
        &settings.llm_model_name,
        settings.llm_temperature,
        settings.llm_max_tokens,
    ));
    tracing::info!("Using {} via {}", settings.llm_model_name, settings.llm_base_url);

    let qa = QAChain::new(Arc::clone(&rag), llm, settings.top_k);
    let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap)?;

    let temp = TempStorage::new(&settings.temp_dir);
    temp.ensure_dir().await?;

    let bind_addr = settings.bind_addr();
    let state = Arc::new(AppState {
        settings,
        rag,
        qa,
        temp,
        splitter,
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
