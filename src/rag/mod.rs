pub mod embeddings;
pub mod local_index;
pub mod qa;
pub mod vector_store;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Settings, VectorBackendKind};
use crate::models::{DocumentChunk, ScoredChunk};
use self::embeddings::{Embedder, EmbeddingGenerator};
use self::local_index::LocalIndex;
use self::vector_store::{QdrantBackend, VectorBackend};

const EMBED_BATCH_SIZE: usize = 32;

/// Vector-store adapter: embeds text and hands vectors to whichever backend
/// is configured.
pub struct RAGEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorBackend>,
}

impl RAGEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorBackend>) -> Self {
        Self { embedder, store }
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let model_dir = settings.embedding_model_dir.clone();
        let dimension = settings.embedding_dimension;
        let embedder = tokio::task::spawn_blocking(move || EmbeddingGenerator::new(&model_dir, dimension))
            .await
            .context("Embedding model loader panicked")??;

        let store: Arc<dyn VectorBackend> = match settings.vector_backend {
            VectorBackendKind::Local => Arc::new(LocalIndex::open(&settings.local_index_path, dimension)?),
            VectorBackendKind::Qdrant => Arc::new(
                QdrantBackend::new(
                    &settings.qdrant_url,
                    Some(settings.qdrant_api_key.clone()),
                    &settings.index_name,
                    dimension,
                )
                .await?,
            ),
        };

        Ok(Self::new(Arc::new(embedder), store))
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed(texts))
            .await
            .context("Embedding task panicked")??;
        if vectors.len() != expected {
            anyhow::bail!("Embedder returned {} vectors for {} texts", vectors.len(), expected);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .context("Embedder returned no vector for the query")
    }

    /// Embed and store chunks. Returns the number of chunks written.
    pub async fn add_documents(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embed(texts).await?;
            self.store.upsert(batch, embeddings).await?;
        }
        if let Some(first) = chunks.first() {
            tracing::info!(
                "Successfully added {} chunks from {} to the {} index",
                chunks.len(),
                first.source,
                self.backend_name()
            );
        }
        Ok(chunks.len())
    }

    /// Swap whatever was indexed for `file_name` for `chunks`.
    ///
    /// Every chunk is embedded before the store is touched, so a failed
    /// embedding leaves the previous version searchable.
    pub async fn replace_document(&self, file_name: &str, chunks: &[DocumentChunk]) -> Result<usize> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            embeddings.extend(self.embed(texts).await?);
        }

        let removed = self.store.replace(file_name, chunks, embeddings).await?;
        tracing::info!(
            "Indexed {} chunks of {} in the {} index ({} previous chunks replaced)",
            chunks.len(),
            file_name,
            self.backend_name(),
            removed
        );
        Ok(chunks.len())
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embed_query(query).await?;
        self.store.search(query_vector, top_k).await
    }

    /// Semantic search returning the matching chunk texts, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let results = self.retrieve(query, top_k).await?;
        Ok(results.into_iter().map(|r| r.chunk.text).collect())
    }

    pub async fn delete_document(&self, file_name: &str) -> Result<usize> {
        let removed = self.store.delete_document(file_name).await?;
        tracing::info!("Deleted {} chunks of {} from the {} index", removed, file_name, self.backend_name());
        Ok(removed)
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await?;
        tracing::info!("{} index reset", self.backend_name());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words hashing embedder: texts that share words end up close.
    pub(crate) struct WordHashEmbedder {
        pub calls: AtomicUsize,
    }

    pub(crate) const DIM: usize = 64;

    impl WordHashEmbedder {
        pub fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    impl Embedder for WordHashEmbedder {
        fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; DIM];
                    for word in text.split_whitespace() {
                        let word = word.to_lowercase();
                        let hash = word.bytes().fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
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

    pub(crate) fn engine(dir: &std::path::Path) -> (RAGEngine, Arc<WordHashEmbedder>) {
        let embedder = Arc::new(WordHashEmbedder::new());
        let store = Arc::new(LocalIndex::open(dir, DIM).unwrap());
        (RAGEngine::new(embedder.clone(), store), embedder)
    }

    fn chunks(source: &str, texts: &[&str]) -> Vec<DocumentChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk::new(source, i, 1, t.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_search_returns_relevant_text_first() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path());
        engine
            .add_documents(&chunks(
                "pump.pdf",
                &["the pump needs oil every month", "valves are made of brass", "invoices are due friday"],
            ))
            .await
            .unwrap();

        let results = engine.search("how often does the pump need oil", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], "the pump needs oil every month");
    }

    #[tokio::test]
    async fn test_add_documents_batches_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, embedder) = engine(dir.path());
        let texts: Vec<String> = (0..70).map(|i| format!("chunk number {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let added = engine.add_documents(&chunks("big.pdf", &refs)).await.unwrap();
        assert_eq!(added, 70);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_documents_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, embedder) = engine(dir.path());
        assert_eq!(engine.add_documents(&[]).await.unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_document_drops_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path());
        engine
            .add_documents(&chunks("guide.pdf", &["first edition intro", "first edition appendix"]))
            .await
            .unwrap();
        engine
            .replace_document("guide.pdf", &chunks("guide.pdf", &["second edition intro"]))
            .await
            .unwrap();

        let results = engine.search("edition", 5).await.unwrap();
        assert_eq!(results, vec!["second edition intro".to_string()]);
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("onnx session failed")
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalIndex::open(dir.path(), DIM).unwrap());
        let working = RAGEngine::new(Arc::new(WordHashEmbedder::new()), store.clone());
        working
            .add_documents(&chunks("guide.pdf", &["first edition intro", "first edition appendix"]))
            .await
            .unwrap();

        let broken = RAGEngine::new(Arc::new(BrokenEmbedder), store.clone());
        let err = broken
            .replace_document("guide.pdf", &chunks("guide.pdf", &["second edition intro"]))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("onnx session failed"));

        assert_eq!(store.len(), 2);
        let results = working.search("first edition", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|t| t.starts_with("first edition")));
    }

    #[tokio::test]
    async fn test_concurrent_replaces_never_mix_versions() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path());
        let long: Vec<String> = (0..10).map(|i| format!("long version part {}", i)).collect();
        let short: Vec<String> = (0..5).map(|i| format!("short version part {}", i)).collect();
        let long_refs: Vec<&str> = long.iter().map(String::as_str).collect();
        let short_refs: Vec<&str> = short.iter().map(String::as_str).collect();
        let long_chunks = chunks("report.pdf", &long_refs);
        let short_chunks = chunks("report.pdf", &short_refs);

        for _ in 0..5 {
            let (a, b) = tokio::join!(
                engine.replace_document("report.pdf", &long_chunks),
                engine.replace_document("report.pdf", &short_chunks),
            );
            a.unwrap();
            b.unwrap();

            let results = engine.search("version part", 50).await.unwrap();
            let from_long = results.iter().filter(|t| t.starts_with("long")).count();
            let from_short = results.iter().filter(|t| t.starts_with("short")).count();
            assert!(
                (from_long == 10 && from_short == 0) || (from_long == 0 && from_short == 5),
                "mixed versions: {} long, {} short",
                from_long,
                from_short
            );
        }
    }

    #[tokio::test]
    async fn test_delete_document_only_touches_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(dir.path());
        engine.add_documents(&chunks("a.pdf", &["alpha text", "more alpha"])).await.unwrap();
        engine.add_documents(&chunks("b.pdf", &["beta text"])).await.unwrap();

        assert_eq!(engine.delete_document("a.pdf").await.unwrap(), 2);
        let results = engine.search("text", 5).await.unwrap();
        assert_eq!(results, vec!["beta text".to_string()]);
    }
}
