use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeleteCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, PointStruct, Range, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{DocumentChunk, ScoredChunk};

/// Storage side of the vector-store adapter. Both the managed and the local
/// index implement it, so the rest of the service never knows which is active.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Insert or overwrite chunks, keyed by `DocumentChunk::id`.
    async fn upsert(&self, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<()>;

    /// Nearest chunks to `query_vector`, best first.
    async fn search(&self, query_vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove every chunk whose `source` is `file_name`; returns how many were removed.
    async fn delete_document(&self, file_name: &str) -> Result<usize>;

    /// Swap the stored chunks of `file_name` for `chunks` in one step.
    /// On error the previous version stays searchable. Returns how many
    /// chunks the previous version had.
    async fn replace(&self, file_name: &str, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<usize>;

    /// Drop everything and start from an empty index.
    async fn reset(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub fn check_embeddings(chunks: &[DocumentChunk], embeddings: &[Vec<f32>], dimension: usize) -> Result<()> {
    if chunks.len() != embeddings.len() {
        anyhow::bail!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        );
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        anyhow::bail!("embedding dimension {} != {}", bad.len(), dimension);
    }
    Ok(())
}

pub fn check_source(file_name: &str, chunks: &[DocumentChunk]) -> Result<()> {
    if let Some(stray) = chunks.iter().find(|c| c.source != file_name) {
        anyhow::bail!("chunk {} does not belong to {}", stray.id, file_name);
    }
    Ok(())
}

/// Point ids must be UUIDs, so the chunk id is hashed into a stable v5 UUID.
fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
}

fn chunk_payload(chunk: &DocumentChunk) -> JsonMap<String, JsonValue> {
    let mut payload_map = JsonMap::new();
    payload_map.insert("text".to_string(), JsonValue::String(chunk.text.clone()));
    payload_map.insert("source".to_string(), JsonValue::String(chunk.source.clone()));
    payload_map.insert("page".to_string(), JsonValue::from(chunk.page));
    payload_map.insert("chunk_id".to_string(), JsonValue::String(chunk.id.clone()));
    payload_map.insert("chunk_index".to_string(), JsonValue::from(chunk.chunk_index as u64));
    payload_map
}

fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<DocumentChunk> {
    let text = payload.get("text")?.as_str()?.clone();
    let source = payload.get("source")?.as_str()?.clone();
    let page = payload.get("page").and_then(|v| v.as_integer()).unwrap_or(0) as u32;
    let chunk_index = payload.get("chunk_index").and_then(|v| v.as_integer()).unwrap_or(0) as usize;
    let id = payload
        .get("chunk_id")
        .and_then(|v| v.as_str())
        .cloned()
        .unwrap_or_else(|| crate::models::chunk_id(&source, chunk_index));

    Some(DocumentChunk {
        id,
        text,
        source,
        page,
        chunk_index,
    })
}

/// Managed vector database backend (Qdrant Cloud or a self-hosted cluster).
pub struct QdrantBackend {
    client: Qdrant,
    collection_name: String,
    dimension: usize,
    /// Serializes replace/delete per document name.
    source_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QdrantBackend {
    pub async fn new(url: &str, api_key: Option<String>, collection_name: &str, dimension: usize) -> Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let client = match Qdrant::from_url(url).api_key(api_key).build() {
            Ok(c) => {
                tracing::info!("Qdrant client built successfully");
                c
            }
            Err(e) => {
                tracing::error!("Qdrant client build failed: {:?}", e);
                anyhow::bail!("Qdrant client build failed: {}", e);
            }
        };

        let store = Self {
            client,
            collection_name: collection_name.to_string(),
            dimension,
            source_locks: parking_lot::Mutex::new(HashMap::new()),
        };

        tracing::info!("Checking Qdrant collection '{}'...", store.collection_name);
        if let Err(e) = store.ensure_collection().await {
            tracing::error!("Qdrant ensure_collection failed: {:?}", e);
            return Err(e);
        }
        tracing::info!("Qdrant collection ready");

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.client.collection_exists(&self.collection_name).await? {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine)),
                )
                .await?;
        }
        Ok(())
    }

    fn source_filter(file_name: &str) -> Filter {
        Filter::must([Condition::matches("source", file_name.to_string())])
    }

    /// Chunks of `file_name` numbered `keep` or higher, i.e. the tail a
    /// shorter re-upload leaves behind.
    fn stale_filter(file_name: &str, keep: usize) -> Filter {
        Filter::must([
            Condition::matches("source", file_name.to_string()),
            Condition::range(
                "chunk_index",
                Range {
                    gte: Some(keep as f64),
                    ..Default::default()
                },
            ),
        ])
    }

    fn source_lock(&self, file_name: &str) -> Arc<Mutex<()>> {
        self.source_locks
            .lock()
            .entry(file_name.to_string())
            .or_default()
            .clone()
    }

    async fn count_matching(&self, filter: Filter) -> Result<usize> {
        Ok(self
            .client
            .count(
                CountPointsBuilder::new(&self.collection_name)
                    .filter(filter)
                    .exact(true),
            )
            .await?
            .result
            .map(|r| r.count as usize)
            .unwrap_or(0))
    }

    async fn delete_matching(&self, filter: Filter) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(filter)
                    .wait(true),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn upsert(&self, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<()> {
        check_embeddings(chunks, &embeddings, self.dimension)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings.into_iter())
            .map(|(chunk, embedding)| PointStruct::new(point_id(&chunk.id), embedding, chunk_payload(chunk)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await?;

        Ok(())
    }

    async fn search(&self, query_vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_vector, top_k as u64)
                    .with_payload(true),
            )
            .await?;

        let mut results = Vec::new();
        for point in search_result.result {
            match chunk_from_payload(&point.payload) {
                Some(chunk) => results.push(ScoredChunk { chunk, score: point.score }),
                None => tracing::warn!("Skipping Qdrant point without text/source payload"),
            }
        }

        Ok(results)
    }

    async fn delete_document(&self, file_name: &str) -> Result<usize> {
        let lock = self.source_lock(file_name);
        let _guard = lock.lock().await;

        let count = self.count_matching(Self::source_filter(file_name)).await?;
        if count > 0 {
            self.delete_matching(Self::source_filter(file_name)).await?;
        }
        Ok(count)
    }

    /// Upsert first, then prune the stale tail. Chunk ids are positional, so
    /// the upsert overwrites the old points in place and a failure midway
    /// never leaves the document missing.
    async fn replace(&self, file_name: &str, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<usize> {
        check_source(file_name, chunks)?;
        check_embeddings(chunks, &embeddings, self.dimension)?;

        let lock = self.source_lock(file_name);
        let _guard = lock.lock().await;

        let previous = self.count_matching(Self::source_filter(file_name)).await?;
        self.upsert(chunks, embeddings).await?;

        let stale = Self::stale_filter(file_name, chunks.len());
        if self.count_matching(stale.clone()).await? > 0 {
            self.delete_matching(stale).await?;
        }
        Ok(previous)
    }

    async fn reset(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection_name).await? {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(&self.collection_name))
                .await?;
        }
        self.ensure_collection().await
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}
