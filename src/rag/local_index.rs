use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bincode::Options;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{DocumentChunk, ScoredChunk};
use super::vector_store::{check_embeddings, check_source, VectorBackend};

const INDEX_FILE: &str = "index.bin";

// HNSW parameters
const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 64;
const MIN_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Chunk table plus the HNSW graph over it. Graph data ids are positions
/// in `entries`.
struct Table {
    entries: Vec<IndexEntry>,
    graph: Hnsw<'static, f32, DistCosine>,
    capacity: usize,
}

impl Table {
    fn build(entries: Vec<IndexEntry>) -> Self {
        let capacity = (entries.len() * 2).max(MIN_CAPACITY);
        let graph = Hnsw::new(MAX_NB_CONNECTION, capacity, MAX_LAYER, EF_CONSTRUCTION, DistCosine {});
        for (i, entry) in entries.iter().enumerate() {
            graph.insert_slice((entry.vector.as_slice(), i));
        }
        Self {
            entries,
            graph,
            capacity,
        }
    }

    /// Append to the live graph when nothing existing changed and there is
    /// room; otherwise rebuild from scratch (HNSW graphs cannot drop nodes).
    fn advance(&mut self, entries: Vec<IndexEntry>, appended_from: Option<usize>) {
        match appended_from {
            Some(start) if start == self.entries.len() && entries.len() <= self.capacity => {
                for (i, entry) in entries.iter().enumerate().skip(start) {
                    self.graph.insert_slice((entry.vector.as_slice(), i));
                }
                self.entries = entries;
            }
            _ => *self = Table::build(entries),
        }
    }
}

/// Local approximate nearest-neighbour index.
///
/// Chunks and vectors are persisted with bincode to `<dir>/index.bin`; the
/// HNSW graph is rebuilt from that table on open and after deletes or
/// overwrites. Mutations write the new table to disk (temp file, then
/// rename) before the in-memory state changes, all under `write_lock`.
pub struct LocalIndex {
    dir: PathBuf,
    dimension: usize,
    table: RwLock<Table>,
    write_lock: Mutex<()>,
}

fn codec() -> impl Options {
    bincode::options().with_fixint_encoding().allow_trailing_bytes()
}

/// Where `chunks` land when merged into `entries`: overwrite by id, append otherwise.
/// Returns the first appended position, or `None` if an existing entry was overwritten.
fn merge_entries(entries: &mut Vec<IndexEntry>, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Option<usize> {
    let start = entries.len();
    let mut overwritten = false;
    let mut positions: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.chunk.id.clone(), i))
        .collect();

    for (chunk, vector) in chunks.iter().zip(embeddings.into_iter()) {
        let entry = IndexEntry {
            chunk: chunk.clone(),
            vector,
        };
        match positions.get(&chunk.id) {
            Some(&i) => {
                overwritten |= i < start;
                entries[i] = entry;
            }
            None => {
                positions.insert(chunk.id.clone(), entries.len());
                entries.push(entry);
            }
        }
    }

    if overwritten {
        None
    } else {
        Some(start)
    }
}

impl LocalIndex {
    /// Open the index stored in `dir`, creating an empty one if none exists.
    pub fn open(dir: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

        let path = dir.join(INDEX_FILE);
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read index file {}", path.display()))?;
            let snapshot: Snapshot = codec()
                .deserialize(&bytes)
                .with_context(|| format!("Corrupt index file {}", path.display()))?;
            if snapshot.dimension != dimension {
                anyhow::bail!(
                    "Index at {} was built with {}-dimensional embeddings, but {} are configured",
                    dir.display(),
                    snapshot.dimension,
                    dimension
                );
            }
            snapshot.entries
        } else {
            Vec::new()
        };

        tracing::info!("Local index opened at {} ({} chunks)", dir.display(), entries.len());

        Ok(Self {
            dir,
            dimension,
            table: RwLock::new(Table::build(entries)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current_entries(&self) -> Vec<IndexEntry> {
        self.table.read().entries.clone()
    }

    /// Persist `entries`, then make them live. Callers hold `write_lock`.
    async fn commit(&self, entries: Vec<IndexEntry>, appended_from: Option<usize>) -> Result<()> {
        let bytes = codec()
            .serialize(&SnapshotRef {
                dimension: self.dimension,
                entries: &entries,
            })
            .context("Failed to serialize local index")?;

        let path = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        self.table.write().advance(entries, appended_from);
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for LocalIndex {
    async fn upsert(&self, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<()> {
        check_embeddings(chunks, &embeddings, self.dimension)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.current_entries();
        let appended_from = merge_entries(&mut entries, chunks, embeddings);
        self.commit(entries, appended_from).await
    }

    async fn search(&self, query_vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query_vector.len() != self.dimension {
            anyhow::bail!(
                "query embedding dimension {} != {}",
                query_vector.len(),
                self.dimension
            );
        }

        let table = self.table.read();
        if table.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let k = top_k.min(table.entries.len());
        let neighbours = table.graph.search(&query_vector, k, EF_SEARCH.max(k));

        let mut results: Vec<ScoredChunk> = neighbours
            .into_iter()
            .filter_map(|n| {
                table.entries.get(n.d_id).map(|entry| ScoredChunk {
                    chunk: entry.chunk.clone(),
                    // cosine distance -> similarity
                    score: 1.0 - n.distance,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    /// Linear scan that rebuilds the table (and graph) without the document's chunks.
    async fn delete_document(&self, file_name: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.current_entries();
        let before = entries.len();
        entries.retain(|e| e.chunk.source != file_name);
        let removed = before - entries.len();

        if removed > 0 {
            self.commit(entries, None).await?;
        }
        Ok(removed)
    }

    async fn replace(&self, file_name: &str, chunks: &[DocumentChunk], embeddings: Vec<Vec<f32>>) -> Result<usize> {
        check_source(file_name, chunks)?;
        check_embeddings(chunks, &embeddings, self.dimension)?;

        let _guard = self.write_lock.lock().await;
        let mut entries = self.current_entries();
        let before = entries.len();
        entries.retain(|e| e.chunk.source != file_name);
        let removed = before - entries.len();

        let appended_from = merge_entries(&mut entries, chunks, embeddings);
        let appended_from = if removed > 0 { None } else { appended_from };
        if removed > 0 || !chunks.is_empty() {
            self.commit(entries, appended_from).await?;
        }
        Ok(removed)
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.commit(Vec::new(), None).await
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
