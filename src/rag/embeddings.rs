use anyhow::Result;
use fastembed::{TextEmbedding, UserDefinedEmbeddingModel, TokenizerFiles, InitOptionsUserDefined};
use std::path::Path;

/// Turns text into fixed-width vectors. Implementations are synchronous
/// and CPU-bound; callers run them on the blocking pool.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

pub struct EmbeddingGenerator {
    model: TextEmbedding,
    dimension: usize,
}

fn read_model_file(model_dir: &Path, name: &str) -> Result<Vec<u8>> {
    std::fs::read(model_dir.join(name))
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", name, e))
}

impl EmbeddingGenerator {
    /// Load a sentence-embedding ONNX model exported to `model_dir`.
    pub fn new(model_dir: &Path, dimension: usize) -> Result<Self> {
        tracing::info!("Initializing embedding model from {}...", model_dir.display());

        if !model_dir.exists() {
            anyhow::bail!("Model directory not found: {}", model_dir.display());
        }

        let onnx_file = read_model_file(model_dir, "model.onnx")?;
        let tokenizer_file = read_model_file(model_dir, "tokenizer.json")?;
        let config_file = read_model_file(model_dir, "config.json")?;
        let special_tokens_map_file = read_model_file(model_dir, "special_tokens_map.json")?;
        let tokenizer_config_file = read_model_file(model_dir, "tokenizer_config.json")?;

        let user_model = UserDefinedEmbeddingModel {
            onnx_file,
            tokenizer_files: TokenizerFiles {
                tokenizer_file,
                config_file,
                special_tokens_map_file,
                tokenizer_config_file,
            },
        };

        let model = TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
            .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))?;

        let generator = Self { model, dimension };
        let sample = generator.embed(vec!["dimension sample".to_string()])?;
        let actual = sample.first().map(Vec::len).unwrap_or(0);
        if actual != dimension {
            anyhow::bail!(
                "Embedding model produces {}-dimensional vectors but EMBEDDING_DIMENSION is {}",
                actual,
                dimension
            );
        }

        tracing::info!("Embedding model initialized ({} dims)", dimension);
        Ok(generator)
    }
}

impl Embedder for EmbeddingGenerator {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.model.embed(texts, None)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
