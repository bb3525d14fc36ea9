use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum VectorBackendKind {
    /// On-disk index under `LOCAL_INDEX_PATH`.
    Local,
    /// Managed Qdrant collection.
    Qdrant,
}

impl TryFrom<String> for VectorBackendKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(format!("unknown vector backend '{}' (expected 'local' or 'qdrant')", other)),
        }
    }
}

impl fmt::Display for VectorBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Qdrant => f.write_str("qdrant"),
        }
    }
}

/// Runtime settings, read from the environment (and `.env`).
///
/// Field names map to upper-cased environment variables, e.g. `server_port`
/// is read from `SERVER_PORT`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    #[serde(default = "default_backend")]
    pub vector_backend: VectorBackendKind,
    #[serde(default = "default_local_index_path")]
    pub local_index_path: PathBuf,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default)]
    pub qdrant_api_key: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,

    #[serde(default = "default_embedding_model_dir")]
    pub embedding_model_dir: PathBuf,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "default_llm_model")]
    pub llm_model_name: String,
    #[serde(default)]
    pub llm_temperature: f32,
    #[serde(default)]
    pub llm_max_tokens: Option<u32>,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default)]
    pub openai_api_key: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/pdf-qa")
}
fn default_max_upload_mb() -> usize {
    50
}
fn default_backend() -> VectorBackendKind {
    VectorBackendKind::Local
}
fn default_local_index_path() -> PathBuf {
    PathBuf::from("vector_index")
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_index_name() -> String {
    "pdf-documents".to_string()
}
fn default_embedding_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_top_k() -> usize {
    5
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Settings {
    /// Load `.env` if present, then read and validate the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let source = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        Self::from_config(source)
    }

    pub fn from_config(source: config::Config) -> Result<Self, ConfigError> {
        let settings: Settings = source.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.vector_backend == VectorBackendKind::Qdrant && self.qdrant_api_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("QDRANT_API_KEY"));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::invalid("INDEX_NAME", "must not be empty"));
        }
        if !self.llm_provider.eq_ignore_ascii_case("openai") {
            return Err(ConfigError::invalid(
                "LLM_PROVIDER",
                format!("unsupported provider '{}'", self.llm_provider),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::invalid("LLM_TEMPERATURE", "must be between 0.0 and 2.0"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("CHUNK_SIZE", "must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                "CHUNK_OVERLAP",
                format!("{} must be smaller than CHUNK_SIZE ({})", self.chunk_overlap, self.chunk_size),
            ));
        }
        if self.top_k == 0 {
            return Err(ConfigError::invalid("TOP_K", "must be greater than zero"));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::invalid("EMBEDDING_DIMENSION", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Configuration summary with secrets redacted, logged in debug mode.
    pub fn summary(&self) -> String {
        format!(
            "Server: {} (debug: {}, log level: {})\n\
             Uploads: temp dir {}, limit {} MB\n\
             Vector store: {} (index '{}', local path {}, qdrant {}, api key {})\n\
             Embeddings: {} ({} dims)\n\
             Chunking: size {}, overlap {}, top_k {}\n\
             LLM: {} / {} (temperature {}, base url {}, api key {})",
            self.bind_addr(),
            self.debug_mode,
            self.log_level,
            self.temp_dir.display(),
            self.max_upload_mb,
            self.vector_backend,
            self.index_name,
            self.local_index_path.display(),
            self.qdrant_url,
            redact(&self.qdrant_api_key),
            self.embedding_model_dir.display(),
            self.embedding_dimension,
            self.chunk_size,
            self.chunk_overlap,
            self.top_k,
            self.llm_provider,
            self.llm_model_name,
            self.llm_temperature,
            self.llm_base_url,
            redact(&self.openai_api_key),
        )
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.trim().is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
