use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Default upload ceiling: 500 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;
/// Fixed chunk target, in cl100k tokens.
pub const DEFAULT_CHUNK_TOKENS: usize = 512;
/// Token overlap carried between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 64;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the knowledge-base service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores chunk vectors.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding every chat type partition.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Document-analysis endpoint, e.g. `https://<resource>.cognitiveservices.azure.com`.
    pub extraction_endpoint: String,
    /// Subscription key for the document-analysis endpoint.
    pub extraction_api_key: String,
    /// API version sent with every analyze request.
    pub extraction_api_version: String,
    /// Upper bound on accepted upload sizes.
    pub max_upload_bytes: u64,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for OpenAI-compatible embedding endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible embedding endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Chunk size in tokens.
    pub text_splitter_chunk_size: usize,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Attempts made for transient upstream failures, including the first.
    pub retry_max_attempts: usize,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay_ms: u64,
    /// Documents processed concurrently during bulk repair.
    pub repair_concurrency: usize,
    /// Number of hits fetched when resolving citations by search.
    pub citation_top_k: usize,
    /// JSON file backing the document store.
    pub document_store_path: PathBuf,
    /// Root directory of the local blob store.
    pub blob_root: PathBuf,
    /// Directory of chat thread JSON files.
    pub chat_store_dir: PathBuf,
    /// JSON file listing known departments.
    pub departments_file: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic in-process hashing, no network.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider: EmbeddingProvider = load_env("EMBEDDING_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            extraction_endpoint: load_env("EXTRACTION_ENDPOINT")?,
            extraction_api_key: load_env("EXTRACTION_API_KEY")?,
            extraction_api_version: load_env_optional("EXTRACTION_API_VERSION")
                .unwrap_or_else(|| "2024-11-30".to_string()),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            embedding_provider,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?.parse().map_err(|_| {
                ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string())
            })?,
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_CHUNK_TOKENS),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            retry_max_attempts: parse_optional("RETRY_MAX_ATTEMPTS")?.unwrap_or(3),
            retry_base_delay_ms: parse_optional("RETRY_BASE_DELAY_MS")?.unwrap_or(500),
            repair_concurrency: parse_optional("REPAIR_CONCURRENCY")?.unwrap_or(4),
            citation_top_k: parse_optional("CITATION_TOP_K")?.unwrap_or(10),
            document_store_path: load_env_optional("DOCUMENT_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/documents.json")),
            blob_root: load_env_optional("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/blobs")),
            chat_store_dir: load_env_optional("CHAT_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/threads")),
            departments_file: load_env_optional("DEPARTMENTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/departments.json")),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        extraction_endpoint = %config.extraction_endpoint,
        embedding_provider = ?config.embedding_provider,
        chunk_size = config.text_splitter_chunk_size,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("hash".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert!("bogus".parse::<EmbeddingProvider>().is_err());
    }
}
