use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

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

/// Runtime configuration for the docuspace server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the vector index (Qdrant-compatible REST endpoint).
    pub index_url: String,
    /// Name of the index/collection that holds all document vectors.
    pub index_name: String,
    /// Optional API key required to access the vector index.
    pub index_api_key: Option<String>,
    /// Base URL of the embedding provider; the deterministic fallback is used when absent.
    pub embedding_url: Option<String>,
    /// Optional API key for the embedding provider.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Maximum number of simultaneous in-flight embedding requests.
    pub embedding_concurrency: usize,
    /// Base URL of the completion provider (OpenAI-compatible chat endpoint).
    pub completion_url: String,
    /// Optional API key for the completion provider.
    pub completion_api_key: Option<String>,
    /// Completion model used when a query does not select one.
    pub completion_model: String,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per query.
    pub search_top_k: usize,
    /// Maximum attempts for retryable provider calls.
    pub retry_max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff between attempts.
    pub retry_base_delay_ms: u64,
    /// Per-request deadline applied to every provider call, in seconds.
    pub provider_timeout_secs: u64,
    /// Path of the SQLite database backing the registry and conversation log.
    pub database_path: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            index_url: load_env("INDEX_URL")?,
            index_name: load_env_optional("INDEX_NAME").unwrap_or_else(|| "documents".into()),
            index_api_key: load_env_optional("INDEX_API_KEY"),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "sentence-transformers/all-MiniLM-L6-v2".into()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 384)?,
            embedding_concurrency: parse_or("EMBEDDING_CONCURRENCY", 5)?,
            completion_url: load_env("COMPLETION_URL")?,
            completion_api_key: load_env_optional("COMPLETION_API_KEY"),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| "llama3-70b-8192".into()),
            chunk_size: parse_or("CHUNK_SIZE", 800)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 100)?,
            search_top_k: parse_or("SEARCH_TOP_K", 4)?,
            retry_max_attempts: parse_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: parse_or("RETRY_BASE_DELAY_MS", 200)?,
            provider_timeout_secs: parse_or("PROVIDER_TIMEOUT_SECS", 30)?,
            database_path: load_env_optional("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/docuspace.db")),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        index_url = %config.index_url,
        index_name = %config.index_name,
        embedding_model = %config.embedding_model,
        completion_model = %config.completion_model,
        database_path = %config.database_path.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
