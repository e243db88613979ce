//! TOML configuration with environment-driven secrets.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//! Secrets (connection string, API keys) never live in the file. The file
//! only names the environment variables they are read from.
//!
//! ```toml
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [llm]
//! provider = "groq"
//! model = "llama3-70b-8192"
//!
//! [storage]
//! container = "docs"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separator() -> String {
    "\n".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks handed to the LLM per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Characters of each source shown by the front end before `...`.
    #[serde(default = "default_source_preview_chars")]
    pub source_preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            source_preview_chars: default_source_preview_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_source_preview_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the key for the `openai` provider.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            api_key_env: default_openai_key_env(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    /// Overrides the provider's default endpoint (e.g. a proxy or local server).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure OpenAI deployment name.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            api_key_env: default_llm_key_env(),
            base_url: None,
            deployment: None,
            api_version: default_api_version(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "llama3-70b-8192".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_api_version() -> String {
    "2023-05-15".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_connection_string_env")]
    pub connection_string_env: String,
    #[serde(default = "default_container_env")]
    pub container_env: String,
    /// Container name; takes precedence over `container_env`.
    #[serde(default)]
    pub container: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string_env: default_connection_string_env(),
            container_env: default_container_env(),
            container: None,
        }
    }
}

fn default_connection_string_env() -> String {
    "AZURE_CONN_STRING".to_string()
}
fn default_container_env() -> String {
    "AZURE_CONTAINER_NAME".to_string()
}

impl StorageConfig {
    /// Connection string from the environment, if set and non-empty.
    pub fn connection_string(&self) -> Option<String> {
        non_empty_env(&self.connection_string_env)
    }

    /// Container name from the config file, else from the environment.
    pub fn container_name(&self) -> Option<String> {
        self.container
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| non_empty_env(&self.container_env))
    }
}

/// Value of `name` if it is set to something other than whitespace.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists; otherwise fall back to defaults unless the
/// caller insisted on that file.
pub fn load_or_default(path: &Path, required: bool) -> Result<Config> {
    if path.exists() || required {
        load_config(path)
    } else {
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if chunking.chunk_overlap >= chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            chunking.chunk_overlap,
            chunking.chunk_size
        );
    }
    if chunking.separator.is_empty() {
        bail!("chunking.separator must not be empty");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.llm.provider.as_str() {
        "groq" | "openai" => {}
        "azure" => {
            if config.llm.deployment.is_none() {
                bail!("llm.deployment must be set when provider is 'azure'");
            }
            if config.llm.base_url.is_none() {
                bail!("llm.base_url (the Azure OpenAI endpoint) must be set when provider is 'azure'");
            }
        }
        other => bail!(
            "Unknown llm provider: '{}'. Must be groq, openai, or azure.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_pipeline() {
        let cfg = Config::default();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.chunking.separator, "\n");
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.llm.model, "llama3-70b-8192");
        assert!((cfg.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.storage.connection_string_env, "AZURE_CONN_STRING");
        validate(&cfg).unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str("[chunking]\nchunk_size = 400\n").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 400);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.llm.provider, "groq");
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let cfg: Config =
            toml::from_str("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn azure_llm_requires_deployment() {
        let cfg: Config = toml::from_str(
            "[llm]\nprovider = \"azure\"\nbase_url = \"https://x.openai.azure.com\"\n",
        )
        .unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("deployment"));
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let cfg: Config = toml::from_str("[embedding]\nprovider = \"magic\"\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn missing_optional_file_falls_back() {
        let cfg = load_or_default(Path::new("/nonexistent/chx.toml"), false).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert!(load_or_default(Path::new("/nonexistent/chx.toml"), true).is_err());
    }

    #[test]
    fn container_from_file_wins() {
        let storage = StorageConfig {
            container: Some("docs".to_string()),
            container_env: "CHX_TEST_UNSET_CONTAINER_VAR".to_string(),
            ..StorageConfig::default()
        };
        assert_eq!(storage.container_name().as_deref(), Some("docs"));
    }
}
