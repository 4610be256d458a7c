//! Configuration file support for dealscout
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/dealscout/config.toml` (user defaults)
//! 2. `.dealscout.toml` in the working directory (project overrides)
//!
//! CLI flags override all config file values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/dealscout/config.toml or .dealscout.toml
/// deals_path = "deals.json"
/// products_path = "qualifying-products.json"
/// cache_dir = ".dealscout/cache"
/// top_k = 20
/// encoder_endpoint = "http://127.0.0.1:8080/v1/embeddings"
/// encoder_model = "sentence-transformers/all-MiniLM-L6-v2"
/// expand = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deals document path (overridden by --deals)
    pub deals_path: Option<PathBuf>,
    /// Qualifying-products document path (overridden by --products)
    pub products_path: Option<PathBuf>,
    /// Embedding cache directory
    pub cache_dir: Option<PathBuf>,
    /// Default result limit (overridden by -n)
    pub top_k: Option<usize>,
    /// Embeddings endpoint (OpenAI-compatible)
    pub encoder_endpoint: Option<String>,
    /// Embedding model name sent to the endpoint
    pub encoder_model: Option<String>,
    /// Enable LLM query expansion when a key is configured
    pub expand: Option<bool>,
    /// Enable verbose logging by default
    pub verbose: Option<bool>,
}

impl Config {
    /// Load configuration from user and project config files
    pub fn load(project_root: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("dealscout/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&project_root.join(".dealscout.toml")).unwrap_or_default();

        // Project overrides user
        let merged = user_config.override_with(project_config);
        tracing::debug!(
            deals_path = ?merged.deals_path,
            products_path = ?merged.products_path,
            top_k = ?merged.top_k,
            expand = ?merged.expand,
            "Effective config after merge"
        );
        merged
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present)
    fn override_with(self, other: Self) -> Self {
        Config {
            deals_path: other.deals_path.or(self.deals_path),
            products_path: other.products_path.or(self.products_path),
            cache_dir: other.cache_dir.or(self.cache_dir),
            top_k: other.top_k.or(self.top_k),
            encoder_endpoint: other.encoder_endpoint.or(self.encoder_endpoint),
            encoder_model: other.encoder_model.or(self.encoder_model),
            expand: other.expand.or(self.expand),
            verbose: other.verbose.or(self.verbose),
        }
    }

    // ===== Accessors with defaults =====

    pub const DEFAULT_DEALS_PATH: &'static str = "deals.json";
    pub const DEFAULT_PRODUCTS_PATH: &'static str = "qualifying-products.json";
    pub const DEFAULT_CACHE_DIR: &'static str = ".dealscout/cache";
    pub const DEFAULT_ENCODER_ENDPOINT: &'static str = "http://127.0.0.1:8080/v1/embeddings";
    pub const DEFAULT_ENCODER_MODEL: &'static str = "sentence-transformers/all-MiniLM-L6-v2";

    pub fn deals_path_or_default(&self) -> PathBuf {
        self.deals_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DEALS_PATH))
    }

    pub fn products_path_or_default(&self) -> PathBuf {
        self.products_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_PRODUCTS_PATH))
    }

    pub fn cache_dir_or_default(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CACHE_DIR))
    }

    pub fn top_k_or_default(&self) -> usize {
        self.top_k.unwrap_or(crate::search::DEFAULT_TOP_K)
    }

    pub fn encoder_endpoint_or_default(&self) -> String {
        self.encoder_endpoint
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_ENCODER_ENDPOINT.to_string())
    }

    pub fn encoder_model_or_default(&self) -> String {
        self.encoder_model
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_ENCODER_MODEL.to_string())
    }

    pub fn expand_or_default(&self) -> bool {
        self.expand.unwrap_or(true)
    }

    pub fn verbose_or_default(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}
