//! Configuration management for product-speaker.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a partial file (or no file at all) still yields a usable config.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::CompletionError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub id: String,
    pub product_name: String,
    pub description: String,
    pub features: String,
    pub brand: String,
    pub price: String,
    pub discounted_price: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "uniq_id".into(),
            product_name: "product_name".into(),
            description: "description".into(),
            features: "product_specifications".into(),
            brand: "brand".into(),
            price: "retail_price".into(),
            discounted_price: "discounted_price".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
    pub columns: ColumnConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flipkart_com-ecommerce_sample.csv"),
            columns: ColumnConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub host: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n: u32,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    pub api_key_env: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            host: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            system_prompt: "You are a knowledgeable product seller.".into(),
            max_tokens: 100,
            temperature: 0.5,
            n: 1,
            timeout_secs: 60,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

impl OpenAiConfig {
    /// Resolve the API key: inline config value first, then the named env var.
    pub fn resolve_api_key(&self) -> Result<String, CompletionError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or_else(|| CompletionError::MissingApiKey(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub host: String,
    pub lang: String,
    pub slow: bool,
    pub output_path: PathBuf,
    pub playback: bool,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "https://translate.google.com".into(),
            lang: "en".into(),
            slow: false,
            output_path: PathBuf::from("response.mp3"),
            playback: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub prompt: String,
    pub exit_keyword: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt: "Please enter the Product ID (or type 'exit' to quit): ".into(),
            exit_keyword: "exit".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl HistoryConfig {
    /// Directory for turn logs, falling back to ~/.product-speaker-history.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".product-speaker-history")
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub openai: OpenAiConfig,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/product-speaker/config.yaml
    /// 3. /etc/product-speaker/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/product-speaker/config.yaml")),
                Some(PathBuf::from("/etc/product-speaker/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }
}
