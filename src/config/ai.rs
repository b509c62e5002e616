// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

pub const DEFAULT_LLM_CONFIG_PATH: &str = "config/ai.json";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_daily_limit() -> u32 {
    200
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_timeout_ms() -> u64 {
    20_000
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/llm")
}

/// LLM collaborator settings, loaded from `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Real (uncached) calls allowed per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Chat completions endpoint; override for OpenAI-compatible gateways.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
            cache_dir: default_cache_dir(),
            endpoint: None,
        }
    }
}

impl LlmConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: LlmConfig = serde_json::from_str(&data)?;
        cfg.resolve()
    }

    /// Load `config/ai.json` if it exists, otherwise a disabled default.
    pub fn load_or_default() -> anyhow::Result<Self> {
        if Path::new(DEFAULT_LLM_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_LLM_CONFIG_PATH)
        } else {
            Ok(Self::default())
        }
    }

    /// Normalize the provider name and resolve an `"ENV"` api key.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" if self.enabled => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "openai" | "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if self.timeout_ms == 0 {
            self.timeout_ms = default_timeout_ms();
        }
        Ok(self)
    }
}
