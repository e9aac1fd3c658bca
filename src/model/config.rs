//! Run configuration
//!
//! Providers form a closed set selected once at run start. Tuning knobs are
//! loaded from an optional YAML file and overridable from the CLI; API keys
//! come from the environment with a provider-specific prefix check.

use std::fs;
use std::path::Path;

use serde::Deserialize;

const ENV_CONFIG_PATH: &str = "T3C_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "t3c.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API key not found in environment variable {0}")]
    MissingApiKey(&'static str),

    #[error("API key in {env_var} does not look like a {provider} key (expected prefix '{prefix}')")]
    InvalidApiKey {
        env_var: &'static str,
        provider: &'static str,
        prefix: &'static str,
    },
}

/// The supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::OpenRouter => "google/gemini-2.0-flash-001",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn api_key_prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "sk-",
            ProviderKind::OpenRouter => "sk-or-",
        }
    }

    /// Dollars per 10k input/output tokens for the default model.
    pub fn pricing(&self) -> Pricing {
        match self {
            ProviderKind::OpenAi => Pricing {
                input_per_10k: 0.1,
                output_per_10k: 0.3,
            },
            ProviderKind::OpenRouter => Pricing {
                input_per_10k: 0.0075,
                output_per_10k: 0.03,
            },
        }
    }

    /// Extra request headers required by the provider.
    pub fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProviderKind::OpenAi => &[],
            ProviderKind::OpenRouter => &[
                ("HTTP-Referer", "https://t3c.dev"),
                ("X-Title", "T3C Pipeline"),
            ],
        }
    }

    /// Read and validate the provider's API key from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        let env_var = self.api_key_env_var();
        let key = std::env::var(env_var).map_err(|_| ConfigError::MissingApiKey(env_var))?;
        if !key.starts_with(self.api_key_prefix()) {
            return Err(ConfigError::InvalidApiKey {
                env_var,
                provider: self.name(),
                prefix: self.api_key_prefix(),
            });
        }
        Ok(key)
    }
}

/// Per-10k-token pricing used for usage-based cost accounting.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_per_10k: f64,
    pub output_per_10k: f64,
}

impl Pricing {
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_10k
            + completion_tokens as f64 * self.output_per_10k)
            / 10_000.0
    }
}

/// YAML configuration file structure; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub claims_concurrency: Option<usize>,
    pub taxonomy_char_budget: Option<usize>,
    pub use_llm_dedup: Option<bool>,
    pub temperature: Option<f32>,
}

/// Resolved run-level configuration with documented defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub provider: ProviderKind,
    /// Model override; falls back to the provider default.
    pub model: Option<String>,
    /// Claims at or above this token-overlap similarity merge (0.0–1.0).
    pub similarity_threshold: f64,
    /// Transient-failure retries per gateway call.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Concurrent per-comment extraction calls.
    pub claims_concurrency: usize,
    /// Cap on corpus characters sent in the taxonomy call.
    pub taxonomy_char_budget: usize,
    /// Use a model call for duplicate clustering before the heuristic pass.
    pub use_llm_dedup: bool,
    pub temperature: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenRouter,
            model: None,
            similarity_threshold: 0.8,
            max_retries: 2,
            initial_backoff_ms: 500,
            request_timeout_secs: 120,
            claims_concurrency: 4,
            taxonomy_char_budget: 120_000,
            use_llm_dedup: true,
            temperature: 0.0,
        }
    }
}

impl RunConfig {
    /// Load configuration: defaults, overlaid with the optional YAML file.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = Self::load_config_file(&path).unwrap_or_default();
        Self::default().merged_with(file)
    }

    fn merged_with(mut self, file: ConfigFile) -> Self {
        if let Some(provider) = file.provider {
            self.provider = provider;
        }
        if file.model.is_some() {
            self.model = file.model;
        }
        if let Some(v) = file.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = file.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = file.initial_backoff_ms {
            self.initial_backoff_ms = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.claims_concurrency {
            self.claims_concurrency = v.max(1);
        }
        if let Some(v) = file.taxonomy_char_budget {
            self.taxonomy_char_budget = v;
        }
        if let Some(v) = file.use_llm_dedup {
            self.use_llm_dedup = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        self
    }

    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    pub fn resolved_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}
