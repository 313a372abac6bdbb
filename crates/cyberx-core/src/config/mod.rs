//! Configuration management with file persistence
//!
//! Settings live in `config.toml`; API keys are read from the environment only.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capability::InvokePolicy;

/// Enables the primary collector
pub const COLLECTION_API_KEY_ENV: &str = "COLLECTION_API_KEY";

/// Enables the primary extractor and responder
pub const EXTRACTION_API_KEY_ENV: &str = "EXTRACTION_API_KEY";

/// Overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "CYBERX_CONFIG_DIR";

/// CyberX configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional JSON file replacing the built-in fallback dataset
    pub fallback_dataset: Option<PathBuf>,
    pub collection: CollectionConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Scraping API endpoint
    pub base_url: String,
    /// Topics to collect, in submission order (article URLs)
    pub topics: Vec<String>,
    pub max_reports: usize,
    /// Upper bound on concurrent per-topic workers
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic local feature hashing
    Hashing,
    /// Embeddings endpoint of the LLM API
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub dimensions: usize,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory holding `<product> #<version>.json` artifacts
    pub output_dir: PathBuf,
    pub product: String,
}

/// Recent threat reports used as default collection topics
const DEFAULT_TOPICS: &[&str] = &[
    "https://thehackernews.com/2025/12/chinese-hackers-have-started-exploiting.html",
    "https://thehackernews.com/2025/12/react2shell-exploitation-escalates-into.html",
    "https://thehackernews.com/2025/12/warning-winrar-vulnerability-cve-2025.html",
    "https://thehackernews.com/2025/12/threatsday-bulletin-spyware-alerts.html",
    "https://thehackernews.com/2025/12/chrome-targeted-by-active-in-wild.html",
    "https://thehackernews.com/2025/12/unpatched-gogs-zero-day-exploited.html",
    "https://thehackernews.com/2025/12/storm-0249-escalates-ransomware-attacks.html",
    "https://thehackernews.com/2025/12/nanoremote-malware-uses-google-drive.html",
    "https://thehackernews.com/2025/11/apt24-deploys-badaudio-in-years-long.html",
    "https://thehackernews.com/2025/08/charon-ransomware-hits-middle-east.html",
    "https://thehackernews.com/2025/12/5-threats-that-reshaped-web-security.html",
    "https://thehackernews.com/2025/12/microsoft-issues-security-fixes-for-56.html",
    "https://thehackernews.com/2025/12/critical-xxe-bug-cve-2025-66516-cvss.html",
    "https://thehackernews.com/2025/11/fortinet-warns-of-new-fortiweb-cve-2025.html",
    "https://thehackernews.com/2025/12/new-advanced-phishing-kits-use-ai-and.html",
];

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.zenrows.com/v1/".to_string(),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            max_reports: 15,
            concurrency: 4,
            timeout_secs: 60,
            retry_delay_ms: 500,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 60,
            retry_delay_ms: 500,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimensions: 384,
            model: "text-embedding-004".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_similarity: 0.2,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            product: "CyberX".to_string(),
        }
    }
}

impl CollectionConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        enforce_env_only(&self.api_key)?;
        Ok(non_blank_env(COLLECTION_API_KEY_ENV))
    }

    pub fn invoke_policy(&self) -> InvokePolicy {
        InvokePolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        enforce_env_only(&self.api_key)?;
        Ok(non_blank_env(EXTRACTION_API_KEY_ENV))
    }

    pub fn invoke_policy(&self) -> InvokePolicy {
        InvokePolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

/// Redact all but the last four characters of a key
pub fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        format!("***{}", chars[chars.len() - 4..].iter().collect::<String>())
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn enforce_env_only(key: &Option<String>) -> anyhow::Result<()> {
    if key.is_some() {
        return Err(anyhow!(
            "API keys must be provided via environment variables, not stored in configuration"
        ));
    }
    Ok(())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("cyberx")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let raw: toml::Table = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        for section in ["collection", "llm"] {
            if raw.get(section).and_then(|t| t.get("api_key")).is_some() {
                return Err(anyhow!(
                    "{}.api_key found in {}; API keys must be provided via environment variables",
                    section,
                    path.display()
                ));
            }
        }
        let config: Config = toml::Value::Table(raw)
            .try_into::<Config>()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        enforce_env_only(&self.collection.api_key)?;
        enforce_env_only(&self.llm.api_key)?;

        if self.collection.max_reports == 0 {
            return Err(anyhow!("collection.max_reports must be at least 1"));
        }
        if self.collection.concurrency == 0 {
            return Err(anyhow!("collection.concurrency must be at least 1"));
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be at least 1"));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(anyhow!(
                "retrieval.min_similarity must be within [-1, 1], got {}",
                self.retrieval.min_similarity
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(anyhow!("embedding.dimensions must be at least 1"));
        }
        if self.audit.product.trim().is_empty() || self.audit.product.contains('#') {
            return Err(anyhow!("audit.product must be non-empty and must not contain '#'"));
        }
        Ok(())
    }
}
