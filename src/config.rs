//! TOML configuration parsing, environment overrides and validation.
//!
//! The configuration is read once at start-up into an immutable [`Config`]
//! and shared as `Arc<Config>`. Nothing reads process-wide state after that.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file,
//! environment variables. Credentials are only ever taken from the
//! environment and held as [`SecretString`].
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [helpdesk]
//! base_url = "http://localhost:3000"
//! mode = "account"          # or "public"
//! history_messages = 10
//!
//! [llm]
//! base_url = "https://openrouter.ai/api/v1"
//! model = "openai/gpt-4o-mini"
//!
//! [rag]
//! enabled = true
//! store_path = "rag_store.jsonl"
//! top_k = 4
//!
//! [tools]
//! enabled = true
//! config_path = "tools.json"
//! max_tool_rounds = 2
//! ```

use anyhow::{bail, Context, Result};
use relay_core::models::AddressMode;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./config/relay.toml";

const DEFAULT_SYSTEM_PROMPT: &str = "You are the official customer support assistant. \
Always answer politely, concisely and honestly. If a question is ambiguous, ask a clarifying \
question instead of guessing, and say so explicitly when information is not confirmed.";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub helpdesk: HelpdeskConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

/// Credentials, environment-only.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub helpdesk_api_token: Option<SecretString>,
    pub llm_api_key: Option<SecretString>,
    /// Falls back to `llm_api_key` when unset.
    pub embedding_api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HelpdeskConfig {
    #[serde(default = "default_helpdesk_url")]
    pub base_url: String,
    #[serde(default)]
    pub mode: AddressMode,
    /// Public-mode inbox identifier used when the webhook carries none.
    #[serde(default)]
    pub inbox_identifier: Option<String>,
    #[serde(default = "default_history_messages")]
    pub history_messages: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HelpdeskConfig {
    fn default() -> Self {
        Self {
            base_url: default_helpdesk_url(),
            mode: AddressMode::Account,
            inbox_identifier: None,
            history_messages: default_history_messages(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_helpdesk_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_history_messages() -> i64 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_llm_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Defaults to `[llm].base_url`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embed_model(),
            base_url: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            store_path: default_store_path(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("rag_store.jsonl")
}
fn default_top_k() -> usize {
    4
}
fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    120
}
fn default_exclude_globs() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "pdf"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            system_prompt_path: None,
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tools_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: i64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            config_path: default_tools_path(),
            tool_choice: default_tool_choice(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_tools_path() -> PathBuf {
    PathBuf::from("tools.json")
}
fn default_tool_choice() -> String {
    "auto".to_string()
}
fn default_max_tool_rounds() -> i64 {
    2
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Compact,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Base URL for the embeddings endpoint.
    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.llm.base_url)
    }

    /// Embedding credential, falling back to the chat credential.
    pub fn embedding_api_key(&self) -> Option<&SecretString> {
        self.secrets
            .embedding_api_key
            .as_ref()
            .or(self.secrets.llm_api_key.as_ref())
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    ///
    /// Blank values are ignored. Names match the `.env` variables used by
    /// existing deployments (`OPENAI_MODEL`, `RAG_TOP_K`, ...).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HELPDESK_API_TOKEN").or_else(|| get("CHATWOOT_API_TOKEN")) {
            self.secrets.helpdesk_api_token = Some(v.into());
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.secrets.llm_api_key = Some(v.into());
        }
        if let Some(v) = get("EMBEDDING_API_KEY") {
            self.secrets.embedding_api_key = Some(v.into());
        }

        if let Some(v) = get("CHATWOOT_BASE_URL") {
            self.helpdesk.base_url = v;
        }
        if let Some(v) = get("CHATWOOT_MODE") {
            self.helpdesk.mode = parse_mode(&v)?;
        }
        if let Some(v) = get("CHATWOOT_INBOX_IDENTIFIER") {
            self.helpdesk.inbox_identifier = Some(v);
        }
        if let Some(v) = get("HISTORY_MESSAGES") {
            self.helpdesk.history_messages = parse_num("HISTORY_MESSAGES", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECONDS") {
            let secs: f64 = parse_num("REQUEST_TIMEOUT_SECONDS", &v)?;
            let secs = secs.ceil().max(1.0) as u64;
            self.helpdesk.timeout_secs = secs;
            self.llm.timeout_secs = secs;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("OPENAI_EMBED_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("SYSTEM_PROMPT") {
            self.prompt.system_prompt = v;
        }
        if let Some(v) = get("SYSTEM_PROMPT_PATH") {
            self.prompt.system_prompt_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RAG_ENABLED") {
            self.rag.enabled = parse_flag(&v);
        }
        if let Some(v) = get("RAG_STORE_PATH") {
            self.rag.store_path = PathBuf::from(v);
        }
        if let Some(v) = get("RAG_TOP_K") {
            self.rag.top_k = parse_num("RAG_TOP_K", &v)?;
        }
        if let Some(v) = get("RAG_CHUNK_SIZE") {
            self.rag.chunk_size = parse_num("RAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("RAG_CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_num("RAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("TOOLS_ENABLED") {
            self.tools.enabled = parse_flag(&v);
        }
        if let Some(v) = get("TOOLS_CONFIG_PATH") {
            self.tools.config_path = PathBuf::from(v);
        }
        if let Some(v) = get("TOOL_CHOICE") {
            self.tools.tool_choice = v;
        }
        if let Some(v) = get("MAX_TOOL_ROUNDS") {
            self.tools.max_tool_rounds = parse_num("MAX_TOOL_ROUNDS", &v)?;
        }
        if let Some(v) = get("RELAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.rag.chunk_size == 0 {
            bail!("rag.chunk_size must be > 0");
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            bail!("rag.chunk_overlap must be smaller than rag.chunk_size");
        }
        if self.rag.top_k < 1 {
            bail!("rag.top_k must be >= 1");
        }
        if self.embedding.batch_size < 1 {
            bail!("embedding.batch_size must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.timeout_secs == 0 || self.helpdesk.timeout_secs == 0 {
            bail!("timeout_secs must be > 0");
        }
        if self.helpdesk.base_url.trim().is_empty() {
            bail!("helpdesk.base_url must not be empty");
        }
        Ok(())
    }

    /// Fail unless the credentials needed to serve webhooks are present.
    pub fn require_serve_secrets(&self) -> Result<()> {
        if self.secrets.helpdesk_api_token.is_none() {
            bail!("Missing required env var: HELPDESK_API_TOKEN (or CHATWOOT_API_TOKEN)");
        }
        self.require_llm_key()
    }

    pub fn require_llm_key(&self) -> Result<()> {
        if self.secrets.llm_api_key.is_none() && self.secrets.embedding_api_key.is_none() {
            bail!("Missing required env var: OPENAI_API_KEY");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {}: '{}'", key, value))
}

fn parse_mode(value: &str) -> Result<AddressMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "account" => Ok(AddressMode::Account),
        "public" => Ok(AddressMode::Public),
        other => bail!("Unknown helpdesk mode: '{}'. Must be account or public.", other),
    }
}

/// Parse a TOML document into a [`Config`] without env overrides.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Load configuration for the process.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
/// used when present and built-in defaults otherwise. Environment
/// overrides are applied last, then the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => read_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_file(default)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
