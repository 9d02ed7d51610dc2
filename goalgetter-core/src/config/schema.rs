//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for goalgetter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Durable store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Summarization collaborator configuration
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Cumulative token estimate that triggers trimming
    #[serde(default = "default_trim_threshold")]
    pub trim_threshold_tokens: u32,
    /// Token headroom reserved for the synthetic summary message
    #[serde(default = "default_summary_reserve")]
    pub summary_reserve_tokens: u32,
}

fn default_trim_threshold() -> u32 {
    3000
}

fn default_summary_reserve() -> u32 {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            trim_threshold_tokens: default_trim_threshold(),
            summary_reserve_tokens: default_summary_reserve(),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL for the relational store
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://goalgetter.db?mode=rwc".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Summarization collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Whether history summarization is enabled; when disabled, trimming
    /// truncates instead
    #[serde(default)]
    pub enabled: bool,
    /// OpenAI-compatible API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_summary_model")]
    pub model: String,
    /// Completion budget for a summary
    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summary_max_tokens() -> u32 {
    512
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_summary_model(),
            max_tokens: default_summary_max_tokens(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
