//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.memory.trim_threshold_tokens == 0 {
        errors.push("memory.trim_threshold_tokens must be > 0".to_string());
    }
    if config.memory.summary_reserve_tokens >= config.memory.trim_threshold_tokens {
        errors.push(
            "memory.summary_reserve_tokens must be smaller than memory.trim_threshold_tokens"
                .to_string(),
        );
    }

    if config.database.url.trim().is_empty() {
        errors.push("database.url must not be empty".to_string());
    }

    if config.summarizer.enabled {
        if config.summarizer.api_key.trim().is_empty() {
            errors.push("summarizer.api_key is required when summarizer is enabled".to_string());
        }
        if config.summarizer.api_base.trim().is_empty() {
            errors.push("summarizer.api_base is required when summarizer is enabled".to_string());
        }
        if config.summarizer.model.trim().is_empty() {
            errors.push("summarizer.model is required when summarizer is enabled".to_string());
        }
        if config.summarizer.max_tokens == 0 {
            errors.push("summarizer.max_tokens must be > 0".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
