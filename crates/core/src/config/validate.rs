use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Retry delays are positive and the cap is not below the base
/// - Attempt timeout and event channel capacity are positive
/// - An enabled secondary provider has an API key
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let retry = &config.retry;
    if retry.base_delay_ms == 0 {
        return Err(ConfigError::ValidationError(
            "retry.base_delay_ms cannot be 0".to_string(),
        ));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ConfigError::ValidationError(format!(
            "retry.max_delay_ms ({}) must be >= retry.base_delay_ms ({})",
            retry.max_delay_ms, retry.base_delay_ms
        )));
    }
    if retry.attempt_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "retry.attempt_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.events.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "events.channel_capacity cannot be 0".to_string(),
        ));
    }

    if let Some(secondary) = &config.providers.secondary {
        if secondary.enabled && secondary.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "providers.secondary.api_key must be set when the secondary provider is enabled"
                    .to_string(),
            ));
        }
    }

    Ok(())
}
