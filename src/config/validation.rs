//! Configuration validation
//!
//! Checks that a parsed configuration is internally consistent before any
//! component is constructed from it.

use crate::config::types::Config;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates a parsed configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is valid
/// * `Err(ConfigError)` - Validation failed with a description
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_base_url(&config.source.base_url)?;
    validate_selectors(config)?;

    if config.source.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be greater than 0".to_string(),
        ));
    }

    if config.media.max_concurrent_downloads == 0 {
        return Err(ConfigError::Validation(
            "max-concurrent-downloads must be greater than 0".to_string(),
        ));
    }

    if config.media.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "max-attempts must be greater than 0".to_string(),
        ));
    }

    if config.media.base_delay_ms > config.media.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) exceeds max-delay-ms ({})",
            config.media.base_delay_ms, config.media.max_delay_ms
        )));
    }

    if config.media.staging_dir == config.media.artifact_dir {
        return Err(ConfigError::Validation(
            "staging-dir and artifact-dir must differ".to_string(),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path must not be empty".to_string(),
        ));
    }

    if let Some(tg) = &config.publisher.telegram {
        if tg.bot_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "publisher.telegram.bot-token must not be empty".to_string(),
            ));
        }
        if tg.chat_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "publisher.telegram.chat-id must not be empty".to_string(),
            ));
        }
        validate_base_url(&tg.api_base)?;
    }

    config
        .server
        .bind
        .parse::<std::net::SocketAddr>()
        .map_err(|_| {
            ConfigError::Validation(format!("server.bind is not a socket address: {}", config.server.bind))
        })?;

    Ok(())
}

/// Checks that a URL parses and uses an http(s) scheme
fn validate_base_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(())
}

/// Checks that every configured CSS selector parses
fn validate_selectors(config: &Config) -> Result<(), ConfigError> {
    let selectors = &config.source.selectors;
    for (name, value) in [
        ("item", &selectors.item),
        ("title", &selectors.title),
        ("image", &selectors.image),
        ("description", &selectors.description),
    ] {
        if Selector::parse(value).is_err() {
            return Err(ConfigError::InvalidSelector(format!("{}: {}", name, value)));
        }
    }
    Ok(())
}
