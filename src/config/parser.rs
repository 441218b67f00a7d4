use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[source]
base-url = "https://www.example.com"
user-agent = "TestAgent/1.0"

[media]
max-concurrent-downloads = 4
max-attempts = 5

[storage]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.source.base_url, "https://www.example.com");
        assert_eq!(config.source.user_agent, "TestAgent/1.0");
        assert_eq!(config.media.max_concurrent_downloads, 4);
        assert_eq!(config.media.max_attempts, 5);
        // Defaults fill in the rest
        assert_eq!(config.media.base_delay_ms, 1000);
        assert_eq!(config.source.selectors.item, "div.node");
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert!(config.publisher.telegram.is_none());
    }

    #[test]
    fn test_load_config_with_telegram() {
        let config_content = r#"
[source]
base-url = "https://www.example.com"

[media]

[storage]
database-path = "./test.db"

[publisher.telegram]
bot-token = "123:abc"
chat-id = "@channel"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        let tg = config.publisher.telegram.unwrap();
        assert_eq!(tg.bot_token, "123:abc");
        assert_eq!(tg.chat_id, "@channel");
        assert_eq!(tg.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[source]
base-url = "not a url"

[media]

[storage]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
