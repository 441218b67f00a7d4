//! Configuration loading, parsing and validation
//!
//! Configuration is read from a TOML file with kebab-case keys, validated
//! after parsing, and hashed so changes between runs can be detected.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, HealthConfig, MediaConfig, PublisherConfig, SelectorConfig, ServerConfig,
    SourceConfig, StorageConfig, TelegramConfig,
};
pub use validation::validate;
