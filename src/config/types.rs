use serde::Deserialize;

/// Main configuration structure for Ferrotype
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub media: MediaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Content source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the source site (listing page)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// User agent string sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// CSS selectors that locate items on the listing page
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// CSS selectors used to parse the listing page.
///
/// The defaults match a Drupal-style photo blog; deployments against other
/// sources override them in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Selector matching one item node on the listing page
    #[serde(default = "default_item_selector")]
    pub item: String,

    /// Selector for the title link, relative to the item node
    #[serde(default = "default_title_selector")]
    pub title: String,

    /// Selector for image elements, relative to the item node
    #[serde(default = "default_image_selector")]
    pub image: String,

    /// Selector for the description paragraph, relative to the item node
    #[serde(default = "default_description_selector")]
    pub description: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: default_item_selector(),
            title: default_title_selector(),
            image: default_image_selector(),
            description: default_description_selector(),
        }
    }
}

/// Media download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Maximum number of concurrent media downloads per item
    #[serde(rename = "max-concurrent-downloads", default = "default_concurrency")]
    pub max_concurrent_downloads: u32,

    /// Maximum download attempts per media file (including the first)
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay in milliseconds (doubles per attempt)
    #[serde(rename = "base-delay-ms", default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Ceiling on the retry delay in milliseconds
    #[serde(rename = "max-delay-ms", default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Directory downloads are staged in before an item completes
    #[serde(rename = "staging-dir", default = "default_staging_dir")]
    pub staging_dir: String,

    /// Directory completed artifacts are moved into
    #[serde(rename = "artifact-dir", default = "default_artifact_dir")]
    pub artifact_dir: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Publisher configuration; absent sections mean items are stored but
/// handed to the null publisher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherConfig {
    pub telegram: Option<TelegramConfig>,
}

/// Telegram channel publisher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(rename = "bot-token")]
    pub bot_token: String,

    /// Target channel/chat id (e.g. "@mychannel" or "-1001234567890")
    #[serde(rename = "chat-id")]
    pub chat_id: String,

    /// Bot API base URL, overridable for testing
    #[serde(rename = "api-base", default = "default_telegram_api")]
    pub api_base: String,
}

/// HTTP server configuration for the health/metrics endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server
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

/// Health derivation thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Hours without a successful cycle before health degrades
    #[serde(rename = "staleness-hours", default = "default_staleness")]
    pub staleness_hours: u64,

    /// Item-level failures in one cycle above which health degrades
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            staleness_hours: default_staleness(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_user_agent() -> String {
    format!("Ferrotype/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_item_selector() -> String {
    "div.node".to_string()
}

fn default_title_selector() -> String {
    "h2.nodetitle a".to_string()
}

fn default_image_selector() -> String {
    "div.content img".to_string()
}

fn default_description_selector() -> String {
    "div.content p".to_string()
}

fn default_concurrency() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_staging_dir() -> String {
    "./staging".to_string()
}

fn default_artifact_dir() -> String {
    "./artifacts".to_string()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_staleness() -> u64 {
    48
}

fn default_failure_threshold() -> u64 {
    3
}
