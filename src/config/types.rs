use serde::Deserialize;

/// Main configuration structure for quote-tree
///
/// Every section is optional in the TOML file; missing sections and keys
/// fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
}

/// Remote API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base XRPC URL used for the session and every read call
    #[serde(rename = "service-url", default = "default_service_url")]
    pub service_url: String,

    /// Number of quotes requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Minimum time between two consecutive requests (milliseconds)
    #[serde(
        rename = "min-request-interval-ms",
        default = "default_min_request_interval"
    )]
    pub min_request_interval_ms: u64,

    /// Total attempts per request, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any retry delay (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// Crawl engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum depth below the seed for `crawl <uri>` (unbounded when absent)
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Number of failed attempts after which a post stays CRAWL_FAILED
    #[serde(rename = "max-failed-attempts", default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Maximum number of posts taken from the frontier per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Wall-clock bound for a single run (unbounded when absent)
    #[serde(rename = "max-run-seconds", default)]
    pub max_run_seconds: Option<u64>,

    /// Mark posts whose quote-count hint is zero as crawled without a fetch
    #[serde(rename = "skip-zero-quote-count", default = "default_true")]
    pub skip_zero_quote_count: bool,
}

/// Update pass configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateConfig {
    /// Only re-check posts last crawled at least this many minutes ago
    #[serde(rename = "min-age-minutes", default)]
    pub min_age_minutes: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email", default)]
    pub contact_email: Option<String>,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`, with the
    /// parenthesised part omitted when no contact details are configured.
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = [
            self.contact_url.as_ref().map(|u| format!("+{}", u)),
            self.contact_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

fn default_service_url() -> String {
    "https://bsky.social/xrpc".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_min_request_interval() -> u64 {
    250
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_max_failed_attempts() -> u32 {
    3
}

fn default_batch_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> String {
    "bangers.db".to_string()
}

fn default_crawler_name() -> String {
    "quote-tree".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout(),
            min_request_interval_ms: default_min_request_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_failed_attempts: default_max_failed_attempts(),
            batch_size: default_batch_size(),
            max_run_seconds: None,
            skip_zero_quote_count: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
            contact_email: None,
        }
    }
}
