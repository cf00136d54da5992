use crate::extract::FieldRule;
use serde::Deserialize;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvester: HarvesterConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub listing: ListingConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

/// Worker pool and paging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Number of concurrent detail-page workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Maximum number of items waiting for a worker
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: u32,

    /// First listing page to fetch
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Upper bound on listing pages fetched per run
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,
}

fn default_workers() -> u32 {
    1
}

fn default_queue_capacity() -> u32 {
    120
}

fn default_start_page() -> u32 {
    1
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            start_page: default_start_page(),
            max_pages: None,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP timeouts for a single request
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    6
}

fn default_connect_timeout_secs() -> u64 {
    3
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Where items are found on listing pages
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Listing page URL with a `{page}` placeholder
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Selector for one item element on a listing page
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Selector for the detail link inside an item element
    #[serde(rename = "link-selector")]
    pub link_selector: String,

    /// Attribute carrying the external id, on the link or else the item
    #[serde(rename = "id-attribute")]
    pub id_attribute: String,
}

impl ListingConfig {
    /// Builds the URL of a listing page
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the CSV table
    #[serde(rename = "csv-path")]
    pub csv_path: String,

    /// Column whose greatest value marks the newest stored row
    #[serde(rename = "order-column", default = "default_order_column")]
    pub order_column: String,
}

fn default_order_column() -> String {
    "date".to_string()
}
