//! Configuration management for polacquire.
//!
//! Settings come from a TOML file (`polacquire.toml` in the working
//! directory unless overridden on the CLI) with serde defaults for every
//! field, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name searched in the working directory.
pub const CONFIG_FILE: &str = "polacquire.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub portal: PortalSettings,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

/// Profile of one carrier portal: where it lives and how its result table
/// is shaped. Field-extraction pattern sets are dispatched separately by
/// `id` (see `scrape::extractor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSettings {
    /// Portal identifier, keys the field-extractor pattern set.
    #[serde(default = "default_portal_id")]
    pub id: String,

    /// Domain used to recognize an already-open portal tab.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Landing URL navigated to when no portal tab is open.
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Page-numbered results URL with a `{page}` placeholder. When unset,
    /// only the page the tab is already on can be scraped.
    #[serde(default)]
    pub results_url: Option<String>,

    /// Row elements carry ids of the form `<row_id_prefix><policy number>`.
    #[serde(default = "default_row_id_prefix")]
    pub row_id_prefix: String,

    /// Detail panels carry ids of the form `<detail_id_prefix><policy number>`.
    #[serde(default = "default_detail_id_prefix")]
    pub detail_id_prefix: String,

    /// Selector that signals result data is present.
    #[serde(default = "default_data_marker")]
    pub data_marker: Option<String>,

    /// Selector that signals the login form is showing.
    #[serde(default = "default_login_marker")]
    pub login_marker: Option<String>,

    /// Upper bound on pages scraped per session.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Fallback settle delay after navigation when no data marker is
    /// configured (the portal exposes no completion signal).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// How long to poll for a marker before giving up.
    #[serde(default = "default_marker_timeout_secs")]
    pub marker_timeout_secs: u64,
}

impl PortalSettings {
    /// Resolve the URL for a given results page, if the portal exposes
    /// page-numbered URLs at all.
    pub fn page_url(&self, page: u32) -> Option<String> {
        self.results_url
            .as_ref()
            .map(|template| template.replace("{page}", &page.to_string()))
    }
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            id: default_portal_id(),
            domain: default_domain(),
            landing_url: default_landing_url(),
            results_url: None,
            row_id_prefix: default_row_id_prefix(),
            detail_id_prefix: default_detail_id_prefix(),
            data_marker: default_data_marker(),
            login_marker: default_login_marker(),
            max_pages: default_max_pages(),
            settle_ms: default_settle_ms(),
            marker_timeout_secs: default_marker_timeout_secs(),
        }
    }
}

/// Remote browser-automation provider endpoint and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of the provider's REST API.
    #[serde(default = "default_provider_url")]
    pub api_url: String,

    /// Optional browser profile to request on allocation.
    #[serde(default)]
    pub profile: Option<String>,

    /// Attempts at browser allocation and endpoint resolution, each.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between retry attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_url: default_provider_url(),
            profile: None,
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Fixed poll interval between worker ticks, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Batch size for policy record writes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address for the control API, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            portal: PortalSettings::default(),
            provider: ProviderSettings::default(),
            worker: WorkerSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or from `polacquire.toml` in the
    /// working directory, or fall back to defaults when neither exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(settings)
    }

    /// Write the current settings as TOML.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("polacquire.db")
}

fn default_portal_id() -> String {
    "keystone".to_string()
}

fn default_domain() -> String {
    "portal.keystonelife.example".to_string()
}

fn default_landing_url() -> String {
    "https://portal.keystonelife.example/policies".to_string()
}

fn default_row_id_prefix() -> String {
    "policyRow_".to_string()
}

fn default_detail_id_prefix() -> String {
    "policyDetail_".to_string()
}

fn default_data_marker() -> Option<String> {
    Some("tr[id^='policyRow_']".to_string())
}

fn default_login_marker() -> Option<String> {
    Some("form#loginForm".to_string())
}

fn default_max_pages() -> u32 {
    50
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_marker_timeout_secs() -> u64 {
    15
}

fn default_provider_url() -> String {
    "http://127.0.0.1:4110".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    50
}

fn default_bind() -> String {
    "127.0.0.1:3030".to_string()
}
