// File: ./src/config.rs
// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::ColumnNames;
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "https://tasks.googleapis.com/tasks/v1";

fn default_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_inter_call_delay_ms() -> u64 {
    500
}
fn default_list_race_backoff_ms() -> u64 {
    2000
}
fn default_reschedule_delay_secs() -> u64 {
    60
}
fn default_list_marker() -> String {
    "list:".to_string()
}
fn default_first_data_row() -> usize {
    2
}
fn default_handler_id() -> String {
    "continue_export".to_string()
}
fn default_title_column() -> String {
    "title".to_string()
}
fn default_id_column() -> String {
    "id".to_string()
}
fn default_status_column() -> String {
    "status".to_string()
}
fn default_due_column() -> String {
    "due".to_string()
}
fn default_links_column() -> String {
    "links".to_string()
}
fn default_list_column() -> String {
    "list".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the task service API.
    #[serde(default = "default_url")]
    pub url: String,
    /// OAuth bearer token sent with every request.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allow_insecure_certs: bool,

    /// Rows processed per invocation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after every task creation, to stay under the service rate limit.
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
    /// Wait before re-listing after a failed list creation. Must exceed the
    /// service's create-propagation delay.
    #[serde(default = "default_list_race_backoff_ms")]
    pub list_race_backoff_ms: u64,
    #[serde(default = "default_reschedule_delay_secs")]
    pub reschedule_delay_secs: u64,
    #[serde(default = "default_list_marker")]
    pub list_marker: String,
    #[serde(default = "default_first_data_row")]
    pub first_data_row: usize,
    /// Identity under which continuation triggers are registered.
    #[serde(default = "default_handler_id")]
    pub handler_id: String,

    #[serde(default = "default_title_column")]
    pub title_column: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_due_column")]
    pub due_column: String,
    #[serde(default = "default_links_column")]
    pub links_column: String,
    #[serde(default = "default_list_column")]
    pub list_column: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
            allow_insecure_certs: false,
            batch_size: default_batch_size(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
            list_race_backoff_ms: default_list_race_backoff_ms(),
            reschedule_delay_secs: default_reschedule_delay_secs(),
            list_marker: default_list_marker(),
            first_data_row: default_first_data_row(),
            handler_id: default_handler_id(),
            title_column: default_title_column(),
            id_column: default_id_column(),
            status_column: default_status_column(),
            due_column: default_due_column(),
            links_column: default_links_column(),
            list_column: default_list_column(),
        }
    }
}

/// The tunables of one export run, in the units the runner uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSettings {
    pub batch_size: usize,
    pub inter_call_delay: Duration,
    pub list_race_backoff: Duration,
    pub reschedule_delay: Duration,
    pub list_marker: String,
    pub first_data_row: usize,
    pub handler_id: String,
    pub columns: ColumnNames,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Config::default().export_settings()
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Load, or fall back to defaults when no config file exists yet.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(config) => Ok(config),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Detect whether an error means the config file was missing, either by
    /// our explicit message or an IO NotFound anywhere in the chain.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    /// Save configuration using an explicit context.
    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            // A zero batch would never advance the cursor.
            batch_size: self.batch_size.max(1),
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
            list_race_backoff: Duration::from_millis(self.list_race_backoff_ms),
            reschedule_delay: Duration::from_secs(self.reschedule_delay_secs),
            list_marker: self.list_marker.clone(),
            first_data_row: self.first_data_row.max(crate::sheet::HEADER_ROW + 1),
            handler_id: self.handler_id.clone(),
            columns: ColumnNames {
                title: self.title_column.clone(),
                id: self.id_column.clone(),
                status: self.status_column.clone(),
                due: self.due_column.clone(),
                links: self.links_column.clone(),
                list: self.list_column.clone(),
            },
        }
    }
}
