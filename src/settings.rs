use anyhow::anyhow;
use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::budget::BudgetPools;
use crate::services::notifications::HighlightTimings;

#[derive(Debug, Deserialize)]
pub struct Api {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Places {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Notifications {
    pub highlight_ms: u64,
    pub navigate_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Preload {
    pub months: u32,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api: Api,
    pub budget: BudgetPools,
    pub places: Places,
    #[serde(default)]
    pub storage: Storage,
    pub notifications: Notifications,
    pub preload: Preload,
}

impl Settings {
    /// Built-in defaults, then `path` if it exists, then `GASTOS_*`
    /// environment variables (`GASTOS_API__URL` sets `api.url`).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("api.url", "http://localhost:3000")?
            .set_default("budget.company", 200.0)?
            .set_default("budget.payroll", 20.0)?
            .set_default("places.url", "https://places.googleapis.com")?
            .set_default("places.api_key", "")?
            .set_default("notifications.highlight_ms", 7000_i64)?
            .set_default("notifications.navigate_delay_ms", 7000_i64)?
            .set_default("preload.months", 6_i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GASTOS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn storage_dir(&self) -> Result<PathBuf, anyhow::Error> {
        if let Some(dir) = self.storage.dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        ProjectDirs::from("app", "gastos", "gastos")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| anyhow!("Could not determine a data directory; set storage.dir"))
    }

    pub fn timings(&self) -> HighlightTimings {
        HighlightTimings {
            highlight: Duration::from_millis(self.notifications.highlight_ms),
            navigate_delay: Duration::from_millis(self.notifications.navigate_delay_ms),
        }
    }
}
