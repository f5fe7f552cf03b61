//! CLI settings file (`assets/cpq.yaml`) and scenario loading.

use anyhow::{Context, Result};
use cpq_engine::Scenario;
use cpq_pricing::MarginConvention;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SETTINGS_PATH: &str = "assets/cpq.yaml";
pub const DATABASE_URL_ENV: &str = "CPQ_DATABASE_URL";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub margin_convention: MarginConvention,
    /// Used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: persistence::default_sqlite_url().to_string(),
            margin_convention: MarginConvention::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read `path` if it exists, otherwise use defaults; then apply the
    /// database URL from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            Self::from_yaml(&text).with_context(|| format!("parsing settings {}", path.display()))?
        } else {
            Self::default()
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                settings.database_url = url;
            }
        }
        Ok(settings)
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}
