use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::constants::DEPOSIT_METHOD;
use crate::models::rewards::WheelSegment;
use crate::services::rewards::selector::default_segments;

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Advisory {
    pub url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_advisory_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_deposit_method")]
    pub method: String,
}

impl Default for Advisory {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: default_advisory_timeout_ms(),
            method: default_deposit_method(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Rewards {
    #[serde(default = "default_segments")]
    pub segments: Vec<WheelSegment>,
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            segments: default_segments(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub http: Http,
    #[serde(default)]
    pub advisory: Advisory,
    #[serde(default)]
    pub rewards: Rewards,
}

impl Settings {
    /// Reads `path`, then lets `SPIN_LEDGER_<SECTION>__<KEY>` variables override it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("SPIN_LEDGER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}

fn default_max_connections() -> u32 {
    1
}

fn default_advisory_timeout_ms() -> u64 {
    3_000
}

fn default_deposit_method() -> String {
    DEPOSIT_METHOD.to_string()
}
