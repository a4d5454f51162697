//! Process configuration (`spec.md` §6, "Environment inputs"): layered
//! the way the original did it — a `config/default.toml` base plus
//! `APP_`-prefixed environment overrides — but every key here has a
//! sane default, since a tenant worker must boot from environment
//! variables alone in a typical deployment.

use std::env;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Required in a real deployment; empty default lets `from_env`
    /// build a `Config` in tests that don't exercise persistence.
    pub tenant_id: String,
    pub database_url: String,
    pub buffer_capacity: usize,
    pub high_watermark_pct: f64,
    pub low_watermark_pct: f64,
    pub entity_cache_enabled: bool,
    pub audit_retention_days: i64,
    pub command_deadline_secs: u64,
    pub query_deadline_secs: u64,
    pub dedup_window_secs: u64,
    pub health_check_interval_secs: u64,
    pub max_restart_attempts: u32,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            database_url: String::new(),
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            high_watermark_pct: crate::buffer::DEFAULT_HIGH_WATERMARK_PCT,
            low_watermark_pct: crate::buffer::DEFAULT_LOW_WATERMARK_PCT,
            entity_cache_enabled: true,
            audit_retention_days: 365,
            command_deadline_secs: 30,
            query_deadline_secs: 5,
            dedup_window_secs: 300,
            health_check_interval_secs: 15,
            max_restart_attempts: 5,
            bind_addr: "0.0.0.0:8080".to_owned(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("ACS"));

        if let Ok(run_mode) = env::var("RUN_MODE") {
            builder = builder.add_source(config::File::with_name(&format!("config/{run_mode}")).required(false));
        }

        builder.build()?.try_deserialize()
    }
}

pub fn init() {
    dotenv::dotenv().ok();
}
