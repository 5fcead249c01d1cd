//! Configuration management for vmnotify
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `vmnotify.toml` file, environment variables,
//! and command-line overrides. Each component receives its configuration
//! section explicitly at construction time; there is no ambient global
//! state.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Periodically log counter snapshots to the console.
    #[serde(default)]
    pub log_metrics: bool,
    /// Interval between counter snapshots in seconds.
    pub metrics_interval_seconds: u64,
    /// Connection settings for the message broker.
    pub broker: BrokerConfig,
    /// Topic and pool the producer and consumers use.
    pub messaging: MessagingConfig,
}

/// Connection settings for the MQTT broker.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the broker-visible client id; the role and process id
    /// are appended per connection.
    pub client_id_prefix: String,
    pub keep_alive_seconds: u64,
}

/// The topic a producer publishes to and the pool label a consumer joins.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessagingConfig {
    pub topic: String,
    pub pool: String,
}

impl Config {
    /// Loads the configuration by layering sources: defaults, the TOML
    /// file, `VMNOTIFY_`-prefixed environment variables, and CLI args.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = cli
            .config
            .clone()
            .unwrap_or_else(|| "vmnotify.toml".into());
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("VMNOTIFY_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_metrics: false,
            metrics_interval_seconds: 60,
            broker: BrokerConfig {
                host: "localhost".to_string(),
                port: 1883,
                client_id_prefix: "vmnotify".to_string(),
                keep_alive_seconds: 30,
            },
            messaging: MessagingConfig {
                topic: "notification".to_string(),
                pool: "test".to_string(),
            },
        }
    }
}
