//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and then merged
//! with the configuration from the `vmnotify.toml` file and environment
//! variables.

use crate::core::Level;
use clap::{ArgGroup, Args, Parser, Subcommand};
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// A minimal leveled publish/subscribe notification utility.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Hostname of the message broker.
    #[arg(long, value_name = "HOST", global = true)]
    pub broker_host: Option<String>,

    /// Port of the message broker.
    #[arg(long, value_name = "PORT", global = true)]
    pub broker_port: Option<u16>,

    /// Topic to publish to or consume from.
    #[arg(long, value_name = "NAME", global = true)]
    pub topic: Option<String>,

    /// Pool label grouping consumers into one work-sharing group.
    #[arg(long, value_name = "NAME", global = true)]
    pub pool: Option<String>,

    /// Periodically log counter snapshots.
    #[arg(long, global = true)]
    pub log_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the consumer, listening on the configured topic until interrupted.
    Server,
    /// Publish one event per selected level from a JSON payload file.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("levels")
        .required(true)
        .multiple(true)
        .args(["info", "warn", "error"]),
))]
pub struct ClientArgs {
    /// Publish at INFO level.
    #[arg(short = 'i', long)]
    pub info: bool,

    /// Publish at WARN level.
    #[arg(short = 'w', long)]
    pub warn: bool,

    /// Publish at ERROR level.
    #[arg(short = 'e', long)]
    pub error: bool,

    /// Publisher identity attached to every event.
    #[arg(short = 'p', long, value_name = "ID", default_value = "vmnotify-client")]
    pub producer_id: String,

    /// Free-form event classification, e.g. `vm.info`.
    #[arg(short = 't', long, value_name = "TYPE", default_value = "vm.info")]
    pub event_type: String,

    /// Path to the JSON payload file; its top-level value must be an object.
    #[arg(value_name = "PAYLOAD_FILE")]
    pub payload_file: PathBuf,
}

impl ClientArgs {
    /// The levels selected by the flags, in ascending severity order.
    pub fn levels(&self) -> Vec<Level> {
        let mut levels = Vec::new();
        if self.info {
            levels.push(Level::Info);
        }
        if self.warn {
            levels.push(Level::Warn);
        }
        if self.error {
            levels.push(Level::Error);
        }
        levels
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        let mut broker = Dict::new();
        if let Some(host) = &self.broker_host {
            broker.insert("host".into(), Value::from(host.clone()));
        }
        if let Some(port) = self.broker_port {
            broker.insert("port".into(), Value::from(u64::from(port)));
        }
        if !broker.is_empty() {
            dict.insert("broker".into(), Value::Dict(Tag::Default, broker));
        }

        let mut messaging = Dict::new();
        if let Some(topic) = &self.topic {
            messaging.insert("topic".into(), Value::from(topic.clone()));
        }
        if let Some(pool) = &self.pool {
            messaging.insert("pool".into(), Value::from(pool.clone()));
        }
        if !messaging.is_empty() {
            dict.insert("messaging".into(), Value::Dict(Tag::Default, messaging));
        }

        // The flag only ever turns metrics logging on; its absence leaves
        // the file/env setting in place.
        if self.log_metrics {
            dict.insert("log_metrics".into(), Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
