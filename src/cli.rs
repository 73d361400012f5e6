//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{load_config, validate_config, ConfigError, GatewayConfig};

#[derive(Debug, Parser)]
#[command(name = "proxy-conn-timeout")]
#[command(about = "TCP gateway enforcing per-operation read/write timeouts", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Upstream address, overrides `upstream.address`.
    #[arg(long)]
    pub upstream: Option<String>,

    /// Upper bound for a single read on an accepted connection. 0 disables.
    #[arg(long, env = "READ_OP_TIMEOUT_MS")]
    pub read_op_timeout_ms: Option<u64>,

    /// Upper bound for a single write on an accepted connection. 0 disables.
    #[arg(long, env = "WRITE_OP_TIMEOUT_MS")]
    pub write_op_timeout_ms: Option<u64>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Build the startup configuration: file (or defaults), then flags.
    pub fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.address = upstream.clone();
        }
        if let Some(ms) = self.read_op_timeout_ms {
            config.timeouts.read_op_timeout_ms = ms;
        }
        if let Some(ms) = self.write_op_timeout_ms {
            config.timeouts.write_op_timeout_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
