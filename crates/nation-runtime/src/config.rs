//! Runtime configuration
//!
//! Defaults, then a JSON document, then `NATION_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;

use nation_core::{NationError, NationResult, Network};
use nation_state::{ReconcileConfig, ReentryPolicy};

use crate::{logging, LogFormat};

pub const ENV_NETWORK: &str = "NATION_NETWORK";
pub const ENV_COLLECT_TIMEOUT_MS: &str = "NATION_COLLECT_TIMEOUT_MS";
pub const ENV_RECONCILE_INTERVAL_MS: &str = "NATION_RECONCILE_INTERVAL_MS";
pub const ENV_REENTRY: &str = "NATION_REENTRY";
pub const ENV_START_BLOCK: &str = "NATION_START_BLOCK";
pub const ENV_LOG_FORMAT: &str = "NATION_LOG_FORMAT";

/// Account runtime configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub network: Network,
    /// Bound on creation-event collection
    pub collect_timeout_ms: u64,
    /// Period of the background reconcile loop; 0 disables it
    pub reconcile_interval_ms: u64,
    pub reentry: ReentryPolicy,
    /// Overrides the network's contract creation block
    pub start_block: Option<u64>,
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            network: Network::Dev,
            collect_timeout_ms: 30_000,
            reconcile_interval_ms: 0,
            reentry: ReentryPolicy::Queue,
            start_block: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl RuntimeConfig {
    /// Production contract, JSON logs
    pub fn production() -> Self {
        RuntimeConfig {
            network: Network::Prod,
            log_format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> NationResult<Self> {
        serde_json::from_str(json).map_err(|e| NationError::InvalidConfig(e.to_string()))
    }

    /// Defaults overridden from the process environment
    pub fn from_env() -> NationResult<Self> {
        RuntimeConfig::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> NationResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `NATION_*` overrides from an arbitrary lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> NationResult<Self> {
        if let Some(value) = lookup(ENV_NETWORK) {
            self.network = value.parse()?;
        }
        if let Some(value) = lookup(ENV_COLLECT_TIMEOUT_MS) {
            self.collect_timeout_ms = parse_number(ENV_COLLECT_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RECONCILE_INTERVAL_MS) {
            self.reconcile_interval_ms = parse_number(ENV_RECONCILE_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_REENTRY) {
            self.reentry = match value.trim().to_ascii_lowercase().as_str() {
                "queue" => ReentryPolicy::Queue,
                "reject" => ReentryPolicy::Reject,
                other => {
                    return Err(NationError::InvalidConfig(format!("{ENV_REENTRY}: unknown policy '{other}'")))
                }
            };
        }
        if let Some(value) = lookup(ENV_START_BLOCK) {
            self.start_block = Some(parse_number(ENV_START_BLOCK, &value)?);
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.log_format = value.parse()?;
        }
        Ok(self)
    }

    /// Block the event cursor is rewound to
    pub fn start_block(&self) -> u64 {
        self.start_block.unwrap_or_else(|| self.network.contract_creation_block())
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// `None` when the loop is disabled
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_ms > 0).then(|| Duration::from_millis(self.reconcile_interval_ms))
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig::for_network(self.network)
            .with_start_block(self.start_block())
            .with_collect_timeout(self.collect_timeout())
            .with_reentry(self.reentry)
    }

    /// Subscriber in the configured `log_format`
    pub fn subscriber<W>(&self, writer: W) -> Box<dyn Subscriber + Send + Sync>
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        logging::subscriber(self.log_format, writer)
    }

    /// Install the configured subscriber globally
    ///
    /// `false` when a subscriber was already installed.
    pub fn init_tracing(&self) -> bool {
        let installed = logging::init_tracing(self.log_format);
        if installed {
            tracing::debug!(format = %self.log_format, network = %self.network, "tracing initialised");
        }
        installed
    }
}

fn parse_number(key: &str, value: &str) -> NationResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| NationError::InvalidConfig(format!("{key}: expected an integer, got '{value}'")))
}
