use serde::Deserialize;
use std::time::Duration;

/// Label of the data channel reserved for in-band API commands
pub const DEFAULT_API_CHANNEL_LABEL: &str = "relay-sfu";

/// Quiet window used to collapse negotiation-needed bursts
pub const DEFAULT_NEGOTIATION_DEBOUNCE_MS: u64 = 100;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<TurnServer>,
    pub negotiation_debounce_ms: u64,
    pub api_channel_label: String,
    pub router: RouterConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TurnServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Consecutive read errors tolerated before a forwarder gives up
    pub max_read_errors: u32,
    /// How long a forwarder waits for the first packet before retrying
    pub read_timeout_ms: u64,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
            negotiation_debounce_ms: DEFAULT_NEGOTIATION_DEBOUNCE_MS,
            api_channel_label: DEFAULT_API_CHANNEL_LABEL.to_string(),
            router: RouterConfig::default(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_read_errors: 30,
            read_timeout_ms: 2000,
        }
    }
}

impl SfuConfig {
    /// Load from `RELAY_*` environment variables, falling back to defaults.
    ///
    /// Nested keys use a double underscore (`RELAY_ROUTER__READ_TIMEOUT_MS`),
    /// `RELAY_STUN_SERVERS` is a comma separated list.
    pub fn load() -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("stun_servers")
                    .try_parsing(true),
            )
            .build()?;

        let config: SfuConfig = config.try_deserialize()?;
        if config.stun_servers.is_empty() {
            tracing::warn!("No STUN servers configured, only host candidates will be gathered");
        }
        Ok(config)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            negotiation_debounce: Duration::from_millis(self.negotiation_debounce_ms),
            api_channel_label: self.api_channel_label.clone(),
        }
    }
}

/// Per-transport settings derived from [`SfuConfig`]
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub negotiation_debounce: Duration,
    pub api_channel_label: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        SfuConfig::default().transport()
    }
}
