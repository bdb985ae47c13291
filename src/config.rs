//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Numeric settings fall back to their
//! defaults when unset or unparseable; the listen address and the device
//! token table are validated strictly.

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::{MalformedTokenEntry, StaticDeviceTokens, StaticOperatorTokens};
use crate::domain::command::CommandTimeouts;
use crate::persistence::models::RetentionPolicy;

/// Device tokens provisioned when `DEVICE_TOKENS` is unset.
pub const DEFAULT_DEVICE_TOKENS: &str =
    "dev-token-rpi-bridge-01=rpi-bridge-01,dev-token-rpi-bridge-02=rpi-bridge-02";

/// Ceiling applied to every `*_SECS` timeout setting (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is not a socket address.
    #[error("invalid LISTEN_ADDR {value:?}: {source}")]
    InvalidListenAddr {
        /// The rejected value.
        value: String,
        /// Parser error.
        source: std::net::AddrParseError,
    },

    /// `DEVICE_TOKENS` contains a malformed entry.
    #[error("invalid DEVICE_TOKENS: {0}")]
    DeviceTokens(#[from] MalformedTokenEntry),
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Device token table.
    pub device_tokens: StaticDeviceTokens,

    /// Accepted operator bearer tokens; empty means the API is open.
    pub operator_tokens: StaticOperatorTokens,

    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,

    /// How long a device has to send its `hub_connect` frame.
    pub handshake_timeout: Duration,

    /// Inbound silence after which a session is closed.
    pub heartbeat_timeout: Duration,

    /// Per-kind command timeouts and the operator override ceiling.
    pub command_timeouts: CommandTimeouts,

    /// Period of the pending-command deadline sweep.
    pub sweep_interval: Duration,

    /// Capacity of each session's outbound frame queue.
    pub outbound_queue_capacity: usize,

    /// Telemetry and command-log retention.
    pub retention: RetentionPolicy,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            device_tokens: StaticDeviceTokens::default(),
            operator_tokens: StaticOperatorTokens::default(),
            cors_origins: Vec::new(),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(90),
            command_timeouts: CommandTimeouts::default(),
            sweep_interval: Duration::from_millis(250),
            outbound_queue_capacity: 64,
            retention: RetentionPolicy::default(),
            event_bus_capacity: 10_000,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LISTEN_ADDR` cannot be parsed or
    /// `DEVICE_TOKENS` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Env(&lookup);

        let listen_addr = match env.raw("LISTEN_ADDR") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::InvalidListenAddr { value, source })?,
            None => defaults.listen_addr,
        };

        let device_tokens = StaticDeviceTokens::parse(
            &env.raw("DEVICE_TOKENS")
                .unwrap_or_else(|| DEFAULT_DEVICE_TOKENS.to_string()),
        )?;
        let operator_tokens =
            StaticOperatorTokens::parse(&env.raw("OPERATOR_TOKENS").unwrap_or_default());
        let cors_origins = env
            .raw("CORS_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let command_timeouts = CommandTimeouts {
            write: env.secs("COMMAND_TIMEOUT_WRITE_SECS", defaults.command_timeouts.write),
            flash: env.secs("COMMAND_TIMEOUT_FLASH_SECS", defaults.command_timeouts.flash),
            restart: env.secs(
                "COMMAND_TIMEOUT_RESTART_SECS",
                defaults.command_timeouts.restart,
            ),
            max: env.secs("COMMAND_TIMEOUT_MAX_SECS", defaults.command_timeouts.max),
        };

        let max_age_secs: u64 = env.parse("TELEMETRY_MAX_AGE_SECS", 0);
        let retention = RetentionPolicy {
            max_records_per_hub: env.parse(
                "TELEMETRY_MAX_RECORDS_PER_HUB",
                defaults.retention.max_records_per_hub,
            ),
            max_age: (max_age_secs > 0).then(|| Duration::from_secs(max_age_secs)),
            max_commands_per_hub: env.parse(
                "COMMAND_LOG_MAX_PER_HUB",
                defaults.retention.max_commands_per_hub,
            ),
        };

        Ok(Self {
            listen_addr,
            device_tokens,
            operator_tokens,
            cors_origins,
            handshake_timeout: env.secs("HANDSHAKE_TIMEOUT_SECS", defaults.handshake_timeout),
            heartbeat_timeout: env.secs("HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout),
            command_timeouts,
            sweep_interval: Duration::from_millis(
                env.parse::<u64>("COMMAND_SWEEP_INTERVAL_MS", 250).max(1),
            ),
            outbound_queue_capacity: env
                .parse("OUTBOUND_QUEUE_CAPACITY", defaults.outbound_queue_capacity)
                .max(1),
            retention,
            event_bus_capacity: env.parse("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parses a value as `T`, returning `default` on missing or invalid
    /// values.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Timeouts are clamped to `1..=MAX_TIMEOUT_SECS`.
    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.raw(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, |secs| Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS)))
    }
}
