// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

//! Probe configuration loaded from environment variables.
//!
//! Every setting comes from the environment (or a `.env` file via `dotenvy`).
//! Defaults describe the TwinCAT 2.11 controller the probe was written for.

use std::time::Duration;

use thiserror::Error;

use crate::client::{ADS_PORT_TC2_PLC1, ADS_TCP_PORT, DEFAULT_SOURCE_PORT};
use crate::netid::{AmsAddr, AmsNetId};

pub const DEFAULT_NET_ID: &str = "192.168.165.1.1.1";
pub const DEFAULT_PLC_IP: &str = "192.168.16.229";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SYMBOL_SIZE: usize = 4;

/// Error raised when a variable is set but unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key}: must be greater than zero")]
    Zero { key: &'static str },
}

/// Connection parameters of the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// AMS Net ID of the target (`ADS_NET_ID`).
    pub net_id: AmsNetId,

    /// IP address or host name of the target (`ADS_PLC_IP`).
    pub plc_ip: String,

    /// AMS port of the target runtime (`ADS_PORT`), 801 for the first TwinCAT 2 PLC.
    pub ads_port: u16,

    /// AMS/TCP port (`ADS_TCP_PORT`).
    pub tcp_port: u16,

    /// Source Net ID (`ADS_LOCAL_NET_ID`). Derived from the local IP when unset.
    pub local_net_id: Option<AmsNetId>,

    /// Source AMS port (`ADS_LOCAL_PORT`).
    pub local_port: u16,

    /// Bound for connecting and for each request (`ADS_TIMEOUT_SECS`).
    pub timeout: Duration,

    /// Symbol read by name after the state check (`ADS_SYMBOL`).
    pub symbol: Option<String>,

    /// Byte size of `symbol` (`ADS_SYMBOL_SIZE`).
    pub symbol_size: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            net_id: AmsNetId([192, 168, 165, 1, 1, 1]),
            plc_ip: DEFAULT_PLC_IP.to_string(),
            ads_port: ADS_PORT_TC2_PLC1,
            tcp_port: ADS_TCP_PORT,
            local_net_id: None,
            local_port: DEFAULT_SOURCE_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            symbol: None,
            symbol_size: DEFAULT_SYMBOL_SIZE,
        }
    }
}

impl ProbeConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` first so a `.env` next to the binary is honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unset or empty variables take their default, set but malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let net_id = parse_var(&get, "ADS_NET_ID", || DEFAULT_NET_ID.parse().ok())?;
        let plc_ip = get("ADS_PLC_IP").unwrap_or_else(|| DEFAULT_PLC_IP.to_string());
        let ads_port = non_zero(parse_var(&get, "ADS_PORT", || Some(ADS_PORT_TC2_PLC1))?, "ADS_PORT")?;
        let tcp_port = non_zero(parse_var(&get, "ADS_TCP_PORT", || Some(ADS_TCP_PORT))?, "ADS_TCP_PORT")?;
        let local_net_id = parse_var(&get, "ADS_LOCAL_NET_ID", || None)?;
        let local_port = non_zero(
            parse_var(&get, "ADS_LOCAL_PORT", || Some(DEFAULT_SOURCE_PORT))?,
            "ADS_LOCAL_PORT",
        )?;
        let timeout_secs = non_zero(
            parse_var(&get, "ADS_TIMEOUT_SECS", || Some(DEFAULT_TIMEOUT_SECS))?,
            "ADS_TIMEOUT_SECS",
        )?;
        let symbol = get("ADS_SYMBOL");
        let symbol_size = non_zero(
            parse_var(&get, "ADS_SYMBOL_SIZE", || Some(DEFAULT_SYMBOL_SIZE))?,
            "ADS_SYMBOL_SIZE",
        )?;

        Ok(ProbeConfig {
            net_id: net_id.unwrap_or_default(),
            plc_ip,
            ads_port: ads_port.unwrap_or(ADS_PORT_TC2_PLC1),
            tcp_port: tcp_port.unwrap_or(ADS_TCP_PORT),
            local_net_id,
            local_port: local_port.unwrap_or(DEFAULT_SOURCE_PORT),
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            symbol,
            symbol_size: symbol_size.unwrap_or(DEFAULT_SYMBOL_SIZE),
        })
    }

    pub fn target(&self) -> AmsAddr {
        AmsAddr::new(self.net_id, self.ads_port)
    }

    /// Source address when a local Net ID was configured.
    pub fn source(&self) -> Option<AmsAddr> {
        self.local_net_id.map(|id| AmsAddr::new(id, self.local_port))
    }
}

/// Parses `key` when set, otherwise falls back to `default`.
fn parse_var<T, G, D>(get: &G, key: &'static str, default: D) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
    D: FnOnce() -> Option<T>,
{
    match get(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default()),
    }
}

fn non_zero<T>(value: Option<T>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: PartialEq + Default,
{
    match value {
        Some(v) if v == T::default() => Err(ConfigError::Zero { key }),
        other => Ok(other),
    }
}
