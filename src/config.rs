use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Detector configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to listen on (e.g. 0.0.0.0:8080).
    pub listen_addr: SocketAddr,
    /// Requests a client may make within one window before it is flagged.
    pub request_limit: u32,
    /// Length of the fixed counting window.
    pub time_window: Duration,
    /// How a connection's peer address is turned into a client identifier.
    pub client_key: ClientKey,
    /// Metrics reporting interval in seconds. Set to 0 to disable.
    pub metrics_interval_secs: u64,
    /// Interval in seconds between sweeps of expired client records. 0 = never sweep.
    pub sweep_interval_secs: u64,
}

/// Which part of the peer address identifies a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKey {
    /// Full `ip:port` peer address (default). Each connection counts separately.
    PeerAddr,
    /// Only the peer IP, so all connections from one host share a count.
    Ip,
}

impl ClientKey {
    /// Client identifier for a connection from `peer`.
    pub fn key_for(&self, peer: SocketAddr) -> String {
        match self {
            ClientKey::PeerAddr => peer.to_string(),
            ClientKey::Ip => ip_key(peer.ip()),
        }
    }
}

// IPv4-mapped IPv6 peers are keyed as plain IPv4 so dual-stack listeners
// don't split one host across two identifiers.
fn ip_key(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_or(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let request_limit: u32 = parse_or(&lookup, "REQUEST_LIMIT", 100)?;
        if request_limit == 0 {
            return Err(ConfigError::Zero("REQUEST_LIMIT"));
        }

        let window_secs: u64 = parse_or(&lookup, "TIME_WINDOW", 10)?;
        if window_secs == 0 {
            return Err(ConfigError::Zero("TIME_WINDOW"));
        }

        let client_key = match lookup("CLIENT_KEY") {
            None => ClientKey::PeerAddr,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "" | "addr" | "peer" => ClientKey::PeerAddr,
                "ip" => ClientKey::Ip,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "CLIENT_KEY",
                        value,
                    })
                }
            },
        };

        let metrics_interval_secs = parse_or(&lookup, "METRICS_INTERVAL", 60)?;
        let sweep_interval_secs = parse_or(&lookup, "SWEEP_INTERVAL", 0)?; // disabled by default

        Ok(Config {
            listen_addr,
            request_limit,
            time_window: Duration::from_secs(window_secs),
            client_key,
            metrics_interval_secs,
            sweep_interval_secs,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { name, value }),
        },
    }
}
