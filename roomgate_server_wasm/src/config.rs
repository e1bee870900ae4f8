//! Entry server configuration
//!
//! Values come from `ROOMGATE_*` environment variables, after an optional
//! `.env` file has been loaded. Every key has a default; a value that does not
//! parse is logged and replaced by its default.
//!
//! | key                           | default                    |
//! |-------------------------------|----------------------------|
//! | `ROOMGATE_ROOM_POOL_SIZE`     | 16                         |
//! | `ROOMGATE_ROOM_CAPACITY`      | 8                          |
//! | `ROOMGATE_QUEUING_POLICY`     | `block_room_and_queue_max` |
//! | `ROOMGATE_ROOM_PORT_BASE`     | 7000                       |
//! | `ROOMGATE_LISTEN_MODE`        | `ipv4`                     |
//! | `ROOMGATE_LISTEN_IPV4`        | `127.0.0.1`                |
//! | `ROOMGATE_LISTEN_IPV6`        | `::1`                      |
//! | `ROOMGATE_JOIN_TIMEOUT_SECS`  | 10                         |
//! | `ROOMGATE_UNITY_CDK_VERSION`  | `0.1.0`                    |
//! | `ROOMGATE_UE4_CDK_VERSION`    | `0.1.0`                    |
//! | `ROOMGATE_NATIVE_CDK_VERSION` | `0.1.0`                    |

use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::room::{ListenEndpoint, ListenMode, QueuingPolicy, RoomPorts};

const ENV_PREFIX: &str = "ROOMGATE_";

/// Ports each room takes from the port range
const PORTS_PER_ROOM: usize = 4;

pub const UA_UNITY_CDK: &str = "UnityCdk";
pub const UA_UE4_CDK: &str = "Ue4Cdk";
pub const UA_NATIVE_CDK: &str = "NativeCdk";

/// Minimum client SDK versions announced by `/version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientVersions {
    pub unity_cdk: String,
    pub ue4_cdk: String,
    pub native_cdk: String,
}

impl Default for ClientVersions {
    fn default() -> Self {
        Self {
            unity_cdk: "0.1.0".into(),
            ue4_cdk: "0.1.0".into(),
            native_cdk: "0.1.0".into(),
        }
    }
}

impl ClientVersions {
    pub fn for_user_agent(&self, user_agent: &str) -> Option<&str> {
        match user_agent {
            UA_UNITY_CDK => Some(self.unity_cdk.as_str()),
            UA_UE4_CDK => Some(self.ue4_cdk.as_str()),
            UA_NATIVE_CDK => Some(self.native_cdk.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryConfig {
    /// Number of rooms provisioned at startup
    pub room_pool_size: usize,
    /// Capacity of a provisioned room before a create request sets it
    pub room_capacity: u16,
    pub queuing_policy: QueuingPolicy,
    /// First relay port; room `i` uses `base + 4i ..= base + 4i + 3`
    pub room_port_base: u16,
    pub listen: ListenEndpoint,
    /// Seconds an admitted seed may hold the join slot without completing
    pub join_timeout_secs: i64,
    pub client_versions: ClientVersions,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            room_pool_size: 16,
            room_capacity: 8,
            queuing_policy: QueuingPolicy::BlockAtRoomAndQueueMax,
            room_port_base: 7000,
            listen: ListenEndpoint::default(),
            join_timeout_secs: 10,
            client_versions: ClientVersions::default(),
        }
    }
}

impl EntryConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        match dotenv::dotenv() {
            Ok(path) => info!(path = %path.display(), "loaded .env"),
            Err(e) => debug!("no .env loaded: {e}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Keys are passed with the
    /// `ROOMGATE_` prefix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        let queuing_policy = named(get("QUEUING_POLICY"), "QUEUING_POLICY", QueuingPolicy::from_name)
            .unwrap_or(defaults.queuing_policy);
        let mode = named(get("LISTEN_MODE"), "LISTEN_MODE", ListenMode::from_name)
            .unwrap_or(defaults.listen.mode);

        let config = Self {
            room_pool_size: parse_or(get("ROOM_POOL_SIZE"), "ROOM_POOL_SIZE", defaults.room_pool_size),
            room_capacity: parse_or(get("ROOM_CAPACITY"), "ROOM_CAPACITY", defaults.room_capacity),
            queuing_policy,
            room_port_base: parse_or(get("ROOM_PORT_BASE"), "ROOM_PORT_BASE", defaults.room_port_base),
            listen: ListenEndpoint {
                mode,
                addr_v4: get("LISTEN_IPV4").unwrap_or(defaults.listen.addr_v4),
                addr_v6: get("LISTEN_IPV6").unwrap_or(defaults.listen.addr_v6),
            },
            join_timeout_secs: parse_or(
                get("JOIN_TIMEOUT_SECS"),
                "JOIN_TIMEOUT_SECS",
                defaults.join_timeout_secs,
            ),
            client_versions: ClientVersions {
                unity_cdk: get("UNITY_CDK_VERSION").unwrap_or(defaults.client_versions.unity_cdk),
                ue4_cdk: get("UE4_CDK_VERSION").unwrap_or(defaults.client_versions.ue4_cdk),
                native_cdk: get("NATIVE_CDK_VERSION").unwrap_or(defaults.client_versions.native_cdk),
            },
        };
        debug!(?config, "entry config");
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if self.join_timeout_secs <= 0 {
            return Err(ConfigError::JoinTimeout(self.join_timeout_secs));
        }
        if self.room_ports(self.room_pool_size - 1).is_none() {
            return Err(ConfigError::PortOverflow {
                base: self.room_port_base,
                rooms: self.room_pool_size,
            });
        }
        self.listen
            .resolve_v4()
            .map_err(|_| ConfigError::ListenAddress(self.listen.addr_v4.clone()))?;
        self.listen
            .resolve_v6()
            .map_err(|_| ConfigError::ListenAddress(self.listen.addr_v6.clone()))?;
        Ok(())
    }

    /// Relay ports of the room at `index` in provisioning order.
    pub fn room_ports(&self, index: usize) -> Option<RoomPorts> {
        let first = index
            .checked_mul(PORTS_PER_ROOM)?
            .checked_add(usize::from(self.room_port_base))?;
        let port = |offset: usize| u16::try_from(first + offset).ok();
        Some(RoomPorts {
            stateful_deal: port(0)?,
            stateful_sub: port(1)?,
            stateless_deal: port(2)?,
            stateless_sub: port(3)?,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(key, value = %raw, "invalid config value, using default");
        default
    })
}

fn named<T>(raw: Option<String>, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid config value, using default");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> EntryConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        EntryConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config_from(&[]), EntryConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let config = config_from(&[
            ("ROOM_POOL_SIZE", "3"),
            ("ROOM_CAPACITY", "2"),
            ("QUEUING_POLICY", "block_room_max"),
            ("ROOM_PORT_BASE", "9000"),
            ("LISTEN_MODE", "dual"),
            ("LISTEN_IPV4", "10.1.2.3"),
            ("LISTEN_IPV6", "fe80::1"),
            ("JOIN_TIMEOUT_SECS", "30"),
            ("NATIVE_CDK_VERSION", "2.0.0"),
        ]);
        assert_eq!(config.room_pool_size, 3);
        assert_eq!(config.room_capacity, 2);
        assert_eq!(config.queuing_policy, QueuingPolicy::BlockAtRoomMax);
        assert_eq!(config.room_port_base, 9000);
        assert_eq!(config.listen.mode, ListenMode::Dual);
        assert_eq!(config.listen.addr_v4, "10.1.2.3");
        assert_eq!(config.listen.addr_v6, "fe80::1");
        assert_eq!(config.join_timeout_secs, 30);
        assert_eq!(config.client_versions.for_user_agent(UA_NATIVE_CDK), Some("2.0.0"));
        assert_eq!(config.client_versions.for_user_agent(UA_UNITY_CDK), Some("0.1.0"));
        assert_eq!(config.client_versions.for_user_agent("curl/8.0"), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config_from(&[
            ("ROOM_CAPACITY", "lots"),
            ("QUEUING_POLICY", "random"),
            ("JOIN_TIMEOUT_SECS", ""),
        ]);
        assert_eq!(config.room_capacity, 8);
        assert_eq!(config.queuing_policy, QueuingPolicy::BlockAtRoomAndQueueMax);
        assert_eq!(config.join_timeout_secs, 10);
    }

    #[test]
    fn port_layout() {
        let config = EntryConfig::default();
        assert_eq!(
            config.room_ports(2),
            Some(RoomPorts {
                stateful_deal: 7008,
                stateful_sub: 7009,
                stateless_deal: 7010,
                stateless_sub: 7011,
            })
        );

        let config = EntryConfig {
            room_port_base: 65530,
            room_pool_size: 2,
            ..EntryConfig::default()
        };
        assert_eq!(config.room_ports(0).map(|p| p.stateless_sub), Some(65533));
        assert_eq!(config.room_ports(1), None);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PortOverflow {
                base: 65530,
                rooms: 2
            })
        );
    }

    #[test]
    fn validate_rejects_non_positive_timeout() {
        for timeout in [0, -5] {
            let raw = timeout.to_string();
            let config = config_from(&[("JOIN_TIMEOUT_SECS", raw.as_str())]);
            assert_eq!(config.validate(), Err(ConfigError::JoinTimeout(timeout)));
        }
        let config = config_from(&[("JOIN_TIMEOUT_SECS", "9223372036854775807")]);
        assert_eq!(config.join_timeout_secs, i64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_pool() {
        let config = EntryConfig {
            room_pool_size: 0,
            ..EntryConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyPool));
    }
}
