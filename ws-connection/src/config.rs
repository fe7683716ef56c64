//! Configuration keys consumed by the core. The configuration loader itself
//! is out of scope; this module only defines the seam and the recognized keys.

use std::collections::HashMap;

/// Bit 0x2 of `connect_flag`: forces TLS even for a `ws://` URL.
pub const CONNECT_FLAG_SECURE: u32 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectFlags(u32);

impl ConnectFlags {
    pub const NONE: ConnectFlags = ConnectFlags(0);
    /// Forces TLS even for a `ws://` URL. Kept as a deliberate config knob
    /// (plausible test/interop tooling) rather than treated as a bug.
    pub const FORCE_SECURE: ConnectFlags = ConnectFlags(CONNECT_FLAG_SECURE);

    pub const fn from_bits(bits: u32) -> ConnectFlags {
        ConnectFlags(bits)
    }

    pub const fn contains(self, other: ConnectFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A source of configuration values, queried by key. Never a durable
/// store — the core holds no durable state of its own.
pub trait ConfigSource: Send + Sync {
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_str(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
enum Value {
    #[default]
    Unset,
    Int(i64),
    Bool(bool),
    Str(String),
}

/// An in-memory `ConfigSource`, for tests and for deployments that bake
/// configuration into the binary rather than loading it externally.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    values: HashMap<String, Value>,
}

impl StaticConfig {
    pub fn new() -> StaticConfig {
        StaticConfig::default()
    }

    pub fn with_int(mut self, key: impl Into<String>, value: i64) -> StaticConfig {
        self.values.insert(key.into(), Value::Int(value));
        self
    }

    pub fn with_bool(mut self, key: impl Into<String>, value: bool) -> StaticConfig {
        self.values.insert(key.into(), Value::Bool(value));
        self
    }

    pub fn with_str(mut self, key: impl Into<String>, value: impl Into<String>) -> StaticConfig {
        self.values.insert(key.into(), Value::Str(value.into()));
        self
    }
}

impl ConfigSource for StaticConfig {
    fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Proxy settings read out of a `ConfigSource`'s
/// `proxy_host`/`proxy_user`/`proxy_pwd` keys.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn from_config(config: &dyn ConfigSource) -> ProxySettings {
        ProxySettings {
            host: config.get_str("proxy_host"),
            user: config.get_str("proxy_user"),
            password: config.get_str("proxy_pwd"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_config_round_trips_each_value_kind() {
        let config = StaticConfig::new()
            .with_int("connect_flag", 2)
            .with_bool("verbose", true)
            .with_str("proxy_host", "proxy.example:8080");
        assert_eq!(config.get_int("connect_flag"), Some(2));
        assert_eq!(config.get_bool("verbose"), Some(true));
        assert_eq!(config.get_str("proxy_host").as_deref(), Some("proxy.example:8080"));
        assert_eq!(config.get_int("missing"), None);
    }

    #[test]
    fn connect_flags_secure_bit() {
        let flags = ConnectFlags::from_bits(CONNECT_FLAG_SECURE);
        assert!(flags.contains(ConnectFlags::FORCE_SECURE));
        assert!(!ConnectFlags::NONE.contains(ConnectFlags::FORCE_SECURE));
    }
}
