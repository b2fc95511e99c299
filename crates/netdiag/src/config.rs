//! Probe configuration.
//!
//! Values start from [`defaults`], may be overlaid from `NETDIAG_*`
//! environment variables, and are finally overridden by command line flags.

use std::time::Duration;

use crate::error::{NetdiagError, Result};

/// Default values for probe settings.
pub mod defaults {
    /// Echo requests sent when the caller does not give a count.
    pub const DEFAULT_PING_COUNT: u32 = 4;

    /// Upper bound on the count, one request per 16-bit sequence number.
    pub const MAX_PING_COUNT: u32 = u16::MAX as u32;

    /// How long the host transport waits for each reply.
    pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 1000;

    /// Spacing between consecutive echo requests of one probe.
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;

    /// Echo payload size in bytes.
    pub const DEFAULT_PAYLOAD_LEN: usize = 32;

    /// Largest payload that still fits an unfragmented IPv4 datagram.
    pub const MAX_PAYLOAD_LEN: usize = 1472;

    /// Environment variable holding the tracing filter directive.
    pub const LOG_ENV: &str = "NETDIAG_LOG";
}

const COUNT_ENV: &str = "NETDIAG_PING_COUNT";
const TIMEOUT_ENV: &str = "NETDIAG_REPLY_TIMEOUT_MS";
const INTERVAL_ENV: &str = "NETDIAG_INTERVAL_MS";

/// Settings shared by the ping engine and the host echo transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Count used when a request does not specify one.
    pub default_count: u32,
    pub reply_timeout: Duration,
    pub interval: Duration,
    pub payload_len: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            default_count: defaults::DEFAULT_PING_COUNT,
            reply_timeout: Duration::from_millis(defaults::DEFAULT_REPLY_TIMEOUT_MS),
            interval: Duration::from_millis(defaults::DEFAULT_INTERVAL_MS),
            payload_len: defaults::DEFAULT_PAYLOAD_LEN,
        }
    }
}

impl ProbeConfig {
    /// Defaults overlaid with any `NETDIAG_*` variables present in the
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(COUNT_ENV) {
            self.default_count = parse_number(COUNT_ENV, &value)?;
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            self.reply_timeout = Duration::from_millis(parse_number(TIMEOUT_ENV, &value)?);
        }
        if let Some(value) = lookup(INTERVAL_ENV) {
            self.interval = Duration::from_millis(parse_number(INTERVAL_ENV, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_default_count(mut self, count: u32) -> Self {
        self.default_count = count;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_count == 0 || self.default_count > defaults::MAX_PING_COUNT {
            return Err(NetdiagError::config(
                "default_count",
                format!("must be 1-{}", defaults::MAX_PING_COUNT),
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err(NetdiagError::config("reply_timeout", "must be non-zero"));
        }
        if self.payload_len > defaults::MAX_PAYLOAD_LEN {
            return Err(NetdiagError::config(
                "payload_len",
                format!("must be at most {}", defaults::MAX_PAYLOAD_LEN),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NetdiagError::config(field, format!("not a number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.default_count, 4);
        assert_eq!(config.reply_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlay_from_variables() {
        let vars: HashMap<&str, &str> = [(COUNT_ENV, "10"), (TIMEOUT_ENV, " 250 ")].into();
        let config = ProbeConfig::default()
            .overlay(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_count, 10);
        assert_eq!(config.reply_timeout, Duration::from_millis(250));
        assert_eq!(config.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overlay_rejects_garbage() {
        let err = ProbeConfig::default()
            .overlay(|key| (key == INTERVAL_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(INTERVAL_ENV));
    }

    #[test]
    fn test_validate() {
        assert!(ProbeConfig::default().with_default_count(0).validate().is_err());
        assert!(ProbeConfig::default()
            .with_reply_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ProbeConfig::default().with_payload_len(4096).validate().is_err());
    }
}
