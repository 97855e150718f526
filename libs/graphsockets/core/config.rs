use crate::protocol::SubProtocol;
use crate::traits::{GraphSocketError, Result};
use serde_json::Value;
use std::time::Duration;

/// Settings for one streaming connection
///
/// Built with chained setters and checked by [`validate`](Self::validate)
/// before a connection is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Bound on the TCP/TLS connect plus WebSocket upgrade
    pub connect_timeout: Duration,

    /// Bound on the wait for `connection_ack`
    pub handshake_timeout: Duration,

    /// Watchdog interval; `None` disables the watchdog
    pub keep_alive_timeout: Option<Duration>,

    /// How long a stopping subscription waits for the server's acknowledgement
    pub stop_grace_timeout: Duration,

    /// Client ping interval, for vocabularies that have a client ping
    pub ping_interval: Option<Duration>,

    /// Payload of the `connection_init` frame
    pub init_payload: Option<Value>,

    /// Close the socket once the last subscription is removed
    pub close_when_idle: bool,

    /// Sub-protocols offered during the upgrade, most preferred first
    pub protocols: Vec<SubProtocol>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            keep_alive_timeout: None,
            stop_grace_timeout: Duration::from_secs(5),
            ping_interval: None,
            init_payload: None,
            close_when_idle: true,
            protocols: SubProtocol::DEFAULT_PREFERENCE.to_vec(),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    pub fn stop_grace_timeout(mut self, timeout: Duration) -> Self {
        self.stop_grace_timeout = timeout;
        self
    }

    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    pub fn close_when_idle(mut self, close: bool) -> Self {
        self.close_when_idle = close;
        self
    }

    pub fn protocols(mut self, protocols: Vec<SubProtocol>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("connect_timeout", Some(self.connect_timeout)),
            ("handshake_timeout", Some(self.handshake_timeout)),
            ("keep_alive_timeout", self.keep_alive_timeout),
            ("stop_grace_timeout", Some(self.stop_grace_timeout)),
            ("ping_interval", self.ping_interval),
        ];
        for (name, value) in positive {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(GraphSocketError::Configuration(format!("{} must be positive", name)));
            }
        }

        if self.protocols.is_empty() {
            return Err(GraphSocketError::Configuration(
                "at least one sub-protocol must be offered".into(),
            ));
        }

        if let Some(ref payload) = self.init_payload {
            if !payload.is_object() {
                return Err(GraphSocketError::Configuration(
                    "init_payload must be a JSON object".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConnectionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.keep_alive_timeout.is_none());
        assert_eq!(config.stop_grace_timeout, Duration::from_secs(5));
        assert!(config.close_when_idle);
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let config = ConnectionConfig::new().keep_alive_timeout(Some(Duration::ZERO));
        assert!(matches!(config.validate(), Err(GraphSocketError::Configuration(_))));

        let config = ConnectionConfig::new().handshake_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_protocols_and_bad_payload() {
        assert!(ConnectionConfig::new().protocols(vec![]).validate().is_err());
        assert!(ConnectionConfig::new()
            .init_payload(serde_json::json!("token"))
            .validate()
            .is_err());
    }
}
