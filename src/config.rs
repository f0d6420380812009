//! Controller configuration and server address resolution.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::error::{MatchControlError, Result};
use crate::match_ready::{ReadyWindows, DEFAULT_LOAD_WINDOW, DEFAULT_READY_WINDOW};
use crate::session::SessionConfig;

/// Server host used when none is configured.
pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";

/// Server port used when none is configured.
pub const DEFAULT_SERVER_PORT: u16 = 23234;

/// Prefix of the environment variables read by [`ServerAddress::from_env`].
pub const DEFAULT_ENV_PREFIX: &str = "RLBOT_SERVER";

/// Default timeout for opening a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the core server listens.
///
/// ```
/// use rlbot_match_control::config::ServerAddress;
///
/// let address = ServerAddress::from_values(Some("10.0.0.2"), None).unwrap();
/// assert_eq!(address.to_string(), "10.0.0.2:23234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub ip: String,
    pub port: u16,
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self {
            ip: DEFAULT_SERVER_IP.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl ServerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Read `RLBOT_SERVER_IP` and `RLBOT_SERVER_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] if the port is set but is
    /// not a valid port number.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Read `{prefix}_IP` and `{prefix}_PORT`. Unset or empty variables fall
    /// back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] if the port is set but is
    /// not a valid port number.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        let ip = std::env::var(format!("{prefix}_IP")).ok();
        let port = std::env::var(format!("{prefix}_PORT")).ok();
        let address = Self::from_values(ip.as_deref(), port.as_deref())?;
        debug!(prefix, address = %address, "resolved server address from environment");
        Ok(address)
    }

    /// Build an address from optional raw values, as found in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`MatchControlError::InvalidConfig`] if `port` is not a valid
    /// port number.
    pub fn from_values(ip: Option<&str>, port: Option<&str>) -> Result<Self> {
        let ip = match ip.map(str::trim) {
            Some(ip) if !ip.is_empty() => ip.to_string(),
            _ => DEFAULT_SERVER_IP.to_string(),
        };
        let port = match port.map(str::trim) {
            Some(port) if !port.is_empty() => port.parse::<u16>().map_err(|e| {
                MatchControlError::InvalidConfig(format!("server port {port:?}: {e}"))
            })?,
            _ => DEFAULT_SERVER_PORT,
        };
        Ok(Self { ip, port })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Everything a [`MatchController`](crate::controller::MatchController) needs.
///
/// ```
/// use rlbot_match_control::config::{ControllerConfig, ServerAddress};
/// use std::time::Duration;
///
/// let config = ControllerConfig::new(ServerAddress::new("127.0.0.1", 23234))
///     .with_load_window(Duration::from_secs(60))
///     .with_ready_window(Duration::from_secs(10));
/// assert_eq!(config.ready_windows().load, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Core server address.
    pub address: ServerAddress,
    /// Time allowed for a new match to load, including the reconnect.
    ///
    /// Also bounds how long the static hold loop may go without a packet.
    /// Defaults to **120 seconds**.
    pub load_window: Duration,
    /// Time allowed for a loaded match to go live, and for one-shot waits on
    /// a running match. Defaults to **20 seconds**.
    pub ready_window: Duration,
    /// Time allowed for opening a connection. `None` waits for the OS.
    /// Defaults to **5 seconds**.
    pub connect_timeout: Option<Duration>,
    /// Settings applied to every session the controller opens.
    pub session: SessionConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(ServerAddress::default())
    }
}

impl ControllerConfig {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            load_window: DEFAULT_LOAD_WINDOW,
            ready_window: DEFAULT_READY_WINDOW,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            session: SessionConfig::default(),
        }
    }

    /// Default configuration with the address taken from the environment.
    ///
    /// # Errors
    ///
    /// See [`ServerAddress::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ServerAddress::from_env()?))
    }

    #[must_use]
    pub fn with_load_window(mut self, window: Duration) -> Self {
        self.load_window = window;
        self
    }

    #[must_use]
    pub fn with_ready_window(mut self, window: Duration) -> Self {
        self.ready_window = window;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// The load and ready windows as one value.
    pub fn ready_windows(&self) -> ReadyWindows {
        ReadyWindows {
            load: self.load_window,
            ready: self.ready_window,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let address = ServerAddress::from_values(None, None).unwrap();
        assert_eq!(address, ServerAddress::new("127.0.0.1", 23234));
        assert_eq!(address.to_string(), "127.0.0.1:23234");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let address = ServerAddress::from_values(Some(""), Some("  ")).unwrap();
        assert_eq!(address, ServerAddress::default());
    }

    #[test]
    fn explicit_values_win() {
        let address = ServerAddress::from_values(Some("192.168.1.20"), Some("4000")).unwrap();
        assert_eq!(address.to_string(), "192.168.1.20:4000");
    }

    #[test]
    fn bad_port_is_invalid_config() {
        for port in ["abc", "70000", "-1"] {
            let err = ServerAddress::from_values(None, Some(port)).unwrap_err();
            assert!(matches!(err, MatchControlError::InvalidConfig(_)), "{port}");
        }
    }

    #[test]
    fn from_env_reads_prefixed_variables() {
        // Unique prefix so parallel tests never share variables.
        std::env::set_var("MATCH_CONTROL_CONFIG_TEST_IP", "10.1.2.3");
        std::env::set_var("MATCH_CONTROL_CONFIG_TEST_PORT", "5555");
        let address = ServerAddress::from_env_with_prefix("MATCH_CONTROL_CONFIG_TEST").unwrap();
        assert_eq!(address, ServerAddress::new("10.1.2.3", 5555));
    }

    #[test]
    fn from_env_without_variables_uses_defaults() {
        let address = ServerAddress::from_env_with_prefix("MATCH_CONTROL_CONFIG_UNSET").unwrap();
        assert_eq!(address, ServerAddress::default());
    }

    #[test]
    fn controller_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.load_window, Duration::from_secs(120));
        assert_eq!(config.ready_window, Duration::from_secs(20));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.session.event_channel_capacity, 256);
        assert_eq!(config.ready_windows(), ReadyWindows::default());
    }
}
