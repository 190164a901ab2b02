use serde::Deserialize;

use crate::{Client, Result};

/// Connection log verbosity levels accepted by `log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Everything, including debug chatter.
    Debug,
    /// Errors only.
    Error,
    /// No log PDUs at all.
    Off,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Response of the `log-level` command.
#[derive(Debug, Clone, Deserialize)]
pub struct LogLevelResponse {
    /// Server version string.
    pub version: String,
    /// The level now in effect for this connection.
    pub log_level: String,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// A unilateral `log` PDU, delivered while the connection's log level admits
/// it.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEvent {
    /// Server version string.
    pub version: String,
    /// The log line.
    pub log: String,
    /// Severity of the line, when the server reports one.
    pub level: Option<String>,
    /// Always true; log PDUs are unilateral.
    #[serde(default)]
    pub unilateral: bool,
}

impl Client {
    /// Set how chatty the server is on this connection.
    ///
    /// Log PDUs arrive unilaterally; register an observer with
    /// [`receive`](Client::receive) and decode [`LogEvent`]s from it.
    pub async fn set_log_level(&self, level: LogLevel) -> Result<LogLevelResponse> {
        self.send(&("log-level", level.as_str())).await
    }
}
