//! Endpoint discovery and connection configuration.
//!
//! The Watchman server listens on a Unix-domain socket whose path the client
//! discovers in order of preference: explicit configuration, the
//! `WATCHMAN_SOCK` environment variable, and finally asking the daemon
//! itself via `watchman get-sockname`, which prints a JSON object with a
//! `sockname` field.

use std::{
    env, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use vigil_bser::Value;

use crate::error::{Error, Result};

/// Connection settings for [`Client::connect`](crate::Client::connect).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket path to use; when `None` (or empty) the path is inferred.
    pub sockname: Option<PathBuf>,
    /// Wrap the connection in a PDU-tracing tap. Defaults to whether
    /// `WATCHMAN_LOG_PDU` is set and non-empty.
    pub trace_pdus: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            sockname: None,
            trace_pdus: env::var_os("WATCHMAN_LOG_PDU").is_some_and(|v| !v.is_empty()),
        }
    }
}

impl ClientConfig {
    /// Config pinned to a known socket path; no discovery, no tracing.
    pub fn at_socket(path: impl Into<PathBuf>) -> Self {
        ClientConfig { sockname: Some(path.into()), trace_pdus: false }
    }
}

/// Stdout shape of `watchman get-sockname`.
#[derive(Deserialize)]
struct GetSockname {
    sockname: PathBuf,
}

/// Resolve the server's socket path.
pub(crate) async fn resolve_sockname(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    if let Some(path) = env::var_os("WATCHMAN_SOCK") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let output = tokio::process::Command::new("watchman")
        .arg("get-sockname")
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::Transport(io::Error::other(format!(
            "watchman get-sockname failed with {}",
            output.status
        ))));
    }

    let parsed: GetSockname = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Transport(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    tracing::debug!(target: "vigil::transport", sockname = %parsed.sockname.display(), "discovered socket");
    Ok(parsed.sockname)
}

/// Resolve a command's root path the way the server expects it: absolute,
/// symlinks flattened.
pub(crate) async fn canonical_root(path: impl AsRef<Path>) -> Result<PathBuf> {
    Ok(tokio::fs::canonicalize(path.as_ref()).await?)
}

/// Build a tap observer that decodes each PDU and emits it as a tracing
/// event, rendered as JSON for readability.
pub(crate) fn pdu_trace(direction: &'static str) -> impl Fn(&[u8]) + Send + 'static {
    move |body| match vigil_bser::from_slice::<Value>(body) {
        Ok(value) => match serde_json::to_string(&value) {
            Ok(rendered) => {
                tracing::debug!(target: "vigil::pdu", direction, pdu = %rendered);
            }
            Err(e) => {
                tracing::debug!(
                    target: "vigil::pdu",
                    direction,
                    error = %e,
                    "pdu not representable as json"
                );
            }
        },
        Err(e) => {
            tracing::debug!(target: "vigil::pdu", direction, error = %e, "undecodable pdu");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_sockname_wins_without_touching_the_environment() {
        let path = resolve_sockname(Some(PathBuf::from("/tmp/watchman.sock"))).await.unwrap();
        assert_eq!(path, PathBuf::from("/tmp/watchman.sock"));
    }

    #[test]
    fn default_config_reads_the_trace_toggle() {
        // Only shape-checks the default; the variable's ambient value is
        // whatever the test environment carries.
        let config = ClientConfig::default();
        assert!(config.sockname.is_none());
    }
}
