use serde::Deserialize;

use crate::{Client, Result};

/// Response of the `version` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    /// Server version string.
    pub version: String,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

impl Client {
    /// Query the server's version.
    pub async fn version(&self) -> Result<Version> {
        self.send(&("version",)).await
    }
}
