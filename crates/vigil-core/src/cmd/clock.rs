use std::path::Path;

use serde::Deserialize;

use crate::{transport, Client, Result};

/// Response of the `clock` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Clock {
    /// Server version string.
    pub version: String,
    /// Current clock value for the root.
    pub clock: String,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

impl Client {
    /// Read the current clock value of a watched root.
    pub async fn clock(&self, root: impl AsRef<Path>) -> Result<Clock> {
        let root = transport::canonical_root(root).await?;
        self.send(&("clock", root)).await
    }
}
