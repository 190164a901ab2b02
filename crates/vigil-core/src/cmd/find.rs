use std::path::Path;

use serde::Deserialize;
use vigil_bser::Value;

use crate::{transport, Client, Result};

use super::FileInfo;

/// Response of the `find` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Find {
    /// Server version string.
    pub version: String,
    /// Clock at which the results were captured.
    pub clock: String,
    /// Matching files; may arrive template-encoded on the wire.
    #[serde(default)]
    pub files: Vec<FileInfo>,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

impl Client {
    /// Find files under a watched root, optionally narrowed by name
    /// patterns.
    pub async fn find(&self, root: impl AsRef<Path>, patterns: &[&str]) -> Result<Find> {
        let root = transport::canonical_root(root).await?;

        let mut args = Vec::with_capacity(2 + patterns.len());
        args.push(Value::from("find"));
        args.push(Value::String(root.to_string_lossy().into_owned()));
        args.extend(patterns.iter().map(|p| Value::from(*p)));

        self.send(&args).await
    }
}
