use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{transport, Client, Result};

/// Response of the legacy `watch` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Watch {
    /// Server version string.
    pub version: String,
    /// The root now being watched.
    pub watch: PathBuf,
    /// Name of the filesystem watcher in use.
    pub watcher: Option<String>,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// Response of the `watch-project` command.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchProject {
    /// Server version string.
    pub version: String,
    /// The project root being watched.
    pub watch: PathBuf,
    /// Name of the filesystem watcher in use.
    pub watcher: Option<String>,
    /// Path of the requested directory relative to the watched root, when
    /// the two differ.
    pub relative_path: Option<PathBuf>,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// Response of the `watch-list` command.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchList {
    /// Server version string.
    pub version: String,
    /// All currently watched roots.
    pub roots: Vec<PathBuf>,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// Response of the `watch-del` command.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchDel {
    /// Server version string.
    pub version: String,
    /// The root whose watch was removed.
    pub root: PathBuf,
    /// Whether the watch was in fact deleted.
    #[serde(rename = "watch-del", default)]
    pub deleted: bool,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// Response of the `watch-del-all` command.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchDelAll {
    /// Server version string.
    pub version: String,
    /// The roots whose watches were removed.
    pub roots: Vec<PathBuf>,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

impl Client {
    /// Watch a root directly.
    ///
    /// `watch-project` is usually the better choice; it dedupes nested
    /// watches against an enclosing project root.
    pub async fn watch(&self, root: impl AsRef<Path>) -> Result<Watch> {
        let root = transport::canonical_root(root).await?;
        self.send(&("watch", root)).await
    }

    /// Watch the project enclosing `path`.
    pub async fn watch_project(&self, path: impl AsRef<Path>) -> Result<WatchProject> {
        let path = transport::canonical_root(path).await?;
        self.send(&("watch-project", path)).await
    }

    /// List all watched roots.
    pub async fn watch_list(&self) -> Result<WatchList> {
        self.send(&("watch-list",)).await
    }

    /// Stop watching a root.
    pub async fn watch_del(&self, root: impl AsRef<Path>) -> Result<WatchDel> {
        let root = transport::canonical_root(root).await?;
        self.send(&("watch-del", root)).await
    }

    /// Stop watching every root.
    pub async fn watch_del_all(&self) -> Result<WatchDelAll> {
        self.send(&("watch-del-all",)).await
    }
}
