//! Typed command wrappers.
//!
//! Each command is a thin method over [`Client::send`](crate::Client::send)
//! with a derived response struct listing the fields the server documents
//! for it (every response also carries `version`, and any of them may carry
//! a `warning`). Struct destinations reject unknown keys, so these structs
//! are the authoritative shape of each response.

mod clock;
mod find;
mod log;
mod subscribe;
mod version;
mod watch;

pub use clock::Clock;
pub use find::Find;
pub use log::{LogEvent, LogLevel, LogLevelResponse};
pub use subscribe::{Subscribe, SubscribeEvent, SubscriptionEvents, Unsubscribe};
pub use version::Version;
pub use watch::{Watch, WatchDel, WatchDelAll, WatchList, WatchProject};

use std::path::PathBuf;

use serde::Deserialize;

/// One changed or matched file, as reported by `find` and subscription
/// events.
///
/// The fields mirror Watchman's default field list for subscriptions
/// (`name`, `exists`, `new`, `size`, `mode`); in template-encoded file lists
/// any of them may be elided, leaving the default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    /// Path relative to the watched root.
    pub name: PathBuf,
    /// Whether the file currently exists.
    #[serde(default)]
    pub exists: bool,
    /// Whether the file appeared since the last observation.
    #[serde(default)]
    pub new: bool,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Unix mode bits.
    #[serde(default)]
    pub mode: i64,
}
