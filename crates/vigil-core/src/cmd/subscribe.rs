use std::path::{Path, PathBuf};

use serde::Deserialize;
use vigil_bser::Value;

use crate::{client::Subscription, transport, Client, Error, Result};

use super::FileInfo;

/// Acknowledgment of the `subscribe` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscribe {
    /// Server version string.
    pub version: String,
    /// Clock at the moment the subscription was established.
    pub clock: String,
    /// The subscription's name, echoed back.
    pub subscribe: String,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// One filesystem event on a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeEvent {
    /// Server version string.
    pub version: String,
    /// Clock as of this event.
    pub clock: String,
    /// The files that changed; often template-encoded on the wire.
    #[serde(default)]
    pub files: Vec<FileInfo>,
    /// True when the file list is a full fresh enumeration rather than a
    /// delta.
    #[serde(default)]
    pub is_fresh_instance: bool,
    /// The watched root the event belongs to.
    pub root: PathBuf,
    /// The clock the delta is relative to, when the server reports one.
    pub since: Option<String>,
    /// Name of the subscription the event belongs to.
    pub subscription: String,
    /// Always true; subscription events are unilateral.
    #[serde(default)]
    pub unilateral: bool,
}

/// Response of the `unsubscribe` command.
#[derive(Debug, Clone, Deserialize)]
pub struct Unsubscribe {
    /// Server version string.
    pub version: String,
    /// The subscription's name, echoed back.
    pub unsubscribe: String,
    /// Whether a subscription of that name existed and was removed.
    #[serde(default)]
    pub deleted: bool,
    /// Advisory from the server, if any.
    pub warning: Option<String>,
}

/// Typed event stream for one named subscription.
///
/// Wraps the raw unilateral stream, decoding each PDU and passing through
/// only events whose `subscription` field matches. Log lines and events for
/// other subscriptions on the same connection are skipped.
pub struct SubscriptionEvents {
    name: String,
    inner: Subscription,
}

impl SubscriptionEvents {
    /// The next event for this subscription, `None` once stopped or the
    /// client is gone.
    ///
    /// An event that matches by name but fails to decode surfaces its codec
    /// error rather than being dropped.
    pub async fn next(&mut self) -> Option<Result<SubscribeEvent>> {
        loop {
            let body = self.inner.next().await?;

            let value = match Value::from_slice(&body) {
                Ok(value) => value,
                Err(e) => return Some(Err(Error::Codec(e))),
            };
            match value.get("subscription").and_then(Value::as_str) {
                Some(name) if name == self.name => {}
                _ => continue,
            }

            return Some(vigil_bser::from_slice(&body).map_err(Error::Codec));
        }
    }

    /// Deregister the underlying observer.
    pub fn stop(mut self) {
        self.inner.stop();
    }
}

impl Client {
    /// Subscribe to filesystem changes under a watched root.
    ///
    /// `expression` is the subscription's query object (expression term,
    /// field list, defer/drop states); `None` subscribes to everything with
    /// the server's default fields. The observer joins the roster when the
    /// subscribe request hits the wire, so no event is missed between the
    /// acknowledgment and the first delivery.
    pub async fn subscribe(
        &self,
        root: impl AsRef<Path>,
        name: &str,
        expression: Option<Value>,
    ) -> Result<(Subscribe, SubscriptionEvents)> {
        let root = transport::canonical_root(root).await?;
        let expression = expression.unwrap_or(Value::Object(Vec::new()));

        let (ack, inner): (Subscribe, _) =
            self.send_and_watch(&("subscribe", root, name, expression)).await?;
        Ok((ack, SubscriptionEvents { name: name.to_owned(), inner }))
    }

    /// Remove a named subscription.
    ///
    /// The event stream keeps draining anything already delivered; stop it
    /// separately.
    pub async fn unsubscribe(&self, root: impl AsRef<Path>, name: &str) -> Result<Unsubscribe> {
        let root = transport::canonical_root(root).await?;
        self.send(&("unsubscribe", root, name)).await
    }
}
