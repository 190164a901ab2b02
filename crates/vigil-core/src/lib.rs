//! # Vigil: a Watchman client
//!
//! This crate speaks to a Watchman server over a single duplex byte stream,
//! multiplexing caller requests onto it and demultiplexing the PDUs that come
//! back.
//!
//! ## Architecture
//!
//! Two long-lived tasks own all connection state:
//!
//! - the **reader** pulls framed PDUs off the transport and forwards them on
//!   a channel;
//! - the **dispatcher** owns the write half, the single in-flight request,
//!   the FIFO of queued requests, and the roster of unilateral observers.
//!
//! At most one request is on the wire at any instant, and the server answers
//! in order, so pairing a response with its caller is positional. A PDU that
//! arrives while nothing is in flight is *unilateral* (a subscription event
//! or a log line) and is fanned out to every registered observer through its
//! own mailbox, so a slow consumer never stalls the dispatcher.
//!
//! ```no_run
//! # async fn demo() -> Result<(), vigil_core::Error> {
//! use vigil_core::{Client, ClientConfig};
//!
//! let client = Client::connect(ClientConfig::default()).await?;
//! let version = client.version().await?;
//! println!("watchman {}", version.version);
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Diagnostics
//!
//! Setting `WATCHMAN_LOG_PDU` wraps the connection in a [`Tap`] that decodes
//! every PDU flowing in either direction and emits it as a `tracing` event
//! under the `vigil::pdu` target.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod cmd;
mod error;
pub mod pdu;
mod tap;
mod transport;

pub use client::{Client, Subscription};
pub use error::{Error, Result};
pub use tap::{Tap, TapHandle};
pub use transport::ClientConfig;
