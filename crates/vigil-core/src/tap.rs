//! A transparent PDU tap over any duplex stream.
//!
//! [`Tap`] forwards reads and writes unchanged while copying each direction's
//! bytes into an unbounded mailbox. One parser task per direction drains its
//! mailbox, reassembles complete PDUs, and hands each body to the observer
//! callback. The data path never waits on an observer, and an observer panic
//! is caught and logged without disturbing the stream.
//!
//! [`TapHandle::untap`] detaches by dropping the mailbox senders: the parser
//! tasks see end-of-channel and exit promptly, even if they were mid-wait.
//! Detaching is permanent for a given tap; wrap the stream again to re-attach.

use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vigil_bser::frame;

/// Per-direction PDU observer: called once per complete PDU body.
pub type PduObserver = Box<dyn Fn(&[u8]) + Send + 'static>;

struct TapState {
    read_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    write_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    parsers: Mutex<Vec<JoinHandle<()>>>,
}

impl TapState {
    fn feed_read(&self, bytes: &[u8]) {
        feed(&self.read_tx, bytes);
    }

    fn feed_write(&self, bytes: &[u8]) {
        feed(&self.write_tx, bytes);
    }
}

fn feed(slot: &Mutex<Option<mpsc::UnboundedSender<Bytes>>>, bytes: &[u8]) {
    let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(tx) = guard.as_ref() {
        // A dropped parser just means the tap is detaching; ignore.
        let _ = tx.send(Bytes::copy_from_slice(bytes));
    }
}

/// A duplex stream wrapper that mirrors every PDU to observer callbacks.
pub struct Tap<S> {
    inner: S,
    state: Arc<TapState>,
}

/// Detach control for a [`Tap`], usable after the tap itself has been split
/// or moved into I/O tasks.
#[derive(Clone)]
pub struct TapHandle {
    state: Arc<TapState>,
}

impl TapHandle {
    /// Stop observing.
    ///
    /// Returns promptly regardless of what the parser tasks are doing;
    /// dropping the mailbox senders wakes them out of any wait and they exit
    /// on their own.
    pub fn untap(&self) {
        self.state.read_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.state.write_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    #[cfg(test)]
    fn take_parsers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.state.parsers.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl<S> Tap<S> {
    /// Wrap `inner`, observing PDUs read from it with `incoming` and PDUs
    /// written to it with `outgoing`.
    ///
    /// Must be called from within a tokio runtime; the parser tasks are
    /// spawned here.
    pub fn new(inner: S, incoming: PduObserver, outgoing: PduObserver) -> (Tap<S>, TapHandle) {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let parsers = vec![
            tokio::spawn(run_parser(read_rx, incoming, "incoming")),
            tokio::spawn(run_parser(write_rx, outgoing, "outgoing")),
        ];

        let state = Arc::new(TapState {
            read_tx: Mutex::new(Some(read_tx)),
            write_tx: Mutex::new(Some(write_tx)),
            parsers: Mutex::new(parsers),
        });

        let handle = TapHandle { state: Arc::clone(&state) };
        (Tap { inner, state }, handle)
    }
}

/// Drain one direction's mailbox, carving PDUs out of the byte flow.
async fn run_parser(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    observer: PduObserver,
    direction: &'static str,
) {
    let mut buf = BytesMut::new();

    while let Some(chunk) = rx.recv().await {
        buf.extend_from_slice(&chunk);

        loop {
            match frame::split_pdu(&mut buf) {
                Ok(Some(body)) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(&body))) {
                        let msg = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_owned())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_owned());
                        tracing::error!(
                            target: "vigil::tap",
                            direction,
                            panic = %msg,
                            "pdu observer panicked"
                        );
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // The mirrored byte stream is corrupt from here on; there
                    // is no way to resynchronize, so stop observing.
                    tracing::warn!(
                        target: "vigil::tap",
                        direction,
                        error = %e,
                        "stopping pdu observer on unparseable stream"
                    );
                    return;
                }
            }
        }
    }
}

impl<S> AsyncRead for Tap<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                if !fresh.is_empty() {
                    this.state.feed_read(fresh);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S> AsyncWrite for Tap<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                if written > 0 {
                    this.state.feed_write(&buf[..written]);
                }
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
