//! The request multiplexer.
//!
//! One connection, two tasks. The reader pulls framed PDUs off the transport
//! and forwards them; the dispatcher owns the write half and all session
//! state: the single in-flight request, the FIFO of queued requests, and the
//! roster of unilateral observers. Requests activate one at a time, so the
//! next PDU to arrive while one is active is, positionally, its response;
//! anything that arrives while nothing is active is unilateral and fans out
//! to every observer registered at that moment.
//!
//! Observers are plain unbounded senders: delivery never blocks the
//! dispatcher, and a send racing a stopped subscription lands in a dropped
//! receiver and is discarded.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use vigil_bser::{frame, Value};

use crate::{
    error::{Error, Result},
    pdu,
    tap::{Tap, TapHandle},
    transport::{self, ClientConfig},
};

/// A Watchman client over one duplex stream.
///
/// All methods take `&self`; the client is `Send + Sync` and can be shared
/// behind an `Arc`. Requests from concurrent callers are serialized in the
/// order they reach the intake channel.
pub struct Client {
    shared: Arc<Shared>,
}

struct Shared {
    intake: Mutex<Option<mpsc::UnboundedSender<Intake>>>,
    /// Set by `close` and by the dispatcher when the connection dies.
    closed: Arc<AtomicBool>,
    next_observer: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    tap: Mutex<Option<TapHandle>>,
}

enum Intake {
    Send(SendReq),
    Watch {
        id: u64,
        tx: mpsc::UnboundedSender<Bytes>,
    },
    Unwatch {
        id: u64,
    },
    /// Explicit close. Subscriptions hold intake senders of their own, so
    /// channel closure alone cannot signal shutdown.
    Shutdown,
}

struct SendReq {
    /// The complete PDU for this request, envelope included.
    wire: Vec<u8>,
    /// Observer to add to the roster at the moment this request activates.
    observer: Option<(u64, mpsc::UnboundedSender<Bytes>)>,
    reply: oneshot::Sender<Result<Bytes>>,
}

/// A stream of unilateral PDU bodies.
///
/// Stays registered until [`stop`](Subscription::stop) or drop; either
/// removes the observer from the roster, after which [`next`](Subscription::next)
/// drains whatever was already delivered and then returns `None`.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Bytes>,
    id: u64,
    intake: mpsc::UnboundedSender<Intake>,
    stopped: bool,
}

impl Subscription {
    /// The next unilateral PDU body, or `None` once stopped or the client is
    /// gone.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Deregister the observer and close its channel.
    ///
    /// Already-delivered PDUs remain readable through
    /// [`next`](Subscription::next) until the channel drains.
    pub fn stop(&mut self) {
        self.send_stop();
    }

    fn send_stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            // A gone dispatcher already dropped the roster; nothing to undo.
            let _ = self.intake.send(Intake::Unwatch { id: self.id });
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.send_stop();
    }
}

impl Client {
    /// Connect to the local Watchman server.
    ///
    /// The socket path comes from the config, `$WATCHMAN_SOCK`, or
    /// `watchman get-sockname`, in that order. With `trace_pdus` set the
    /// stream is wrapped in a [`Tap`] emitting one `tracing` event per PDU.
    #[cfg(unix)]
    pub async fn connect(config: ClientConfig) -> Result<Client> {
        let sockname = transport::resolve_sockname(config.sockname).await?;
        let stream = tokio::net::UnixStream::connect(&sockname).await?;

        if config.trace_pdus {
            let (tap, handle) = Tap::new(
                stream,
                Box::new(transport::pdu_trace("incoming")),
                Box::new(transport::pdu_trace("outgoing")),
            );
            Ok(Client::build(tap, Some(handle)))
        } else {
            Ok(Client::build(stream, None))
        }
    }

    /// Run the client over an already-connected duplex stream.
    ///
    /// This is how tests and non-standard transports drive the multiplexer.
    pub fn from_stream<S>(stream: S) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Client::build(stream, None)
    }

    fn build<S>(stream: S, tap: Option<TapHandle>) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (pdu_tx, pdu_rx) = mpsc::unbounded_channel();
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();

        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(run_reader(read, pdu_tx));
        let dispatcher = tokio::spawn(
            Dispatcher {
                writer: write,
                intake: intake_rx,
                pdus: pdu_rx,
                active: None,
                queue: VecDeque::new(),
                observers: Vec::new(),
                closed: Arc::clone(&closed),
            }
            .run(),
        );

        Client {
            shared: Arc::new(Shared {
                intake: Mutex::new(Some(intake_tx)),
                closed,
                next_observer: AtomicU64::new(1),
                reader: Mutex::new(Some(reader)),
                dispatcher: Mutex::new(Some(dispatcher)),
                tap: Mutex::new(tap),
            }),
        }
    }

    /// Issue a request and decode its response.
    ///
    /// `args` becomes the request's argument array; pass a tuple, slice, or
    /// `Vec` of [`Value`]s. The call resolves when the paired response PDU
    /// has arrived: a non-empty `error` field in it becomes
    /// [`Error::Server`], a `warning` field is logged, and the body is then
    /// decoded into `R`.
    pub async fn send<T, R>(&self, args: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.roundtrip(args, None).await?;
        decode_response(&body)
    }

    /// Like [`send`](Client::send), additionally registering an observer for
    /// every future unilateral PDU.
    ///
    /// The observer joins the roster at the moment the request is written to
    /// the transport, so no event the server emits after seeing the request
    /// can be missed.
    pub async fn send_and_watch<T, R>(&self, args: &T) -> Result<(R, Subscription)>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let body = self.roundtrip(args, Some((id, tx))).await?;

        // Build the subscription before decoding so an error response
        // deregisters the observer on drop.
        let subscription =
            Subscription { rx, id, intake: self.intake_sender()?, stopped: false };
        let response = decode_response(&body)?;
        Ok((response, subscription))
    }

    /// Register an observer for unilateral PDUs without sending anything.
    pub fn receive(&self) -> Result<Subscription> {
        let intake = self.intake_sender()?;
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        intake.send(Intake::Watch { id, tx }).map_err(|_| Error::Closed)?;
        Ok(Subscription { rx, id, intake, stopped: false })
    }

    async fn roundtrip<T>(
        &self,
        args: &T,
        observer: Option<(u64, mpsc::UnboundedSender<Bytes>)>,
    ) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        // Encode up front: an unencodable request fails here, before it can
        // occupy a queue slot, and the dispatcher only ever writes finished
        // bytes.
        let wire = frame::pdu_vec(args)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let req = SendReq { wire, observer, reply: reply_tx };
        self.intake_sender()?.send(Intake::Send(req)).map_err(|_| Error::Closed)?;
        reply_rx.await.map_err(|_| Error::Closed)?
    }

    fn intake_sender(&self) -> Result<mpsc::UnboundedSender<Intake>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.shared
            .intake
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(Error::Closed)
    }

    /// Shut the client down.
    ///
    /// Idempotent. Queued and in-flight requests fail with
    /// [`Error::Closed`], observer channels close, the transport is torn
    /// down, and both tasks are joined.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);

        if let Some(intake) = self.shared.intake.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = intake.send(Intake::Shutdown);
        }

        let dispatcher = self.shared.dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = dispatcher {
            let _ = task.await;
        }

        // The reader is likely parked in a transport read; closing the handle
        // out from under it is the cancellation mechanism.
        let reader = self.shared.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = reader {
            task.abort();
            let _ = task.await;
        }

        if let Some(tap) = self.shared.tap.lock().unwrap_or_else(|e| e.into_inner()).take() {
            tap.untap();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Synchronous best-effort half of `close`: signal the dispatcher to
        // drain and cancel the reader.
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(intake) = self.shared.intake.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = intake.send(Intake::Shutdown);
        }
        if let Some(task) = self.shared.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        if let Some(tap) = self.shared.tap.lock().unwrap_or_else(|e| e.into_inner()).take() {
            tap.untap();
        }
    }
}

/// Check the response body for server-reported conditions, then decode it.
fn decode_response<R>(body: &[u8]) -> Result<R>
where
    R: DeserializeOwned,
{
    let value: Value = vigil_bser::from_slice(body)?;

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        if !message.is_empty() {
            return Err(Error::Server(message.to_owned()));
        }
    }
    if let Some(warning) = value.get("warning").and_then(Value::as_str) {
        if !warning.is_empty() {
            tracing::warn!(target: "vigil::client", warning, "server warning");
        }
    }

    Ok(vigil_bser::from_slice(body)?)
}

async fn run_reader<R>(mut read: R, tx: mpsc::UnboundedSender<Result<Bytes>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match pdu::read_pdu(&mut read).await {
            Ok(body) => {
                if tx.send(Ok(body)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

struct Dispatcher<W> {
    writer: W,
    intake: mpsc::UnboundedReceiver<Intake>,
    pdus: mpsc::UnboundedReceiver<Result<Bytes>>,
    /// Reply slot of the request currently on the wire.
    active: Option<oneshot::Sender<Result<Bytes>>>,
    queue: VecDeque<SendReq>,
    observers: Vec<(u64, mpsc::UnboundedSender<Bytes>)>,
    closed: Arc<AtomicBool>,
}

impl<W> Dispatcher<W>
where
    W: AsyncWrite + Unpin,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                // Intake first: a registration already queued must join the
                // roster before a PDU racing in behind it is routed.
                biased;

                req = self.intake.recv() => match req {
                    Some(Intake::Send(req)) => {
                        self.queue.push_back(req);
                        self.pump().await;
                    }
                    Some(Intake::Watch { id, tx }) => {
                        self.observers.push((id, tx));
                    }
                    Some(Intake::Unwatch { id }) => {
                        self.observers.retain(|(oid, _)| *oid != id);
                    }
                    Some(Intake::Shutdown) | None => break,
                },
                pdu = self.pdus.recv() => match pdu {
                    Some(Ok(body)) => {
                        match self.active.take() {
                            Some(reply) => {
                                let _ = reply.send(Ok(body));
                                self.pump().await;
                            }
                            // Nothing in flight: unilateral.
                            None => self.fan_out(body),
                        }
                    }
                    Some(Err(e)) => {
                        if let Some(reply) = self.active.take() {
                            let _ = reply.send(Err(e));
                        }
                        self.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    None => {
                        self.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                },
            }
        }

        self.drain();
        let _ = self.writer.shutdown().await;
    }

    /// Activate queued requests until one is in flight or the queue is dry.
    async fn pump(&mut self) {
        while self.active.is_none() {
            let Some(req) = self.queue.pop_front() else {
                return;
            };

            match self.writer.write_all(&req.wire).await {
                Ok(()) => {
                    self.active = Some(req.reply);
                    if let Some(observer) = req.observer {
                        self.observers.push(observer);
                    }
                }
                Err(e) => {
                    let _ = req.reply.send(Err(Error::Transport(e)));
                }
            }
        }
    }

    /// Deliver a unilateral PDU to every live observer; a stopped observer's
    /// dead channel prunes it from the roster.
    fn fan_out(&mut self, body: Bytes) {
        self.observers.retain(|(_, tx)| tx.send(body.clone()).is_ok());
    }

    fn drain(&mut self) {
        if let Some(reply) = self.active.take() {
            let _ = reply.send(Err(Error::Closed));
        }
        while let Some(req) = self.queue.pop_front() {
            let _ = req.reply.send(Err(Error::Closed));
        }
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::DuplexStream;
    use vigil_bser::object;

    use super::*;

    /// The far end of a duplex pair, acting as a scripted server.
    struct FakeServer {
        stream: DuplexStream,
    }

    impl FakeServer {
        async fn next_request(&mut self) -> Value {
            let body = pdu::read_pdu(&mut self.stream).await.expect("request pdu");
            Value::from_slice(&body).expect("request decodes")
        }

        async fn respond(&mut self, value: &Value) {
            pdu::write_pdu_value(&mut self.stream, value).await.expect("response written");
        }
    }

    fn pair() -> (Client, FakeServer) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        (Client::from_stream(near), FakeServer { stream: far })
    }

    #[tokio::test]
    async fn send_pairs_request_with_response() {
        let (client, mut server) = pair();

        let task = tokio::spawn(async move {
            let request = server.next_request().await;
            assert_eq!(request, Value::Array(vec!["version".into()]));
            server.respond(&object! { "version" => "4.9.0" }).await;
            server
        });

        let response: Value = client.send(&("version",)).await.unwrap();
        assert_eq!(response.get("version").and_then(Value::as_str), Some("4.9.0"));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn responses_pair_with_requests_in_fifo_order() {
        let (client, mut server) = pair();
        let client = Arc::new(client);

        let a = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.send::<_, Value>(&("clock", "/a")).await })
        };
        let b = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.send::<_, Value>(&("clock", "/b")).await })
        };

        // Single-in-flight: the second request is not written until the
        // first response has been consumed, whatever order the callers ran.
        let first = server.next_request().await;
        let first_root = first.as_array().unwrap()[1].as_str().unwrap().to_owned();
        server.respond(&object! { "clock" => format!("c:{}", first_root) }).await;

        let second = server.next_request().await;
        let second_root = second.as_array().unwrap()[1].as_str().unwrap().to_owned();
        assert_ne!(first_root, second_root);
        server.respond(&object! { "clock" => format!("c:{}", second_root) }).await;

        let ra = a.await.unwrap().unwrap();
        let rb = b.await.unwrap().unwrap();
        assert_eq!(ra.get("clock").and_then(Value::as_str), Some("c:/a"));
        assert_eq!(rb.get("clock").and_then(Value::as_str), Some("c:/b"));
    }

    #[tokio::test]
    async fn error_field_surfaces_as_server_error() {
        let (client, mut server) = pair();

        let task = tokio::spawn(async move {
            server.next_request().await;
            server.respond(&object! { "error" => "unable to resolve root" }).await;
        });

        let err = client.send::<_, Value>(&("watch", "/nope")).await.unwrap_err();
        assert!(matches!(err, Error::Server(message) if message == "unable to resolve root"));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unilateral_pdus_fan_out_to_registered_observers_only() {
        let (client, mut server) = pair();

        let mut early_a = client.receive().unwrap();
        let mut early_b = client.receive().unwrap();

        // Nothing is in flight, so this PDU is unilateral.
        let event = object! { "subscription" => "s", "clock" => "c:1" };
        server.respond(&event).await;

        let got_a = early_a.next().await.expect("observer a delivery");
        let got_b = early_b.next().await.expect("observer b delivery");
        assert_eq!(Value::from_slice(&got_a).unwrap(), event);
        assert_eq!(Value::from_slice(&got_b).unwrap(), event);

        // An observer registered strictly after the arrival sees nothing.
        let mut late = client.receive().unwrap();
        early_a.stop();
        let second = object! { "subscription" => "s", "clock" => "c:2" };
        server.respond(&second).await;

        assert_eq!(Value::from_slice(&late.next().await.unwrap()).unwrap(), second);
        assert_eq!(Value::from_slice(&early_b.next().await.unwrap()).unwrap(), second);
        // Stopped observer's stream ends after the already-delivered PDU.
        assert!(early_a.next().await.is_none());
    }

    #[tokio::test]
    async fn close_fails_pending_requests() {
        let (client, mut server) = pair();
        let client = Arc::new(client);

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.send::<_, Value>(&("version",)).await })
        };

        // Let the request reach the wire, then close without responding.
        server.next_request().await;
        client.close().await;

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Closed));

        // Subsequent sends fail fast.
        let err = client.send::<_, Value>(&("version",)).await.unwrap_err();
        assert!(matches!(err, Error::Closed));

        // Close is idempotent.
        client.close().await;
    }

    #[tokio::test]
    async fn reader_failure_breaks_the_active_request_and_closes_the_client() {
        let (client, mut server) = pair();
        let client = Arc::new(client);

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.send::<_, Value>(&("version",)).await })
        };

        server.next_request().await;
        drop(server); // connection torn down mid-request

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        // The client reports closed from here on; allow the flag a moment to
        // settle since the dispatcher sets it.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let err = client.send::<_, Value>(&("version",)).await.unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[tokio::test]
    async fn send_and_watch_registers_at_activation() {
        let (client, mut server) = pair();
        let client = Arc::new(client);

        let watcher = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.send_and_watch::<_, Value>(&("subscribe", "/r", "s")).await
            })
        };

        server.next_request().await;
        // Respond to the subscribe, then push an event.
        server.respond(&object! { "subscribe" => "s" }).await;
        let event = object! { "subscription" => "s", "files" => Value::Array(vec![]) };
        server.respond(&event).await;

        let (ack, mut sub) = watcher.await.unwrap().unwrap();
        assert_eq!(ack.get("subscribe").and_then(Value::as_str), Some("s"));
        let got = sub.next().await.expect("event delivered");
        assert_eq!(Value::from_slice(&got).unwrap(), event);
    }
}
