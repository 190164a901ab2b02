//! Turmoil-based test harness for the vigil client.
//!
//! The real Watchman server is a filesystem daemon and useless inside a
//! deterministic simulation, so the harness provides [`ScriptedServer`]: a
//! BSER-speaking endpoint over Turmoil's simulated TCP that executes a fixed
//! list of [`Step`]s. Tests drive the *real* client (reader, dispatcher,
//! framing, codec) against it, with Turmoil controlling time and packet
//! delivery.
//!
//! Why TCP when production speaks over a Unix socket? The client is generic
//! over any duplex byte stream; the protocol logic under test lives above
//! the transport, and Turmoil's TCP provides identical ordered-stream
//! semantics with fault injection on top.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io;

use turmoil::net::{TcpListener, TcpStream};
use vigil_bser::Value;
use vigil_core::pdu;

/// One step of a scripted server session, executed in order.
pub enum Step {
    /// Wait for the next request PDU and answer it with this value.
    Respond(Value),
    /// Wait for the next request PDU and answer with a function of it.
    RespondWith(Box<dyn FnOnce(Value) -> Value + Send>),
    /// Push a PDU without waiting for a request.
    Unilateral(Value),
    /// Tear the connection down immediately.
    Drop,
}

/// A single-connection BSER server that follows a script.
pub struct ScriptedServer;

impl ScriptedServer {
    /// Bind `addr`, accept one connection, run the script, then hold the
    /// connection open until the peer goes away.
    ///
    /// # Errors
    ///
    /// Propagates socket errors and framing errors from malformed client
    /// requests.
    pub async fn run(addr: &str, script: Vec<Step>) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let (mut stream, _peer) = listener.accept().await?;

        for step in script {
            match step {
                Step::Respond(reply) => {
                    let _request = next_request(&mut stream).await?;
                    pdu::write_pdu_value(&mut stream, &reply).await?;
                }
                Step::RespondWith(f) => {
                    let request = next_request(&mut stream).await?;
                    let reply = f(request);
                    pdu::write_pdu_value(&mut stream, &reply).await?;
                }
                Step::Unilateral(event) => {
                    pdu::write_pdu_value(&mut stream, &event).await?;
                }
                Step::Drop => return Ok(()),
            }
        }

        // Script exhausted: linger until the client hangs up so its close
        // path sees an orderly peer.
        loop {
            match pdu::read_pdu(&mut stream).await {
                Ok(_) => continue,
                Err(_) => return Ok(()),
            }
        }
    }
}

async fn next_request(stream: &mut TcpStream) -> io::Result<Value> {
    let body = pdu::read_pdu(stream)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Value::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
