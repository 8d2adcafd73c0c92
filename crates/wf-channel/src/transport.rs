//! Persistent message transports.
//!
//! # Wire format
//!
//! Newline-delimited JSON: each message is one UTF-8 JSON object followed
//! by `\n`.  Messages never contain a raw newline.
//!
//! ```text
//! {"session_id":"a1b2c3d4-..."}\n
//! {"latitude":39.981,"longitude":-75.155,"timestamp":1700000000}\n
//! ```
//!
//! Reads never block: [`Transport::try_recv`] returns `Ok(None)` when no
//! complete line is buffered yet.  A peer close surfaces as
//! [`ChannelError::Closed`].

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::{ChannelError, ChannelResult};

/// Largest line accepted from a peer.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// A bidirectional, message-oriented connection.
pub trait Transport: Send {
    /// (Re)open the connection.  Any previous connection is dropped first.
    fn connect(&mut self) -> ChannelResult<()>;

    /// Send one message.  `line` must not contain `\n`.
    fn send(&mut self, line: &str) -> ChannelResult<()>;

    /// Next complete inbound message, if any.  Never blocks.
    fn try_recv(&mut self) -> ChannelResult<Option<String>>;

    /// Close the connection.  Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> ChannelResult<()> {
        (**self).connect()
    }
    fn send(&mut self, line: &str) -> ChannelResult<()> {
        (**self).send(line)
    }
    fn try_recv(&mut self) -> ChannelResult<Option<String>> {
        (**self).try_recv()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

// ── TcpTransport ──────────────────────────────────────────────────────────────

pub struct TcpTransport {
    address:         String,
    connect_timeout: Duration,
    stream:          Option<TcpStream>,
    /// Bytes received but not yet split into lines.
    pending:         Vec<u8>,
    /// Peer closed with lines still buffered.
    peer_gone:       bool,
}

impl TcpTransport {
    /// A client transport for `address` (`host:port`); nothing is opened
    /// until [`Transport::connect`].
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            stream: None,
            pending: Vec::new(),
            peer_gone: false,
        }
    }

    /// Wrap a server-side stream from `TcpListener::accept`.
    ///
    /// The stream is switched to non-blocking mode.  `connect` on an
    /// accepted transport re-dials the peer address, which is rarely
    /// useful; servers just drop the transport when the peer leaves.
    pub fn from_stream(stream: TcpStream) -> ChannelResult<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let address = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        Ok(Self {
            address,
            connect_timeout: Duration::from_secs(5),
            stream: Some(stream),
            pending: Vec::new(),
            peer_gone: false,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn connect_err(&self, source: std::io::Error) -> ChannelError {
        ChannelError::Connect { address: self.address.clone(), source }
    }

    /// Pop one complete line out of `pending`.
    fn take_line(&mut self) -> ChannelResult<Option<String>> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| ChannelError::MalformedUpdate(format!("invalid UTF-8: {e}")))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> ChannelResult<()> {
        self.close();

        let mut last_err = None;
        let addrs = self.address.to_socket_addrs().map_err(|e| self.connect_err(e))?;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    info!(address = %self.address, "connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(self.connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "address resolved to nothing")
        })))
    }

    fn send(&mut self, line: &str) -> ChannelResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ChannelError::Closed);
        };
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        // Lines are small; a full send buffer is treated like a dead peer.
        match stream.write_all(&framed) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(address = %self.address, error = %e, "send failed");
                self.close();
                Err(ChannelError::Closed)
            }
        }
    }

    fn try_recv(&mut self) -> ChannelResult<Option<String>> {
        if let Some(line) = self.take_line()? {
            return Ok(Some(line));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ChannelError::Closed);
        };

        let mut chunk = [0u8; 4096];
        let mut eof = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if self.pending.len() > MAX_LINE_BYTES && !self.pending.contains(&b'\n') {
                        self.close();
                        return Err(ChannelError::MalformedUpdate("line too long".into()));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(address = %self.address, error = %e, "read failed");
                    eof = true;
                    break;
                }
            }
        }

        // Lines that arrived before the close are still delivered.
        if let Some(line) = self.take_line()? {
            if eof {
                self.peer_gone = true;
            }
            return Ok(Some(line));
        }
        if eof || self.peer_gone {
            debug!(address = %self.address, "peer closed");
            self.close();
            return Err(ChannelError::Closed);
        }
        Ok(None)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.pending.clear();
        self.peer_gone = false;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

// ── MemoryTransport ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    open:          bool,
    connects:      usize,
    failing:       usize,
    sent:          Vec<String>,
    inbound:       VecDeque<String>,
    peer_closing:  bool,
}

/// An in-process transport driven from a [`MemoryHandle`].
///
/// Used by tests and the demo's local loopback.  The handle survives the
/// transport being boxed into a channel, so a test can script the server
/// side and inspect what was sent.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Clone)]
pub struct MemoryHandle {
    inner: Arc<Mutex<MemoryInner>>,
}

fn lock(inner: &Mutex<MemoryInner>) -> MutexGuard<'_, MemoryInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryHandle) {
        let t = Self::default();
        let h = MemoryHandle { inner: Arc::clone(&t.inner) };
        (t, h)
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> ChannelResult<()> {
        let mut inner = lock(&self.inner);
        inner.connects += 1;
        if inner.failing > 0 {
            inner.failing -= 1;
            inner.open = false;
            return Err(ChannelError::Connect {
                address: "memory".into(),
                source:  std::io::Error::new(ErrorKind::ConnectionRefused, "scripted failure"),
            });
        }
        inner.open = true;
        inner.peer_closing = false;
        Ok(())
    }

    fn send(&mut self, line: &str) -> ChannelResult<()> {
        let mut inner = lock(&self.inner);
        if !inner.open {
            return Err(ChannelError::Closed);
        }
        inner.sent.push(line.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> ChannelResult<Option<String>> {
        let mut inner = lock(&self.inner);
        if !inner.open {
            return Err(ChannelError::Closed);
        }
        if let Some(line) = inner.inbound.pop_front() {
            return Ok(Some(line));
        }
        if inner.peer_closing {
            inner.peer_closing = false;
            inner.open = false;
            return Err(ChannelError::Closed);
        }
        Ok(None)
    }

    fn close(&mut self) {
        let mut inner = lock(&self.inner);
        inner.open = false;
        inner.inbound.clear();
        inner.peer_closing = false;
    }

    fn is_open(&self) -> bool {
        lock(&self.inner).open
    }
}

impl MemoryHandle {
    /// Queue a line for the client to receive.
    pub fn push(&self, line: impl Into<String>) {
        lock(&self.inner).inbound.push_back(line.into());
    }

    /// Close from the peer side once queued lines are drained.
    pub fn close_from_peer(&self) {
        lock(&self.inner).peer_closing = true;
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        lock(&self.inner).failing = n;
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.inner).sent.clone()
    }

    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.inner).sent)
    }

    pub fn connects(&self) -> usize {
        lock(&self.inner).connects
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner).open
    }
}
