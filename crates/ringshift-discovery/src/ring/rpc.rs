//! msgpack-rpc client for the ring binary.
//!
//! Each call opens a fresh TCP connection, writes one request
//! `[0, msgid, method, params]` and reads frames until the matching response
//! `[1, msgid, error, result]` arrives. The whole exchange is bounded by the
//! client's timeout.

use super::key::RingKey;
use super::peer::{NodeInfo, RingError, RingPeer};
use async_trait::async_trait;
use rmpv::Value;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

/// Default ring RPC port
pub const DEFAULT_RING_PORT: u16 = 5057;

/// Largest frame accepted from a peer
const MAX_FRAME: usize = 1024 * 1024;

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;

/// Ring peer reached over msgpack-rpc
#[derive(Debug)]
pub struct RpcRingClient {
    peer: String,
    timeout: Duration,
    next_id: AtomicU32,
}

impl RpcRingClient {
    /// Client for the ring node at `host:port`
    #[must_use]
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            peer: format!("{host}:{port}"),
            timeout,
            next_id: AtomicU32::new(0),
        }
    }

    /// Issue one call and return the result slot
    ///
    /// # Errors
    ///
    /// See [`RingError`]: timeouts and socket failures are transient, a
    /// populated error slot is `Remote`, anything undecodable is `Protocol`.
    pub async fn call(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Value, RingError> {
        let msgid = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("-> {} {}({:?}) #{}", self.peer, method, params, msgid);

        match time::timeout(self.timeout, self.exchange(method, msgid, params)).await {
            Ok(result) => result,
            Err(_) => Err(RingError::Timeout {
                peer: self.peer.clone(),
                method,
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange(
        &self,
        method: &'static str,
        msgid: u32,
        params: Vec<Value>,
    ) -> Result<Value, RingError> {
        let request = Value::Array(vec![
            Value::from(REQUEST),
            Value::from(msgid),
            Value::from(method),
            Value::Array(params),
        ]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &request).map_err(|e| self.protocol(e))?;

        let mut stream = TcpStream::connect(&self.peer)
            .await
            .map_err(|e| self.unreachable(e))?;
        stream
            .write_all(&bytes)
            .await
            .map_err(|e| self.unreachable(e))?;

        let mut buf = Vec::new();
        loop {
            let frame = read_frame(&mut stream, &mut buf)
                .await
                .map_err(|e| self.unreachable(e))?
                .ok_or_else(|| self.protocol("connection closed before response"))?;

            match self.parse_response(method, msgid, frame)? {
                Some(result) => return Ok(result),
                None => continue,
            }
        }
    }

    /// `Ok(None)` for frames that belong to another exchange
    fn parse_response(
        &self,
        method: &'static str,
        msgid: u32,
        frame: Value,
    ) -> Result<Option<Value>, RingError> {
        let Value::Array(mut parts) = frame else {
            return Err(self.protocol("response is not an array"));
        };
        if parts.len() != 4 || parts[0].as_u64() != Some(RESPONSE) {
            tracing::debug!("Ignoring non-response frame from {}", self.peer);
            return Ok(None);
        }
        if parts[1].as_u64() != Some(u64::from(msgid)) {
            tracing::debug!("Ignoring response for another msgid from {}", self.peer);
            return Ok(None);
        }

        let result = parts.pop().unwrap_or(Value::Nil);
        let error = parts.pop().unwrap_or(Value::Nil);
        if !error.is_nil() {
            return Err(RingError::Remote {
                peer: self.peer.clone(),
                method,
                message: value_text(&error).unwrap_or_else(|| error.to_string()),
            });
        }
        Ok(Some(result))
    }

    async fn call_node(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<NodeInfo, RingError> {
        let value = self.call(method, params).await?;
        decode_node(&value).map_err(|reason| self.protocol(reason))
    }

    fn unreachable(&self, source: io::Error) -> RingError {
        RingError::Unreachable {
            peer: self.peer.clone(),
            source,
        }
    }

    fn protocol(&self, reason: impl ToString) -> RingError {
        RingError::Protocol {
            peer: self.peer.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RingPeer for RpcRingClient {
    async fn create(&self) -> Result<(), RingError> {
        self.call("create", Vec::new()).await.map(|_| ())
    }

    async fn join(&self, via: &NodeInfo) -> Result<(), RingError> {
        self.call("join", vec![encode_node(via)]).await.map(|_| ())
    }

    async fn get_info(&self) -> Result<NodeInfo, RingError> {
        self.call_node("get_info", Vec::new()).await
    }

    async fn get_predecessor(&self) -> Result<NodeInfo, RingError> {
        self.call_node("get_predecessor", Vec::new()).await
    }

    async fn get_successor(&self, index: u32) -> Result<NodeInfo, RingError> {
        self.call_node("get_successor", vec![Value::from(index)]).await
    }
}

/// Wire form of a node: `[ip, port, id]`
#[must_use]
pub fn encode_node(node: &NodeInfo) -> Value {
    Value::Array(vec![
        Value::from(node.ip.as_str()),
        Value::from(node.port),
        Value::from(node.id.get()),
    ])
}

/// Decode `[ip, port, id]`, accepting `ip` as either str or bin
///
/// # Errors
///
/// Returns a description of the first field that does not fit.
pub fn decode_node(value: &Value) -> Result<NodeInfo, String> {
    let fields = value
        .as_array()
        .ok_or_else(|| format!("node is not an array: {value}"))?;
    if fields.len() < 3 {
        return Err(format!("node has {} fields, expected 3", fields.len()));
    }

    let ip = value_text(&fields[0]).ok_or_else(|| format!("bad node address: {}", fields[0]))?;
    let port = fields[1]
        .as_u64()
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| format!("bad node port: {}", fields[1]))?;
    let id = fields[2]
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| format!("node id outside the 32-bit ring: {}", fields[2]))?;

    Ok(NodeInfo::new(ip, port, RingKey(id)))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => s.as_str().map(str::to_owned),
        Value::Binary(b) => String::from_utf8(b.clone()).ok(),
        _ => None,
    }
}

/// Read one msgpack value from `reader`, buffering partial input in `buf`
///
/// Returns `Ok(None)` on a clean EOF with nothing buffered.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<Value>> {
    let mut chunk = [0u8; 4096];
    loop {
        if !buf.is_empty() {
            let mut cursor = Cursor::new(buf.as_slice());
            match rmpv::decode::read_value(&mut cursor) {
                Ok(value) => {
                    let used = cursor.position() as usize;
                    buf.drain(..used);
                    return Ok(Some(value));
                }
                Err(e) if is_truncated(&e) => {}
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            }
        }
        if buf.len() > MAX_FRAME {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(io::ErrorKind::UnexpectedEof.into())
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn is_truncated(error: &rmpv::decode::Error) -> bool {
    match error {
        rmpv::decode::Error::InvalidMarkerRead(e) | rmpv::decode::Error::InvalidDataRead(e) => {
            e.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}
