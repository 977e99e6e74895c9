//! A minimal hand-rolled WebSocket frame codec over a TLS stream.
//!
//! The signalling channel only ever needs text frames, close, and the
//! server's ping/pong keepalive, so rather than pull in a full WebSocket
//! crate this speaks just enough of RFC 6455 to open the connection and
//! exchange JSON messages with the voice gateway.

use rand::RngCore;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use serde_json::Value;
use std::convert::TryInto;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::instrument;
use url::Url;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid websocket endpoint url: {0}")]
    InvalidUrl(String),
    #[error("tls handshake failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("server did not upgrade the connection (status line: {0})")]
    HandshakeRefused(String),
    #[error("peer closed the connection")]
    Closed,
    #[error("received an oversized frame ({0} bytes)")]
    FrameTooLarge(u64),
}

pub type Result<T> = std::result::Result<T, WsError>;

const OP_TEXT: u8 = 0x1;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;
const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// A connected, handshaken WebSocket-framed TLS stream.
pub struct WsStream {
    inner: TlsStream<TcpStream>,
}

impl WsStream {
    /// Opens a TCP connection to `url`'s host, performs the TLS handshake
    /// using the platform's trusted root store, sends the HTTP Upgrade
    /// request, and validates the `101 Switching Protocols` response.
    #[instrument(skip_all, fields(host = %url.host_str().unwrap_or("")))]
    pub async fn connect(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| WsError::InvalidUrl(url.to_string()))?
            .to_owned();
        let port = url.port_or_known_default().unwrap_or(443);

        let tcp = TcpStream::connect((host.as_str(), port)).await?;

        let mut roots = RootCertStore::empty();
        roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(host.as_str())
            .map_err(|_| WsError::InvalidUrl(host.clone()))?;
        let mut tls = connector.connect(server_name, tcp).await?;

        let path = if url.path().is_empty() { "/" } else { url.path() };
        let request = format!(
            "GET {path}?v={version} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            path = path,
            version = crate::constants::VOICE_GATEWAY_VERSION,
            host = host,
            key = base64_nonce(),
        );
        tls.write_all(request.as_bytes()).await?;

        let status = read_http_status_line(&mut tls).await?;
        if !status.contains("101") {
            return Err(WsError::HandshakeRefused(status));
        }

        Ok(Self { inner: tls })
    }

    /// Sends `value` as a masked text frame.
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        let text = serde_json::to_vec(value)?;
        write_frame(&mut self.inner, OP_TEXT, &text).await
    }

    /// Reads the next frame, transparently answering pings, skipping pongs,
    /// and returning `Ok(None)` if the peer sent a close frame.
    pub async fn recv_json(&mut self) -> Result<Option<Value>> {
        loop {
            let (opcode, payload) = read_frame(&mut self.inner).await?;
            match opcode {
                OP_TEXT => return Ok(Some(serde_json::from_slice(&payload)?)),
                OP_PING => write_frame(&mut self.inner, OP_PONG, &payload).await?,
                OP_PONG => continue,
                OP_CLOSE => return Ok(None),
                _ => continue,
            }
        }
    }

    /// Splits the handshaken stream into an independently owned writer and
    /// reader, so a background task can own inbound reads without holding a
    /// lock shared with whatever sends outbound frames.
    pub fn split(self) -> (WsReader, WsWriter) {
        let (read_half, write_half) = split(self.inner);
        let writer = WsWriter {
            inner: Arc::new(AsyncMutex::new(write_half)),
        };
        let reader = WsReader {
            inner: read_half,
            writer: writer.clone(),
        };
        (reader, writer)
    }
}

/// The write half of a split [`WsStream`]. Cheaply `Clone`, so the steady-
/// state loop and the background reader's auto-pong can both hold one.
#[derive(Clone)]
pub struct WsWriter {
    inner: Arc<AsyncMutex<WriteHalf<TlsStream<TcpStream>>>>,
}

impl WsWriter {
    pub async fn send_json(&self, value: &Value) -> Result<()> {
        let text = serde_json::to_vec(value)?;
        let mut inner = self.inner.lock().await;
        write_frame(&mut *inner, OP_TEXT, &text).await
    }
}

/// The read half of a split [`WsStream`]. Not `Clone`; meant to be owned
/// exclusively by the task that pumps inbound frames.
pub struct WsReader {
    inner: ReadHalf<TlsStream<TcpStream>>,
    writer: WsWriter,
}

impl WsReader {
    /// Reads the next frame, transparently answering pings via the paired
    /// writer, skipping pongs, and returning `Ok(None)` on a close frame.
    pub async fn recv_json(&mut self) -> Result<Option<Value>> {
        loop {
            let (opcode, payload) = read_frame(&mut self.inner).await?;
            match opcode {
                OP_TEXT => return Ok(Some(serde_json::from_slice(&payload)?)),
                OP_PING => {
                    let mut inner = self.writer.inner.lock().await;
                    write_frame(&mut *inner, OP_PONG, &payload).await?;
                },
                OP_PONG => continue,
                OP_CLOSE => return Ok(None),
                _ => continue,
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, opcode: u8, payload: &[u8]) -> Result<()> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(0x80 | opcode);

    let len = payload.len();
    if len < 126 {
        frame.push(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(0x80 | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mut mask_key = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut mask_key);
    frame.extend_from_slice(&mask_key);

    let start = frame.len();
    frame.extend_from_slice(payload);
    for (i, byte) in frame[start..].iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }

    stream.write_all(&frame).await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<(u8, Vec<u8>)> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;

    let opcode = head[0] & 0x0F;
    let masked = head[1] & 0x80 != 0;
    let mut len = (head[1] & 0x7F) as u64;

    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext).await?;
        len = u16::from_be_bytes(ext) as u64;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext).await?;
        len = u64::from_be_bytes(ext);
    }

    if len > MAX_FRAME_LEN {
        return Err(WsError::FrameTooLarge(len));
    }

    let mask_key = if masked {
        let mut key = [0u8; 4];
        stream.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len.try_into().unwrap_or(usize::MAX)];
    stream.read_exact(&mut payload).await?;

    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok((opcode, payload))
}

fn base64_nonce() -> String {
    use std::fmt::Write;
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    // Not a general-purpose base64 encoder: good enough for a throwaway
    // handshake nonce the server never validates against a known alphabet
    // requirement beyond "is valid base64".
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(24);
    for chunk in raw.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        let _ = write!(out, "{}", ALPHABET[((n >> 18) & 0x3F) as usize] as char);
        let _ = write!(out, "{}", ALPHABET[((n >> 12) & 0x3F) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[((n >> 6) & 0x3F) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3F) as usize] as char
        } else {
            '='
        });
    }
    out
}

async fn read_http_status_line(stream: &mut TlsStream<TcpStream>) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    // Drain the remaining header lines up to the blank line terminator.
    let mut blank_run = 0;
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == b'\r' {
            continue;
        }
        if byte[0] == b'\n' {
            blank_run += 1;
            if blank_run == 2 {
                break;
            }
        } else {
            blank_run = 0;
        }
    }
    Ok(String::from_utf8_lossy(&line).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_nonce_has_expected_length() {
        assert_eq!(base64_nonce().len(), 24);
    }
}
