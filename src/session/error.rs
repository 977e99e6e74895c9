//! Errors for the handshake (`ConnectError`) and steady-state (`TaskError`)
//! halves of a voice session, split the way the teacher splits
//! `connection::error::Error` from `tasks::error::Error`.

use crate::crypto::CryptoError;
use crate::rtp::RtpError;
use crate::udp::DatagramError;
use crate::ws::WsError;
use thiserror::Error;

/// Errors encountered while establishing a voice session: TLS connect,
/// hello/ready/session-description handshake, and IP discovery.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cryptography error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("server changed the negotiated encryption mode mid-handshake")]
    CryptoModeInvalid,
    #[error("no mutually supported encryption mode was offered")]
    CryptoModeUnavailable,
    #[error("endpoint url received from the control shard was invalid: {0}")]
    EndpointUrl(String),
    #[error("handshake protocol was violated: expected {expected}, got opcode {got}")]
    ExpectedHandshake { expected: &'static str, got: u8 },
    #[error("IP discovery response was malformed")]
    IllegalDiscoveryResponse,
    #[error("IP discovery response contained an unparsable IP address")]
    IllegalIp,
    #[error("timed out waiting for the control shard to hand over session data")]
    InitDataTimeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] WsError),
    #[error("datagram channel error: {0}")]
    Datagram(#[from] DatagramError),
}

/// Errors raised by the steady-state session worker after a connection has
/// been established.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("rtp error: {0}")]
    Rtp(#[from] RtpError),
    #[error("cryptography error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] WsError),
    #[error("datagram channel error: {0}")]
    Datagram(#[from] DatagramError),
    #[error("heartbeat ack not received before the next heartbeat was due")]
    HeartbeatTimeout,
    #[error("failed to message another internal worker: {0}")]
    InterconnectFailure(&'static str),
}

impl TaskError {
    /// Whether this failure should trigger a full reconnect (tear down and
    /// re-enter the handshake) as opposed to being logged and ignored.
    pub fn should_trigger_reconnect(&self) -> bool {
        !matches!(self, TaskError::Rtp(_) | TaskError::Crypto(_))
    }
}
