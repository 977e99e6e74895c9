//! Per-guild voice session: the handshake state machine, heartbeat, and the
//! steady-state hooks the supervisor and mixer drive each tick.

pub mod error;
pub mod state;

use crate::constants::{IP_DISCOVERY_LEN, KEY_LEN, VOICE_GATEWAY_VERSION};
use crate::crypto::{Cipher, Mode as CryptoMode};
use crate::info::ConnectionInfo;
use crate::model::payload::{
    build_identify, build_resume, build_select_protocol, inbound_from_value, Inbound,
};
use crate::rtp::RtpState;
use crate::udp::DatagramChannel;
use crate::ws::{WsStream, WsWriter};
use byteorder::{BigEndian, ByteOrder};
use error::ConnectError;
use serde_json::Value;
use state::State;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Everything a connected voice session needs to keep driving RTP and
/// signalling: the negotiated SSRC, external address, cipher, and sockets.
pub struct VoiceSession {
    pub info: ConnectionInfo,
    pub state: State,
    pub ssrc: u32,
    pub heartbeat_interval: Duration,
    pub ws: Option<WsWriter>,
    pub datagram: DatagramChannel,
    pub cipher: Option<Cipher>,
    pub rtp_state: RtpState,
    heartbeat_acked: bool,
    inbound_rx: Option<flume::Receiver<Value>>,
    recv_task: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            state: State::CollectingInitData,
            ssrc: 0,
            heartbeat_interval: Duration::from_millis(41_250),
            ws: None,
            datagram: DatagramChannel::new(),
            cipher: None,
            rtp_state: RtpState::new(0),
            heartbeat_acked: true,
            inbound_rx: None,
            recv_task: None,
        }
    }

    /// Hands back a fresh clone of the channel carrying decoded inbound
    /// signalling messages, once [`VoiceSession::connect`] has reached
    /// [`State::Connected`]. `None` before that, or after a reconnect has
    /// torn the previous channel down.
    pub fn inbound_receiver(&self) -> Option<flume::Receiver<Value>> {
        self.inbound_rx.clone()
    }

    /// Splits `ws` into its write half (kept on `self`) and spawns a task
    /// that owns the read half exclusively, forwarding decoded messages
    /// through an unbounded channel. This keeps inbound reads off of
    /// whatever lock guards the session, so a caller awaiting the next
    /// signalling message never blocks the heartbeat or RTP send paths.
    fn spawn_inbound_pump(&mut self, ws: WsStream) {
        let (mut reader, writer) = ws.split();
        let (tx, rx) = flume::unbounded();
        let task = tokio::spawn(async move {
            loop {
                match reader.recv_json().await {
                    Ok(Some(value)) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "inbound signalling read failed");
                        break;
                    },
                }
            }
        });
        self.ws = Some(writer);
        self.inbound_rx = Some(rx);
        self.recv_task = Some(task);
    }

    /// Runs the full handshake (identify path, not resume) from whatever
    /// endpoint/session/token is already in `self.info`, leaving the
    /// session in [`State::Connected`] on success.
    #[instrument(skip(self), fields(guild = %self.info.guild_id))]
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = State::InitializingWebSocket;
        let url = generate_url(&self.info.endpoint)?;
        let mut ws = WsStream::connect(&url).await?;

        self.state = State::CollectingHello;
        let hello_interval = loop {
            match ws.recv_json().await? {
                Some(value) => match inbound_from_value(value)? {
                    Inbound::Hello(h) => break h.heartbeat_interval,
                    other => {
                        let got = other.opcode();
                        debug!(?other, "expected hello during handshake");
                        return Err(ConnectError::ExpectedHandshake { expected: "hello", got });
                    },
                },
                None => continue,
            }
        };
        self.heartbeat_interval = Duration::from_secs_f64(hello_interval / 1000.0);

        self.state = State::SendingIdentify;
        ws.send_json(&build_identify(&self.info)).await?;

        self.state = State::CollectingReady;
        let ready = loop {
            match ws.recv_json().await? {
                Some(value) => match inbound_from_value(value)? {
                    Inbound::Ready(r) => break r,
                    other => {
                        let got = other.opcode();
                        debug!(?other, "expected ready during handshake");
                        return Err(ConnectError::ExpectedHandshake { expected: "ready", got });
                    },
                },
                None => continue,
            }
        };

        if !ready
            .modes
            .iter()
            .any(|m| m == CryptoMode::Normal.to_request_str())
        {
            return Err(ConnectError::CryptoModeUnavailable);
        }
        self.ssrc = ready.ssrc;
        self.rtp_state = RtpState::new(self.ssrc);

        self.state = State::InitializingDatagramSocket;
        let peer: SocketAddr = format!("{}:{}", ready.ip, ready.port)
            .parse()
            .map_err(|_| ConnectError::IllegalDiscoveryResponse)?;
        self.datagram.connect(peer).await?;

        let request = build_discovery_request(self.ssrc);
        self.datagram.write_data(&request);
        self.datagram
            .process_io(crate::udp::IoMode::Write)
            .await?;
        self.datagram.readable().await?;
        self.datagram.process_io(crate::udp::IoMode::Read).await?;
        let reply = self.datagram.input_view();
        let (external_ip, external_port) = parse_discovery_response(&reply)?;
        self.datagram.consume_input(reply.len());

        self.state = State::SendingSelectProtocol;
        ws.send_json(&build_select_protocol(
            &external_ip,
            external_port,
            CryptoMode::Normal,
        ))
        .await?;

        self.state = State::CollectingSessionDescription;
        loop {
            match ws.recv_json().await? {
                Some(value) => match inbound_from_value(value)? {
                    Inbound::SessionDescription(desc) => {
                        if desc.secret_key.len() != KEY_LEN {
                            return Err(ConnectError::IllegalIp);
                        }
                        self.cipher = Some(Cipher::new(&desc.secret_key)?);
                        break;
                    },
                    other => debug!(?other, "expected session description"),
                },
                None => continue,
            }
        }

        self.spawn_inbound_pump(ws);
        self.heartbeat_acked = true;
        self.state = State::Connected;
        info!(endpoint = %self.info.endpoint, "voice session connected");
        Ok(())
    }

    /// Re-establishes the signalling channel using a resume, preserving the
    /// already-negotiated SSRC/cipher/UDP peer.
    #[instrument(skip(self), fields(guild = %self.info.guild_id))]
    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        let url = generate_url(&self.info.endpoint)?;
        let mut ws = WsStream::connect(&url).await?;
        ws.send_json(&build_resume(&self.info)).await?;

        let mut hello_interval = None;
        let mut resumed = false;
        loop {
            match ws.recv_json().await? {
                Some(value) => match inbound_from_value(value)? {
                    Inbound::Hello(h) => {
                        hello_interval = Some(Duration::from_secs_f64(h.heartbeat_interval / 1000.0));
                        if resumed {
                            break;
                        }
                    },
                    Inbound::Resumed => {
                        resumed = true;
                        if hello_interval.is_some() {
                            break;
                        }
                    },
                    other => debug!(?other, "expected hello/resumed"),
                },
                None => continue,
            }
        }

        self.heartbeat_interval = hello_interval.expect("hello is Some once the loop above breaks");
        self.spawn_inbound_pump(ws);
        self.heartbeat_acked = true;
        self.state = State::Connected;
        info!(endpoint = %self.info.endpoint, "voice session reconnected");
        Ok(())
    }

    /// Sends a heartbeat if one hasn't been acked since the last send;
    /// returns `false` if the previous heartbeat went unanswered (the
    /// caller should treat this as a reconnect trigger).
    pub async fn heartbeat_tick(&mut self, nonce: u64) -> Result<bool, ConnectError> {
        if !self.heartbeat_acked {
            return Ok(false);
        }
        if let Some(ws) = self.ws.as_ref() {
            ws.send_json(&crate::model::payload::build_heartbeat(nonce))
                .await?;
            self.heartbeat_acked = false;
        }
        Ok(true)
    }

    pub fn note_heartbeat_ack(&mut self) {
        self.heartbeat_acked = true;
    }

    pub fn reset_for_reconnect(&mut self) {
        self.ws = None;
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.inbound_rx = None;
        self.datagram.disconnect();
        self.rtp_state = RtpState::new(0);
        self.state = State::CollectingInitData;
    }
}

fn generate_url(endpoint: &str) -> Result<Url, ConnectError> {
    let endpoint = endpoint.strip_suffix(":80").unwrap_or(endpoint);
    Url::parse(&format!("wss://{endpoint}/?v={VOICE_GATEWAY_VERSION}"))
        .map_err(|_| ConnectError::EndpointUrl(endpoint.to_owned()))
}

fn build_discovery_request(ssrc: u32) -> [u8; IP_DISCOVERY_LEN] {
    let mut buf = [0u8; IP_DISCOVERY_LEN];
    BigEndian::write_u16(&mut buf[0..2], 0x0001);
    BigEndian::write_u16(&mut buf[2..4], 70);
    BigEndian::write_u32(&mut buf[4..8], ssrc);
    buf
}

fn parse_discovery_response(reply: &[u8]) -> Result<(String, u16), ConnectError> {
    if reply.len() < IP_DISCOVERY_LEN {
        return Err(ConnectError::IllegalDiscoveryResponse);
    }
    let kind = BigEndian::read_u16(&reply[0..2]);
    if kind != 0x0002 {
        return Err(ConnectError::IllegalDiscoveryResponse);
    }

    let address_raw = &reply[8..72];
    let nul = address_raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(ConnectError::IllegalIp)?;
    let address_str =
        std::str::from_utf8(&address_raw[..nul]).map_err(|_| ConnectError::IllegalIp)?;
    let address = IpAddr::from_str(address_str).map_err(|_| ConnectError::IllegalIp)?;
    let port = BigEndian::read_u16(&reply[72..74]);

    Ok((address.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_request_has_expected_layout() {
        let req = build_discovery_request(0xDEADBEEF);
        assert_eq!(BigEndian::read_u16(&req[0..2]), 1);
        assert_eq!(BigEndian::read_u16(&req[2..4]), 70);
        assert_eq!(BigEndian::read_u32(&req[4..8]), 0xDEADBEEF);
    }

    #[test]
    fn discovery_response_extracts_ip_and_port() {
        let mut reply = [0u8; IP_DISCOVERY_LEN];
        BigEndian::write_u16(&mut reply[0..2], 2);
        let ip = b"203.0.113.9\0";
        reply[8..8 + ip.len()].copy_from_slice(ip);
        BigEndian::write_u16(&mut reply[72..74], 50001);

        let (ip_str, port) = parse_discovery_response(&reply).unwrap();
        assert_eq!(ip_str, "203.0.113.9");
        assert_eq!(port, 50001);
    }

    #[test]
    fn generate_url_strips_trailing_port_80() {
        let url = generate_url("voice123.example.com:80").unwrap();
        assert!(!url.as_str().contains(":80"));
    }
}
