//! JSON payload builders and parsers for the voice signalling channel.

use crate::crypto::Mode;
use crate::info::ConnectionInfo;
use crate::model::OpCode;
use serde::Deserialize;
use serde_json::{json, Value};

#[inline]
pub fn build_identify(info: &ConnectionInfo) -> Value {
    json!({
        "op": OpCode::Identify.num(),
        "d": {
            "server_id": info.guild_id.0,
            "session_id": &info.session_id,
            "token": &info.token,
            "user_id": info.user_id.0,
        }
    })
}

#[inline]
pub fn build_heartbeat(nonce: u64) -> Value {
    json!({
        "op": OpCode::Heartbeat.num(),
        "d": nonce,
    })
}

#[inline]
pub fn build_resume(info: &ConnectionInfo) -> Value {
    json!({
        "op": OpCode::Resume.num(),
        "d": {
            "server_id": info.guild_id.0,
            "session_id": &info.session_id,
            "token": &info.token,
        },
    })
}

#[inline]
pub fn build_select_protocol(address: &str, port: u16, crypto_mode: Mode) -> Value {
    json!({
        "op": OpCode::SelectProtocol.num(),
        "d": {
            "protocol": "udp",
            "data": {
                "address": address,
                "mode": crypto_mode.to_request_str(),
                "port": port,
            }
        }
    })
}

#[inline]
pub fn build_speaking(speaking: bool, ssrc: u32) -> Value {
    json!({
        "op": OpCode::Speaking.num(),
        "d": {
            "delay": 0,
            "speaking": if speaking { 1 } else { 0 },
            "ssrc": ssrc,
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReadyData {
    pub ssrc: u32,
    pub ip: String,
    pub port: u16,
    pub modes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionDescriptionData {
    pub secret_key: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct SpeakingData {
    pub ssrc: u32,
    pub user_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ClientDisconnectData {
    pub user_id: u64,
}

/// A fully parsed inbound signalling-channel message.
#[derive(Debug)]
pub enum Inbound {
    Hello(HelloData),
    Ready(ReadyData),
    SessionDescription(SessionDescriptionData),
    SpeakerStart(SpeakingData),
    SpeakerStop(ClientDisconnectData),
    HeartbeatAck,
    Resumed,
    Unknown(u8),
}

impl Inbound {
    /// The wire opcode this message was parsed from, for diagnostics where
    /// the raw byte matters more than the parsed shape.
    pub fn opcode(&self) -> u8 {
        match self {
            Inbound::Hello(_) => OpCode::Hello.num(),
            Inbound::Ready(_) => OpCode::Ready.num(),
            Inbound::SessionDescription(_) => OpCode::SessionDescription.num(),
            Inbound::SpeakerStart(_) => OpCode::Speaking.num(),
            Inbound::SpeakerStop(_) => OpCode::SpeakerStop.num(),
            Inbound::HeartbeatAck => OpCode::HeartbeatAck.num(),
            Inbound::Resumed => OpCode::Resumed.num(),
            Inbound::Unknown(op) => *op,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

/// Parses a raw JSON text frame into an [`Inbound`] message.
pub fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let env: Envelope = serde_json::from_str(text)?;
    inbound_from_envelope(env)
}

/// Parses an already-decoded JSON value (e.g. from `serde_json::Value`)
/// into an [`Inbound`] message.
pub fn inbound_from_value(value: Value) -> Result<Inbound, serde_json::Error> {
    let env: Envelope = serde_json::from_value(value)?;
    inbound_from_envelope(env)
}

fn inbound_from_envelope(env: Envelope) -> Result<Inbound, serde_json::Error> {
    Ok(match env.op {
        op if op == OpCode::Hello.num() => Inbound::Hello(serde_json::from_value(env.d)?),
        op if op == OpCode::Ready.num() => Inbound::Ready(serde_json::from_value(env.d)?),
        op if op == OpCode::SessionDescription.num() =>
            Inbound::SessionDescription(serde_json::from_value(env.d)?),
        op if op == OpCode::Speaking.num() => Inbound::SpeakerStart(serde_json::from_value(env.d)?),
        op if op == OpCode::SpeakerStop.num() =>
            Inbound::SpeakerStop(serde_json::from_value(env.d)?),
        op if op == OpCode::HeartbeatAck.num() => Inbound::HeartbeatAck,
        op if op == OpCode::Resumed.num() => Inbound::Resumed,
        other => Inbound::Unknown(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_select_protocol_embeds_normal_mode() {
        let v = build_select_protocol("203.0.113.9", 50001, Mode::Normal);
        assert_eq!(v["d"]["data"]["mode"], "xsalsa20_poly1305");
        assert_eq!(v["d"]["data"]["port"], 50001);
    }

    #[test]
    fn parse_inbound_recognises_ready() {
        let text = r#"{"op":2,"d":{"ssrc":12345,"ip":"198.51.100.7","port":50001,"modes":["xsalsa20_poly1305"]}}"#;
        match parse_inbound(text).unwrap() {
            Inbound::Ready(r) => {
                assert_eq!(r.ssrc, 12345);
                assert_eq!(r.modes[0], "xsalsa20_poly1305");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_inbound_falls_back_to_unknown() {
        let text = r#"{"op":200,"d":{}}"#;
        assert!(matches!(parse_inbound(text).unwrap(), Inbound::Unknown(200)));
    }
}
