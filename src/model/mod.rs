//! Wire types for the voice signalling channel: opcodes and JSON payloads.

pub mod payload;

/// Opcodes understood on the voice signalling channel.
///
/// Values match the platform's voice gateway numbering; only the ones this
/// crate sends or reads are named, the rest are left as integers at the
/// parse boundary (see [`payload::Inbound::Unknown`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    Identify = 0,
    SelectProtocol = 1,
    Ready = 2,
    Heartbeat = 3,
    SessionDescription = 4,
    Speaking = 5,
    HeartbeatAck = 6,
    Resume = 7,
    Hello = 8,
    Resumed = 9,
    SpeakerStop = 13,
}

impl OpCode {
    pub fn num(self) -> u8 {
        self as u8
    }
}
