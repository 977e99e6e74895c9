//! RTP header construction and parsing.
//!
//! Builds and reads the 12-byte header by hand (no `discortp`), per the
//! transport's need for just one fixed, dynamic-payload-type RTP profile.

use crate::constants::{
    RTCP_PAYLOAD_TYPE_RANGE, RTP_FLAGS, RTP_HEADER_LEN, RTP_PAYLOAD_TYPE, RTP_VERSION,
};
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpError {
    #[error("packet shorter than the {RTP_HEADER_LEN} byte RTP header")]
    TooShort,
    #[error("unexpected RTP version byte {0:#x}")]
    BadVersion(u8),
    #[error("payload type {0} falls in the RTCP range and is not audio")]
    RtcpPayloadType(u8),
    #[error("packet truncated while skipping CSRC/extension fields")]
    TruncatedExtension,
}

/// Running RTP sequence/timestamp state for one outbound stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct RtpState {
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpState {
    pub fn new(ssrc: u32) -> Self {
        Self {
            sequence: 0,
            timestamp: 0,
            ssrc,
        }
    }

    /// Advances sequence by 1 and timestamp by `sample_count`, both wrapping,
    /// and returns the 12-byte header for the packet this frame becomes.
    pub fn next_header(&mut self, sample_count: u32) -> [u8; RTP_HEADER_LEN] {
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(sample_count);
        self.header()
    }

    pub fn header(&self) -> [u8; RTP_HEADER_LEN] {
        let mut buf = [0u8; RTP_HEADER_LEN];
        buf[0] = RTP_FLAGS;
        buf[1] = RTP_PAYLOAD_TYPE;
        BigEndian::write_u16(&mut buf[2..4], self.sequence);
        BigEndian::write_u32(&mut buf[4..8], self.timestamp);
        BigEndian::write_u32(&mut buf[8..12], self.ssrc);
        buf
    }
}

/// A parsed RTP header plus the offset in the original packet where the
/// audio payload (after CSRC list and any extension) begins.
#[derive(Clone, Copy, Debug)]
pub struct ParsedHeader {
    pub version: u8,
    pub has_extension: bool,
    pub csrc_count: u8,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_offset: usize,
}

/// Parses the fixed 12-byte header plus any CSRC list, rejecting RTCP
/// payload types per the platform's quirk of sharing a port between RTP
/// and RTCP traffic.
pub fn parse_header(packet: &[u8]) -> Result<ParsedHeader, RtpError> {
    if packet.len() < RTP_HEADER_LEN {
        return Err(RtpError::TooShort);
    }

    let version = packet[0] >> 6;
    if version != RTP_VERSION {
        return Err(RtpError::BadVersion(version));
    }

    let has_extension = (packet[0] & 0b0001_0000) != 0;
    let csrc_count = packet[0] & 0b0000_1111;
    let payload_type = packet[1] & 0x7F;

    if RTCP_PAYLOAD_TYPE_RANGE.contains(&payload_type) {
        return Err(RtpError::RtcpPayloadType(payload_type));
    }

    let sequence = BigEndian::read_u16(&packet[2..4]);
    let timestamp = BigEndian::read_u32(&packet[4..8]);
    let ssrc = BigEndian::read_u32(&packet[8..12]);

    let csrc_bytes = 4 * csrc_count as usize;
    if packet.len() < RTP_HEADER_LEN + csrc_bytes {
        return Err(RtpError::TruncatedExtension);
    }

    Ok(ParsedHeader {
        version,
        has_extension,
        csrc_count,
        payload_type,
        sequence,
        timestamp,
        ssrc,
        payload_offset: RTP_HEADER_LEN + csrc_bytes,
    })
}

/// Given an already-decrypted payload (the bytes starting at
/// [`ParsedHeader::payload_offset`]), returns the offset at which the Opus
/// frame itself begins once any RTP header extension has been skipped.
pub fn skip_extension(header: &ParsedHeader, decrypted_payload: &[u8]) -> Result<usize, RtpError> {
    if !header.has_extension {
        return Ok(0);
    }
    if decrypted_payload.len() < 4 {
        return Err(RtpError::TruncatedExtension);
    }
    let len_words = BigEndian::read_u16(&decrypted_payload[2..4]) as usize;
    let skip = 4 + 4 * len_words;
    if decrypted_payload.len() < skip {
        return Err(RtpError::TruncatedExtension);
    }
    Ok(skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_header_increments_sequence_and_timestamp() {
        let mut state = RtpState::new(0xABCD1234);
        let h1 = state.next_header(960);
        let h2 = state.next_header(960);

        let seq1 = BigEndian::read_u16(&h1[2..4]);
        let seq2 = BigEndian::read_u16(&h2[2..4]);
        assert_eq!(seq2, seq1.wrapping_add(1));

        let ts1 = BigEndian::read_u32(&h1[4..8]);
        let ts2 = BigEndian::read_u32(&h2[4..8]);
        assert_eq!(ts2, ts1 + 960);
    }

    #[test]
    fn sequence_and_timestamp_wrap() {
        let mut state = RtpState::new(1);
        state.sequence = u16::MAX;
        state.timestamp = u32::MAX - 10;
        let h = state.next_header(960);
        assert_eq!(BigEndian::read_u16(&h[2..4]), 0);
        assert_eq!(BigEndian::read_u32(&h[4..8]), 949);
    }

    #[test]
    fn parse_header_round_trips_fields() {
        let mut state = RtpState::new(42);
        let header = state.next_header(960);
        let parsed = parse_header(&header).unwrap();
        assert_eq!(parsed.ssrc, 42);
        assert_eq!(parsed.sequence, 1);
        assert_eq!(parsed.timestamp, 960);
        assert_eq!(parsed.payload_offset, RTP_HEADER_LEN);
    }

    #[test]
    fn rejects_rtcp_payload_type_range() {
        let mut packet = [0u8; RTP_HEADER_LEN];
        packet[0] = RTP_FLAGS;
        packet[1] = 73;
        assert_eq!(parse_header(&packet), Err(RtpError::RtcpPayloadType(73)));
    }

    #[test]
    fn skips_csrc_list() {
        let mut packet = vec![0u8; RTP_HEADER_LEN + 8];
        packet[0] = RTP_FLAGS | 0x02; // csrc_count = 2
        packet[1] = RTP_PAYLOAD_TYPE;
        let parsed = parse_header(&packet).unwrap();
        assert_eq!(parsed.payload_offset, RTP_HEADER_LEN + 8);
    }

    #[test]
    fn skip_extension_computes_word_length() {
        let header = ParsedHeader {
            version: RTP_VERSION,
            has_extension: true,
            csrc_count: 0,
            payload_type: RTP_PAYLOAD_TYPE,
            sequence: 0,
            timestamp: 0,
            ssrc: 0,
            payload_offset: RTP_HEADER_LEN,
        };
        let mut payload = vec![0u8; 12];
        BigEndian::write_u16(&mut payload[2..4], 2);
        assert_eq!(skip_extension(&header, &payload).unwrap(), 12);
    }
}
