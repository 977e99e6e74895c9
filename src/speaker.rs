//! Per-SSRC decoder registry and the downmix that feeds the optional
//! forwarded stream (spec §4.8).

use crate::constants::{MAX_DECODE_OUTPUT_LEN, MIX_ACCUMULATOR_LEN, SAMPLE_RATE, SILENT_FRAME};
use crate::id::UserId;
use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::{Application, Channels};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{error, warn};

/// One active remote speaker: a live Opus decoder plus a jitter buffer of
/// decoded payloads awaiting the mixer's next tick.
///
/// The jitter buffer is a `VecDeque` with `push_front`/`pop_back` — see
/// `DESIGN.md` OQ-1: pushes land at the front in arrival order and the
/// mixer drains from the back, so under normal (non-dropped) operation
/// this behaves as a FIFO, with the most recent arrival always at the
/// front if the mixer falls behind.
pub struct Speaker {
    pub user_id: UserId,
    decoder: OpusDecoder,
    jitter: VecDeque<Vec<i16>>,
}

impl Speaker {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            decoder: OpusDecoder::new(SAMPLE_RATE, Channels::Stereo)
                .expect("failed to construct opus decoder"),
            jitter: VecDeque::new(),
        }
    }

    /// Decodes one RTP payload (already past the RTP header/extension) and
    /// pushes it to the front of the jitter buffer. Silent frames are
    /// dropped rather than buffered, matching the teacher's
    /// `SsrcState::scan_and_decode` silent-frame short-circuit.
    fn decode_and_push(&mut self, payload: &[u8]) {
        if payload.len() == SILENT_FRAME.len() && payload == SILENT_FRAME {
            return;
        }

        let mut out = vec![0i16; MAX_DECODE_OUTPUT_LEN];
        match self.decoder.decode(Some(payload), &mut out[..], false) {
            Ok(samples) => {
                out.truncate(2 * samples);
                self.jitter.push_front(out);
            },
            Err(e) => error!(error = %e, "failed to decode speaker payload"),
        }
    }

    /// Decodes a single missed (lost) packet via Opus packet-loss
    /// concealment, discarding the output — concealment here exists only to
    /// keep decoder state consistent, not to produce audio.
    fn conceal_missing_packet(&mut self) {
        let mut out = vec![0i16; MAX_DECODE_OUTPUT_LEN];
        let missing: Option<&[u8]> = None;
        if let Err(e) = self.decoder.decode(missing, &mut out[..], false) {
            warn!(error = %e, "packet loss concealment decode failed");
        }
    }
}

/// Per-SSRC registry of active speakers plus the mix-down to a single
/// outbound stereo stream.
pub struct SpeakerRegistry {
    speakers: Mutex<HashMap<u32, Speaker>>,
    encoder: Mutex<OpusEncoder>,
}

impl SpeakerRegistry {
    pub fn new(bitrate: audiopus::Bitrate) -> Self {
        let mut encoder = OpusEncoder::new(SAMPLE_RATE, Channels::Stereo, Application::Audio)
            .expect("failed to construct opus encoder");
        encoder
            .set_bitrate(bitrate)
            .expect("failed to set opus encoder bitrate");

        Self {
            speakers: Mutex::new(HashMap::new()),
            encoder: Mutex::new(encoder),
        }
    }

    /// Handles a `speaker_start` event (opcode 5): inserts a fresh decoder
    /// keyed by SSRC if one doesn't already exist.
    pub fn speaker_start(&self, ssrc: u32, user_id: UserId) {
        self.speakers
            .lock()
            .entry(ssrc)
            .or_insert_with(|| Speaker::new(user_id));
    }

    /// Handles a `speaker_stop` event (opcode 13): removes the entry for
    /// `user_id`, scanning by user id since only that is given, not the SSRC.
    pub fn speaker_stop(&self, user_id: UserId) {
        self.speakers.lock().retain(|_, s| s.user_id != user_id);
    }

    pub fn len(&self) -> usize {
        self.speakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.lock().is_empty()
    }

    /// Feeds one decrypted, extension-stripped RTP payload from `ssrc` into
    /// that speaker's decoder and jitter buffer. A decode error for one
    /// speaker is logged and does not affect any other speaker.
    pub fn ingest(&self, ssrc: u32, payload: &[u8]) {
        let mut speakers = self.speakers.lock();
        if let Some(speaker) = speakers.get_mut(&ssrc) {
            speaker.decode_and_push(payload);
        }
    }

    pub fn note_missed_packet(&self, ssrc: u32) {
        let mut speakers = self.speakers.lock();
        if let Some(speaker) = speakers.get_mut(&ssrc) {
            speaker.conceal_missing_packet();
        }
    }

    /// One mixer tick: pops one payload per active speaker from the back of
    /// its jitter buffer, sums into a 32-bit accumulator, divides by the
    /// number of contributing speakers, and Opus-encodes the result. Only
    /// the longest payload actually contributed this tick is summed and
    /// encoded, not the full accumulator capacity. Returns `None` if no
    /// speaker had anything buffered this tick.
    ///
    /// Grounded on `VoiceConnection::mixAudio`: the division by speaker
    /// count is the clipping guard the original applies before re-encoding,
    /// and `decoded_size` mirrors its own `decodedSize` tracking.
    pub fn mix_tick(&self) -> Option<Vec<u8>> {
        let mut speakers = self.speakers.lock();
        let mut contributors = 0usize;
        let mut decoded_size = 0usize;
        let mut accumulator = vec![0i32; MIX_ACCUMULATOR_LEN];

        for speaker in speakers.values_mut() {
            if let Some(payload) = speaker.jitter.pop_back() {
                contributors += 1;
                decoded_size = decoded_size.max(payload.len());
                for (acc, sample) in accumulator.iter_mut().zip(payload.iter()) {
                    *acc += *sample as i32;
                }
            }
        }
        drop(speakers);

        if contributors == 0 {
            return None;
        }

        let mixed: Vec<i16> = accumulator[..decoded_size]
            .iter()
            .map(|&s| (s / contributors as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect();

        let mut out = vec![0u8; crate::constants::VOICE_PACKET_MAX];
        match self.encoder.lock().encode(&mixed, &mut out[..]) {
            Ok(len) => {
                out.truncate(len);
                Some(out)
            },
            Err(e) => {
                error!(error = %e, "failed to encode mixed audio");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_lifecycle_goes_zero_one_zero() {
        let registry = SpeakerRegistry::new(crate::constants::DEFAULT_BITRATE);
        assert_eq!(registry.len(), 0);
        registry.speaker_start(7, UserId(100));
        assert_eq!(registry.len(), 1);
        registry.speaker_stop(UserId(100));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn speaker_stop_only_removes_matching_user() {
        let registry = SpeakerRegistry::new(crate::constants::DEFAULT_BITRATE);
        registry.speaker_start(7, UserId(100));
        registry.speaker_start(8, UserId(200));
        registry.speaker_stop(UserId(100));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn mix_tick_with_no_speakers_returns_none() {
        let registry = SpeakerRegistry::new(crate::constants::DEFAULT_BITRATE);
        assert!(registry.mix_tick().is_none());
    }
}
