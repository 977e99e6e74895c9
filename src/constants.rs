//! Timing, sizing and wire-format constants shared across the voice engine.

use audiopus::{Bitrate, SampleRate};
use std::time::Duration;

/// Gateway version requested when opening the signalling channel.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Sample rate of audio handled by the Opus codec.
pub const SAMPLE_RATE: SampleRate = SampleRate::Hz48000;

/// Sample rate of audio handled by the Opus codec, as a raw integer.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Default bitrate for the outbound Opus encoder.
pub const DEFAULT_BITRATE: Bitrate = Bitrate::BitsPerSecond(128_000);

/// Number of samples in one complete frame of audio per channel.
///
/// This is equally the number of stereo (joint) samples in an audio frame,
/// and the amount by which the RTP timestamp advances each tick.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Number of individual samples in one complete frame of stereo audio.
pub const STEREO_FRAME_SIZE: usize = 2 * MONO_FRAME_SIZE;

/// Maximum number of interleaved stereo samples a single Opus decode call
/// can produce (60ms, the longest standard Opus frame duration at 48kHz).
pub const MAX_DECODE_OUTPUT_LEN: usize = 5760;

/// Capacity of the mixer's per-tick accumulator: a 4x over-provision above
/// [`MAX_DECODE_OUTPUT_LEN`] carried over from the reference mixer, which
/// only ever sums/encodes up to the longest payload actually contributed
/// in a given tick.
pub const MIX_ACCUMULATOR_LEN: usize = 23040;

/// Number of bytes in one complete frame of raw `f32`-encoded mono audio.
pub const MONO_FRAME_BYTE_SIZE: usize = MONO_FRAME_SIZE * std::mem::size_of::<f32>();

/// Number of bytes in one complete frame of raw `f32`-encoded stereo audio.
pub const STEREO_FRAME_BYTE_SIZE: usize = STEREO_FRAME_SIZE * std::mem::size_of::<f32>();

/// Length (in milliseconds) of any audio frame.
pub const FRAME_LEN_MS: usize = 1000 / AUDIO_FRAME_RATE;

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between sends of UDP keepalive frames.
pub const UDP_KEEPALIVE_GAP_MS: u64 = 5_000;

/// Type-converted delay between sends of UDP keepalive frames.
pub const UDP_KEEPALIVE_GAP: Duration = Duration::from_millis(UDP_KEEPALIVE_GAP_MS);

/// Opus silent frame, used to signal speech start and end and prevent glitches.
pub const SILENT_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// The one (and only) RTP version understood by this crate.
pub const RTP_VERSION: u8 = 2;

/// Fixed RTP header flags byte used on all outbound packets (no extension, no padding).
pub const RTP_FLAGS: u8 = 0x80;

/// Fixed RTP payload-type byte for dynamic Opus audio.
pub const RTP_PAYLOAD_TYPE: u8 = 0x78;

/// Inclusive range of RTCP payload types that must never be treated as RTP audio.
pub const RTCP_PAYLOAD_TYPE_RANGE: std::ops::RangeInclusive<u8> = 72..=76;

/// Size, in bytes, of the RTP header emitted and expected by this crate.
pub const RTP_HEADER_LEN: usize = 12;

/// Size, in bytes, of the nonce passed to the AEAD primitive.
pub const NONCE_LEN: usize = 24;

/// Size, in bytes, of the authentication tag appended by the AEAD primitive.
pub const TAG_LEN: usize = 16;

/// Size, in bytes, of the negotiated symmetric key.
pub const KEY_LEN: usize = 32;

/// Size, in bytes, of the fixed-layout IP discovery packet (both request and reply).
pub const IP_DISCOVERY_LEN: usize = 74;

/// Capacity, in bytes, of the ring buffers backing the datagram channel.
pub const RING_BUFFER_LEN: usize = 16 * 1024;

/// Default number of reconnect attempts before the supervisor gives up.
pub const DEFAULT_MAX_RECONNECT_TRIES: u32 = 10;

/// Grace period given to a cancelled decode worker to finish up before it is
/// marked orphaned and its resources released unconditionally.
pub const WORKER_DETACH_GRACE: Duration = Duration::from_secs(10);

/// Seconds the control shard interface is allowed to take to hand over
/// initial connection data before the state machine treats it as a timeout.
pub const INIT_DATA_TIMEOUT: Duration = Duration::from_secs(10);
