//! Engine-wide tunables.
//!
//! A plain `Clone + Debug + Default` struct, constructed and overridden by
//! the embedding application, the way the teacher's `driver::config::Config`
//! is — this crate never reads environment variables or files itself.

use crate::constants::DEFAULT_MAX_RECONNECT_TRIES;
use audiopus::Bitrate;

#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum reconnect attempts before the supervisor gives up.
    pub max_reconnect_tries: u32,
    /// Whether mixed inbound audio is forwarded to a second stream.
    pub forward_mixed_audio: bool,
    /// Bitrate used by the outbound and mixed-forwarding Opus encoders.
    pub bitrate: Bitrate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_reconnect_tries: DEFAULT_MAX_RECONNECT_TRIES,
            forward_mixed_audio: false,
            bitrate: crate::constants::DEFAULT_BITRATE,
        }
    }
}
