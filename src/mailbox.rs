//! The bounded-by-convention FIFO handoff between the audio producer and
//! the session worker that packetizes and sends frames.

/// One unit of audio handed from the producer to the session worker.
#[derive(Clone, Debug)]
pub enum AudioFrame {
    /// Raw PCM samples awaiting Opus encoding.
    RawPcm(Vec<i16>),
    /// An already Opus-encoded frame, ready to packetize and encrypt.
    EncodedOpus(Vec<u8>),
    /// Sentinel telling the worker to advance the playlist immediately.
    Skip,
    /// Sentinel meaning "nothing to send this tick, but the session stays up".
    Unset,
}

/// An unbounded, single-consumer FIFO of [`AudioFrame`]s. Grounded on the
/// teacher's `MixerMessage`/track-command channel shape: a `flume` unbounded
/// channel gives us a non-blocking `try_recv` for the pacer-driven consumer
/// and a cheap `Sender` clone for the producer side.
pub struct FrameMailbox {
    tx: flume::Sender<AudioFrame>,
    rx: flume::Receiver<AudioFrame>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> flume::Sender<AudioFrame> {
        self.tx.clone()
    }

    /// Non-blocking receive for the 20ms tick: returns `None` immediately if
    /// nothing is queued rather than waiting for the producer.
    pub fn try_recv(&self) -> Option<AudioFrame> {
        self.rx.try_recv().ok()
    }

    /// Drops every currently-queued frame without reading it, used when a
    /// song is skipped or stopped so stale audio never plays.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FrameMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_received_in_fifo_order() {
        let mailbox = FrameMailbox::new();
        let tx = mailbox.sender();
        tx.send(AudioFrame::EncodedOpus(vec![1])).unwrap();
        tx.send(AudioFrame::EncodedOpus(vec![2])).unwrap();

        match mailbox.try_recv() {
            Some(AudioFrame::EncodedOpus(v)) => assert_eq!(v, vec![1]),
            other => panic!("unexpected: {other:?}"),
        }
        match mailbox.try_recv() {
            Some(AudioFrame::EncodedOpus(v)) => assert_eq!(v, vec![2]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn clear_discards_stale_frames_after_stop_then_play() {
        let mailbox = FrameMailbox::new();
        let tx = mailbox.sender();
        tx.send(AudioFrame::EncodedOpus(vec![1])).unwrap();
        mailbox.clear();
        tx.send(AudioFrame::EncodedOpus(vec![2])).unwrap();

        match mailbox.try_recv() {
            Some(AudioFrame::EncodedOpus(v)) => assert_eq!(v, vec![2]),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(mailbox.try_recv().is_none());
    }
}
