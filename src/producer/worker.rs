//! The cancellable decode-and-stream worker spawned per current song.
//!
//! Grounded on `original_source/Source/SongAPI.cpp::cancelCurrentSong`:
//! cancellation requests a stop, then polls the source's `is_working()` for
//! up to [`WORKER_DETACH_GRACE`] before giving up and detaching. This is a
//! bounded poll rather than a single timed join because the original has no
//! join point for its detached thread — only a liveness flag to watch.

use crate::constants::WORKER_DETACH_GRACE;
use crate::mailbox::AudioFrame;
use crate::producer::song::Song;
use crate::producer::source::StreamingSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running (or just-finished) decode worker for one song.
pub struct SongWorker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    source: Arc<dyn StreamingSource>,
}

impl SongWorker {
    pub fn spawn(
        source: Arc<dyn StreamingSource>,
        song: Song,
        offset: f64,
        sink: flume::Sender<AudioFrame>,
        on_complete: impl FnOnce(bool) + Send + 'static,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_source = source.clone();

        let handle = tokio::spawn(async move {
            let result = task_source
                .download_and_stream(&song, task_cancel, offset, sink)
                .await;
            on_complete(result.is_err());
        });

        Self {
            cancel,
            handle: Some(handle),
            source,
        }
    }

    /// Requests cancellation and waits up to [`WORKER_DETACH_GRACE`] for the
    /// source to report it has stopped working, polling rather than
    /// blocking on a single join (the original streaming API exposes only a
    /// liveness flag, not a joinable handle).
    pub async fn cancel_and_wait(mut self) {
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + WORKER_DETACH_GRACE;
        while self.source.is_working() && tokio::time::Instant::now() < deadline {
            sleep(POLL_INTERVAL).await;
        }

        if let Some(handle) = self.handle.take() {
            if self.source.is_working() {
                warn!("decode worker did not stop within the grace period; detaching");
                handle.abort();
            } else {
                let _ = handle.await;
            }
        }
    }
}
