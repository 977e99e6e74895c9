//! The per-guild song pipeline: playlist, cancellable decode worker, and
//! the single completion event fired per song (spec §4.7).

pub mod error;
pub mod playlist;
pub mod song;
pub mod source;
pub mod worker;

use crate::id::{GuildId, UserId};
use crate::mailbox::FrameMailbox;
use error::ProducerResult;
use playlist::{AdvanceReason, SongPlaylist};
use song::Song;
use source::StreamingSourceSet;
use std::collections::VecDeque;
use tracing::instrument;
use worker::SongWorker;

/// Delivered exactly once per `current_song` that reaches end-of-stream
/// without being skipped.
#[derive(Clone, Debug)]
pub struct CompletionEvent {
    pub guild: GuildId,
    pub added_by: Option<UserId>,
    pub was_failure: bool,
}

pub type CompletionHandler = Box<dyn Fn(CompletionEvent) + Send + Sync>;

struct WorkerOutcome {
    was_failure: bool,
}

pub struct AudioProducer {
    guild: GuildId,
    playlist: SongPlaylist,
    mailbox: FrameMailbox,
    sources: StreamingSourceSet,
    worker: Option<SongWorker>,
    completion_tx: flume::Sender<WorkerOutcome>,
    completion_rx: flume::Receiver<WorkerOutcome>,
    on_completion: Option<CompletionHandler>,
    paused: bool,
}

impl AudioProducer {
    pub fn new(guild: GuildId, sources: StreamingSourceSet) -> Self {
        let (completion_tx, completion_rx) = flume::unbounded();
        Self {
            guild,
            playlist: SongPlaylist::new(),
            mailbox: FrameMailbox::new(),
            sources,
            worker: None,
            completion_tx,
            completion_rx,
            on_completion: None,
            paused: false,
        }
    }

    pub fn mailbox(&self) -> &FrameMailbox {
        &self.mailbox
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.playlist.current()
    }

    pub fn playlist(&self) -> &SongPlaylist {
        &self.playlist
    }

    pub fn set_playlist(&mut self, queue: VecDeque<Song>) {
        self.playlist.set_queue(queue);
    }

    pub fn set_loop_song(&mut self, on: bool) {
        self.playlist.loop_song = on;
    }

    pub fn set_loop_all(&mut self, on: bool) {
        self.playlist.loop_all = on;
    }

    pub fn move_in_queue(&mut self, from: usize, to: usize) -> ProducerResult<()> {
        self.playlist.move_in_queue(from, to)
    }

    pub fn on_completion(&mut self, handler: CompletionHandler) {
        self.on_completion = Some(handler);
    }

    pub async fn search(&self, query: &str) -> ProducerResult<Vec<Song>> {
        self.sources.search(query).await
    }

    /// Adds a song to the queue, starting playback immediately if nothing
    /// is currently playing.
    #[instrument(skip(self, song), fields(guild = %self.guild))]
    pub async fn enqueue(&mut self, song: Song) {
        self.playlist.enqueue(song);
        if self.playlist.current().is_none() {
            self.restart_from(AdvanceReason::Completion).await;
        }
    }

    /// `skip()`: cancels the worker, re-enqueues the current song if
    /// looping, advances, and restarts. No completion event is fired.
    #[instrument(skip(self), fields(guild = %self.guild))]
    pub async fn skip(&mut self) {
        self.stop_worker().await;
        self.playlist.skip();
        self.mailbox.clear();
        self.spawn_current();
    }

    /// `stop()`: cancels the worker, pushes the current song back to the
    /// front of the queue, clears any completion handler, and does not
    /// start a new song.
    #[instrument(skip(self), fields(guild = %self.guild))]
    pub async fn stop(&mut self) {
        self.stop_worker().await;
        self.playlist.stop();
        self.mailbox.clear();
        self.on_completion = None;
    }

    pub fn pause_toggle(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Called once per tick by the session worker; drains a pending
    /// worker-completion notification (if any) and advances the playlist.
    pub async fn poll_completion(&mut self) {
        if let Ok(outcome) = self.completion_rx.try_recv() {
            let added_by = self.playlist.current().map(|s| s.added_by);
            if let Some(handler) = &self.on_completion {
                handler(CompletionEvent {
                    guild: self.guild,
                    added_by,
                    was_failure: outcome.was_failure,
                });
            }
            self.restart_from(AdvanceReason::Completion).await;
        }
    }

    async fn restart_from(&mut self, reason: AdvanceReason) {
        self.stop_worker().await;
        self.playlist.advance(reason);
        self.mailbox.clear();
        self.spawn_current();
    }

    async fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel_and_wait().await;
            // A worker cancelled by `skip`/`stop` still reports its outcome on
            // `completion_tx`; drop it so the next `poll_completion` doesn't
            // mistake it for the next song's completion.
            while self.completion_rx.try_recv().is_ok() {}
        }
    }

    fn spawn_current(&mut self) {
        let Some(song) = self.playlist.current().cloned() else {
            return;
        };
        let Some(source) = self.sources.source_for(song.kind).cloned() else {
            return;
        };

        let sink = self.mailbox.sender();
        let tx = self.completion_tx.clone();
        self.worker = Some(SongWorker::spawn(source, song, 0.0, sink, move |failed| {
            let _ = tx.send(WorkerOutcome { was_failure: failed });
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::AudioFrame;
    use crate::producer::song::SourceKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Streams a single byte (its generation counter) on repeat until
    /// cancelled, so tests can tell frames from before/after a restart apart.
    struct TaggedSource {
        working: AtomicBool,
        generation: AtomicU8,
    }

    impl TaggedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                working: AtomicBool::new(false),
                generation: AtomicU8::new(0),
            })
        }
    }

    #[async_trait]
    impl source::StreamingSource for TaggedSource {
        async fn search(&self, _query: &str) -> ProducerResult<Vec<Song>> {
            Ok(Vec::new())
        }

        async fn resolve(&self, song: &Song) -> ProducerResult<Song> {
            Ok(song.clone())
        }

        async fn download_and_stream(
            &self,
            _song: &Song,
            cancel: CancellationToken,
            _offset: f64,
            sink: flume::Sender<AudioFrame>,
        ) -> ProducerResult<()> {
            self.working.store(true, Ordering::SeqCst);
            let tag = self.generation.fetch_add(1, Ordering::SeqCst);
            while !cancel.is_cancelled() {
                let _ = sink.send(AudioFrame::EncodedOpus(vec![tag]));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.working.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_working(&self) -> bool {
            self.working.load(Ordering::SeqCst)
        }
    }

    fn fake_song(id: &str) -> Song {
        Song::new(id, SourceKind::YouTube, id, UserId(1), "tester")
    }

    fn producer_with_tagged_source() -> AudioProducer {
        let source = TaggedSource::new() as Arc<dyn source::StreamingSource>;
        let sources = StreamingSourceSet::new(vec![(SourceKind::YouTube, source)]);
        AudioProducer::new(GuildId(1), sources)
    }

    #[tokio::test]
    async fn enqueue_starts_playback_when_nothing_is_playing() {
        let mut producer = producer_with_tagged_source();
        producer.enqueue(fake_song("a")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!producer.mailbox().is_empty());
        producer.stop().await;
    }

    #[tokio::test]
    async fn stop_then_enqueue_leaves_only_frames_produced_after_the_restart() {
        let mut producer = producer_with_tagged_source();

        producer.enqueue(fake_song("a")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        producer.stop().await;
        assert!(producer.mailbox().is_empty());

        producer.enqueue(fake_song("b")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut saw_any = false;
        while let Some(AudioFrame::EncodedOpus(tag)) = producer.mailbox().try_recv() {
            assert_eq!(tag, vec![1u8], "frame from the pre-stop generation leaked into the post-restart mailbox");
            saw_any = true;
        }
        assert!(saw_any, "expected the restarted song to have produced frames");

        producer.stop().await;
    }

    #[tokio::test]
    async fn skip_advances_without_firing_a_completion_event() {
        let mut producer = producer_with_tagged_source();
        producer.on_completion(Box::new(|_| panic!("skip must not fire a completion event")));

        producer.enqueue(fake_song("a")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        producer.skip().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The skipped worker's outcome must not leak into the next poll and
        // be mistaken for the new song's completion.
        producer.poll_completion().await;

        producer.stop().await;
    }
}
