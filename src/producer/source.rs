//! The consumed streaming-source interface (spec §6) and the round-robin
//! search fan-out across every configured source (§2b, grounded on
//! `SongAPI::searchForSong`).

use super::song::Song;
use crate::mailbox::AudioFrame;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait StreamingSource: Send + Sync {
    /// Searches this source for `query`, returning candidate songs.
    async fn search(&self, query: &str) -> crate::producer::error::ProducerResult<Vec<Song>>;

    /// Resolves a `Song` (e.g. from a queue) into a fully playable handle,
    /// re-fetching any details that may have gone stale.
    async fn resolve(&self, song: &Song) -> crate::producer::error::ProducerResult<Song>;

    /// Streams `song` starting at `offset` seconds, pushing encoded frames
    /// into `sink` until end-of-stream or `cancel` fires.
    async fn download_and_stream(
        &self,
        song: &Song,
        cancel: CancellationToken,
        offset: f64,
        sink: flume::Sender<AudioFrame>,
    ) -> crate::producer::error::ProducerResult<()>;

    /// Whether a worker for this source is still actively streaming. Used
    /// by the bounded cancellation poll (`cancelCurrentSong`'s `isWeWorking`
    /// equivalent).
    fn is_working(&self) -> bool;
}

/// The set of streaming sources configured for a guild, searched in the
/// interleaved order `SongAPI::searchForSong` uses: first source's first
/// hit, second source's first hit, first source's second hit, and so on,
/// falling through to whichever source still has entries once another is
/// exhausted.
#[derive(Clone, Default)]
pub struct StreamingSourceSet {
    sources: Vec<(super::song::SourceKind, Arc<dyn StreamingSource>)>,
}

impl StreamingSourceSet {
    pub fn new(sources: Vec<(super::song::SourceKind, Arc<dyn StreamingSource>)>) -> Self {
        Self { sources }
    }

    pub async fn search(&self, query: &str) -> crate::producer::error::ProducerResult<Vec<Song>> {
        let mut lists = Vec::with_capacity(self.sources.len());
        for (_, source) in &self.sources {
            lists.push(source.search(query).await?.into_iter());
        }

        let mut interleaved = Vec::new();
        loop {
            let mut any = false;
            for list in lists.iter_mut() {
                if let Some(song) = list.next() {
                    interleaved.push(song);
                    any = true;
                }
            }
            if !any {
                break;
            }
        }
        Ok(interleaved)
    }

    pub fn source_for(&self, kind: super::song::SourceKind) -> Option<&Arc<dyn StreamingSource>> {
        self.sources
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_empty_set_is_empty() {
        let set = StreamingSourceSet::default();
        assert!(set.sources.is_empty());
    }
}
