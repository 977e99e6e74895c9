//! The per-guild queue, current-song slot, and loop-mode advancement rules
//! (spec §4.7), grounded on `original_source/Source/SongAPI.cpp::sendNextSong`.

use super::song::Song;
use std::collections::VecDeque;

/// Why [`SongPlaylist::advance`] was invoked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdvanceReason {
    /// The current song reached natural end-of-stream.
    Completion,
    /// The caller explicitly skipped ahead.
    Skip,
}

#[derive(Clone, Debug, Default)]
pub struct SongPlaylist {
    queue: VecDeque<Song>,
    current: Option<Song>,
    pub loop_song: bool,
    pub loop_all: bool,
}

impl SongPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &VecDeque<Song> {
        &self.queue
    }

    pub fn set_queue(&mut self, queue: VecDeque<Song>) {
        self.queue = queue;
    }

    pub fn enqueue(&mut self, song: Song) {
        self.queue.push_back(song);
    }

    pub fn move_in_queue(&mut self, from: usize, to: usize) -> Result<(), super::error::ProducerError> {
        if from >= self.queue.len() || to >= self.queue.len() {
            return Err(super::error::ProducerError::IndexOutOfRange(from.max(to)));
        }
        if let Some(song) = self.queue.remove(from) {
            self.queue.insert(to, song);
        }
        Ok(())
    }

    /// Advancement rule from spec §4.7:
    ///
    /// - `loop_song`: if `current` is empty and the queue is non-empty,
    ///   rotate the head into `current`; otherwise leave `current` as-is.
    /// - `loop_all`: if `current` is empty, pop the head into `current`. On
    ///   a natural completion with a non-empty `current`, push the old
    ///   `current` to the tail and pop the new head.
    /// - normal: on completion, pop the head into `current`; if the queue
    ///   is empty, `current` becomes empty.
    ///
    /// `Skip` always pops a fresh head regardless of loop mode (with the
    /// skipped song re-enqueued by the caller first if looping, per
    /// [`SongPlaylist::skip`]).
    pub fn advance(&mut self, reason: AdvanceReason) {
        match reason {
            AdvanceReason::Completion if self.loop_song => {
                if self.current.is_none() {
                    if let Some(head) = self.queue.pop_front() {
                        self.current = Some(head);
                    }
                }
                // else: current stays exactly as it was.
            },
            AdvanceReason::Completion if self.loop_all => {
                if self.current.is_none() {
                    self.current = self.queue.pop_front();
                } else if let Some(finished) = self.current.take() {
                    self.queue.push_back(finished);
                    self.current = self.queue.pop_front();
                }
            },
            AdvanceReason::Completion => {
                self.current = self.queue.pop_front();
            },
            AdvanceReason::Skip => {
                self.current = self.queue.pop_front();
            },
        }
    }

    /// `skip()`: cancels the worker (handled by the caller), re-enqueues the
    /// current song to the tail if looping so it will be played again, then
    /// advances immediately.
    pub fn skip(&mut self) {
        if self.loop_song || self.loop_all {
            if let Some(current) = self.current.take() {
                self.queue.push_back(current);
            }
        }
        self.advance(AdvanceReason::Skip);
    }

    /// `stop()`: like skip, but the current song goes back to the *front*
    /// of the queue instead of being dropped or requeued at the tail, and
    /// no new song is started.
    pub fn stop(&mut self) {
        if let Some(current) = self.current.take() {
            self.queue.push_front(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UserId;
    use crate::producer::song::SourceKind;

    fn song(id: &str) -> Song {
        Song::new(id, SourceKind::YouTube, id, UserId(1), "tester")
    }

    #[test]
    fn loop_song_keeps_current_assignment_constant() {
        let mut pl = SongPlaylist::new();
        pl.loop_song = true;
        pl.enqueue(song("a"));
        pl.advance(AdvanceReason::Completion);
        assert_eq!(pl.current().unwrap().id, "a");

        // Further completions under loop_song leave `current` untouched.
        pl.advance(AdvanceReason::Completion);
        pl.advance(AdvanceReason::Completion);
        assert_eq!(pl.current().unwrap().id, "a");
    }

    #[test]
    fn loop_all_cycles_through_the_initial_queue() {
        let mut pl = SongPlaylist::new();
        pl.loop_all = true;
        pl.enqueue(song("a"));
        pl.enqueue(song("b"));

        pl.advance(AdvanceReason::Completion);
        assert_eq!(pl.current().unwrap().id, "a");
        pl.advance(AdvanceReason::Completion);
        assert_eq!(pl.current().unwrap().id, "b");
        pl.advance(AdvanceReason::Completion);
        assert_eq!(pl.current().unwrap().id, "a");
    }

    #[test]
    fn skip_under_loop_all_advances_without_losing_the_skipped_song() {
        let mut pl = SongPlaylist::new();
        pl.loop_all = true;
        pl.enqueue(song("a"));
        pl.enqueue(song("b"));
        pl.advance(AdvanceReason::Completion); // current = a, queue = [b]

        pl.skip(); // a requeued to tail -> queue = [b, a], then pop -> current = b
        assert_eq!(pl.current().unwrap().id, "b");
        assert_eq!(pl.queue().iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn normal_mode_empties_current_when_queue_drains() {
        let mut pl = SongPlaylist::new();
        pl.enqueue(song("a"));
        pl.advance(AdvanceReason::Completion);
        assert!(pl.current().is_some());
        pl.advance(AdvanceReason::Completion);
        assert!(pl.current().is_none());
    }

    #[test]
    fn stop_requeues_current_to_the_front() {
        let mut pl = SongPlaylist::new();
        pl.enqueue(song("a"));
        pl.enqueue(song("b"));
        pl.advance(AdvanceReason::Completion); // current = a, queue = [b]
        pl.stop();
        assert!(pl.current().is_none());
        assert_eq!(pl.queue().iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
