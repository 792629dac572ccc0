use std::collections::VecDeque;

use crate::track::TrackDescriptor;

/// Explicit queue, auto-queue and what is playing.
///
/// Plain data guarded by the scheduler's mutex; nothing here awaits.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    queue: VecDeque<TrackDescriptor>,
    auto_queue: VecDeque<TrackDescriptor>,
    now_playing: Option<TrackDescriptor>,
    last_popped: Option<TrackDescriptor>,
}

impl QueueState {
    /// Appends an explicit request, invalidating auto-suggestions.
    ///
    /// Returns the zero-based position of the new entry.
    pub fn push(&mut self, track: TrackDescriptor) -> usize {
        self.auto_queue.clear();
        self.queue.push_back(track);
        self.queue.len() - 1
    }

    /// Puts a track in front of every other explicit request.
    pub fn push_front(&mut self, track: TrackDescriptor) {
        self.queue.push_front(track);
    }

    /// Pops the explicit queue's front, or the auto-queue's front if no
    /// explicit request is pending. Popping an explicit request clears the
    /// auto-queue.
    pub fn pop(&mut self) -> Option<TrackDescriptor> {
        let track = match self.queue.pop_front() {
            Some(track) => {
                self.auto_queue.clear();
                track
            }
            None => self.auto_queue.pop_front()?,
        };
        self.last_popped = Some(track.clone());
        Some(track)
    }

    /// Refills the auto-queue with a related-tracks batch and pops from it.
    ///
    /// An explicit request that arrived while the batch was being looked up
    /// wins, and the batch is discarded.
    pub fn refill_and_pop(&mut self, related: Vec<TrackDescriptor>) -> Option<TrackDescriptor> {
        if self.queue.is_empty() {
            self.auto_queue.extend(related);
        }
        self.pop()
    }

    /// Track the next related lookup is based on: the one playing (or last
    /// played), else the last one popped.
    pub fn related_seed(&self) -> Option<TrackDescriptor> {
        self.now_playing
            .clone()
            .or_else(|| self.last_popped.clone())
    }

    pub fn set_now_playing(&mut self, track: TrackDescriptor) {
        self.now_playing = Some(track);
    }

    pub fn now_playing(&self) -> Option<&TrackDescriptor> {
        self.now_playing.as_ref()
    }

    pub fn next_up(&self) -> Option<&TrackDescriptor> {
        self.queue.front()
    }

    pub fn page(&self, offset: usize, limit: usize) -> Vec<TrackDescriptor> {
        self.queue.iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn auto_queue(&self) -> Vec<TrackDescriptor> {
        self.auto_queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
