use std::collections::VecDeque;

use crate::api::api_types::TrackInfo;
use crate::model::track::Track;

/// Tracks waiting to be played, in the order they were added.
///
/// The playing track is held by the session, not here.
#[derive(Debug, Default)]
pub(crate) struct TrackQueue {
    tracks: VecDeque<Track>,
}

impl TrackQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    pub(crate) fn dequeue_next(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Head first.
    pub(crate) fn snapshot(&self) -> Vec<TrackInfo> {
        self.tracks.iter().map(Track::info).collect()
    }

    /// Drops every pending track, deleting their files.
    pub(crate) fn clear(&mut self) {
        for track in self.tracks.drain(..) {
            track.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::track_in;

    #[test]
    fn test_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = TrackQueue::new();
        assert!(queue.is_empty());
        assert!(queue.dequeue_next().is_none());

        queue.enqueue(track_in(dir.path(), "a"));
        queue.enqueue(track_in(dir.path(), "b"));
        queue.enqueue(track_in(dir.path(), "c"));
        assert_eq!(queue.len(), 3);

        let titles: Vec<String> = queue.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        assert_eq!(queue.dequeue_next().unwrap().title(), "a");
        let titles: Vec<String> = queue.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["b", "c"]);

        assert_eq!(queue.dequeue_next().unwrap().title(), "b");
        assert_eq!(queue.dequeue_next().unwrap().title(), "c");
        assert!(queue.dequeue_next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = TrackQueue::new();
        queue.enqueue(track_in(dir.path(), "a"));
        queue.enqueue(track_in(dir.path(), "b"));
        let paths: Vec<_> = queue.snapshot().into_iter().map(|t| t.file_path).collect();
        assert!(paths.iter().all(|p| p.exists()));

        queue.clear();
        assert!(queue.is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }
}
