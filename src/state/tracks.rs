use std::collections::{BTreeMap, HashSet};

use super::data::{Track, TrackId};
use crate::error::{EditorError, Result};

/// The TrackGraph owns every track.
///
/// Tracks reference keypoints by `(ImageId, KeypointId)` only; the reverse
/// link lives on the keypoint in the `ImageCatalog`. Mutations that touch
/// both sides go through `MergeEngine`.
#[derive(Debug, Default)]
pub struct TrackGraph {
    tracks: BTreeMap<TrackId, Track>,
    next_track_id: u64,
}

impl TrackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty track with a fresh id
    pub fn create_track(&mut self) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        self.tracks.insert(id, Track::new(id));
        id
    }

    pub fn track(&self, track_id: TrackId) -> Result<&Track> {
        self.tracks
            .get(&track_id)
            .ok_or_else(|| EditorError::track_not_found(track_id))
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.tracks.contains_key(&track_id)
    }

    /// Tracks ordered by id
    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The id the next `create_track` will hand out
    pub fn next_track_id(&self) -> TrackId {
        TrackId(self.next_track_id)
    }

    /// Insert imported tracks with their own ids and advance the id counter
    /// past the largest one. Ids must not collide with existing tracks or
    /// with each other; on error nothing is inserted.
    pub(crate) fn seed(&mut self, tracks: Vec<Track>) -> Result<()> {
        let mut seen = HashSet::with_capacity(tracks.len());
        for track in &tracks {
            if self.tracks.contains_key(&track.id) {
                return Err(EditorError::Conflict(format!("track {} already exists", track.id)));
            }
            if !seen.insert(track.id) {
                return Err(EditorError::Corruption(format!("track {} listed twice", track.id)));
            }
            if track.id.0 == u64::MAX {
                return Err(EditorError::Corruption(format!("track id {} is reserved", track.id)));
            }
        }
        for track in tracks {
            self.next_track_id = self.next_track_id.max(track.id.0 + 1);
            self.tracks.insert(track.id, track);
        }
        Ok(())
    }

    pub(crate) fn track_mut(&mut self, track_id: TrackId) -> Result<&mut Track> {
        self.tracks
            .get_mut(&track_id)
            .ok_or_else(|| EditorError::track_not_found(track_id))
    }

    pub(crate) fn remove(&mut self, track_id: TrackId) -> Option<Track> {
        self.tracks.remove(&track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{ImageId, KeypointId, TrackMember};

    #[test]
    fn test_create_track_is_empty() {
        let mut graph = TrackGraph::new();
        let id = graph.create_track();
        let track = graph.track(id).unwrap();
        assert!(track.is_empty());
        assert_eq!(track.error, 0.0);
    }

    #[test]
    fn test_seed_advances_counter() {
        let mut graph = TrackGraph::new();
        let mut imported = Track::new(TrackId(41));
        imported.members.push(TrackMember::new(ImageId(1), KeypointId(0)));
        graph.seed(vec![Track::new(TrackId(3)), imported]).unwrap();

        assert_eq!(graph.next_track_id(), TrackId(42));
        assert_eq!(graph.create_track(), TrackId(42));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_seed_rejects_existing_ids() {
        let mut graph = TrackGraph::new();
        let id = graph.create_track();
        assert!(graph.seed(vec![Track::new(id)]).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_seed_rejects_repeated_ids_in_batch() {
        let mut graph = TrackGraph::new();
        let mut first = Track::new(TrackId(9));
        first.members.push(TrackMember::new(ImageId(4), KeypointId(0)));
        let mut second = Track::new(TrackId(9));
        second.members.push(TrackMember::new(ImageId(7), KeypointId(0)));

        let result = graph.seed(vec![first, second]);
        assert!(matches!(result, Err(EditorError::Corruption(_))));
        assert!(graph.is_empty());
        assert_eq!(graph.next_track_id(), TrackId(0));
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let mut graph = TrackGraph::new();
        let first = graph.create_track();
        graph.remove(first);
        assert!(graph.track(first).is_err());
        assert_ne!(graph.create_track(), first);
    }
}
