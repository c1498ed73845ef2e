/// Track creation, attachment and merging
///
/// These operations touch both sides of the keypoint <-> track relation,
/// so they borrow the catalog and the graph together. Every operation
/// validates first and mutates second: when it returns an error, neither
/// side has changed.

use std::collections::HashSet;

use super::catalog::ImageCatalog;
use super::data::{ImageId, KeypointId, TrackId, TrackMember};
use super::tracks::TrackGraph;
use crate::error::{EditorError, Result};

/// Why an attach request was turned into a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The track already observes this image through another keypoint
    ImageOccupied { existing: KeypointId },
    /// The keypoint is already a member of the track
    AlreadyMember,
}

/// Successful result of `add_keypoint_to_track`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The unassigned keypoint joined the track
    Attached,
    /// The keypoint's former track was absorbed into the target
    Merged { absorbed: TrackId },
    /// Nothing changed
    Conflict(ConflictKind),
}

pub struct MergeEngine<'a> {
    catalog: &'a mut ImageCatalog,
    graph: &'a mut TrackGraph,
}

impl<'a> MergeEngine<'a> {
    pub fn new(catalog: &'a mut ImageCatalog, graph: &'a mut TrackGraph) -> Self {
        Self { catalog, graph }
    }

    /// Return the keypoint's track, creating a single-member track for it
    /// the first time. Idempotent.
    pub fn get_or_create_track_for_keypoint(
        &mut self,
        image_id: ImageId,
        keypoint_id: KeypointId,
    ) -> Result<TrackId> {
        if let Some(track_id) = self.catalog.keypoint(image_id, keypoint_id)?.track_id {
            return Ok(track_id);
        }

        let member = TrackMember::new(image_id, keypoint_id);
        let track_id = self.graph.create_track();
        self.graph.track_mut(track_id)?.members.push(member);
        self.catalog.set_keypoint_track(member, Some(track_id))?;
        self.catalog.notify_keypoints_changed(image_id);
        tracing::debug!("🧵 Created {} for {} in image {}", track_id, keypoint_id, image_id);
        Ok(track_id)
    }

    /// Add a keypoint to `track_id`, merging its current track into
    /// `track_id` when it already belongs to another one.
    ///
    /// `track_id` always survives a merge; the keypoint's former track is
    /// deleted. A merge between tracks that observe a common image is
    /// rejected with `Corruption` before anything is touched.
    pub fn add_keypoint_to_track(
        &mut self,
        track_id: TrackId,
        image_id: ImageId,
        keypoint_id: KeypointId,
    ) -> Result<AttachOutcome> {
        let keypoint_track = self.catalog.keypoint(image_id, keypoint_id)?.track_id;
        let target = self.graph.track(track_id)?;

        if let Some(existing) = target.member_in(image_id) {
            let kind = if existing.keypoint_id == keypoint_id {
                tracing::warn!("⚠️  {} of image {} is already in {}", keypoint_id, image_id, track_id);
                ConflictKind::AlreadyMember
            } else {
                tracing::warn!(
                    "⚠️  {} already observes image {} through {}",
                    track_id,
                    image_id,
                    existing.keypoint_id
                );
                ConflictKind::ImageOccupied {
                    existing: existing.keypoint_id,
                }
            };
            return Ok(AttachOutcome::Conflict(kind));
        }

        let member = TrackMember::new(image_id, keypoint_id);
        match keypoint_track {
            None => {
                self.graph.track_mut(track_id)?.members.push(member);
                self.catalog.set_keypoint_track(member, Some(track_id))?;
                self.catalog.notify_keypoints_changed(image_id);
                Ok(AttachOutcome::Attached)
            }
            Some(other) if other == track_id => {
                // The keypoint claims the track but the track does not list it
                Err(EditorError::Corruption(format!(
                    "{} of image {} points at {} which does not list it",
                    keypoint_id, image_id, track_id
                )))
            }
            Some(other) => {
                self.merge(other, track_id)?;
                Ok(AttachOutcome::Merged { absorbed: other })
            }
        }
    }

    /// Move every member of `absorbed` into `survivor` and delete `absorbed`
    fn merge(&mut self, absorbed: TrackId, survivor: TrackId) -> Result<()> {
        let source = self.graph.track(absorbed).map_err(|_| {
            EditorError::Corruption(format!("keypoint refers to missing track {}", absorbed))
        })?;
        let target = self.graph.track(survivor)?;

        let target_images: HashSet<ImageId> = target.members.iter().map(|m| m.image_id).collect();
        if let Some(shared) = source.members.iter().find(|m| target_images.contains(&m.image_id)) {
            tracing::error!(
                "❌ Refusing to merge {} into {}: both observe image {}",
                absorbed,
                survivor,
                shared.image_id
            );
            return Err(EditorError::Corruption(format!(
                "tracks {} and {} both observe image {}",
                absorbed, survivor, shared.image_id
            )));
        }
        for member in &source.members {
            let keypoint = self.catalog.keypoint(member.image_id, member.keypoint_id)?;
            if keypoint.track_id != Some(absorbed) {
                return Err(EditorError::Corruption(format!(
                    "{} of image {} is listed by {} but assigned to {:?}",
                    member.keypoint_id, member.image_id, absorbed, keypoint.track_id
                )));
            }
        }

        // Validated: from here on nothing can fail
        let Some(source) = self.graph.remove(absorbed) else {
            return Err(EditorError::track_not_found(absorbed));
        };
        let mut touched: Vec<ImageId> = Vec::new();
        for member in &source.members {
            self.catalog.set_keypoint_track(*member, Some(survivor))?;
            if !touched.contains(&member.image_id) {
                touched.push(member.image_id);
            }
        }
        self.graph.track_mut(survivor)?.members.extend(source.members.iter().copied());
        for image_id in touched {
            self.catalog.notify_keypoints_changed(image_id);
        }

        tracing::info!(
            "🔗 Merged {} ({} observations) into {}",
            absorbed,
            source.members.len(),
            survivor
        );
        Ok(())
    }
}
