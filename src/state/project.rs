/// Project: the editing session
///
/// Owns the image catalog, the track graph and the vertex buffer
/// synchronizer, and keeps them in step: every mutation goes through
/// here, and the catalog's events are pumped into the synchronizer
/// before the call returns.

use cgmath::{Point2, Point3};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::catalog::{ImageCatalog, ImageEntry};
use super::data::{Image, ImageId, KeypointId, Track, TrackId, TrackMember};
use super::merge::{AttachOutcome, MergeEngine};
use super::tracks::TrackGraph;
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::gpu::selection::SelectionResolver;
use crate::gpu::sync::{PatchTarget, VertexBufferSynchronizer};
use crate::import::ImportPayload;

/// What a pick on the keypoint overlay does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Picking a keypoint starts track mode on its track
    #[default]
    Browse,
    /// Picked keypoints are attached to (or merged into) this track
    Track(TrackId),
}

/// Result of `Project::handle_pick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickResult {
    /// No keypoint under the cursor
    Missed,
    /// Browse mode: track mode was entered on the keypoint's track
    TrackStarted { track_id: TrackId, image_id: ImageId, keypoint_id: KeypointId },
    /// Track mode: the keypoint was offered to the current track
    Attach { image_id: ImageId, keypoint_id: KeypointId, outcome: AttachOutcome },
}

pub struct Project {
    config: EditorConfig,
    catalog: ImageCatalog,
    graph: TrackGraph,
    synchronizer: VertexBufferSynchronizer,
    mode: InteractionMode,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("images", &self.catalog.len())
            .field("active", &self.catalog.active_count())
            .field("tracks", &self.graph.len())
            .field("mode", &self.mode)
            .finish()
    }
}

impl Project {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            catalog: ImageCatalog::new(config.max_keypoints_per_image),
            graph: TrackGraph::new(),
            synchronizer: VertexBufferSynchronizer::new(&config),
            mode: InteractionMode::Browse,
            config,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    pub fn graph(&self) -> &TrackGraph {
        &self.graph
    }

    pub fn synchronizer(&self) -> &VertexBufferSynchronizer {
        &self.synchronizer
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Images in insertion order, for the image table
    pub fn images(&self) -> impl Iterator<Item = &Image> + '_ {
        self.catalog.images()
    }

    // ========== Catalog ==========

    pub fn add_image(&mut self, path: impl Into<PathBuf>) -> Result<ImageId> {
        let image_id = self.catalog.add_image(path)?;
        self.pump()?;
        Ok(image_id)
    }

    pub fn add_image_with_size(&mut self, path: impl Into<PathBuf>, size: (u32, u32)) -> Result<ImageId> {
        let image_id = self.catalog.add_image_with_size(path, size)?;
        self.pump()?;
        Ok(image_id)
    }

    pub fn add_keypoint(&mut self, image_id: ImageId, position: Point2<f32>) -> Result<KeypointId> {
        let keypoint_id = self.catalog.add_keypoint(image_id, position)?;
        self.pump()?;
        Ok(keypoint_id)
    }

    /// Toggle whether an image is rendered.
    ///
    /// Activation past `max_active_images` fails before the catalog flag
    /// changes. Returns whether the flag changed.
    pub fn set_active(&mut self, image_id: ImageId, active: bool) -> Result<bool> {
        let currently = self.catalog.image(image_id)?.active;
        if active && !currently {
            self.synchronizer.ensure_can_activate()?;
        }
        let changed = self.catalog.set_active(image_id, active)?;
        self.pump()?;
        if changed {
            tracing::info!(
                "👁️  Image {} {} ({} active)",
                image_id,
                if active { "activated" } else { "deactivated" },
                self.catalog.active_count()
            );
        }
        Ok(changed)
    }

    // ========== Tracks ==========

    pub fn get_or_create_track_for_keypoint(&mut self, image_id: ImageId, keypoint_id: KeypointId) -> Result<TrackId> {
        let track_id = MergeEngine::new(&mut self.catalog, &mut self.graph)
            .get_or_create_track_for_keypoint(image_id, keypoint_id)?;
        self.pump()?;
        Ok(track_id)
    }

    pub fn add_keypoint_to_track(
        &mut self,
        track_id: TrackId,
        image_id: ImageId,
        keypoint_id: KeypointId,
    ) -> Result<AttachOutcome> {
        let outcome = MergeEngine::new(&mut self.catalog, &mut self.graph)
            .add_keypoint_to_track(track_id, image_id, keypoint_id)?;
        self.pump()?;

        if let AttachOutcome::Merged { absorbed } = outcome {
            // The current track was folded into another one; follow it
            if self.mode == InteractionMode::Track(absorbed) {
                self.begin_track_mode(track_id)?;
            }
        }
        Ok(outcome)
    }

    /// `(image path, normalized position)` of every member of a track,
    /// in member order
    pub fn track_observations(&self, track_id: TrackId) -> Result<Vec<(PathBuf, Point2<f32>)>> {
        self.graph
            .track(track_id)?
            .members
            .iter()
            .map(|member| {
                let image = self.catalog.image(member.image_id)?;
                let keypoint = self.catalog.keypoint(member.image_id, member.keypoint_id)?;
                Ok((image.path.clone(), keypoint.position))
            })
            .collect()
    }

    // ========== Interaction ==========

    /// Enter track mode on the keypoint's track, creating it if needed
    pub fn begin_track_mode_at(&mut self, image_id: ImageId, keypoint_id: KeypointId) -> Result<TrackId> {
        let track_id = self.get_or_create_track_for_keypoint(image_id, keypoint_id)?;
        self.begin_track_mode(track_id)?;
        Ok(track_id)
    }

    /// Make `track_id` the current track and highlight its keypoints
    pub fn begin_track_mode(&mut self, track_id: TrackId) -> Result<()> {
        self.graph.track(track_id)?;
        let previous = self.synchronizer.highlight();
        self.mode = InteractionMode::Track(track_id);
        self.synchronizer.set_highlight(Some(track_id));
        self.refresh_track_images(previous.into_iter().chain(Some(track_id)))?;
        tracing::info!("🎯 Track mode on {}", track_id);
        Ok(())
    }

    pub fn end_track_mode(&mut self) -> Result<()> {
        let previous = self.synchronizer.highlight();
        self.mode = InteractionMode::Browse;
        self.synchronizer.set_highlight(None);
        self.refresh_track_images(previous)?;
        Ok(())
    }

    /// Re-emit "keypoints changed" once for every image observed by the tracks
    fn refresh_track_images(&mut self, tracks: impl IntoIterator<Item = TrackId>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();
        for track_id in tracks {
            // A track deleted by a merge has nothing left to recolor
            let Ok(track) = self.graph.track(track_id) else {
                continue;
            };
            for member in &track.members {
                if seen.insert(member.image_id) {
                    images.push(member.image_id);
                }
            }
        }
        for image_id in images {
            self.catalog.notify_keypoints_changed(image_id);
        }
        self.pump()
    }

    /// Map a raw index from the picking pass to a keypoint
    pub fn pick(&self, raw_index: u32) -> Result<Option<(ImageId, KeypointId)>> {
        SelectionResolver::resolve_pick(self.synchronizer.ranges(), raw_index)
    }

    /// Resolve a pick and act on it according to the interaction mode
    pub fn handle_pick(&mut self, raw_index: u32) -> Result<PickResult> {
        let Some((image_id, keypoint_id)) = self.pick(raw_index)? else {
            return Ok(PickResult::Missed);
        };
        match self.mode {
            InteractionMode::Browse => {
                let track_id = self.begin_track_mode_at(image_id, keypoint_id)?;
                Ok(PickResult::TrackStarted { track_id, image_id, keypoint_id })
            }
            InteractionMode::Track(track_id) => {
                let outcome = self.add_keypoint_to_track(track_id, image_id, keypoint_id)?;
                Ok(PickResult::Attach { image_id, keypoint_id, outcome })
            }
        }
    }

    /// A pick that hit no keypoint inside an image: add one there. In track
    /// mode the new keypoint joins the current track.
    pub fn add_keypoint_at(
        &mut self,
        image_id: ImageId,
        position: Point2<f32>,
    ) -> Result<(KeypointId, Option<AttachOutcome>)> {
        let keypoint_id = self.add_keypoint(image_id, position)?;
        let outcome = match self.mode {
            InteractionMode::Browse => None,
            InteractionMode::Track(track_id) => Some(self.add_keypoint_to_track(track_id, image_id, keypoint_id)?),
        };
        Ok((keypoint_id, outcome))
    }

    // ========== Synchronization ==========

    /// Hand pending catalog events to the synchronizer, in emission order.
    ///
    /// Every event is applied even if an earlier one fails; the first
    /// failure is returned.
    fn pump(&mut self) -> Result<()> {
        let mut first_error = None;
        for event in self.catalog.drain_events() {
            if let Err(e) = self.synchronizer.apply(&event, &self.catalog) {
                tracing::error!("❌ Failed to apply {:?}: {}", event, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Re-upload everything on the next flush, e.g. after switching targets
    pub fn resync(&mut self) {
        self.synchronizer.invalidate();
    }

    /// Push pending vertex/draw changes to the render target
    pub fn flush(&mut self, target: &dyn PatchTarget) -> Result<bool> {
        self.synchronizer.flush(target)
    }

    // ========== Import ==========

    /// Load a reconstruction: every image becomes a catalog image with its
    /// 2D points as keypoints, every 3D point becomes a track.
    ///
    /// The payload is validated as a whole first; on any error the project
    /// is unchanged.
    pub fn import(&mut self, payload: &ImportPayload, image_dir: &Path) -> Result<Vec<ImageId>> {
        let (entries, tracks) = self.plan_import(payload, image_dir).map_err(|e| {
            tracing::error!("❌ Rejected reconstruction import: {}", e);
            e
        })?;
        let track_count = tracks.len();

        let image_ids = self.catalog.add_images_bulk(entries)?;
        self.graph.seed(tracks)?;
        self.pump()?;

        tracing::info!(
            "✅ Imported {} images and {} tracks (next track id {})",
            image_ids.len(),
            track_count,
            self.graph.next_track_id()
        );
        Ok(image_ids)
    }

    fn plan_import(&self, payload: &ImportPayload, image_dir: &Path) -> Result<(Vec<ImageEntry>, Vec<Track>)> {
        let corrupt = |reason: String| EditorError::Corruption(reason);

        let mut images = HashMap::with_capacity(payload.images.len());
        for image in &payload.images {
            if image.image_id == u32::MAX {
                return Err(corrupt(format!("image id {} is reserved", image.image_id)));
            }
            if images.insert(image.image_id, image).is_some() {
                return Err(corrupt(format!("image id {} listed twice", image.image_id)));
            }
            if self.catalog.image(ImageId(image.image_id)).is_ok() {
                return Err(EditorError::Conflict(format!(
                    "image {} already in the catalog",
                    image.image_id
                )));
            }
            if image.points2d.len() != image.point3d_ids.len() {
                return Err(corrupt(format!(
                    "image {} has {} points but {} point3D ids",
                    image.image_id,
                    image.points2d.len(),
                    image.point3d_ids.len()
                )));
            }
        }

        // Every (image, point2D) pair listed by some track
        let mut listed = HashMap::new();
        let mut tracks = Vec::with_capacity(payload.points.len());
        let mut point_ids = HashSet::with_capacity(payload.points.len());
        for point in &payload.points {
            if point.point3d_id == u64::MAX {
                return Err(corrupt("point3D id u64::MAX is reserved".to_string()));
            }
            let track_id = TrackId(point.point3d_id);
            if !point_ids.insert(point.point3d_id) {
                return Err(corrupt(format!("point3D id {} listed twice", point.point3d_id)));
            }
            if self.graph.contains(track_id) {
                return Err(EditorError::Conflict(format!("track {} already exists", track_id)));
            }

            let mut track = Track::new(track_id);
            track.position = Point3::new(point.xyz[0] as f32, point.xyz[1] as f32, point.xyz[2] as f32);
            track.error = point.error as f32;
            for &(image_id, point2d_idx) in &point.track {
                let image = images
                    .get(&image_id)
                    .ok_or_else(|| corrupt(format!("{} observed in unknown image {}", track_id, image_id)))?;
                let claimed = image.point3d_ids.get(point2d_idx as usize).ok_or_else(|| {
                    corrupt(format!(
                        "{} references point {} of image {} which has {}",
                        track_id,
                        point2d_idx,
                        image_id,
                        image.points2d.len()
                    ))
                })?;
                if *claimed != Some(point.point3d_id) {
                    return Err(corrupt(format!(
                        "point {} of image {} does not belong to {}",
                        point2d_idx, image_id, track_id
                    )));
                }
                let member = TrackMember::new(ImageId(image_id), KeypointId(point2d_idx));
                if track.member_in(member.image_id).is_some() {
                    return Err(corrupt(format!("{} observes image {} twice", track_id, image_id)));
                }
                track.members.push(member);
                if listed.insert((image_id, point2d_idx), track_id).is_some() {
                    return Err(corrupt(format!("point {} of image {} is in two tracks", point2d_idx, image_id)));
                }
            }
            tracks.push(track);
        }

        let mut entries = Vec::with_capacity(payload.images.len());
        for image in &payload.images {
            let path = image_dir.join(&image.name);
            let size = match payload.camera(image.camera_id) {
                Some(camera) => (
                    u32::try_from(camera.width).unwrap_or(u32::MAX),
                    u32::try_from(camera.height).unwrap_or(u32::MAX),
                ),
                None => {
                    tracing::warn!(
                        "⚠️  No camera {} for {}, reading size from the file",
                        image.camera_id,
                        image.name
                    );
                    ::image::image_dimensions(&path)?
                }
            };
            if size.0 == 0 || size.1 == 0 {
                return Err(corrupt(format!("image {} has zero size", image.image_id)));
            }

            let mut keypoints = Vec::with_capacity(image.points2d.len());
            for (idx, (xy, point3d_id)) in image.points2d.iter().zip(&image.point3d_ids).enumerate() {
                let track_id = match point3d_id {
                    None => None,
                    Some(id) => {
                        // The keypoint's track must list it back
                        if listed.get(&(image.image_id, idx as u32)) != Some(&TrackId(*id)) {
                            return Err(corrupt(format!(
                                "point {} of image {} references missing track T{}",
                                idx, image.image_id, id
                            )));
                        }
                        Some(TrackId(*id))
                    }
                };
                let position = Point2::new((xy[0] / size.0 as f64) as f32, (xy[1] / size.1 as f64) as f32);
                keypoints.push((position, track_id));
            }

            entries.push(ImageEntry {
                id: Some(ImageId(image.image_id)),
                path,
                size,
                keypoints,
            });
        }

        Ok((entries, tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::sync::StagingMirror;
    use crate::import::{ImportedCamera, ImportedImage, ImportedPoint};

    fn small_config() -> EditorConfig {
        EditorConfig {
            max_active_images: 2,
            max_keypoints_per_image: 8,
            ..EditorConfig::default()
        }
    }

    fn project_with(counts: &[usize]) -> (Project, Vec<ImageId>) {
        let mut project = Project::new(small_config());
        let ids = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let id = project.add_image_with_size(format!("img{}.png", i), (100, 100)).unwrap();
                for k in 0..count {
                    project.add_keypoint(id, Point2::new(k as f32 * 0.1, 0.5)).unwrap();
                }
                id
            })
            .collect();
        (project, ids)
    }

    fn payload() -> ImportPayload {
        ImportPayload {
            cameras: vec![ImportedCamera {
                camera_id: 1,
                model_id: 1,
                width: 200,
                height: 100,
                params: vec![100.0, 100.0, 100.0, 50.0],
            }],
            images: vec![
                ImportedImage {
                    image_id: 4,
                    camera_id: 1,
                    name: "a.png".to_string(),
                    points2d: vec![[100.0, 50.0], [20.0, 10.0]],
                    point3d_ids: vec![Some(9), None],
                },
                ImportedImage {
                    image_id: 7,
                    camera_id: 1,
                    name: "b.png".to_string(),
                    points2d: vec![[0.0, 0.0]],
                    point3d_ids: vec![Some(9)],
                },
            ],
            points: vec![ImportedPoint {
                point3d_id: 9,
                xyz: [1.0, 2.0, 3.0],
                color: [255, 255, 255],
                error: 0.5,
                track: vec![(4, 0), (7, 0)],
            }],
        }
    }

    #[test]
    fn test_import_builds_images_and_tracks() {
        let mut project = Project::new(EditorConfig::default());
        let ids = project.import(&payload(), Path::new("/data/images")).unwrap();
        assert_eq!(ids, vec![ImageId(4), ImageId(7)]);

        let image = project.catalog().image(ImageId(4)).unwrap();
        assert_eq!(image.path, PathBuf::from("/data/images/a.png"));
        assert_eq!(image.keypoints[0].position, Point2::new(0.5, 0.5));
        assert_eq!(image.keypoints[0].track_id, Some(TrackId(9)));
        assert_eq!(image.keypoints[1].track_id, None);

        let track = project.graph().track(TrackId(9)).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.position, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(project.graph().next_track_id(), TrackId(10));

        // New ids continue past the imported ones
        let next = project.add_image_with_size("c.png", (10, 10)).unwrap();
        assert_eq!(next, ImageId(8));
    }

    #[test]
    fn test_import_rejects_inconsistent_payloads_atomically() {
        let mut broken = Vec::new();

        let mut p = payload();
        p.images[1].image_id = 4;
        broken.push(p);

        let mut p = payload();
        p.points[0].track.push((99, 0));
        broken.push(p);

        let mut p = payload();
        p.points[0].track[1] = (7, 5);
        broken.push(p);

        let mut p = payload();
        p.images[0].point3d_ids[0] = Some(3);
        broken.push(p);

        let mut p = payload();
        p.images[0].point3d_ids[1] = Some(9);
        p.points[0].track.push((4, 1));
        broken.push(p);

        let mut p = payload();
        p.images[0].point3d_ids[1] = Some(12);
        broken.push(p);

        // The same 3D point listed twice, with its observations split
        let mut p = payload();
        let mut second = p.points[0].clone();
        second.track = vec![(7, 0)];
        p.points[0].track = vec![(4, 0)];
        p.points.push(second);
        broken.push(p);

        for p in broken {
            let mut project = Project::new(EditorConfig::default());
            let result = project.import(&p, Path::new("/data"));
            assert!(matches!(result, Err(EditorError::Corruption(_))), "{:?}", result);
            assert!(project.catalog().is_empty());
            assert!(project.graph().is_empty());
        }
    }

    #[test]
    fn test_import_twice_conflicts() {
        let mut project = Project::new(EditorConfig::default());
        project.import(&payload(), Path::new("/data")).unwrap();
        let result = project.import(&payload(), Path::new("/data"));
        assert!(matches!(result, Err(EditorError::Conflict(_))));
        assert_eq!(project.catalog().len(), 2);
    }

    #[test]
    fn test_import_over_capacity_is_rejected() {
        let mut config = EditorConfig::default();
        config.max_keypoints_per_image = 1;
        let mut project = Project::new(config);
        let result = project.import(&payload(), Path::new("/data"));
        assert!(matches!(result, Err(EditorError::CapacityExceeded { .. })));
        assert!(project.graph().is_empty());
    }

    #[test]
    fn test_deactivate_shifts_later_range() {
        let (mut project, ids) = project_with(&[5, 3]);
        project.set_active(ids[0], true).unwrap();
        project.set_active(ids[1], true).unwrap();
        assert_eq!(project.synchronizer().ranges()[1].start, 5);

        project.set_active(ids[0], false).unwrap();
        let ranges = project.synchronizer().ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].owner, ranges[0].start, ranges[0].count), (ids[1], 0, 3));
        assert_eq!(project.synchronizer().vertices().len(), 3);
    }

    #[test]
    fn test_activation_over_capacity_leaves_flag_unchanged() {
        let (mut project, ids) = project_with(&[1, 1, 1]);
        project.set_active(ids[0], true).unwrap();
        project.set_active(ids[1], true).unwrap();

        let result = project.set_active(ids[2], true);
        assert!(matches!(result, Err(EditorError::CapacityExceeded { .. })));
        assert!(!project.catalog().image(ids[2]).unwrap().active);

        // Re-activating an active image is not a new slot
        assert!(!project.set_active(ids[0], true).unwrap());
    }

    #[test]
    fn test_keypoints_added_to_active_image_are_synced() {
        let (mut project, ids) = project_with(&[2, 2]);
        project.set_active(ids[0], true).unwrap();
        project.set_active(ids[1], true).unwrap();
        project.add_keypoint(ids[0], Point2::new(0.9, 0.9)).unwrap();

        let ranges = project.synchronizer().ranges();
        assert_eq!(ranges[0].count, 3);
        assert_eq!(ranges[1].start, 3);
        assert_eq!(project.synchronizer().vertices()[2].position, [0.9, 0.9]);
    }

    #[test]
    fn test_pick_flow_in_track_mode() {
        let (mut project, ids) = project_with(&[3, 2]);
        project.set_active(ids[0], true).unwrap();
        project.set_active(ids[1], true).unwrap();
        let colors = project.config().colors;

        // Browse: picking starts a track
        let result = project.handle_pick(3).unwrap();
        let PickResult::TrackStarted { track_id, image_id, keypoint_id } = result else {
            panic!("expected track start, got {:?}", result);
        };
        assert_eq!((image_id, keypoint_id), (ids[1], KeypointId(0)));
        assert_eq!(project.mode(), InteractionMode::Track(track_id));

        // Track: picking attaches
        let result = project.handle_pick(0).unwrap();
        assert!(matches!(result, PickResult::Attach { outcome: AttachOutcome::Attached, .. }));
        assert_eq!(project.graph().track(track_id).unwrap().len(), 2);

        let vertices = project.synchronizer().vertices();
        assert_eq!(vertices[0].rgba, colors.highlighted);
        assert_eq!(vertices[3].rgba, colors.highlighted);
        assert_eq!(vertices[1].rgba, colors.unassigned);

        // Picking another keypoint in an image the track already covers
        let result = project.handle_pick(1).unwrap();
        assert!(matches!(result, PickResult::Attach { outcome: AttachOutcome::Conflict(_), .. }));

        assert_eq!(project.handle_pick(crate::gpu::selection::NO_PICK).unwrap(), PickResult::Missed);
        assert!(project.handle_pick(100).is_err());

        project.end_track_mode().unwrap();
        assert_eq!(project.mode(), InteractionMode::Browse);
        assert_eq!(project.synchronizer().vertices()[0].rgba, colors.assigned);
    }

    #[test]
    fn test_merge_keeps_current_track() {
        let (mut project, ids) = project_with(&[1, 1]);
        let t1 = project.get_or_create_track_for_keypoint(ids[0], KeypointId(0)).unwrap();
        let t2 = project.get_or_create_track_for_keypoint(ids[1], KeypointId(0)).unwrap();

        project.begin_track_mode(t1).unwrap();
        let outcome = project.add_keypoint_to_track(t1, ids[1], KeypointId(0)).unwrap();
        assert_eq!(outcome, AttachOutcome::Merged { absorbed: t2 });
        assert_eq!(project.mode(), InteractionMode::Track(t1));
        assert!(project.graph().track(t2).is_err());

        // Absorbing the current track moves track mode to the survivor
        let (mut project, ids) = project_with(&[1, 1]);
        let t1 = project.get_or_create_track_for_keypoint(ids[0], KeypointId(0)).unwrap();
        let t2 = project.begin_track_mode_at(ids[1], KeypointId(0)).unwrap();
        project.add_keypoint_to_track(t1, ids[1], KeypointId(0)).unwrap();
        assert_eq!(project.mode(), InteractionMode::Track(t1));
        assert!(!project.graph().contains(t2));
    }

    #[test]
    fn test_add_keypoint_at_joins_current_track() {
        let (mut project, ids) = project_with(&[1, 0]);
        project.begin_track_mode_at(ids[0], KeypointId(0)).unwrap();

        let (kp, outcome) = project.add_keypoint_at(ids[1], Point2::new(0.25, 0.75)).unwrap();
        assert_eq!(kp, KeypointId(0));
        assert_eq!(outcome, Some(AttachOutcome::Attached));

        let InteractionMode::Track(track_id) = project.mode() else {
            panic!("expected track mode");
        };
        let observations = project.track_observations(track_id).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[1], (PathBuf::from("img1.png"), Point2::new(0.25, 0.75)));
    }

    #[test]
    fn test_resync_replaces_previous_session_in_target() {
        let (mut old, ids) = project_with(&[2, 3]);
        let mirror = StagingMirror::new();
        old.set_active(ids[0], true).unwrap();
        old.set_active(ids[1], true).unwrap();
        old.flush(&mirror).unwrap();
        assert_eq!(mirror.draws().len(), 2);

        // A freshly imported session has nothing active and nothing dirty
        let mut fresh = Project::new(EditorConfig::default());
        fresh.import(&payload(), Path::new("/data")).unwrap();
        assert!(!fresh.flush(&mirror).unwrap());
        assert_eq!(mirror.draws().len(), 2);

        fresh.resync();
        assert!(fresh.flush(&mirror).unwrap());
        assert!(mirror.draws().is_empty());
        assert!(mirror.vertices().is_empty());
    }

    #[test]
    fn test_add_image_reports_exhausted_ids() {
        let mut p = payload();
        p.points.clear();
        p.images.truncate(1);
        p.images[0].image_id = u32::MAX - 1;
        p.images[0].point3d_ids = vec![None, None];

        let mut project = Project::new(EditorConfig::default());
        project.import(&p, Path::new("/data")).unwrap();
        let result = project.add_image_with_size("late.png", (10, 10));
        assert!(matches!(result, Err(EditorError::CapacityExceeded { .. })));
        assert_eq!(project.catalog().len(), 1);
    }

    #[test]
    fn test_flush_to_mirror() {
        let (mut project, ids) = project_with(&[2, 3]);
        let mirror = StagingMirror::new();
        assert!(!project.flush(&mirror).unwrap());

        project.set_active(ids[0], true).unwrap();
        project.set_active(ids[1], true).unwrap();
        project.begin_track_mode_at(ids[1], KeypointId(2)).unwrap();
        assert!(project.flush(&mirror).unwrap());
        assert!(!project.flush(&mirror).unwrap());

        assert_eq!(mirror.vertices(), project.synchronizer().vertices());
        assert_eq!(mirror.draws(), project.synchronizer().draw_commands());
    }
}
