/// Incremental keypoint vertex buffer synchronization
///
/// The synchronizer mirrors the catalog into a packed vertex sequence (one
/// contiguous range per active image, in activation order) and remembers
/// the lowest vertex and draw slot touched since the last upload. Once per
/// frame `flush` hands that dirty tail to a `PatchTarget`, which owns the
/// presentation-side copy (a GPU buffer, or `StagingMirror` headless).

use std::cell::{Cell, RefCell};

use super::packed::{DrawRange, PackedRanges};
use super::vertex::{IndirectDraw, KeypointVertex};
use crate::config::{EditorConfig, KeypointColors};
use crate::error::{EditorError, Result};
use crate::state::catalog::{CatalogEvent, ImageCatalog};
use crate::state::data::{Image, ImageId, TrackId};

/// The part of the presentation copy that changed.
///
/// Both slices run to the end of their sequence: the target overwrites
/// everything from `first_vertex` / `first_draw` on and drops whatever it
/// held beyond the new end.
#[derive(Debug, Clone, Copy)]
pub struct RegionPatch<'a> {
    pub first_vertex: usize,
    pub vertices: &'a [KeypointVertex],
    pub first_draw: usize,
    pub draws: &'a [IndirectDraw],
}

impl RegionPatch<'_> {
    pub fn vertex_count(&self) -> usize {
        self.first_vertex + self.vertices.len()
    }

    pub fn draw_count(&self) -> usize {
        self.first_draw + self.draws.len()
    }
}

/// Receiver of region patches (the renderer side).
///
/// `apply_patch` is blocking: when it returns `Ok`, the presentation copy
/// is fully updated and may be read by the next frame.
pub trait PatchTarget {
    fn apply_patch(&self, patch: &RegionPatch<'_>) -> Result<()>;
}

/// Lowest positions modified since the last flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRegion {
    first_vertex: usize,
    first_draw: usize,
}

pub struct VertexBufferSynchronizer {
    packed: PackedRanges<ImageId, KeypointVertex>,
    colors: KeypointColors,
    max_active_images: usize,
    highlight: Option<TrackId>,
    dirty: Option<DirtyRegion>,
}

impl VertexBufferSynchronizer {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            packed: PackedRanges::new(),
            colors: config.colors,
            max_active_images: config.max_active_images,
            highlight: None,
            dirty: None,
        }
    }

    /// Apply one catalog event. Events must be fed in emission order.
    pub fn apply(&mut self, event: &CatalogEvent, catalog: &ImageCatalog) -> Result<()> {
        tracing::debug!("🔄 Sync event {:?}", event);
        match event {
            CatalogEvent::ImagesAdded(_) => Ok(()),
            CatalogEvent::ImageActivated(image_id) => self.on_image_activated(catalog.image(*image_id)?),
            CatalogEvent::ImageDeactivated(image_id) => {
                self.on_image_deactivated(*image_id);
                Ok(())
            }
            CatalogEvent::KeypointsChanged(image_id) => {
                self.on_keypoints_changed(catalog.image(*image_id)?);
                Ok(())
            }
        }
    }

    /// Fails with `CapacityExceeded` when no activation slot is free
    pub fn ensure_can_activate(&self) -> Result<()> {
        if self.packed.ranges().len() >= self.max_active_images {
            return Err(EditorError::CapacityExceeded {
                what: "active images",
                limit: self.max_active_images,
            });
        }
        Ok(())
    }

    /// Append a range for the image at the end of the sequence
    pub fn on_image_activated(&mut self, image: &Image) -> Result<()> {
        if self.packed.slot_of(image.id).is_some() {
            tracing::debug!("Image {} already has a vertex range", image.id);
            return Ok(());
        }
        self.ensure_can_activate()?;

        let first_vertex = self.packed.len();
        let vertices: Vec<KeypointVertex> = self.vertices_for(image).collect();
        if let Some(slot) = self.packed.push_range(image.id, vertices) {
            self.mark_dirty(first_vertex, slot);
        }
        Ok(())
    }

    /// Cut the image's range out and close the gap
    pub fn on_image_deactivated(&mut self, image_id: ImageId) {
        match self.packed.remove_range(image_id) {
            Some((slot, removed)) => self.mark_dirty(removed.start, slot),
            None => tracing::debug!("Image {} had no vertex range", image_id),
        }
    }

    /// Resize the image's range to its keypoint count and rewrite it
    pub fn on_keypoints_changed(&mut self, image: &Image) {
        let Some(slot) = self.packed.resize_range(image.id, image.keypoints.len()) else {
            // Inactive images have nothing to update
            return;
        };
        let vertices: Vec<KeypointVertex> = self.vertices_for(image).collect();
        if let Some(records) = self.packed.records_mut(image.id) {
            records.copy_from_slice(&vertices);
        }
        let start = self.packed.ranges()[slot].start;
        self.mark_dirty(start, slot);
    }

    /// Track whose keypoints use the highlight color. The caller reports
    /// the affected images as changed afterwards.
    pub fn set_highlight(&mut self, track_id: Option<TrackId>) {
        self.highlight = track_id;
    }

    pub fn highlight(&self) -> Option<TrackId> {
        self.highlight
    }

    fn vertices_for<'a>(&self, image: &'a Image) -> impl Iterator<Item = KeypointVertex> + 'a {
        let colors = self.colors;
        let highlight = self.highlight;
        image.keypoints.iter().map(move |kp| {
            let rgba = match kp.track_id {
                None => colors.unassigned,
                Some(track_id) if Some(track_id) == highlight => colors.highlighted,
                Some(_) => colors.assigned,
            };
            KeypointVertex::new(kp, rgba)
        })
    }

    fn mark_dirty(&mut self, first_vertex: usize, first_draw: usize) {
        self.dirty = Some(match self.dirty {
            Some(region) => DirtyRegion {
                first_vertex: region.first_vertex.min(first_vertex),
                first_draw: region.first_draw.min(first_draw),
            },
            None => DirtyRegion {
                first_vertex,
                first_draw,
            },
        });
    }

    /// Mark everything dirty so the next flush rewrites a fresh target
    pub fn invalidate(&mut self) {
        self.dirty = Some(DirtyRegion {
            first_vertex: 0,
            first_draw: 0,
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    pub fn vertices(&self) -> &[KeypointVertex] {
        self.packed.records()
    }

    pub fn ranges(&self) -> &[DrawRange<ImageId>] {
        self.packed.ranges()
    }

    /// Range table as indirect draw commands, one per active image
    pub fn draw_commands(&self) -> Vec<IndirectDraw> {
        self.packed
            .ranges()
            .iter()
            .enumerate()
            .map(|(slot, range)| IndirectDraw {
                vertex_count: range.count as u32,
                instance_count: 1,
                first_vertex: range.start as u32,
                first_instance: slot as u32,
            })
            .collect()
    }

    /// Push the dirty region to the target and clear the dirty flag.
    ///
    /// Returns `Ok(false)` when nothing changed since the last flush. If
    /// the target fails the region stays dirty and is retried next cycle.
    pub fn flush(&mut self, target: &dyn PatchTarget) -> Result<bool> {
        let Some(region) = self.dirty else {
            return Ok(false);
        };
        let draws = self.draw_commands();
        let first_vertex = region.first_vertex.min(self.packed.len());
        let first_draw = region.first_draw.min(draws.len());
        let patch = RegionPatch {
            first_vertex,
            vertices: &self.packed.records()[first_vertex..],
            first_draw,
            draws: &draws[first_draw..],
        };
        target.apply_patch(&patch)?;
        tracing::debug!(
            "⬆️  Uploaded {} vertices from {} and {} draws from {}",
            patch.vertices.len(),
            first_vertex,
            patch.draws.len(),
            first_draw
        );
        self.dirty = None;
        Ok(true)
    }
}

impl std::fmt::Debug for VertexBufferSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBufferSynchronizer")
            .field("vertices", &self.packed.len())
            .field("ranges", &self.packed.ranges().len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// CPU-side presentation copy, for running without a GPU
#[derive(Debug, Default)]
pub struct StagingMirror {
    vertices: RefCell<Vec<KeypointVertex>>,
    draws: RefCell<Vec<IndirectDraw>>,
    patches: Cell<usize>,
}

impl StagingMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> Vec<KeypointVertex> {
        self.vertices.borrow().clone()
    }

    pub fn draws(&self) -> Vec<IndirectDraw> {
        self.draws.borrow().clone()
    }

    /// Number of patches applied so far
    pub fn patch_count(&self) -> usize {
        self.patches.get()
    }
}

impl PatchTarget for StagingMirror {
    fn apply_patch(&self, patch: &RegionPatch<'_>) -> Result<()> {
        let mut vertices = self.vertices.borrow_mut();
        if patch.first_vertex > vertices.len() {
            return Err(EditorError::Gpu(format!(
                "patch starts at vertex {} past the end ({})",
                patch.first_vertex,
                vertices.len()
            )));
        }
        let mut draws = self.draws.borrow_mut();
        if patch.first_draw > draws.len() {
            return Err(EditorError::Gpu(format!(
                "patch starts at draw {} past the end ({})",
                patch.first_draw,
                draws.len()
            )));
        }

        vertices.truncate(patch.first_vertex);
        vertices.extend_from_slice(patch.vertices);
        draws.truncate(patch.first_draw);
        draws.extend_from_slice(patch.draws);
        self.patches.set(self.patches.get() + 1);
        Ok(())
    }
}
