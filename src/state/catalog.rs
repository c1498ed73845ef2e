use cgmath::Point2;
use std::collections::HashMap;
use std::path::PathBuf;

use super::data::{Image, ImageId, KeyPoint, KeypointId, TrackId, TrackMember};
use crate::error::{EditorError, Result};

/// Change notification emitted by every mutating catalog call.
///
/// Events queue up in the catalog's outbox in the order the mutations
/// happened; the owner drains them and hands them to the vertex buffer
/// synchronizer one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// One or more images were appended (a bulk import is a single event)
    ImagesAdded(Vec<ImageId>),
    /// Keypoints of the image were appended or changed state
    KeypointsChanged(ImageId),
    ImageActivated(ImageId),
    ImageDeactivated(ImageId),
}

/// An image to be inserted by `add_images_bulk`
#[derive(Debug, Clone)]
pub struct ImageEntry {
    /// Fixed id (from a reconstruction), or `None` to allocate the next one
    pub id: Option<ImageId>,
    pub path: PathBuf,
    pub size: (u32, u32),
    /// Initial keypoints: normalized position and optional track
    pub keypoints: Vec<(Point2<f32>, Option<TrackId>)>,
}

/// The ImageCatalog owns all images and their keypoint lists.
///
/// Images live in an arena keyed by their stable id; `order` remembers the
/// insertion order used by the image table. Images are never removed.
pub struct ImageCatalog {
    images: HashMap<ImageId, Image>,
    order: Vec<ImageId>,
    next_image_id: u32,
    max_keypoints_per_image: usize,
    events: Vec<CatalogEvent>,
}

impl ImageCatalog {
    pub fn new(max_keypoints_per_image: usize) -> Self {
        Self {
            images: HashMap::new(),
            order: Vec::new(),
            next_image_id: 0,
            max_keypoints_per_image,
            events: Vec::new(),
        }
    }

    /// Add an image file; its header is read to learn the pixel dimensions
    pub fn add_image(&mut self, path: impl Into<PathBuf>) -> Result<ImageId> {
        let path = path.into();
        let size = image::image_dimensions(&path)?;
        self.add_image_with_size(path, size)
    }

    /// Add an image whose dimensions are already known
    pub fn add_image_with_size(&mut self, path: impl Into<PathBuf>, size: (u32, u32)) -> Result<ImageId> {
        let id = ImageId(self.next_image_id);
        self.next_image_id = id_after(id)?;
        self.insert(Image {
            id,
            path: path.into(),
            size,
            keypoints: Vec::new(),
            active: false,
        });
        self.events.push(CatalogEvent::ImagesAdded(vec![id]));
        Ok(id)
    }

    /// Insert a batch of images with a single notification.
    ///
    /// The whole batch is checked and its ids assigned first (duplicate
    /// ids, per-image capacity, id space); on error nothing is inserted.
    pub fn add_images_bulk(&mut self, entries: Vec<ImageEntry>) -> Result<Vec<ImageId>> {
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if entry.keypoints.len() > self.max_keypoints_per_image {
                return Err(EditorError::CapacityExceeded {
                    what: "keypoints per image",
                    limit: self.max_keypoints_per_image,
                });
            }
            if let Some(id) = entry.id {
                if self.images.contains_key(&id) || !seen.insert(id) {
                    return Err(EditorError::Conflict(format!("image {} already in the catalog", id)));
                }
            }
        }

        let mut next_image_id = self.next_image_id;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            let id = match entry.id {
                Some(id) => id,
                None => {
                    // Skip ids reserved by explicitly numbered entries of this batch
                    while seen.contains(&ImageId(next_image_id)) {
                        next_image_id = id_after(ImageId(next_image_id))?;
                    }
                    ImageId(next_image_id)
                }
            };
            next_image_id = next_image_id.max(id_after(id)?);
            ids.push(id);
        }

        for (entry, &id) in entries.into_iter().zip(&ids) {
            let keypoints = entry
                .keypoints
                .into_iter()
                .enumerate()
                .map(|(i, (position, track_id))| KeyPoint {
                    id: KeypointId(i as u32),
                    position,
                    track_id,
                })
                .collect();
            self.insert(Image {
                id,
                path: entry.path,
                size: entry.size,
                keypoints,
                active: false,
            });
        }
        self.next_image_id = next_image_id;

        tracing::info!("🖼️  Added {} images to the catalog", ids.len());
        self.events.push(CatalogEvent::ImagesAdded(ids.clone()));
        Ok(ids)
    }

    fn insert(&mut self, image: Image) {
        self.order.push(image.id);
        self.images.insert(image.id, image);
    }

    /// Append a keypoint at a normalized position; it starts without a track
    pub fn add_keypoint(&mut self, image_id: ImageId, position: Point2<f32>) -> Result<KeypointId> {
        let limit = self.max_keypoints_per_image;
        let image = self
            .images
            .get_mut(&image_id)
            .ok_or_else(|| EditorError::image_not_found(image_id))?;
        if image.keypoints.len() >= limit {
            return Err(EditorError::CapacityExceeded {
                what: "keypoints per image",
                limit,
            });
        }

        let id = KeypointId(image.keypoints.len() as u32);
        image.keypoints.push(KeyPoint {
            id,
            position: Point2::new(position.x.clamp(0.0, 1.0), position.y.clamp(0.0, 1.0)),
            track_id: None,
        });
        tracing::debug!("📍 Added {} to image {}", id, image_id);
        self.events.push(CatalogEvent::KeypointsChanged(image_id));
        Ok(id)
    }

    pub fn image(&self, image_id: ImageId) -> Result<&Image> {
        self.images
            .get(&image_id)
            .ok_or_else(|| EditorError::image_not_found(image_id))
    }

    pub fn keypoint(&self, image_id: ImageId, keypoint_id: KeypointId) -> Result<&KeyPoint> {
        self.image(image_id)?
            .keypoint(keypoint_id)
            .ok_or_else(|| EditorError::keypoint_not_found(image_id, keypoint_id))
    }

    /// Images in insertion order
    pub fn images(&self) -> impl Iterator<Item = &Image> + '_ {
        self.order.iter().filter_map(|id| self.images.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.images.values().filter(|image| image.active).count()
    }

    /// Toggle rendering of an image. Returns whether the flag changed.
    pub fn set_active(&mut self, image_id: ImageId, active: bool) -> Result<bool> {
        let image = self
            .images
            .get_mut(&image_id)
            .ok_or_else(|| EditorError::image_not_found(image_id))?;
        if image.active == active {
            return Ok(false);
        }
        image.active = active;
        self.events.push(if active {
            CatalogEvent::ImageActivated(image_id)
        } else {
            CatalogEvent::ImageDeactivated(image_id)
        });
        Ok(true)
    }

    /// Set a keypoint's track without notifying; callers batch the
    /// notification per image with `notify_keypoints_changed`.
    pub(crate) fn set_keypoint_track(&mut self, member: TrackMember, track_id: Option<TrackId>) -> Result<()> {
        let keypoint = self
            .images
            .get_mut(&member.image_id)
            .and_then(|image| image.keypoints.get_mut(member.keypoint_id.index()))
            .ok_or_else(|| EditorError::keypoint_not_found(member.image_id, member.keypoint_id))?;
        keypoint.track_id = track_id;
        Ok(())
    }

    pub(crate) fn notify_keypoints_changed(&mut self, image_id: ImageId) {
        self.events.push(CatalogEvent::KeypointsChanged(image_id));
    }

    /// Take all pending notifications, oldest first
    pub fn drain_events(&mut self) -> Vec<CatalogEvent> {
        std::mem::take(&mut self.events)
    }
}

/// The id allocated after `id`; `u32::MAX` itself is never handed out
fn id_after(id: ImageId) -> Result<u32> {
    id.0
        .checked_add(1)
        .ok_or(EditorError::CapacityExceeded {
            what: "image ids",
            limit: u32::MAX as usize,
        })
}

impl std::fmt::Debug for ImageCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCatalog")
            .field("images", &self.order.len())
            .field("next_image_id", &self.next_image_id)
            .finish_non_exhaustive()
    }
}
