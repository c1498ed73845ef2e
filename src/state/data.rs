/// Shared data structures for the image/track graph
///
/// Ids are plain copyable handles. Images own their keypoints, tracks
/// reference keypoints by `(ImageId, KeypointId)` pairs, and nothing holds
/// a pointer into another table.

use cgmath::{Point2, Point3};
use std::fmt;
use std::path::PathBuf;

/// Identifier of an image, unique and never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u32);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a keypoint inside its image (append-only, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeypointId(pub u32);

impl KeypointId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for KeypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kp{}", self.0)
    }
}

/// Identifier of a track, unique and never reused even after a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// One observation of a track: a keypoint in a given image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackMember {
    pub image_id: ImageId,
    pub keypoint_id: KeypointId,
}

impl TrackMember {
    pub fn new(image_id: ImageId, keypoint_id: KeypointId) -> Self {
        Self { image_id, keypoint_id }
    }
}

/// A 2D point of interest inside one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub id: KeypointId,
    /// Normalized image coordinates in [0, 1] x [0, 1]
    pub position: Point2<f32>,
    /// `None` while the keypoint is not part of any track
    pub track_id: Option<TrackId>,
}

/// Represents a single image in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: ImageId,
    /// Full path to the image file
    pub path: PathBuf,
    /// Pixel dimensions (width, height)
    pub size: (u32, u32),
    /// Keypoints ordered by id; `keypoints[i].id == KeypointId(i)`
    pub keypoints: Vec<KeyPoint>,
    /// Whether the image is currently rendered
    pub active: bool,
}

impl Image {
    /// Filename without extension, as shown in the image table
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    pub fn keypoint(&self, keypoint_id: KeypointId) -> Option<&KeyPoint> {
        self.keypoints.get(keypoint_id.index())
    }
}

/// The set of observations believed to be one physical point
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Observations, at most one per image, in insertion order
    pub members: Vec<TrackMember>,
    /// Triangulated position (zero for tracks created in the editor)
    pub position: Point3<f32>,
    /// Mean reprojection error reported by the reconstruction
    pub error: f32,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            members: Vec::new(),
            position: Point3::new(0.0, 0.0, 0.0),
            error: 0.0,
        }
    }

    /// The member observed in `image_id`, if any
    pub fn member_in(&self, image_id: ImageId) -> Option<&TrackMember> {
        self.members.iter().find(|m| m.image_id == image_id)
    }

    pub fn contains(&self, member: &TrackMember) -> bool {
        self.members.contains(member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_name_is_file_stem() {
        let image = Image {
            id: ImageId(3),
            path: PathBuf::from("/data/south-building/images/P1180141.JPG"),
            size: (3072, 2304),
            keypoints: Vec::new(),
            active: false,
        };
        assert_eq!(image.name(), "P1180141");
    }

    #[test]
    fn test_member_lookup_by_image() {
        let mut track = Track::new(TrackId(7));
        track.members.push(TrackMember::new(ImageId(1), KeypointId(4)));
        track.members.push(TrackMember::new(ImageId(2), KeypointId(0)));

        assert_eq!(track.member_in(ImageId(2)).map(|m| m.keypoint_id), Some(KeypointId(0)));
        assert!(track.member_in(ImageId(9)).is_none());
        assert!(track.contains(&TrackMember::new(ImageId(1), KeypointId(4))));
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(TrackId(12).to_string(), "T12");
        assert_eq!(KeypointId(5).to_string(), "kp5");
    }
}
