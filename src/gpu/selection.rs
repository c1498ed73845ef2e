/// Picking support: maps a vertex index reported by the picking pass back
/// to the keypoint it was generated from, and the other way around.

use super::packed::DrawRange;
use crate::error::{EditorError, Result};
use crate::state::data::{ImageId, KeypointId};

/// Value the picking pass writes where no keypoint was hit
pub const NO_PICK: u32 = u32::MAX;

pub struct SelectionResolver;

impl SelectionResolver {
    /// Resolve a global vertex index to `(image, keypoint)`.
    ///
    /// Ranges are half-open: an index equal to the running total belongs
    /// to the next range. Indices past the sequence end are `NotFound`.
    pub fn resolve(ranges: &[DrawRange<ImageId>], index: u32) -> Result<(ImageId, KeypointId)> {
        let mut remaining = index as usize;
        for range in ranges {
            if remaining < range.count {
                return Ok((range.owner, KeypointId(remaining as u32)));
            }
            remaining -= range.count;
        }
        Err(EditorError::NotFound(format!("vertex {}", index)))
    }

    /// Like `resolve`, but treats the `NO_PICK` sentinel as "nothing picked"
    pub fn resolve_pick(ranges: &[DrawRange<ImageId>], raw: u32) -> Result<Option<(ImageId, KeypointId)>> {
        if raw == NO_PICK {
            return Ok(None);
        }
        Self::resolve(ranges, raw).map(Some)
    }

    /// Forward mapping: the global vertex index of a keypoint of an active image
    pub fn global_index(ranges: &[DrawRange<ImageId>], image_id: ImageId, keypoint_id: KeypointId) -> Option<u32> {
        let range = ranges.iter().find(|r| r.owner == image_id)?;
        let local = keypoint_id.index();
        (local < range.count).then(|| (range.start + local) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<DrawRange<ImageId>> {
        vec![
            DrawRange { owner: ImageId(7), start: 0, count: 5 },
            DrawRange { owner: ImageId(2), start: 5, count: 0 },
            DrawRange { owner: ImageId(4), start: 5, count: 3 },
        ]
    }

    #[test]
    fn test_resolve_within_ranges() {
        let ranges = table();
        assert_eq!(SelectionResolver::resolve(&ranges, 0).unwrap(), (ImageId(7), KeypointId(0)));
        assert_eq!(SelectionResolver::resolve(&ranges, 4).unwrap(), (ImageId(7), KeypointId(4)));
        assert_eq!(SelectionResolver::resolve(&ranges, 7).unwrap(), (ImageId(4), KeypointId(2)));
    }

    #[test]
    fn test_boundary_belongs_to_next_range() {
        let ranges = table();
        // Index 5 is the start of image 4 (the empty range in between is skipped)
        assert_eq!(SelectionResolver::resolve(&ranges, 5).unwrap(), (ImageId(4), KeypointId(0)));
    }

    #[test]
    fn test_past_end_is_not_found() {
        let ranges = table();
        assert!(matches!(SelectionResolver::resolve(&ranges, 8), Err(EditorError::NotFound(_))));
        assert!(SelectionResolver::resolve(&[], 0).is_err());
    }

    #[test]
    fn test_sentinel_means_nothing_picked() {
        assert_eq!(SelectionResolver::resolve_pick(&table(), NO_PICK).unwrap(), None);
        assert!(SelectionResolver::resolve_pick(&table(), 3).unwrap().is_some());
    }

    #[test]
    fn test_left_inverse_of_forward_mapping() {
        let ranges = table();
        let total: usize = ranges.iter().map(|r| r.count).sum();
        for index in 0..total as u32 {
            let (image, kp) = SelectionResolver::resolve(&ranges, index).unwrap();
            assert_eq!(SelectionResolver::global_index(&ranges, image, kp), Some(index));
        }
        assert_eq!(SelectionResolver::global_index(&ranges, ImageId(2), KeypointId(0)), None);
    }
}
