/// GPU-facing record layouts
///
/// Both structs are uploaded byte-for-byte with `bytemuck::cast_slice`, so
/// their layout must match the vertex input and `DrawIndirectArgs` layouts.

use crate::state::data::KeyPoint;

/// One keypoint as drawn by the point pipeline
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KeypointVertex {
    /// Normalized image coordinates
    pub position: [f32; 2],
    /// Packed status color, 0xRRGGBBAA
    pub rgba: u32,
}

impl KeypointVertex {
    pub fn new(keypoint: &KeyPoint, rgba: u32) -> Self {
        Self {
            position: [keypoint.position.x, keypoint.position.y],
            rgba,
        }
    }
}

/// Indirect draw command for one active image.
/// Same layout as `VkDrawIndirectCommand` / wgpu's `DrawIndirectArgs`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IndirectDraw {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    /// Activation slot; selects the image's per-instance data
    pub first_instance: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<KeypointVertex>(), 12);
        assert_eq!(std::mem::size_of::<IndirectDraw>(), 16);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertex = KeypointVertex {
            position: [0.5, 0.25],
            rgba: 0xFF0000FF,
        };
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(&bytes[0..4], &0.5f32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &0xFF0000FFu32.to_ne_bytes());
    }
}
