/// GPU-resident keypoint overlay
///
/// Keeps a packed per-keypoint vertex array and a per-image draw range
/// table in sync with the catalog, and pushes the changed tail to a
/// render target.
///
/// Architecture:
/// - `vertex.rs` - Vertex and indirect draw records
/// - `packed.rs` - Packed sequence with a range table (no graph knowledge)
/// - `sync.rs` - Event-driven synchronizer and the patch target seam
/// - `selection.rs` - Picking index to keypoint resolution
/// - `buffers.rs` - wgpu buffers implementing the patch target

pub mod vertex;
pub mod packed;
pub mod sync;
pub mod selection;
pub mod buffers;

pub use buffers::KeypointBuffers;
pub use selection::SelectionResolver;
pub use sync::{PatchTarget, RegionPatch, StagingMirror, VertexBufferSynchronizer};
