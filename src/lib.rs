//! Track editor core
//!
//! Images with their keypoints, tracks linking keypoints across images,
//! and the GPU vertex buffers that show them.

pub mod config;
pub mod error;
pub mod gpu;
pub mod import;
pub mod state;

pub use config::EditorConfig;
pub use error::{EditorError, Result};
pub use state::Project;
