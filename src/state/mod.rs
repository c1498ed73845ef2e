/// State management module
///
/// This module handles all editing state, including:
/// - Ids, images, keypoints and tracks (data.rs)
/// - The image catalog and its change events (catalog.rs)
/// - The track table (tracks.rs)
/// - Track creation, attachment and merging (merge.rs)
/// - The editing session tying everything together (project.rs)

pub mod data;
pub mod catalog;
pub mod tracks;
pub mod merge;
pub mod project;

pub use project::{InteractionMode, PickResult, Project};
