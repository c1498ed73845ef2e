/// Reconstruction import
///
/// This module handles:
/// - Reading COLMAP sparse models (binary or text) into an `ImportPayload`
/// - Running the read on a blocking thread so the UI stays responsive
///
/// Turning the payload into images, keypoints and tracks happens in
/// `state::project`, where it can be validated against the catalog.

pub mod colmap;

use std::path::PathBuf;
use tokio::task;

/// Camera intrinsics; only the image size is used for normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedCamera {
    pub camera_id: u32,
    pub model_id: i32,
    pub width: u64,
    pub height: u64,
    pub params: Vec<f64>,
}

/// One registered image with its 2D observations
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedImage {
    pub image_id: u32,
    pub camera_id: u32,
    /// File name relative to the image directory
    pub name: String,
    /// Pixel coordinates
    pub points2d: Vec<[f64; 2]>,
    /// Parallel to `points2d`; `None` for points without a 3D point
    pub point3d_ids: Vec<Option<u64>>,
}

/// One 3D point and the observations that make up its track
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedPoint {
    pub point3d_id: u64,
    pub xyz: [f64; 3],
    pub color: [u8; 3],
    pub error: f64,
    /// (image id, index into that image's `points2d`)
    pub track: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPayload {
    pub cameras: Vec<ImportedCamera>,
    pub images: Vec<ImportedImage>,
    pub points: Vec<ImportedPoint>,
}

impl ImportPayload {
    pub fn camera(&self, camera_id: u32) -> Option<&ImportedCamera> {
        self.cameras.iter().find(|c| c.camera_id == camera_id)
    }
}

/// Load a COLMAP sparse model directory in a background thread
pub async fn load_reconstruction(sparse_dir: PathBuf) -> Result<ImportPayload, String> {
    // Spawn blocking because parsing large models is CPU-intensive
    task::spawn_blocking(move || colmap::read_sparse_dir(&sparse_dir).map_err(|e| e.to_string()))
        .await
        .map_err(|e| format!("Task join error: {}", e))?
}
