/// Editor configuration
///
/// Capacity bounds for the GPU-resident keypoint buffers and the colors used
/// to render keypoint status. Stored as JSON in the user's config directory:
/// - Linux: ~/.config/track-editor/config.json
/// - macOS: ~/Library/Application Support/track-editor/config.json
/// - Windows: %APPDATA%\track-editor\config.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EditorError, Result};

/// Keypoint colors, packed RGBA (`0xRRGGBBAA`) exactly as uploaded to the GPU
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeypointColors {
    /// Keypoint not observed by any track
    pub unassigned: u32,
    /// Keypoint that belongs to a track
    pub assigned: u32,
    /// Keypoint that belongs to the track currently being edited
    pub highlighted: u32,
}

impl Default for KeypointColors {
    fn default() -> Self {
        Self {
            unassigned: 0xFFFF00FF,
            assigned: 0xFF00FFFF,
            highlighted: 0xFF0000FF,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// How many images may be rendered (activated) at the same time
    pub max_active_images: usize,
    /// Upper bound for the keypoint list of a single image
    pub max_keypoints_per_image: usize,
    pub colors: KeypointColors,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_active_images: 256,
            max_keypoints_per_image: 10_000,
            colors: KeypointColors::default(),
        }
    }
}

impl EditorConfig {
    /// Size of the packed vertex sequence when every slot is full
    pub fn max_vertices(&self) -> usize {
        self.max_active_images.saturating_mul(self.max_keypoints_per_image)
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string, rejecting zero capacities
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_active_images == 0 || self.max_keypoints_per_image == 0 {
            return Err(EditorError::InvalidConfig(
                "capacity limits in config.json must be non-zero".to_string(),
            ));
        }
        // Vertex indices and draw offsets are 32-bit on the GPU
        let total = self.max_active_images.checked_mul(self.max_keypoints_per_image);
        if total.map_or(true, |total| total > u32::MAX as usize) {
            return Err(EditorError::InvalidConfig(format!(
                "{} active images × {} keypoints exceeds the vertex index range",
                self.max_active_images, self.max_keypoints_per_image
            )));
        }
        Ok(())
    }

    /// Get the path where the config file is expected
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("track-editor");
        path.push("config.json");
        Some(path)
    }

    /// Load the config from disk, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("⚙️  No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        tracing::info!("⚙️  Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_renderer_limits() {
        let config = EditorConfig::default();
        assert_eq!(config.max_active_images, 256);
        assert_eq!(config.max_keypoints_per_image, 10_000);
        assert_eq!(config.max_vertices(), 2_560_000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EditorConfig::from_json(r#"{ "max_active_images": 4 }"#).unwrap();
        assert_eq!(config.max_active_images, 4);
        assert_eq!(config.max_keypoints_per_image, 10_000);
        assert_eq!(config.colors, KeypointColors::default());
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let json = format!(
            r#"{{ "max_active_images": {}, "max_keypoints_per_image": {} }}"#,
            usize::MAX,
            2
        );
        let result = EditorConfig::from_json(&json);
        assert!(matches!(result, Err(EditorError::InvalidConfig(_))));

        let result = EditorConfig::from_json(r#"{ "max_active_images": 65536, "max_keypoints_per_image": 65536 }"#);
        assert!(matches!(result, Err(EditorError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = EditorConfig::from_json(r#"{ "max_keypoints_per_image": 0 }"#);
        assert!(matches!(result, Err(EditorError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = EditorConfig::from_json("{ not json");
        assert!(matches!(result, Err(EditorError::Config(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("track-editor-does-not-exist/config.json");
        let config = EditorConfig::load_from(&path).unwrap();
        assert_eq!(config, EditorConfig::default());
    }
}
