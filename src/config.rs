//! Configuration persistence for maskpaint settings

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::domain::GenerationParams;

/// Serializable color representation for config storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for OverlayColor {
    fn default() -> Self {
        // Default red, matching the service's paint default
        Self {
            r: 1.0,
            g: 0.0,
            b: 0.0,
        }
    }
}

impl OverlayColor {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Convert to image crate RGBA format (0-255)
    pub fn to_rgba_u8(self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            255,
        ]
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            bail!("expected a #RRGGBB color, got {hex:?}");
        }
        let channel = |range: std::ops::Range<usize>| -> Result<f32> {
            let value = u8::from_str_radix(&digits[range], 16)
                .with_context(|| format!("invalid hex color {hex:?}"))?;
            Ok(value as f32 / 255.0)
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// Format as `#rrggbb`
    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba_u8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// Engine configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A pixel belongs to a mask when its intensity is above this value
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Sample the four direct neighbours on hover
    #[serde(default = "default_true")]
    pub hover_neighborhood: bool,
    /// Highlight color for selected masks
    #[serde(default = "default_selected_color")]
    pub selected_color: OverlayColor,
    /// Highlight color for the hovered mask
    #[serde(default = "default_hover_color")]
    pub hover_color: OverlayColor,
    /// Opacity of selection and hover highlights (0.0-1.0)
    #[serde(default = "default_overlay_opacity")]
    pub overlay_opacity: f32,
    /// Opacity of show-all overlays (0.0-1.0)
    #[serde(default = "default_show_all_opacity")]
    pub show_all_opacity: f32,
    /// Colors cycled through by batch index in show-all mode
    #[serde(default = "default_palette")]
    pub palette: Vec<OverlayColor>,
    /// Opacity used when promoting a selection to paint
    #[serde(default = "default_paint_opacity")]
    pub paint_opacity: f32,
    /// Parameters for automatic mask generation
    #[serde(default)]
    pub generation: GenerationParams,
    /// Whether the mask cache is consulted and written
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Maximum age of a cache entry
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u32,
    /// Cache directory (None = platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_threshold() -> u8 {
    128
}

fn default_true() -> bool {
    true
}

fn default_selected_color() -> OverlayColor {
    OverlayColor::rgb(0.0, 0.47, 1.0) // Accent blue
}

fn default_hover_color() -> OverlayColor {
    OverlayColor::rgb(1.0, 0.84, 0.0) // Yellow
}

fn default_overlay_opacity() -> f32 {
    0.6
}

fn default_show_all_opacity() -> f32 {
    0.4
}

fn default_paint_opacity() -> f32 {
    0.7
}

fn default_cache_ttl_hours() -> u32 {
    24
}

fn default_palette() -> Vec<OverlayColor> {
    vec![
        OverlayColor::rgb(0.90, 0.10, 0.29),
        OverlayColor::rgb(0.24, 0.71, 0.29),
        OverlayColor::rgb(1.00, 0.88, 0.10),
        OverlayColor::rgb(0.26, 0.39, 0.85),
        OverlayColor::rgb(0.96, 0.51, 0.19),
        OverlayColor::rgb(0.57, 0.12, 0.71),
        OverlayColor::rgb(0.27, 0.94, 0.94),
        OverlayColor::rgb(0.94, 0.20, 0.90),
        OverlayColor::rgb(0.74, 0.96, 0.05),
        OverlayColor::rgb(0.98, 0.75, 0.83),
    ]
}

impl EngineConfig {
    /// Application directory name under the platform config/cache dirs
    pub const ID: &'static str = "maskpaint";

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Resolved cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(Self::ID)
        })
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        let Some(path) = Self::config_file_path() else {
            log::warn!("No config directory available, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Error loading config, using defaults: {:#}", err);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) {
        let Some(path) = Self::config_file_path() else {
            log::error!("No config directory available, settings not saved");
            return;
        };
        if let Err(err) = self.save_to(&path) {
            log::error!("Failed to save config: {:#}", err);
        }
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            hover_neighborhood: true,
            selected_color: default_selected_color(),
            hover_color: default_hover_color(),
            overlay_opacity: default_overlay_opacity(),
            show_all_opacity: default_show_all_opacity(),
            palette: default_palette(),
            paint_opacity: default_paint_opacity(),
            generation: GenerationParams::default(),
            cache_enabled: true,
            cache_ttl_hours: default_cache_ttl_hours(),
            cache_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let color = OverlayColor::from_hex("#FF8000").unwrap();
        assert_eq!(color.to_rgba_u8(), [255, 128, 0, 255]);
        assert_eq!(color.to_hex(), "#ff8000");
        assert_eq!(OverlayColor::from_hex("00ff00").unwrap().to_hex(), "#00ff00");
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(OverlayColor::from_hex("#12345").is_err());
        assert!(OverlayColor::from_hex("#GGGGGG").is_err());
        assert!(OverlayColor::from_hex("#ééé").is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"threshold": 100}"#).unwrap();
        assert_eq!(config.threshold, 100);
        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.generation.points_per_side, 96);
        assert_eq!(config.palette.len(), 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = EngineConfig::default();
        config.show_all_opacity = 0.25;
        config.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), config);
    }
}
