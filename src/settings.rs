use image::Rgb;
use std::path::PathBuf;

use crate::components::tools::{MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::io::DEFAULT_JPEG_QUALITY;

/// Default border-key tolerance (0–100 color distance scale).
pub const DEFAULT_BORDER_TOLERANCE: f32 = 12.0;

// ============================================================================
// APP SETTINGS
// ============================================================================

/// Persistent preferences, stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Absolute path to onnxruntime.dll / libonnxruntime.so. Empty = unset.
    pub onnx_runtime_path: String,
    /// Absolute path to the salient-object `.onnx` model. Empty = unset.
    pub segmentation_model_path: String,
    pub default_pen_color: Rgb<u8>,
    pub default_brush_size: u32,
    pub jpeg_quality: u8,
    /// Flood tolerance for the model-free background key.
    pub border_tolerance: f32,
    /// Where the camera tool drops downloads. Empty = unset.
    pub ingest_dir: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            onnx_runtime_path: String::new(),
            segmentation_model_path: String::new(),
            default_pen_color: Rgb([0, 0, 0]),
            default_brush_size: MIN_BRUSH_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            border_tolerance: DEFAULT_BORDER_TOLERANCE,
            ingest_dir: String::new(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/epanouident/epanouident_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\EpanouiDent\epanouident_settings.cfg
    /// On macOS:   ~/Library/Application Support/EpanouiDent/epanouident_settings.cfg
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("EpanouiDent");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("epanouident_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("EpanouiDent");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("epanouident_settings.cfg"));
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?
                .join("epanouident");
            let _ = std::fs::create_dir_all(&config_dir);
            Some(config_dir.join("epanouident_settings.cfg"))
        }
    }

    /// Serialize a color as "r,g,b"
    fn color_to_str(c: Rgb<u8>) -> String {
        format!("{},{},{}", c[0], c[1], c[2])
    }

    /// Parse a color from "r,g,b"
    fn str_to_color(s: &str) -> Option<Rgb<u8>> {
        let mut parts = s.split(',');
        let r = parts.next()?.trim().parse::<u8>().ok()?;
        let g = parts.next()?.trim().parse::<u8>().ok()?;
        let b = parts.next()?.trim().parse::<u8>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Rgb([r, g, b]))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "onnx_runtime_path={}\n\
             segmentation_model_path={}\n\
             default_pen_color={}\n\
             default_brush_size={}\n\
             jpeg_quality={}\n\
             border_tolerance={}\n\
             ingest_dir={}\n",
            self.onnx_runtime_path,
            self.segmentation_model_path,
            Self::color_to_str(self.default_pen_color),
            self.default_brush_size,
            self.jpeg_quality,
            self.border_tolerance,
            self.ingest_dir,
        )
    }

    /// Parse settings text. Unknown keys and malformed values keep defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "onnx_runtime_path" => s.onnx_runtime_path = val.to_string(),
                "segmentation_model_path" => s.segmentation_model_path = val.to_string(),
                "default_pen_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.default_pen_color = c;
                    }
                }
                "default_brush_size" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.default_brush_size = v.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
                    }
                }
                "jpeg_quality" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.jpeg_quality = v.clamp(1, 100);
                    }
                }
                "border_tolerance" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.border_tolerance = v.clamp(0.0, 100.0);
                    }
                }
                "ingest_dir" => s.ingest_dir = val.to_string(),
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_str(&content)
    }

    /// Both ONNX paths configured.
    pub fn has_onnx(&self) -> bool {
        !self.onnx_runtime_path.is_empty() && !self.segmentation_model_path.is_empty()
    }
}
