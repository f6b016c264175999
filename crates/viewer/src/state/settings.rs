//! Viewer settings

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the backend base URL
pub const SERVER_URL_ENV: &str = "RECON_SERVER_URL";

/// Unit system for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    #[serde(alias = "mm")]
    Millimeters,
    #[serde(alias = "cm")]
    Centimeters,
    #[serde(alias = "m")]
    Meters,
    #[serde(alias = "in")]
    Inches,
}

impl Units {
    /// Get the abbreviation for this unit
    pub fn abbrev(&self) -> &'static str {
        match self {
            Units::Millimeters => "mm",
            Units::Centimeters => "cm",
            Units::Meters => "m",
            Units::Inches => "in",
        }
    }

    /// Get the display name for this unit
    pub fn display_name(&self) -> &'static str {
        match self {
            Units::Millimeters => "Millimeters",
            Units::Centimeters => "Centimeters",
            Units::Meters => "Meters",
            Units::Inches => "Inches",
        }
    }

    /// Conversion factor to base units (millimeters)
    pub fn to_mm(&self) -> f64 {
        match self {
            Units::Millimeters => 1.0,
            Units::Centimeters => 10.0,
            Units::Meters => 1000.0,
            Units::Inches => 25.4,
        }
    }

    /// All available units
    pub fn all() -> &'static [Units] {
        &[Units::Millimeters, Units::Centimeters, Units::Meters, Units::Inches]
    }
}

/// Backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// Consecutive transport failures tolerated before a task is failed
    pub retry_budget: u32,
    pub load_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 2000,
            retry_budget: 5,
            load_timeout_secs: 30,
        }
    }
}

impl ServerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs.max(1))
    }
}

/// Asset normalization and scene helpers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Largest dimension of a loaded asset after normalization
    pub reference_size: f32,
    /// Color of points and faces without their own color
    pub default_color: [f32; 3],
    /// Rendered point size in pixels
    pub point_size: f32,
    pub show_grid: bool,
    /// Pick radius for point clouds, as a fraction of the reference size
    pub pick_radius_factor: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            reference_size: 5.0,
            default_color: crate::asset::DEFAULT_COLOR,
            point_size: 2.0,
            show_grid: true,
            pick_radius_factor: 0.01,
        }
    }
}

impl SceneSettings {
    pub fn pick_radius(&self) -> f32 {
        self.pick_radius_factor * self.reference_size
    }
}

/// Camera limits and input sensitivity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub min_distance: f32,
    pub max_distance: f32,
    pub pitch_limit: f32,
    /// Pointer travel (pixels) that turns a press into a drag
    pub drag_threshold: f32,
    /// Radians per pixel of drag
    pub orbit_sensitivity: f32,
    /// Dolly fraction per scroll unit
    pub zoom_sensitivity: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            min_distance: 0.5,
            max_distance: 200.0,
            pitch_limit: 1.5,
            drag_threshold: 4.0,
            orbit_sensitivity: 0.01,
            zoom_sensitivity: 0.002,
        }
    }
}

/// Dimension display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    pub units: Units,
    /// Display units per original model unit
    pub scale_factor: f64,
    /// Number of decimal places for measurement values
    pub precision: usize,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            units: Units::Millimeters,
            scale_factor: 1.0,
            precision: 2,
        }
    }
}

/// Viewport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    /// Background color RGB
    pub background_color: [u8; 3],
    /// Marker radius in world units
    pub marker_size: f32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            background_color: [30, 30, 35],
            marker_size: 0.04,
        }
    }
}

/// All viewer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub server: ServerSettings,
    pub scene: SceneSettings,
    pub camera: CameraSettings,
    pub measurement: MeasurementSettings,
    pub viewport: ViewportSettings,
}

impl ViewerSettings {
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "recon", "recon-viewer")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from file, or return default if not found. The
    /// `RECON_SERVER_URL` environment variable overrides the base URL.
    pub fn load() -> Self {
        let mut settings = Self::config_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|json| Self::from_json(&json))
            .unwrap_or_default();
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                settings.server.base_url = url.trim().to_string();
            }
        }
        settings
    }

    /// Parse settings JSON; missing sections fall back to defaults
    pub fn from_json(json: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(json) {
            Ok(mut settings) => {
                settings.sanitize();
                Some(settings)
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file: {e}");
                None
            }
        }
    }

    /// Repair values a hand-edited file can get wrong: inverted distance
    /// limits, a negative pitch limit, a non-positive reference size.
    pub fn sanitize(&mut self) {
        let defaults = CameraSettings::default();
        let cam = &mut self.camera;
        if !(cam.min_distance.is_finite() && cam.max_distance.is_finite()) {
            cam.min_distance = defaults.min_distance;
            cam.max_distance = defaults.max_distance;
        }
        if cam.min_distance > cam.max_distance {
            std::mem::swap(&mut cam.min_distance, &mut cam.max_distance);
        }
        cam.pitch_limit = if cam.pitch_limit.is_finite() {
            cam.pitch_limit.abs()
        } else {
            defaults.pitch_limit
        };

        let scene = &mut self.scene;
        if !(scene.reference_size.is_finite() && scene.reference_size > 0.0) {
            scene.reference_size = SceneSettings::default().reference_size;
        }
    }

    /// Save settings to file
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(dir) = path.parent() {
            if std::fs::create_dir_all(dir).is_err() {
                return;
            }
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!("Failed to save settings to {}: {e}", path.display());
            }
        }
    }
}
