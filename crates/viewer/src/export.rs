//! Frame capture (PNG) and measurement report (JSON) export.

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use glam::Vec3;
use image::{ImageFormat, RgbaImage};
use serde::Serialize;

use crate::asset::{FormatTag, SceneAsset};
use crate::error::ExportError;
use crate::state::{Annotation, Measurement, Units};
use crate::viewport::camera::CameraState;

/// Loaded model summary
#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub source_url: String,
    pub tag: FormatTag,
    pub vertices: usize,
    pub faces: usize,
    pub scale: f32,
    /// Bounds in the file's own coordinates
    pub original_min: Vec3,
    pub original_max: Vec3,
}

impl AssetSummary {
    pub fn new(asset: &SceneAsset) -> Self {
        Self {
            source_url: asset.source_url.clone(),
            tag: asset.tag,
            vertices: asset.vertex_count(),
            faces: asset.face_count(),
            scale: asset.scale,
            original_min: asset.original_bounds.min,
            original_max: asset.original_bounds.max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    #[serde(flatten)]
    pub measurement: Measurement,
    /// Points mapped back into the file's coordinates
    pub original_points: Vec<Vec3>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub generated_at: DateTime<Utc>,
    pub asset: Option<AssetSummary>,
    pub units: Units,
    pub camera: CameraState,
    pub measurements: Vec<MeasurementRecord>,
    pub annotations: Vec<Annotation>,
}

impl SceneReport {
    pub fn new(
        asset: Option<&SceneAsset>,
        units: Units,
        camera: CameraState,
        measurements: &[Measurement],
        annotations: &[Annotation],
    ) -> Self {
        let measurements = measurements
            .iter()
            .map(|m| MeasurementRecord {
                original_points: match asset {
                    Some(a) => m.points.iter().map(|p| a.to_original(*p)).collect(),
                    None => m.points.clone(),
                },
                measurement: m.clone(),
            })
            .collect();
        Self {
            generated_at: Utc::now(),
            asset: asset.map(AssetSummary::new),
            units,
            camera,
            measurements,
            annotations: annotations.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Encode tightly packed RGBA8 pixels as PNG
pub fn encode_png(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, ExportError> {
    let image = RgbaImage::from_raw(width as u32, height as u32, rgba.to_vec())
        .ok_or(ExportError::FrameSize(width, height))?;
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn save_png(path: &Path, width: usize, height: usize, rgba: &[u8]) -> Result<(), ExportError> {
    let bytes = encode_png(width, height, rgba)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MeasurementKind;
    use uuid::Uuid;

    #[test]
    fn test_encode_png_signature() {
        let pixels = vec![255u8; 4 * 3 * 2];
        let png = encode_png(3, 2, &pixels).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_encode_png_size_mismatch() {
        let err = encode_png(4, 4, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, ExportError::FrameSize(4, 4)));
    }

    #[test]
    fn test_report_json() {
        let m = Measurement {
            id: Uuid::new_v4(),
            kind: MeasurementKind::Distance,
            points: vec![Vec3::ZERO, Vec3::X],
            world_value: 1.0,
            value: 1.0,
            unit: "mm".into(),
            label: "1.00 mm".into(),
            color: [1.0, 0.0, 0.0],
            visible: true,
        };
        let camera = crate::viewport::camera::CameraController::default().state();
        let report = SceneReport::new(None, Units::Millimeters, camera, &[m], &[]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["measurements"][0]["kind"], "distance");
        assert_eq!(json["measurements"][0]["label"], "1.00 mm");
        assert_eq!(json["units"], "millimeters");
        assert!(json["asset"].is_null());
    }
}
