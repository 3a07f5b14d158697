use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

// Constants for the building and camera defaults
pub const METERS_PER_LEVEL: f64 = 3.0;
pub const DEFAULT_LEVELS: u32 = 3;
pub const DEFAULT_BUILDING_COLOR: &str = "#00ffff";
pub const FIXED_SCALE_FACTOR: f64 = 1.0 / 5.0;
pub const MAP_SCALE_FACTOR: f64 = 1.0 / 50000.0;
pub const MAP_CAMERA_K: f64 = 1000.0;
pub const MAP_CAMERA_ALTITUDE: f64 = 500.0;
pub const GROUND_PLANE_SIZE: f64 = 5000.0;
pub const SOURCE_CRS: &str = "EPSG:4326";
pub const TARGET_CRS: &str = "EPSG:3857";

/// Where footprint vertices get their planar coordinates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionMode {
    /// A process-wide projector picked by `FixedProjection`.
    Fixed,
    /// The map widget's own pixel conversion at its current zoom.
    MapLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FixedProjection {
    WebMercator,
    /// Degree coordinates passed through unchanged; the normalizer's scale does the rest.
    ScaleOnly,
}

/// Configuration for one pipeline. The plain, shadowed and map-linked scenes are all
/// expressed through this struct rather than separate code paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub projection_mode: ProjectionMode,
    pub fixed_projection: FixedProjection,
    pub shadows_enabled: bool,
    pub ground_plane_enabled: bool,
    pub meters_per_level: f64,
    pub default_levels: u32,
    pub building_color: String,
    pub fixed_scale_factor: f64,
    pub map_scale_factor: f64,
    pub map_camera_k: f64,
    pub map_camera_altitude: f64,
    pub fixed_camera_position: [f64; 3],
    pub ground_plane_size: f64,
    pub source_crs: String,
    pub target_crs: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            projection_mode: ProjectionMode::Fixed,
            fixed_projection: FixedProjection::ScaleOnly,
            shadows_enabled: false,
            ground_plane_enabled: true,
            meters_per_level: METERS_PER_LEVEL,
            default_levels: DEFAULT_LEVELS,
            building_color: DEFAULT_BUILDING_COLOR.to_string(),
            fixed_scale_factor: FIXED_SCALE_FACTOR,
            map_scale_factor: MAP_SCALE_FACTOR,
            map_camera_k: MAP_CAMERA_K,
            map_camera_altitude: MAP_CAMERA_ALTITUDE,
            fixed_camera_position: [0.0, 0.0, 50.0],
            ground_plane_size: GROUND_PLANE_SIZE,
            source_crs: SOURCE_CRS.to_string(),
            target_crs: TARGET_CRS.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Web-Mercator scene with shadows, matching the lit variant of the viewer.
    pub fn shadowed() -> Self {
        Self {
            fixed_projection: FixedProjection::WebMercator,
            shadows_enabled: true,
            building_color: "#808080".to_string(),
            fixed_scale_factor: 1.0,
            fixed_camera_position: [70.0, 20.0, 50.0],
            ..Self::default()
        }
    }

    pub fn map_linked() -> Self {
        Self {
            projection_mode: ProjectionMode::MapLinked,
            ..Self::default()
        }
    }

    /// Scale applied by the normalizer for the active projection mode.
    pub fn scale_factor(&self) -> f64 {
        match self.projection_mode {
            ProjectionMode::Fixed => self.fixed_scale_factor,
            ProjectionMode::MapLinked => self.map_scale_factor,
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        for (name, value) in [
            ("fixedScaleFactor", self.fixed_scale_factor),
            ("mapScaleFactor", self.map_scale_factor),
            ("mapCameraK", self.map_camera_k),
            ("groundPlaneSize", self.ground_plane_size),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::Config(format!("{} must be a positive number, got {}", name, value)));
            }
        }

        if !self.meters_per_level.is_finite() || self.meters_per_level < 0.0 {
            return Err(PipelineError::Config(format!(
                "metersPerLevel must not be negative, got {}",
                self.meters_per_level
            )));
        }

        if self.source_crs != SOURCE_CRS {
            return Err(PipelineError::Config(format!("unsupported source CRS {}", self.source_crs)));
        }
        if self.target_crs != TARGET_CRS {
            return Err(PipelineError::Config(format!("unsupported target CRS {}", self.target_crs)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = PipelineConfig::from_json(r#"{"projectionMode": "mapLinked", "shadowsEnabled": true}"#)
            .expect("valid config");

        assert_eq!(config.projection_mode, ProjectionMode::MapLinked);
        assert!(config.shadows_enabled);
        assert!(config.ground_plane_enabled);
        assert_eq!(config.meters_per_level, METERS_PER_LEVEL);
        assert_eq!(config.scale_factor(), MAP_SCALE_FACTOR);
    }

    #[test]
    fn rejects_non_positive_scale() {
        let err = PipelineConfig::from_json(r#"{"fixedScaleFactor": 0}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn rejects_unknown_crs() {
        let config = PipelineConfig {
            target_crs: "EPSG:27700".to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn presets_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineConfig::shadowed().validate().is_ok());
        assert!(PipelineConfig::map_linked().validate().is_ok());
    }
}
