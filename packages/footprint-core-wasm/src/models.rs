// Shared data structures used across the pipeline
use geo_types::Coord;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 2D Cartesian coordinate, either projected-geographic or map-pixel.
pub type PlanarPoint = Coord<f64>;

/// The frame a `PlanarPoint` was produced in. Frames never mix within one normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanarFrame {
    ProjectedGeographic,
    MapPixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const GREY: Color = Color { r: 128.0 / 255.0, g: 128.0 / 255.0, b: 128.0 / 255.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    /// Used when a color string cannot be parsed.
    pub const FALLBACK: Color = Color { r: 0.7, g: 0.7, b: 0.7 };

    // Parse a color string in hex format (#RRGGBB), falling back to grey
    pub fn from_hex(color_str: &str) -> Color {
        let parsed = color_str
            .strip_prefix('#')
            .filter(|hex| hex.len() >= 6)
            .and_then(|hex| {
                let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                Some((r, g, b))
            });

        match parsed {
            Some((r, g, b)) => Color {
                r: r as f32 / 255.0,
                g: g as f32 / 255.0,
                b: b as f32 / 255.0,
            },
            None => Color::FALLBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaterialKind {
    /// Unlit, flat color.
    Basic,
    /// Lit by the scene lights.
    Standard,
    /// Invisible except where shadows fall on it.
    ShadowOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub kind: MaterialKind,
    pub color: Color,
    pub opacity: f32,
}

impl Material {
    pub fn basic(color: Color) -> Self {
        Self { kind: MaterialKind::Basic, color, opacity: 1.0 }
    }

    pub fn standard(color: Color) -> Self {
        Self { kind: MaterialKind::Standard, color, opacity: 1.0 }
    }

    pub fn shadow_only(opacity: f32) -> Self {
        Self { kind: MaterialKind::ShadowOnly, color: Color { r: 0.0, g: 0.0, b: 0.0 }, opacity }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowFlags {
    pub cast: bool,
    pub receive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Light {
    Directional {
        direction: Vector3<f64>,
        color: Color,
        intensity: f32,
    },
    Ambient {
        color: Color,
        intensity: f32,
    },
}

/// Perspective camera looking at a fixed target, with +Z as the extrusion axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Point3<f64>,
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
    pub fov_degrees: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 50.0),
            target: Point3::origin(),
            up: Vector3::y(),
            fov_degrees: 75.0,
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn look_at(&mut self, target: Point3<f64>) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f64 / height as f64;
        }
    }

    /// Unit vector from the camera towards its target.
    pub fn view_direction(&self) -> Vector3<f64> {
        let dir = self.target - self.position;
        let len = dir.norm();
        if len > 0.0 {
            dir / len
        } else {
            -Vector3::z()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        let cyan = Color::from_hex("#00ffff");
        assert_eq!(cyan, Color { r: 0.0, g: 1.0, b: 1.0 });

        let fallback = Color::from_hex("cyan");
        assert_eq!(fallback, Color::FALLBACK);
        assert_eq!(Color::from_hex("#12"), Color::FALLBACK);
    }

    #[test]
    fn resize_updates_aspect_only_for_real_sizes() {
        let mut camera = Camera::default();
        camera.set_aspect(1920, 1080);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < 1e-12);

        camera.set_aspect(0, 1080);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < 1e-12);
    }

    #[test]
    fn default_camera_looks_down_the_extrusion_axis() {
        let camera = Camera::default();
        let dir = camera.view_direction();
        assert!((dir.z + 1.0).abs() < 1e-12);
    }
}
