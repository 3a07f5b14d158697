use geo::BoundingRect;
use geo_types::{MultiPoint, Rect};

use crate::error::{PipelineError, PipelineResult};
use crate::geojson_features::GeoFeature;
use crate::models::{PlanarFrame, PlanarPoint};
use crate::projection::Projector;

/// A feature's outer ring after projection, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRing {
    pub frame: PlanarFrame,
    pub points: Vec<PlanarPoint>,
}

/// Project every vertex of every feature. The first out-of-range coordinate aborts the
/// whole dataset, since malformed data rarely affects a single feature.
pub fn project_features(features: &[GeoFeature], projector: &dyn Projector) -> PipelineResult<Vec<ProjectedRing>> {
    features
        .iter()
        .map(|feature| {
            let points = feature
                .ring
                .iter()
                .map(|coord| projector.project(coord.y, coord.x))
                .collect::<PipelineResult<Vec<_>>>()?;

            Ok(ProjectedRing {
                frame: projector.frame(),
                points,
            })
        })
        .collect()
}

/// Dataset-wide origin and scale. Built once per load and shared by every feature of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationContext {
    origin: PlanarPoint,
    scale: f64,
    frame: PlanarFrame,
    bounds: Rect<f64>,
}

impl NormalizationContext {
    pub fn origin(&self) -> PlanarPoint {
        self.origin
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn frame(&self) -> PlanarFrame {
        self.frame
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn normalize(&self, point: PlanarPoint) -> PlanarPoint {
        (point - self.origin) * self.scale
    }

    pub fn normalize_ring(&self, ring: &ProjectedRing) -> PipelineResult<Vec<PlanarPoint>> {
        if ring.frame != self.frame {
            return Err(PipelineError::FrameMismatch {
                context: self.frame,
                points: ring.frame,
            });
        }
        Ok(ring.points.iter().map(|p| self.normalize(*p)).collect())
    }

    /// Width and height of the dataset once normalized.
    pub fn normalized_extent(&self) -> (f64, f64) {
        (self.bounds.width() * self.scale, self.bounds.height() * self.scale)
    }
}

/// Compute the origin as the center of the bounding box over all vertices of all rings.
/// The scale is the configured constant, so footprints keep their relative proportions.
pub fn compute_context(rings: &[ProjectedRing], scale: f64) -> PipelineResult<NormalizationContext> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PipelineError::Config(format!("scale factor must be positive, got {}", scale)));
    }

    let frame = match rings.first() {
        Some(ring) => ring.frame,
        None => return Err(PipelineError::EmptyDataset),
    };

    if let Some(other) = rings.iter().find(|r| r.frame != frame) {
        return Err(PipelineError::FrameMismatch {
            context: frame,
            points: other.frame,
        });
    }

    let all_points: MultiPoint<f64> = rings.iter().flat_map(|r| r.points.iter().copied()).collect();
    let bounds = all_points.bounding_rect().ok_or(PipelineError::EmptyDataset)?;

    Ok(NormalizationContext {
        origin: bounds.center(),
        scale,
        frame,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ScaleOnlyProjector;
    use geo_types::{coord, Coord};

    fn ring(points: &[(f64, f64)]) -> ProjectedRing {
        ProjectedRing {
            frame: PlanarFrame::ProjectedGeographic,
            points: points.iter().map(|&(x, y)| Coord { x, y }).collect(),
        }
    }

    fn fixture() -> Vec<ProjectedRing> {
        vec![
            ring(&[(2.0, 3.0), (4.0, 3.0), (4.0, 5.0), (2.0, 3.0)]),
            ring(&[(-6.0, 1.0), (-5.0, 1.0), (-5.0, 2.0)]),
            ring(&[(10.0, -4.0), (12.0, -4.0), (12.0, 9.0), (10.0, 9.0)]),
        ]
    }

    #[test]
    fn origin_is_bounding_box_midpoint() {
        // x spans -6..12, y spans -4..9
        let context = compute_context(&fixture(), 0.5).unwrap();
        assert_eq!(context.origin(), coord! { x: 3.0, y: 2.5 });
        assert_eq!(context.scale(), 0.5);
        assert_eq!(context.normalized_extent(), (9.0, 6.5));
    }

    #[test]
    fn origin_normalizes_to_zero() {
        let context = compute_context(&fixture(), 0.2).unwrap();
        let normalized = context.normalize(context.origin());
        assert_eq!(normalized, coord! { x: 0.0, y: 0.0 });
    }

    #[test]
    fn normalize_translates_then_scales() {
        let context = compute_context(&fixture(), 0.5).unwrap();
        let normalized = context.normalize(coord! { x: 13.0, y: 4.5 });
        assert_eq!(normalized, coord! { x: 5.0, y: 1.0 });
    }

    #[test]
    fn single_point_dataset_is_valid() {
        let context = compute_context(&[ring(&[(7.0, -2.0)])], 1.0).unwrap();
        assert_eq!(context.origin(), coord! { x: 7.0, y: -2.0 });
        assert_eq!(context.normalized_extent(), (0.0, 0.0));
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert_eq!(compute_context(&[], 1.0), Err(PipelineError::EmptyDataset));
        assert_eq!(compute_context(&[ring(&[])], 1.0), Err(PipelineError::EmptyDataset));
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(matches!(compute_context(&fixture(), 0.0), Err(PipelineError::Config(_))));
    }

    #[test]
    fn frames_never_mix() {
        let mut rings = fixture();
        rings[1].frame = PlanarFrame::MapPixel;
        assert!(matches!(
            compute_context(&rings, 1.0),
            Err(PipelineError::FrameMismatch { .. })
        ));

        let context = compute_context(&fixture(), 1.0).unwrap();
        let pixel_ring = ProjectedRing {
            frame: PlanarFrame::MapPixel,
            points: vec![coord! { x: 0.0, y: 0.0 }],
        };
        assert!(context.normalize_ring(&pixel_ring).is_err());
    }

    #[test]
    fn invalid_coordinate_aborts_projection() {
        let features = vec![
            GeoFeature::new("ok", vec![coord! { x: 10.0, y: 10.0 }]),
            GeoFeature::new("bad", vec![coord! { x: 10.0, y: 95.0 }]),
        ];
        let err = project_features(&features, &ScaleOnlyProjector::default()).unwrap_err();
        assert_eq!(err, PipelineError::InvalidCoordinate { lat: 95.0, lng: 10.0 });
    }
}
