use std::f64::consts::PI;
use std::rc::Rc;

use geo_types::Coord;

use crate::config::{FixedProjection, PipelineConfig, ProjectionMode};
use crate::error::{PipelineError, PipelineResult};
use crate::map_sync::MapView;
use crate::models::{LatLng, PlanarFrame, PlanarPoint};

// WGS84 semi-major axis used by EPSG:3857
const EARTH_RADIUS: f64 = 6_378_137.0;
// Web Mercator is undefined at the poles; latitudes beyond this map to the square's edge
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Maps geographic coordinates to a planar frame. Implementations are pure and
/// deterministic, so downstream code never needs to know which one is active.
pub trait Projector {
    fn frame(&self) -> PlanarFrame;

    fn project(&self, lat: f64, lng: f64) -> PipelineResult<PlanarPoint>;
}

// Reject coordinates outside the geographic domain instead of clamping them
pub fn validate_lat_lng(lat: f64, lng: f64) -> PipelineResult<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(PipelineError::InvalidCoordinate { lat, lng });
    }
    Ok(())
}

/// EPSG:4326 to EPSG:3857, in meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorProjector;

impl Projector for WebMercatorProjector {
    fn frame(&self) -> PlanarFrame {
        PlanarFrame::ProjectedGeographic
    }

    fn project(&self, lat: f64, lng: f64) -> PipelineResult<PlanarPoint> {
        validate_lat_lng(lat, lng)?;

        let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        let x = EARTH_RADIUS * lng.to_radians();
        let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();

        Ok(Coord { x, y })
    }
}

/// Degraded projection used without a map widget: degrees times a constant.
#[derive(Debug, Clone, Copy)]
pub struct ScaleOnlyProjector {
    pub units_per_degree: f64,
}

impl Default for ScaleOnlyProjector {
    fn default() -> Self {
        Self { units_per_degree: 1.0 }
    }
}

impl Projector for ScaleOnlyProjector {
    fn frame(&self) -> PlanarFrame {
        PlanarFrame::ProjectedGeographic
    }

    fn project(&self, lat: f64, lng: f64) -> PipelineResult<PlanarPoint> {
        validate_lat_lng(lat, lng)?;

        Ok(Coord {
            x: lng * self.units_per_degree,
            y: lat * self.units_per_degree,
        })
    }
}

/// Asks the map widget for layer pixels, which already account for its current zoom.
pub struct MapPixelProjector {
    map: Rc<dyn MapView>,
}

impl MapPixelProjector {
    pub fn new(map: Rc<dyn MapView>) -> Self {
        Self { map }
    }
}

impl Projector for MapPixelProjector {
    fn frame(&self) -> PlanarFrame {
        PlanarFrame::MapPixel
    }

    fn project(&self, lat: f64, lng: f64) -> PipelineResult<PlanarPoint> {
        validate_lat_lng(lat, lng)?;
        Ok(self.map.lat_lng_to_layer_point(LatLng::new(lat, lng)))
    }
}

/// Pick the projector for the configured mode. Map-linked mode needs a map.
pub fn projector_for(
    config: &PipelineConfig,
    map: Option<Rc<dyn MapView>>,
) -> PipelineResult<Box<dyn Projector>> {
    match config.projection_mode {
        ProjectionMode::Fixed => match config.fixed_projection {
            FixedProjection::WebMercator => Ok(Box::new(WebMercatorProjector)),
            FixedProjection::ScaleOnly => Ok(Box::new(ScaleOnlyProjector::default())),
        },
        ProjectionMode::MapLinked => map
            .map(|map| Box::new(MapPixelProjector::new(map)) as Box<dyn Projector>)
            .ok_or_else(|| PipelineError::Config("map-linked projection requires a map view".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_sync::MirroredMapView;

    #[test]
    fn web_mercator_is_deterministic() {
        let projector = WebMercatorProjector;
        let a = projector.project(17.49319309, 78.56584627).unwrap();
        let b = projector.project(17.49319309, 78.56584627).unwrap();
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
    }

    #[test]
    fn web_mercator_known_values() {
        let projector = WebMercatorProjector;

        let origin = projector.project(0.0, 0.0).unwrap();
        assert!(origin.x.abs() < 1e-6);
        assert!(origin.y.abs() < 1e-6);

        // The antimeridian sits half the equator away
        let east = projector.project(0.0, 180.0).unwrap();
        assert!((east.x - 20_037_508.342_789_244).abs() < 1e-6);

        let north = projector.project(MAX_MERCATOR_LAT, 0.0).unwrap();
        assert!((north.y - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn poles_stay_finite() {
        let north = WebMercatorProjector.project(90.0, 0.0).unwrap();
        assert!(north.y.is_finite());
    }

    #[test]
    fn out_of_range_input_is_rejected() {
        for (lat, lng) in [(90.5, 0.0), (-91.0, 0.0), (0.0, 180.01), (0.0, -200.0), (f64::NAN, 0.0)] {
            let err = WebMercatorProjector.project(lat, lng).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidCoordinate { .. }));

            let err = ScaleOnlyProjector::default().project(lat, lng).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidCoordinate { .. }));
        }
    }

    #[test]
    fn scale_only_keeps_lng_lat_order() {
        let projector = ScaleOnlyProjector { units_per_degree: 2.0 };
        let point = projector.project(10.0, 20.0).unwrap();
        assert_eq!(point, Coord { x: 40.0, y: 20.0 });
    }

    #[test]
    fn map_linked_mode_requires_a_map() {
        let config = PipelineConfig::map_linked();
        assert!(projector_for(&config, None).is_err());

        let map: Rc<dyn MapView> = Rc::new(MirroredMapView::new(LatLng::new(0.0, 0.0), 18.0, (800, 600)));
        let projector = projector_for(&config, Some(map)).unwrap();
        assert_eq!(projector.frame(), PlanarFrame::MapPixel);
    }
}
