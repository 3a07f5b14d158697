use std::cell::Cell;
use std::f64::consts::PI;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Camera, LatLng, PlanarPoint};
use crate::projection::validate_lat_lng;

// Side of one tile in map pixels at zoom 0
const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// The 2D map widget as seen by the pipeline.
pub trait MapView {
    fn center(&self) -> LatLng;

    fn zoom(&self) -> f64;

    /// Pixel position of a coordinate relative to the map's layer origin at the current zoom.
    fn lat_lng_to_layer_point(&self, lat_lng: LatLng) -> PlanarPoint;
}

// Spherical Mercator into world pixels at the given zoom
fn world_pixel(lat_lng: LatLng, zoom: f64) -> PlanarPoint {
    let size = TILE_SIZE * 2f64.powf(zoom);
    let lat = lat_lng.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let merc_y = (PI / 4.0 + lat / 2.0).tan().ln();

    PlanarPoint {
        x: size * (0.5 + lat_lng.lng / 360.0),
        y: size * (0.5 - merc_y / (2.0 * PI)),
    }
}

/// In-process mirror of a slippy map's view state. The JS bindings keep it in step with
/// the real widget; tests and native hosts drive it directly.
#[derive(Debug)]
pub struct MirroredMapView {
    center: Cell<LatLng>,
    zoom: Cell<f64>,
    viewport: Cell<(u32, u32)>,
}

impl MirroredMapView {
    pub fn new(center: LatLng, zoom: f64, viewport: (u32, u32)) -> Self {
        Self {
            center: Cell::new(center),
            zoom: Cell::new(zoom),
            viewport: Cell::new(viewport),
        }
    }

    pub fn set_view(&self, center: LatLng, zoom: f64) {
        self.center.set(center);
        self.zoom.set(zoom);
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        self.viewport.set((width, height));
    }

    // Top-left corner of the layer in world pixels, rounded like the widget does
    fn pixel_origin(&self) -> PlanarPoint {
        let (w, h) = self.viewport.get();
        let center = world_pixel(self.center.get(), self.zoom.get());
        PlanarPoint {
            x: (center.x - w as f64 / 2.0).round(),
            y: (center.y - h as f64 / 2.0).round(),
        }
    }
}

impl MapView for MirroredMapView {
    fn center(&self) -> LatLng {
        self.center.get()
    }

    fn zoom(&self) -> f64 {
        self.zoom.get()
    }

    fn lat_lng_to_layer_point(&self, lat_lng: LatLng) -> PlanarPoint {
        let p = world_pixel(lat_lng, self.zoom.get());
        let origin = self.pixel_origin();
        PlanarPoint {
            x: p.x.round() - origin.x,
            y: p.y.round() - origin.y,
        }
    }
}

/// A pan or zoom of the map, as reported by its move callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapMoveEvent {
    pub center: LatLng,
    pub zoom: f64,
}

pub type MapMoveSender = UnboundedSender<MapMoveEvent>;
pub type MapMoveReceiver = UnboundedReceiver<MapMoveEvent>;

/// Unbounded so the map callback never blocks or drops an event.
pub fn map_move_channel() -> (MapMoveSender, MapMoveReceiver) {
    mpsc::unbounded()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraState {
    pub position: Point3<f64>,
    pub scale: f64,
    pub target: Point3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Tracking,
}

/// Scale `k / 2^zoom`; the camera sits above the map center with the map's y axis
/// pointing down, looking at the scene origin.
pub fn camera_state_for(center: LatLng, zoom: f64, k: f64, altitude: f64) -> CameraState {
    let scale = k / 2f64.powf(zoom);
    CameraState {
        position: Point3::new(center.lng * scale, -center.lat * scale, altitude),
        scale,
        target: Point3::origin(),
    }
}

/// Keeps the 3D camera in step with the map. Every event produces exactly one update.
#[derive(Debug, Clone)]
pub struct MapCameraSynchronizer {
    k: f64,
    altitude: f64,
    state: SyncState,
    updates: u64,
    last: Option<CameraState>,
}

impl MapCameraSynchronizer {
    pub fn new(k: f64, altitude: f64) -> Self {
        Self {
            k,
            altitude,
            state: SyncState::Idle,
            updates: 0,
            last: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.map_camera_k, config.map_camera_altitude)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn last_state(&self) -> Option<CameraState> {
        self.last
    }

    /// Recompute the camera state for one movement event and apply it immediately.
    pub fn handle_move(&mut self, event: MapMoveEvent, camera: &mut Camera) -> PipelineResult<CameraState> {
        if !event.zoom.is_finite() {
            return Err(PipelineError::InvalidZoom(event.zoom));
        }
        validate_lat_lng(event.center.lat, event.center.lng)?;

        self.state = SyncState::Tracking;
        let state = camera_state_for(event.center, event.zoom, self.k, self.altitude);
        camera.position = state.position;
        camera.look_at(state.target);
        self.updates += 1;
        self.last = Some(state);
        self.state = SyncState::Idle;

        Ok(state)
    }

    /// Sync from the map's current view without waiting for an event.
    pub fn from_map(&mut self, map: &dyn MapView, camera: &mut Camera) -> PipelineResult<CameraState> {
        self.handle_move(
            MapMoveEvent {
                center: map.center(),
                zoom: map.zoom(),
            },
            camera,
        )
    }

    /// Wait for the next movement event and apply it. `None` once the map side hung up.
    pub async fn next_update(
        &mut self,
        events: &mut MapMoveReceiver,
        camera: &mut Camera,
    ) -> Option<PipelineResult<CameraState>> {
        let event = events.next().await?;
        Some(self.handle_move(event, camera))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: f64 = 1000.0;

    #[test]
    fn scale_halves_per_zoom_level() {
        let a = camera_state_for(LatLng::new(0.0, 0.0), 10.0, K, 500.0);
        let b = camera_state_for(LatLng::new(0.0, 0.0), 11.0, K, 500.0);
        assert!((a.scale / b.scale - 2.0).abs() < 1e-12);
        assert!((a.scale - K / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn increasing_zoom_strictly_decreases_scale() {
        let mut sync = MapCameraSynchronizer::new(K, 500.0);
        let mut camera = Camera::default();
        let center = LatLng::new(17.493, 78.565);

        let mut previous = f64::INFINITY;
        for zoom in [12.0, 13.0, 14.5, 16.0, 18.0] {
            let state = sync.handle_move(MapMoveEvent { center, zoom }, &mut camera).unwrap();
            assert!(state.scale < previous);
            assert!((state.scale - K / 2f64.powf(zoom)).abs() < 1e-12);
            assert_eq!(camera.position, state.position);
            previous = state.scale;
        }

        assert_eq!(sync.updates(), 5);
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn camera_follows_center() {
        let state = camera_state_for(LatLng::new(10.0, 20.0), 0.0, K, 500.0);
        assert_eq!(state.position, Point3::new(20_000.0, -10_000.0, 500.0));
        assert_eq!(state.target, Point3::origin());
    }

    #[test]
    fn rejects_bad_events_without_moving_the_camera() {
        let mut sync = MapCameraSynchronizer::new(K, 500.0);
        let mut camera = Camera::default();

        let err = sync
            .handle_move(MapMoveEvent { center: LatLng::new(0.0, 0.0), zoom: f64::NAN }, &mut camera)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidZoom(_)));

        let err = sync
            .handle_move(MapMoveEvent { center: LatLng::new(120.0, 0.0), zoom: 3.0 }, &mut camera)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidCoordinate { .. }));

        assert_eq!(camera, Camera::default());
        assert_eq!(sync.updates(), 0);
    }

    #[test]
    fn queued_events_are_all_applied() {
        let (tx, mut rx) = map_move_channel();
        let mut sync = MapCameraSynchronizer::new(K, 500.0);
        let mut camera = Camera::default();

        for zoom in 1..=3 {
            tx.unbounded_send(MapMoveEvent { center: LatLng::new(0.0, 0.0), zoom: zoom as f64 })
                .unwrap();
        }
        drop(tx);

        let applied = futures::executor::block_on(async {
            let mut n = 0;
            while let Some(result) = sync.next_update(&mut rx, &mut camera).await {
                result.unwrap();
                n += 1;
            }
            n
        });

        assert_eq!(applied, 3);
        assert_eq!(sync.last_state().unwrap().scale, K / 8.0);
    }

    #[test]
    fn map_center_lands_in_viewport_middle() {
        let map = MirroredMapView::new(LatLng::new(17.493, 78.565), 16.0, (800, 600));
        let p = map.lat_lng_to_layer_point(map.center());
        assert!((p.x - 400.0).abs() <= 1.0);
        assert!((p.y - 300.0).abs() <= 1.0);
    }

    #[test]
    fn layer_points_double_with_zoom() {
        let map = MirroredMapView::new(LatLng::new(0.0, 0.0), 10.0, (0, 0));
        let east = map.lat_lng_to_layer_point(LatLng::new(0.0, 1.0));

        map.set_view(LatLng::new(0.0, 0.0), 11.0);
        let east_zoomed = map.lat_lng_to_layer_point(LatLng::new(0.0, 1.0));

        assert!((east_zoomed.x - 2.0 * east.x).abs() <= 1.0);
        // North is up on the map, so y shrinks going north
        assert!(map.lat_lng_to_layer_point(LatLng::new(1.0, 0.0)).y < 0.0);
    }
}
