use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

pub mod console;
pub mod config;
pub mod error;
pub mod models;
pub mod projection;
pub mod geojson_features;
pub mod normalize;
// Extrusion kernel
#[path = "../geometry_functions/extrude.rs"]
pub mod extrude;
pub mod height_policy;
pub mod scene;
pub mod scene_buffer;
pub mod map_sync;
pub mod render_loop;


use config::PipelineConfig;
use error::{PipelineError, PipelineResult};
use map_sync::{MapCameraSynchronizer, MapMoveEvent};
use models::{Camera, LatLng};
use scene::{LoadOutcome, LoadReport, PipelineContext};
use scene_buffer::{RecordedScene, SceneBuffer};

#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[wasm_bindgen]
extern "C" {
    // Provided by the host page; resolves to the response body
    #[wasm_bindgen(js_namespace = wasmJsHelpers, catch)]
    pub fn fetch(url: &str) -> Result<js_sys::Promise, JsValue>;
}

#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::console::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => ($crate::console::warn(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_error {
    ($($t:tt)*) => ($crate::console::error(&format!($($t)*)))
}

use std::sync::Once;
static INIT: Once = Once::new();

#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("Footprint pipeline initialized");
    });
}

// Undefined or null means defaults; anything else must deserialize and validate
fn config_from_js(value: JsValue) -> Result<PipelineConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(PipelineConfig::default());
    }

    let config: PipelineConfig = serde_wasm_bindgen::from_value(value)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Scene as handed back to JavaScript: recorded drawables, the load report and the
/// initial camera.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneOutput {
    pub scene: RecordedScene,
    pub report: LoadReport,
    pub camera: Camera,
    pub error: Option<String>,
}

impl SceneOutput {
    fn from_context(ctx: PipelineContext<SceneBuffer>, outcome: LoadOutcome) -> Self {
        let (report, error) = match outcome {
            LoadOutcome::Loaded(report) => (report, None),
            LoadOutcome::Failed(err) => (LoadReport::default(), Some(err.to_string())),
        };

        SceneOutput {
            scene: ctx.scene().clone(),
            report,
            camera: ctx.camera().clone(),
            error,
        }
    }
}

/// Run the fixed-mode pipeline over a GeoJSON string. Load failures are reported in
/// `error`; the returned scene then holds only the ground plane.
pub fn build_scene(geojson: &str, config: PipelineConfig) -> PipelineResult<SceneOutput> {
    let mut ctx = PipelineContext::new(SceneBuffer::default(), config, None)?;
    let outcome = match ctx.load_geojson_str(geojson) {
        Ok(report) => LoadOutcome::Loaded(report),
        Err(err) => {
            console_error!("Error loading GeoJSON: {}", err);
            LoadOutcome::Failed(err)
        }
    };
    Ok(SceneOutput::from_context(ctx, outcome))
}

// Await the JS fetch helper and decode the body as UTF-8 text
async fn fetch_text(url: &str) -> PipelineResult<String> {
    let promise = fetch(url).map_err(|e| PipelineError::LoadFailure(format!("{:?}", e)))?;
    let body = JsFuture::from(promise)
        .await
        .map_err(|e| PipelineError::LoadFailure(format!("{:?}", e)))?;

    if let Some(text) = body.as_string() {
        return Ok(text);
    }
    let bytes = js_sys::Uint8Array::new(&body).to_vec();
    String::from_utf8(bytes).map_err(|e| PipelineError::LoadFailure(e.to_string()))
}

#[wasm_bindgen]
pub fn project_coordinate(lat: f64, lng: f64, config: JsValue) -> Result<JsValue, JsValue> {
    let config = config_from_js(config)?;
    let projector = projection::projector_for(&config, None)?;
    let point = projector.project(lat, lng)?;
    Ok(to_value(&point)?)
}

#[wasm_bindgen]
pub fn build_scene_geometry(geojson: &str, config: JsValue) -> Result<JsValue, JsValue> {
    let config = config_from_js(config)?;
    let output = build_scene(geojson, config)?;
    Ok(to_value(&output)?)
}

#[wasm_bindgen]
pub async fn fetch_and_build_scene(url: String, config: JsValue) -> Result<JsValue, JsValue> {
    let config = config_from_js(config)?;
    let mut ctx = PipelineContext::new(SceneBuffer::default(), config, None)?;

    console_log!("Fetching GeoJSON from {}", url);
    let outcome = ctx.load_dataset(fetch_text(&url)).await;
    Ok(to_value(&SceneOutput::from_context(ctx, outcome))?)
}

/// Camera follower for hosts that render with their own engine: call `on_move` from
/// the map's move handler and apply the returned state to the 3D camera.
#[wasm_bindgen]
pub struct MapCameraSync {
    sync: MapCameraSynchronizer,
    camera: Camera,
}

#[wasm_bindgen]
impl MapCameraSync {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<MapCameraSync, JsValue> {
        let config = config_from_js(config)?;
        let mut camera = Camera::default();
        camera.position.z = config.map_camera_altitude;

        Ok(MapCameraSync {
            sync: MapCameraSynchronizer::from_config(&config),
            camera,
        })
    }

    pub fn on_move(&mut self, lat: f64, lng: f64, zoom: f64) -> Result<JsValue, JsValue> {
        let event = MapMoveEvent {
            center: LatLng::new(lat, lng),
            zoom,
        };
        let state = self.sync.handle_move(event, &mut self.camera)?;
        Ok(to_value(&state)?)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width, height);
    }

    pub fn camera(&self) -> Result<JsValue, JsValue> {
        Ok(to_value(&self.camera)?)
    }

    #[wasm_bindgen(getter)]
    pub fn updates(&self) -> f64 {
        self.sync.updates() as f64
    }
}
