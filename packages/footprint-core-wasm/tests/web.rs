//! Browser smoke tests for the exported bindings. Run with `wasm-pack test --headless --chrome`.
#![cfg(target_arch = "wasm32")]

use footprint_core_wasm::{build_scene_geometry, project_coordinate, MapCameraSync};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const SQUARE: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "id": "way/1",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[78.5658, 17.4932], [78.5660, 17.4932], [78.5660, 17.4934], [78.5658, 17.4934], [78.5658, 17.4932]]]
        }
    }]
}"#;

#[wasm_bindgen_test]
fn projects_with_default_config() {
    let point = project_coordinate(10.0, 20.0, JsValue::UNDEFINED).unwrap();
    let x = js_sys::Reflect::get(&point, &JsValue::from_str("x")).unwrap();
    assert_eq!(x.as_f64(), Some(20.0));
}

#[wasm_bindgen_test]
fn out_of_range_coordinate_is_an_error() {
    assert!(project_coordinate(95.0, 0.0, JsValue::NULL).is_err());
}

#[wasm_bindgen_test]
fn builds_scene_geometry() {
    let output = build_scene_geometry(SQUARE, JsValue::UNDEFINED).unwrap();
    let scene = js_sys::Reflect::get(&output, &JsValue::from_str("scene")).unwrap();
    let drawables = js_sys::Reflect::get(&scene, &JsValue::from_str("drawables")).unwrap();
    assert_eq!(js_sys::Array::from(&drawables).length(), 2);
}

#[wasm_bindgen_test]
fn camera_sync_counts_moves() {
    let mut sync = MapCameraSync::new(JsValue::UNDEFINED).unwrap();
    for zoom in [10.0, 11.0, 12.0] {
        sync.on_move(17.49, 78.56, zoom).unwrap();
    }
    assert_eq!(sync.updates(), 3.0);
    assert!(sync.on_move(17.49, 78.56, f64::NAN).is_err());
}
