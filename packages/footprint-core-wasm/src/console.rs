#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// This allows us to access console.log from JS
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    // Use `js_namespace` to bind `console.log(..)` instead of just `log(..)`
    #[wasm_bindgen(js_namespace = console)]
    pub fn log(s: &str);
}

#[cfg(target_arch = "wasm32")]
pub fn warn(s: &str) {
    web_sys::console::warn_1(&JsValue::from_str(s));
}

#[cfg(target_arch = "wasm32")]
pub fn error(s: &str) {
    web_sys::console::error_1(&JsValue::from_str(s));
}

// Imported JS functions panic outside the browser, so native builds go through the `log` facade
#[cfg(not(target_arch = "wasm32"))]
pub fn log(s: &str) {
    log::info!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn warn(s: &str) {
    log::warn!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn error(s: &str) {
    log::error!("{}", s);
}

// Note: the console_* macros are defined in lib.rs to avoid duplication
