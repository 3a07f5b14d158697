use thiserror::Error;
use wasm_bindgen::JsValue;

use crate::models::PlanarFrame;

/// Everything that can go wrong between fetching a dataset and drawing it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Fetching or parsing the dataset failed.
    #[error("failed to load dataset: {0}")]
    LoadFailure(String),

    #[error("coordinate out of range: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// The ring cannot form a closed solid (too few points, zero area, or self-intersecting).
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("map zoom must be finite, got {0}")]
    InvalidZoom(f64),

    #[error("dataset contains no features")]
    EmptyDataset,

    #[error("feature {0} is already part of the scene")]
    DuplicateFeature(String),

    /// Points from one planar frame were normalized with a context built for another.
    #[error("planar frame mismatch: context is {context:?}, points are {points:?}")]
    FrameMismatch {
        context: PlanarFrame,
        points: PlanarFrame,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("renderer error: {0}")]
    Renderer(String),
}

impl PipelineError {
    /// Whether this error aborts the whole dataset load, as opposed to skipping one feature.
    pub fn is_dataset_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::DegenerateGeometry(_) | PipelineError::DuplicateFeature(_)
        )
    }
}

impl From<PipelineError> for JsValue {
    fn from(err: PipelineError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::LoadFailure(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_per_feature_errors_are_recoverable() {
        assert!(!PipelineError::DegenerateGeometry("two points".into()).is_dataset_fatal());
        assert!(!PipelineError::DuplicateFeature("way/1".into()).is_dataset_fatal());
        assert!(PipelineError::InvalidCoordinate { lat: 91.0, lng: 0.0 }.is_dataset_fatal());
        assert!(PipelineError::EmptyDataset.is_dataset_fatal());
        assert!(PipelineError::LoadFailure("404".into()).is_dataset_fatal());
    }

    #[test]
    fn json_errors_become_load_failures() {
        let err: PipelineError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, PipelineError::LoadFailure(_)));
    }
}
