use geo_types::Coord;
use serde::{Deserialize, Serialize};

use crate::console_warn;
use crate::error::{PipelineError, PipelineResult};

/// One building footprint: the outer ring in (longitude, latitude) order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoFeature {
    pub id: String,
    /// `x` is longitude, `y` is latitude. The closing point may or may not be repeated.
    pub ring: Vec<Coord<f64>>,
    pub properties: serde_json::Value,
}

impl GeoFeature {
    pub fn new(id: impl Into<String>, ring: Vec<Coord<f64>>) -> Self {
        Self {
            id: id.into(),
            ring,
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

#[derive(Deserialize)]
struct FeatureCollectionJson {
    r#type: String,
    #[serde(default)]
    features: Vec<FeatureJson>,
}

#[derive(Deserialize)]
struct FeatureJson {
    id: Option<serde_json::Value>,
    geometry: Option<GeometryJson>,
    #[serde(default)]
    properties: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GeometryJson {
    r#type: String,
    coordinates: serde_json::Value,
}

/// Parse a GeoJSON `FeatureCollection` string into footprints.
///
/// Only the outer ring of each polygon is kept; holes are ignored. Features without a
/// polygonal geometry are skipped with a warning. Malformed positions fail the whole parse.
pub fn parse_feature_collection(json: &str) -> PipelineResult<Vec<GeoFeature>> {
    let collection: FeatureCollectionJson = serde_json::from_str(json)?;

    if collection.r#type != "FeatureCollection" {
        return Err(PipelineError::LoadFailure(format!(
            "expected a FeatureCollection, got {}",
            collection.r#type
        )));
    }

    let mut features = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let explicit_id = explicit_feature_id(feature.id.as_ref(), feature.properties.as_ref());
        let label = explicit_id.clone().unwrap_or_else(|| format!("#{}", index));

        let Some(geometry) = feature.geometry else {
            console_warn!("Skipping feature {}: no geometry", label);
            continue;
        };

        let outer_ring = match geometry.r#type.as_str() {
            "Polygon" => geometry.coordinates.get(0),
            "MultiPolygon" => geometry.coordinates.get(0).and_then(|poly| poly.get(0)),
            other => {
                console_warn!("Skipping feature {}: unsupported geometry type {}", label, other);
                continue;
            }
        };

        let ring = match outer_ring {
            Some(ring) => parse_ring(ring, &label)?,
            None => Vec::new(),
        };
        let id = explicit_id.unwrap_or_else(|| ring_id(&ring));

        features.push(GeoFeature {
            id,
            ring,
            properties: feature.properties.unwrap_or(serde_json::Value::Null),
        });
    }

    Ok(features)
}

fn explicit_feature_id(id: Option<&serde_json::Value>, properties: Option<&serde_json::Value>) -> Option<String> {
    let from_properties = properties.and_then(|p| p.get("@id").or_else(|| p.get("id")));

    match id.or(from_properties) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Content-derived id for features that carry none: the same outer ring always gets
/// the same id, whatever its position in the collection.
pub fn ring_id(ring: &[Coord<f64>]) -> String {
    let mut hasher = blake3::Hasher::new();
    for coord in ring {
        hasher.update(&coord.x.to_le_bytes());
        hasher.update(&coord.y.to_le_bytes());
    }
    let hex = hasher.finalize().to_hex();
    format!("ring-{}", &hex.as_str()[..16])
}

fn parse_ring(ring: &serde_json::Value, id: &str) -> PipelineResult<Vec<Coord<f64>>> {
    let positions = ring
        .as_array()
        .ok_or_else(|| PipelineError::LoadFailure(format!("feature {}: ring is not an array", id)))?;

    positions
        .iter()
        .map(|position| {
            let pair = position.as_array().filter(|p| p.len() >= 2);
            match pair.map(|p| (p[0].as_f64(), p[1].as_f64())) {
                Some((Some(lng), Some(lat))) => Ok(Coord { x: lng, y: lat }),
                _ => Err(PipelineError::LoadFailure(format!(
                    "feature {}: malformed position {}",
                    id, position
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_outer_ring() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": "way/42",
                "properties": {"building": "yes"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [
                        [[78.5, 17.4], [78.6, 17.4], [78.6, 17.5], [78.5, 17.4]],
                        [[78.52, 17.42], [78.53, 17.42], [78.53, 17.43], [78.52, 17.42]]
                    ]
                }
            }]
        }"#;

        let features = parse_feature_collection(json).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, "way/42");
        assert_eq!(features[0].ring.len(), 4);
        assert_eq!(features[0].ring[1], Coord { x: 78.6, y: 17.4 });
        assert_eq!(features[0].property("building"), Some(&serde_json::json!("yes")));
    }

    #[test]
    fn multipolygon_uses_first_polygon_outer_ring() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": null,
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                        [[[5, 5], [6, 5], [6, 6], [5, 5]]]
                    ]
                }
            }]
        }"#;

        let features = parse_feature_collection(json).unwrap();
        assert_eq!(features[0].ring[2], Coord { x: 1.0, y: 1.0 });
        assert_eq!(features[0].id, ring_id(&features[0].ring));
    }

    #[test]
    fn missing_ids_follow_the_geometry_not_the_position() {
        let first = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}}
        ]}"#;
        let second = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[5, 5], [6, 5], [6, 6], [5, 5]]]}},
            {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}}
        ]}"#;

        let a = parse_feature_collection(first).unwrap();
        let b = parse_feature_collection(second).unwrap();
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].id, b[1].id);
        assert!(a[0].id.starts_with("ring-"));
    }

    #[test]
    fn skips_non_polygon_features() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"id": 7}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
                {"type": "Feature", "properties": {}, "geometry": null},
                {"type": "Feature", "properties": {"id": 9}, "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1]]]}}
            ]
        }"#;

        let features = parse_feature_collection(json).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, "9");
    }

    #[test]
    fn empty_collection_parses_to_no_features() {
        let features = parse_feature_collection(r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn malformed_input_is_a_load_failure() {
        assert!(matches!(
            parse_feature_collection("not json"),
            Err(PipelineError::LoadFailure(_))
        ));
        assert!(matches!(
            parse_feature_collection(r#"{"type": "Feature", "features": []}"#),
            Err(PipelineError::LoadFailure(_))
        ));

        let bad_position = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[["a", 0], [1, 0], [1, 1]]]}}
        ]}"#;
        assert!(matches!(
            parse_feature_collection(bad_position),
            Err(PipelineError::LoadFailure(_))
        ));
    }
}
