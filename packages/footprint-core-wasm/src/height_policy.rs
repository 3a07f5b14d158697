use crate::config::PipelineConfig;
use crate::geojson_features::GeoFeature;

/// Decides how tall a footprint is extruded, in meters.
pub trait HeightPolicy {
    fn height(&self, feature: &GeoFeature) -> f64;
}

impl<F> HeightPolicy for F
where
    F: Fn(&GeoFeature) -> f64,
{
    fn height(&self, feature: &GeoFeature) -> f64 {
        self(feature)
    }
}

/// Every building gets the same number of levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLevels {
    pub levels: u32,
    pub meters_per_level: f64,
}

impl FixedLevels {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            levels: config.default_levels,
            meters_per_level: config.meters_per_level,
        }
    }
}

impl HeightPolicy for FixedLevels {
    fn height(&self, _feature: &GeoFeature) -> f64 {
        self.levels as f64 * self.meters_per_level
    }
}

/// Reads OSM-style tags: `height` in meters wins, then `building:levels` (or `levels`),
/// then the default level count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelsFromProperties {
    pub default_levels: u32,
    pub meters_per_level: f64,
}

impl LevelsFromProperties {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            default_levels: config.default_levels,
            meters_per_level: config.meters_per_level,
        }
    }
}

// Tags come as numbers or strings like "12", "12.5" or "12 m"
fn numeric_tag(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('m').trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

impl HeightPolicy for LevelsFromProperties {
    fn height(&self, feature: &GeoFeature) -> f64 {
        if let Some(height) = feature.property("height").and_then(numeric_tag) {
            return height;
        }

        let levels = feature
            .property("building:levels")
            .or_else(|| feature.property("levels"))
            .and_then(numeric_tag)
            .unwrap_or(self.default_levels as f64);

        levels * self.meters_per_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(properties: serde_json::Value) -> GeoFeature {
        GeoFeature::new("f", Vec::new()).with_properties(properties)
    }

    #[test]
    fn fixed_levels_multiply_out() {
        let policy = FixedLevels::from_config(&PipelineConfig::default());
        assert_eq!(policy.height(&feature(json!({}))), 9.0);
    }

    #[test]
    fn closures_are_policies() {
        let policy = |f: &GeoFeature| f.ring.len() as f64;
        assert_eq!(policy.height(&feature(json!(null))), 0.0);
    }

    #[test]
    fn properties_drive_height() {
        let policy = LevelsFromProperties {
            default_levels: 2,
            meters_per_level: 3.0,
        };

        assert_eq!(policy.height(&feature(json!({"height": "14.5 m", "building:levels": 8}))), 14.5);
        assert_eq!(policy.height(&feature(json!({"building:levels": "5"}))), 15.0);
        assert_eq!(policy.height(&feature(json!({"levels": 4}))), 12.0);
        assert_eq!(policy.height(&feature(json!({"building:levels": "many"}))), 6.0);
        assert_eq!(policy.height(&feature(json!(null))), 6.0);
    }
}
