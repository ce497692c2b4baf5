//! Configuration for a [`SceneGraph`](crate::SceneGraph).

use crate::coords::CorrectionVariant;
use crate::error::GraphError;
use serde::{Deserialize, Serialize};

/// Configuration for the scene graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Rotation about X applied below point-tracked objects (default: -π/2)
    pub point_correction_angle: f64,

    /// Rotation about X applied below plane-anchored objects (default: +π/2)
    pub plane_correction_angle: f64,

    /// Create the CAMERA and GROUNDPLANE anchors at construction (default: false)
    pub reserved_anchors: bool,

    /// Contain panics raised by mutation observers (default: true)
    pub isolate_observers: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            point_correction_angle: CorrectionVariant::Point.default_angle(),
            plane_correction_angle: CorrectionVariant::Plane.default_angle(),
            reserved_anchors: false,
            isolate_observers: true,
        }
    }
}

impl GraphConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(GraphError::config)
    }

    /// Correction angle configured for `variant`.
    pub fn correction_angle(&self, variant: CorrectionVariant) -> f64 {
        match variant {
            CorrectionVariant::Point => self.point_correction_angle,
            CorrectionVariant::Plane => self.plane_correction_angle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GraphConfig::from_json(r#"{ "reserved_anchors": true }"#).unwrap();

        assert!(config.reserved_anchors);
        assert!(config.isolate_observers);
        assert_eq!(config.point_correction_angle, CorrectionVariant::Point.default_angle());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = GraphConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
