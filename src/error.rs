//! Error types for planning and parameter derivation.
//!
//! Every failure aborts the current planning run: a partially parameterized
//! path is never handed back.

use crate::geometry::Rgb;
use crate::graph::NodeId;
use thiserror::Error;

/// Errors raised while building, planning or parameterizing a surface path.
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Planning was requested before a mesh was attached.
    #[error("No mesh attached to the planner")]
    NotConfigured,

    /// Calibration inputs or fabrication constants are unusable.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// A node color has no acceptable entry in the calibration table.
    #[error("No calibration entry for node {node} with color {color:?}")]
    CalibrationMiss { node: NodeId, color: Rgb },

    /// A face whose geometry cannot produce a frame or deposition parameters.
    #[error("Degenerate topology at node {node}: {reason}")]
    DegenerateTopology { node: NodeId, reason: String },

    /// Vertex or face data could not be turned into a mesh.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// JSON configuration or mesh input could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl PlannerError {
    pub(crate) fn degenerate(node: NodeId, reason: impl Into<String>) -> Self {
        Self::DegenerateTopology {
            node,
            reason: reason.into(),
        }
    }
}

/// Result type alias for planner operations.
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::NotConfigured;
        assert_eq!(err.to_string(), "No mesh attached to the planner");

        let err = PlannerError::InvalidCalibration("need at least 2 thickness values".into());
        assert_eq!(
            err.to_string(),
            "Invalid calibration: need at least 2 thickness values"
        );

        let err = PlannerError::degenerate(NodeId(4), "zero area and no neighbors");
        assert_eq!(
            err.to_string(),
            "Degenerate topology at node 4: zero area and no neighbors"
        );
    }

    #[test]
    fn test_calibration_miss_names_color() {
        let err = PlannerError::CalibrationMiss {
            node: NodeId(2),
            color: Rgb(1, 2, 3),
        };
        assert_eq!(
            err.to_string(),
            "No calibration entry for node 2 with color Rgb(1, 2, 3)"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PlannerError = json_err.into();
        assert!(matches!(err, PlannerError::Config(_)));
    }
}
