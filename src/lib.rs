//! Surfpath — dual-graph toolpaths and deposition parameters for robotic
//! extrusion over surface meshes, in WebAssembly.
//!
//! # Swiss Cheese Architecture
//!
//! The pipeline is composed of independent, swappable layers:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Input        │ ──▶ │  Dual graph   │ ──▶ │  Traversal    │ ──▶ │  Fabrication  │
//! │  (FaceMesh /  │     │  (one node    │     │  (lowest-     │     │  (radius,     │
//! │   UV surface) │     │   per face)   │     │   axis sweep) │     │   thickness,  │
//! │  🧀 hole:     │     │               │     │  🧀 hole:     │     │   velocity)   │
//! │  scans, CAD   │     │               │     │  spiral,      │     │  🧀 hole:     │
//! │  tessellation │     │               │     │  contour…     │     │  new lookups  │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each layer is a trait / module boundary. Add new mesh sources, traversal
//! strategies or calibration policies without touching existing code.

pub mod calibration;
pub mod error;
pub mod fabrication;
pub mod geometry;
pub mod graph;
pub mod mesh;
pub mod planner;
pub mod toolpath;

use calibration::{CalibrationTable, ColorLookup};
use error::PlannerResult;
use fabrication::{DepositionPipeline, FabricationParameters, LayerSchedule, RangeSource};
use geometry::{Frame, OrientationAxis, Rgb, Vec3};
use graph::{Deposition, DualGraph, NodeId};
use mesh::{FaceMesh, MeshInput, QuadMesh};
use planner::SurfacePathPlanner;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

// ── Public parameter struct (JSON from JS) ───────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub axis: OrientationAxis,
    #[serde(default)]
    pub fabrication: FabricationParameters,
    #[serde(default)]
    pub range_source: RangeSource,
    #[serde(default)]
    pub layers: LayerSchedule,
    #[serde(default = "default_control_colors")]
    pub control_colors: Vec<Rgb>,
    /// Thickness control points. Empty means the designed thickness range.
    #[serde(default = "default_control_thicknesses")]
    pub control_thicknesses: Vec<f64>,
    #[serde(default)]
    pub lookup: ColorLookup,
}

fn default_control_colors() -> Vec<Rgb> {
    vec![Rgb::BLACK, Rgb::WHITE]
}
fn default_control_thicknesses() -> Vec<f64> {
    vec![0.008, 0.022]
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            axis: OrientationAxis::default(),
            fabrication: FabricationParameters::default(),
            range_source: RangeSource::default(),
            layers: LayerSchedule::default(),
            control_colors: default_control_colors(),
            control_thicknesses: default_control_thicknesses(),
            lookup: ColorLookup::default(),
        }
    }
}

impl PlannerConfig {
    pub fn calibration_table(&self) -> PlannerResult<CalibrationTable> {
        let range = self.fabrication.thickness;
        let thicknesses = if self.control_thicknesses.is_empty() {
            vec![range.min, range.max]
        } else {
            self.control_thicknesses.clone()
        };
        Ok(CalibrationTable::from_controls(&self.control_colors, &thicknesses)?
            .with_lookup(self.lookup))
    }
}

// ── Plan output ──────────────────────────────────────────────────────

/// Planning result for one visited face.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub position: Vec3,
    pub color: Option<Rgb>,
    pub frame: Option<Frame>,
    pub deposition: Option<Deposition>,
}

/// Ordered toolpath over the mesh faces with deposition parameters.
#[derive(Debug, Clone, Serialize)]
pub struct SurfacePlan {
    pub path: Vec<NodeId>,
    pub interruptions: usize,
    pub edges: Vec<(NodeId, NodeId)>,
    /// One report per path entry, in path order.
    pub nodes: Vec<NodeReport>,
}

impl SurfacePlan {
    pub fn from_graph(graph: &DualGraph) -> Self {
        let nodes = graph
            .path()
            .iter()
            .map(|&id| {
                let state = graph.state(id);
                NodeReport {
                    id,
                    position: graph.node(id).position,
                    color: graph.color(id),
                    frame: state.frame,
                    deposition: state.deposition,
                }
            })
            .collect();
        Self {
            path: graph.path().to_vec(),
            interruptions: graph.interruptions(),
            edges: graph.edges().to_vec(),
            nodes,
        }
    }
}

/// Plan a path over `mesh` and parameterize every node.
pub fn plan_surface(
    mesh: impl FaceMesh + 'static,
    config: &PlannerConfig,
) -> PlannerResult<SurfacePlan> {
    let table = config.calibration_table()?;
    let mut planner = SurfacePathPlanner::new();
    planner.set_quad_mesh(mesh);
    let mut graph = planner.lowest_axis_path(config.axis)?;
    DepositionPipeline::new(&config.fabrication, &table)
        .range_source(config.range_source)
        .layers(config.layers)
        .axis(config.axis)
        .run(&mut graph)?;
    Ok(SurfacePlan::from_graph(&graph))
}

fn plan_mesh_json(mesh_json: &str, config_json: &str) -> PlannerResult<String> {
    let config: PlannerConfig = serde_json::from_str(config_json)?;
    let input: MeshInput = serde_json::from_str(mesh_json)?;
    let plan = plan_surface(QuadMesh::try_from(input)?, &config)?;
    Ok(serde_json::to_string(&plan)?)
}

fn preview_path_json(mesh_json: &str, config_json: &str) -> PlannerResult<String> {
    let config: PlannerConfig = serde_json::from_str(config_json)?;
    let input: MeshInput = serde_json::from_str(mesh_json)?;
    let mut planner = SurfacePathPlanner::new();
    planner.set_quad_mesh(QuadMesh::try_from(input)?);
    let graph = planner.lowest_axis_path(config.axis)?;
    let points: Vec<[f64; 3]> = graph
        .path()
        .iter()
        .map(|&id| {
            let p = graph.node(id).position;
            [p.x, p.y, p.z]
        })
        .collect();
    Ok(serde_json::to_string(&points)?)
}

// ── WASM entry points ────────────────────────────────────────────────

/// Plan a mesh (JSON `{vertices, colors?, faces}`) and return the full plan
/// as JSON.
#[wasm_bindgen]
pub fn plan_mesh(mesh_json: &str, config_json: &str) -> Result<String, JsValue> {
    plan_mesh_json(mesh_json, config_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Return face centers in path order as JSON (for the 3-D preview polyline).
#[wasm_bindgen]
pub fn preview_path(mesh_json: &str, config_json: &str) -> Result<String, JsValue> {
    preview_path_json(mesh_json, config_json).map_err(|e| JsValue::from_str(&e.to_string()))
}
