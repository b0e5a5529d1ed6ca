/// Deposition parameters per visited face.
///
/// Swiss-cheese layer: **Fabrication parameters**
/// Turns face geometry and the calibration channel into bead radius, layer
/// thickness, nozzle standoff, tool frame and travel velocity. Nodes are
/// independent of each other, so the work is spread over threads when the
/// `parallel` feature is on.
///
/// Units follow the inputs: with lengths in metres and `flow_rate` in cubic
/// metres per minute, velocities come out in metres per second.
use crate::calibration::CalibrationTable;
use crate::error::{PlannerError, PlannerResult};
use crate::geometry::{BoundingBox, Frame, OrientationAxis, Rgb};
use crate::graph::{Deposition, DualGraph, Node, NodeAttributes, NodeId};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Which radius/distance pair scales the nozzle standoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeSource {
    #[default]
    Designed,
    Measured,
}

/// Material and machine constants, read-only while a plan is parameterized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricationParameters {
    /// Volumetric flow of the extruder per minute.
    #[serde(default = "default_flow_rate")]
    pub flow_rate: f64,
    #[serde(default = "default_radius")]
    pub radius: ValueRange,
    #[serde(default = "default_thickness")]
    pub thickness: ValueRange,
    #[serde(default = "default_distance")]
    pub distance: ValueRange,
    #[serde(default = "default_measured_radius")]
    pub measured_radius: ValueRange,
    #[serde(default = "default_measured_distance")]
    pub measured_distance: ValueRange,
}

fn default_flow_rate() -> f64 {
    0.0003
}
fn default_radius() -> ValueRange {
    ValueRange::new(0.01, 0.05)
}
fn default_thickness() -> ValueRange {
    ValueRange::new(0.008, 0.022)
}
fn default_distance() -> ValueRange {
    ValueRange::new(0.02, 0.10)
}
fn default_measured_radius() -> ValueRange {
    ValueRange::new(0.012, 0.048)
}
fn default_measured_distance() -> ValueRange {
    ValueRange::new(0.025, 0.095)
}

impl Default for FabricationParameters {
    fn default() -> Self {
        Self {
            flow_rate: default_flow_rate(),
            radius: default_radius(),
            thickness: default_thickness(),
            distance: default_distance(),
            measured_radius: default_measured_radius(),
            measured_distance: default_measured_distance(),
        }
    }
}

impl FabricationParameters {
    /// Check the flow rate and the radius range of the pair `source` selects.
    /// The other pair may stay unset.
    pub fn validate(&self, source: RangeSource) -> PlannerResult<()> {
        if self.flow_rate.is_nan() || self.flow_rate <= 0.0 {
            return Err(PlannerError::InvalidCalibration(format!(
                "flow rate must be positive, got {}",
                self.flow_rate
            )));
        }
        let (radius, _) = self.ranges(source);
        if radius.span() == 0.0 {
            return Err(PlannerError::InvalidCalibration(format!(
                "{source:?} radius range has zero span"
            )));
        }
        Ok(())
    }

    /// Radius and distance ranges for `source`.
    pub fn ranges(&self, source: RangeSource) -> (ValueRange, ValueRange) {
        match source {
            RangeSource::Designed => (self.radius, self.distance),
            RangeSource::Measured => (self.measured_radius, self.measured_distance),
        }
    }

    /// Nozzle standoff for a bead of `radius`, scaled by the ratio of the
    /// distance span to the radius span.
    pub fn nozzle_distance(&self, radius: f64, source: RangeSource) -> PlannerResult<f64> {
        let (r, d) = self.ranges(source);
        if r.span() == 0.0 {
            return Err(PlannerError::InvalidCalibration(format!(
                "{source:?} radius range has zero span"
            )));
        }
        Ok(radius * (d.span() / r.span()))
    }

    /// Travel speed at which the constant flow deposits `area × thickness`
    /// while covering `radius`.
    pub fn velocity(
        &self,
        node: NodeId,
        radius: f64,
        area: f64,
        thickness: f64,
    ) -> PlannerResult<f64> {
        let volume = area * thickness;
        if volume == 0.0 {
            return Err(PlannerError::degenerate(node, "zero bead volume, velocity undefined"));
        }
        Ok(radius / (volume / (self.flow_rate / 60.0)))
    }
}

/// Radius of the disc with the same area as the face.
pub fn bead_radius(area: f64) -> f64 {
    (area / std::f64::consts::PI).sqrt()
}

/// Which layer of a multi-layer print is being planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSchedule {
    #[serde(default)]
    pub current_layer: u32,
    #[serde(default = "default_total_layers")]
    pub total_layers: u32,
}

fn default_total_layers() -> u32 {
    1
}

impl Default for LayerSchedule {
    fn default() -> Self {
        Self {
            current_layer: 0,
            total_layers: default_total_layers(),
        }
    }
}

impl LayerSchedule {
    /// Share of the print already deposited, `current / total`.
    pub fn fraction(&self) -> PlannerResult<f64> {
        if self.total_layers == 0 || self.current_layer > self.total_layers {
            return Err(PlannerError::InvalidCalibration(format!(
                "layer {} of {} is out of range",
                self.current_layer, self.total_layers
            )));
        }
        Ok(self.current_layer as f64 / self.total_layers as f64)
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────

pub struct DepositionPipeline<'a> {
    params: &'a FabricationParameters,
    table: &'a CalibrationTable,
    source: RangeSource,
    layers: LayerSchedule,
    axis: OrientationAxis,
    overrides: Option<&'a NodeAttributes<Rgb>>,
}

impl<'a> DepositionPipeline<'a> {
    pub fn new(params: &'a FabricationParameters, table: &'a CalibrationTable) -> Self {
        Self {
            params,
            table,
            source: RangeSource::default(),
            layers: LayerSchedule::default(),
            axis: OrientationAxis::default(),
            overrides: None,
        }
    }

    pub fn range_source(mut self, source: RangeSource) -> Self {
        self.source = source;
        self
    }

    pub fn layers(mut self, layers: LayerSchedule) -> Self {
        self.layers = layers;
        self
    }

    /// Axis along which uncolored faces are spread over the color map.
    pub fn axis(mut self, axis: OrientationAxis) -> Self {
        self.axis = axis;
        self
    }

    /// Per-node colors that take precedence over the mesh colors.
    pub fn color_overrides(mut self, overrides: &'a NodeAttributes<Rgb>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Parameterize every node of a planned graph.
    ///
    /// Nothing is written unless every node succeeds.
    pub fn run(&self, graph: &mut DualGraph) -> PlannerResult<()> {
        self.params.validate(self.source)?;
        let layer_fraction = self.layers.fraction()?;
        self.assign_missing_colors(graph);

        let depositions = self.compute_all(graph, layer_fraction)?;
        for (state, deposition) in graph.states_mut().iter_mut().zip(depositions) {
            state.deposition = Some(deposition);
        }
        log::debug!(
            "Parameterized {} nodes (layer {} of {}, {:?} ranges)",
            graph.len(),
            self.layers.current_layer,
            self.layers.total_layers,
            self.source
        );
        Ok(())
    }

    /// Give faces without a baked color the color-map entry matching their
    /// position along the sweep axis.
    fn assign_missing_colors(&self, graph: &mut DualGraph) {
        let Some(bounds) = BoundingBox::from_points(graph.nodes().iter().map(|n| &n.position))
        else {
            return;
        };
        let assigned: Vec<Option<Rgb>> = graph
            .nodes()
            .iter()
            .map(|n| {
                if n.color.is_some() || self.override_for(n.id).is_some() {
                    None
                } else {
                    Some(self.table.color_at(bounds.fraction_along(n.position, self.axis)))
                }
            })
            .collect();
        let count = assigned.iter().filter(|c| c.is_some()).count();
        if count > 0 {
            log::warn!("{count} faces have no calibration color, taking it from the color map");
        }
        for (state, color) in graph.states_mut().iter_mut().zip(assigned) {
            state.assigned_color = color;
        }
    }

    fn override_for(&self, id: NodeId) -> Option<Rgb> {
        self.overrides.and_then(|o| o.get(id)).copied()
    }

    #[cfg(feature = "parallel")]
    fn compute_all(
        &self,
        graph: &DualGraph,
        layer_fraction: f64,
    ) -> PlannerResult<Vec<Deposition>> {
        graph
            .nodes()
            .par_iter()
            .map(|node| self.compute_node(graph, node, layer_fraction))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_all(
        &self,
        graph: &DualGraph,
        layer_fraction: f64,
    ) -> PlannerResult<Vec<Deposition>> {
        graph
            .nodes()
            .iter()
            .map(|node| self.compute_node(graph, node, layer_fraction))
            .collect()
    }

    fn compute_node(
        &self,
        graph: &DualGraph,
        node: &Node,
        layer_fraction: f64,
    ) -> PlannerResult<Deposition> {
        let frame = graph.state(node.id).frame.ok_or_else(|| {
            PlannerError::degenerate(node.id, "node has no frame, plan the path first")
        })?;
        let color = self
            .override_for(node.id)
            .or_else(|| graph.color(node.id))
            .ok_or_else(|| PlannerError::degenerate(node.id, "node has no calibration color"))?;
        self.parameterize(node, frame, color, layer_fraction)
    }

    /// Radius, then thickness, then distance and tool frame, then velocity.
    pub fn parameterize(
        &self,
        node: &Node,
        frame: Frame,
        color: Rgb,
        layer_fraction: f64,
    ) -> PlannerResult<Deposition> {
        let radius = bead_radius(node.area);
        let thickness = self.table.thickness_for(node.id, color)?;
        let distance = self.params.nozzle_distance(radius, self.source)?;
        let distance_thickness = thickness * layer_fraction;
        let tool_frame = frame.translated(-frame.zaxis * (distance + distance_thickness));
        let velocity = self.params.velocity(node.id, radius, node.area, thickness)?;
        Ok(Deposition {
            radius,
            thickness,
            distance,
            distance_thickness,
            tool_frame,
            velocity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::mesh::tests::grid;
    use crate::planner::SurfacePathPlanner;
    use approx::assert_relative_eq;

    fn black_white_table() -> CalibrationTable {
        CalibrationTable::from_controls(&[Rgb::BLACK, Rgb::WHITE], &[0.008, 0.022]).unwrap()
    }

    fn planned_grid(color: Option<Rgb>) -> DualGraph {
        let mut mesh = grid(3, 2);
        if let Some(c) = color {
            mesh = mesh.with_uniform_color(c);
        }
        let mut planner = SurfacePathPlanner::new();
        planner.set_quad_mesh(mesh);
        planner.lowest_axis_path(OrientationAxis::X).unwrap()
    }

    #[test]
    fn test_bead_radius() {
        assert_relative_eq!(bead_radius(std::f64::consts::PI), 1.0);
        assert_relative_eq!(bead_radius(2.0), (2.0 / std::f64::consts::PI).sqrt());
        assert_eq!(bead_radius(0.0), 0.0);
    }

    #[test]
    fn test_nozzle_distance_scales_by_span_ratio() {
        let params = FabricationParameters::default();
        // Designed: distance span 0.08, radius span 0.04.
        assert_relative_eq!(
            params.nozzle_distance(0.02, RangeSource::Designed).unwrap(),
            0.04,
            max_relative = 1e-12
        );
        // Measured: 0.07 / 0.036.
        assert_relative_eq!(
            params.nozzle_distance(0.02, RangeSource::Measured).unwrap(),
            0.02 * (0.07 / 0.036),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_velocity_formula() {
        let params = FabricationParameters {
            flow_rate: 60.0,
            ..FabricationParameters::default()
        };
        // flow 1 per second, volume 2 → 2 s per bead, radius 4 → 2 per second
        assert_relative_eq!(params.velocity(NodeId(0), 4.0, 1.0, 2.0).unwrap(), 2.0);
        assert!(matches!(
            params.velocity(NodeId(3), 1.0, 0.0, 2.0),
            Err(PlannerError::DegenerateTopology { node: NodeId(3), .. })
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let params = FabricationParameters {
            flow_rate: 0.0,
            ..FabricationParameters::default()
        };
        assert!(matches!(
            params.validate(RangeSource::Designed),
            Err(PlannerError::InvalidCalibration(_))
        ));

        let params = FabricationParameters {
            radius: ValueRange::new(0.02, 0.02),
            ..FabricationParameters::default()
        };
        assert!(params.validate(RangeSource::Designed).is_err());
        assert!(params.validate(RangeSource::Measured).is_ok());
        assert!(params.nozzle_distance(0.01, RangeSource::Designed).is_err());
        assert!(params.nozzle_distance(0.01, RangeSource::Measured).is_ok());
    }

    #[test]
    fn test_unmeasured_pair_ignored_for_designed_ranges() {
        let params = FabricationParameters {
            measured_radius: ValueRange::new(0.0, 0.0),
            measured_distance: ValueRange::new(0.0, 0.0),
            ..FabricationParameters::default()
        };
        let table = black_white_table();
        let mut graph = planned_grid(Some(Rgb::WHITE));
        DepositionPipeline::new(&params, &table)
            .range_source(RangeSource::Designed)
            .run(&mut graph)
            .unwrap();
        assert!(graph.states().iter().all(|s| s.deposition.is_some()));

        let mut graph = planned_grid(Some(Rgb::WHITE));
        let err = DepositionPipeline::new(&params, &table)
            .range_source(RangeSource::Measured)
            .run(&mut graph)
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidCalibration(_)));
    }

    #[test]
    fn test_planned_parameters_are_deterministic() {
        let params = FabricationParameters::default();
        let table = black_white_table();
        let run = || {
            let mut planner = SurfacePathPlanner::new();
            planner.set_quad_mesh(grid(4, 3));
            let mut graph = planner.lowest_axis_path(OrientationAxis::X).unwrap();
            DepositionPipeline::new(&params, &table)
                .layers(LayerSchedule {
                    current_layer: 1,
                    total_layers: 3,
                })
                .run(&mut graph)
                .unwrap();
            graph
        };
        let (a, b) = (run(), run());
        assert_eq!(a.path(), b.path());
        assert_eq!(a.states(), b.states());
        assert!(a.states().iter().all(|s| s.deposition.is_some()));
    }

    #[test]
    fn test_layer_fraction() {
        let l = LayerSchedule {
            current_layer: 1,
            total_layers: 4,
        };
        assert_relative_eq!(l.fraction().unwrap(), 0.25);
        assert_eq!(LayerSchedule::default().fraction().unwrap(), 0.0);
        let bad = LayerSchedule {
            current_layer: 0,
            total_layers: 0,
        };
        assert!(bad.fraction().is_err());
        let past = LayerSchedule {
            current_layer: 5,
            total_layers: 4,
        };
        assert!(past.fraction().is_err());
    }

    #[test]
    fn test_pipeline_fills_every_node() {
        let mut graph = planned_grid(Some(Rgb::WHITE));
        let params = FabricationParameters::default();
        let table = black_white_table();
        DepositionPipeline::new(&params, &table)
            .layers(LayerSchedule {
                current_layer: 1,
                total_layers: 2,
            })
            .run(&mut graph)
            .unwrap();

        for node in graph.nodes() {
            let d = graph.state(node.id).deposition.unwrap();
            assert_relative_eq!(d.radius, (1.0 / std::f64::consts::PI).sqrt());
            assert_relative_eq!(d.thickness, 0.022);
            assert_relative_eq!(d.distance, d.radius * 2.0, max_relative = 1e-12);
            assert_relative_eq!(d.distance_thickness, 0.011);
            // Tool sits below the face along -normal.
            let frame = graph.state(node.id).frame.unwrap();
            let offset = d.tool_frame.origin - frame.origin;
            assert_relative_eq!(
                offset.length(),
                d.distance + d.distance_thickness,
                max_relative = 1e-12
            );
            assert!(offset.dot(frame.zaxis) < 0.0);
            assert_eq!(d.tool_frame.xaxis, frame.xaxis);
            assert!(d.velocity > 0.0);
        }
    }

    #[test]
    fn test_calibration_miss_aborts_without_partial_write() {
        let mut graph = planned_grid(Some(Rgb(255, 0, 0)));
        let params = FabricationParameters::default();
        let table = black_white_table();
        let err = DepositionPipeline::new(&params, &table)
            .run(&mut graph)
            .unwrap_err();
        assert!(matches!(err, PlannerError::CalibrationMiss { .. }));
        assert!(graph.states().iter().all(|s| s.deposition.is_none()));
    }

    #[test]
    fn test_uncolored_faces_follow_axis() {
        let mut graph = planned_grid(None);
        let params = FabricationParameters::default();
        let table = black_white_table();
        DepositionPipeline::new(&params, &table)
            .axis(OrientationAxis::X)
            .run(&mut graph)
            .unwrap();
        // Faces in the first column are black (thinnest), in the last white.
        let first = graph.state(NodeId(0));
        let last = graph.state(NodeId(5));
        assert_eq!(first.assigned_color, Some(Rgb::BLACK));
        assert_eq!(last.assigned_color, Some(Rgb::WHITE));
        assert_relative_eq!(first.deposition.unwrap().thickness, 0.008);
        assert_relative_eq!(last.deposition.unwrap().thickness, 0.022);
    }

    #[test]
    fn test_color_overrides_win() {
        let mut graph = planned_grid(Some(Rgb::WHITE));
        let params = FabricationParameters::default();
        let table = black_white_table();
        let overrides: NodeAttributes<Rgb> = [(NodeId(2), Rgb::BLACK)].into_iter().collect();
        DepositionPipeline::new(&params, &table)
            .color_overrides(&overrides)
            .run(&mut graph)
            .unwrap();
        assert_relative_eq!(graph.state(NodeId(2)).deposition.unwrap().thickness, 0.008);
        assert_relative_eq!(graph.state(NodeId(1)).deposition.unwrap().thickness, 0.022);
    }

    #[test]
    fn test_unplanned_graph_has_no_frames() {
        let mut graph = DualGraph::from_mesh(&grid(2, 2).with_uniform_color(Rgb::WHITE)).unwrap();
        let params = FabricationParameters::default();
        let table = black_white_table();
        let err = DepositionPipeline::new(&params, &table)
            .run(&mut graph)
            .unwrap_err();
        assert!(matches!(err, PlannerError::DegenerateTopology { .. }));
    }

    #[test]
    fn test_parameterize_single_node() {
        let node = Node {
            id: NodeId(0),
            position: Vec3::new(0.0, 0.0, 1.0),
            normal: Vec3::Z,
            area: std::f64::consts::PI * 0.0004,
            neighbors: Vec::new(),
            color: Some(Rgb::BLACK),
        };
        let frame = Frame::from_normal(node.position, node.normal).unwrap();
        let params = FabricationParameters::default();
        let table = black_white_table();
        let d = DepositionPipeline::new(&params, &table)
            .parameterize(&node, frame, Rgb::BLACK, 0.0)
            .unwrap();
        assert_relative_eq!(d.radius, 0.02, max_relative = 1e-12);
        assert_relative_eq!(d.distance, 0.04, max_relative = 1e-12);
        assert_relative_eq!(d.tool_frame.origin.z, 1.0 - 0.04, max_relative = 1e-12);
        let expected = 0.02 / ((node.area * 0.008) / (0.0003 / 60.0));
        assert_relative_eq!(d.velocity, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_parameters_from_json_defaults() {
        let params: FabricationParameters =
            serde_json::from_str(r#"{"flow_rate": 0.001, "radius": {"min": 0.0, "max": 0.1}}"#)
                .unwrap();
        assert_eq!(params.flow_rate, 0.001);
        assert_eq!(params.radius, ValueRange::new(0.0, 0.1));
        assert_eq!(params.distance, default_distance());
    }
}
