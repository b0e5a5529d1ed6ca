/// Surface path planner.
///
/// Swiss-cheese layer: **Traversal driver**
/// Owns the mesh and drives a `TraversalStrategy` through the
/// `Unstarted → Seeding → Stepping → Complete` cycle, handing back the
/// traversed dual graph.
use crate::error::{PlannerError, PlannerResult};
use crate::geometry::OrientationAxis;
use crate::graph::{DualGraph, NodeId};
use crate::mesh::{FaceMesh, QuadMesh, Surface};
use crate::toolpath::{LowestAxisStrategy, Step, TraversalStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Unstarted,
    Seeding,
    Stepping { step: usize },
    Complete,
}

pub struct SurfacePathPlanner {
    mesh: Option<Box<dyn FaceMesh>>,
    state: PlannerState,
}

impl Default for SurfacePathPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfacePathPlanner {
    pub fn new() -> Self {
        Self {
            mesh: None,
            state: PlannerState::Unstarted,
        }
    }

    /// Attach the mesh to plan over, replacing any earlier one.
    pub fn set_quad_mesh(&mut self, mesh: impl FaceMesh + 'static) {
        self.mesh = Some(Box::new(mesh));
        self.state = PlannerState::Unstarted;
    }

    /// Sample `surface` into an `nu × nv` quad mesh and attach it.
    pub fn create_quad_mesh_from_surface(
        &mut self,
        surface: &dyn Surface,
        nu: usize,
        nv: usize,
    ) -> PlannerResult<()> {
        let mesh = QuadMesh::from_surface(surface, nu, Some(nv))?;
        self.set_quad_mesh(mesh);
        Ok(())
    }

    pub fn mesh(&self) -> Option<&dyn FaceMesh> {
        self.mesh.as_deref()
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Fresh dual graph of the attached mesh.
    pub fn build_graph(&self) -> PlannerResult<DualGraph> {
        let mesh = self.mesh.as_deref().ok_or(PlannerError::NotConfigured)?;
        DualGraph::from_mesh(mesh)
    }

    /// Plan a path that sweeps along `axis`, preferring the lowest free
    /// neighbor at every step.
    pub fn lowest_axis_path(&mut self, axis: OrientationAxis) -> PlannerResult<DualGraph> {
        self.plan_with(&LowestAxisStrategy::new(axis))
    }

    /// Plan a path with any traversal strategy. Every call starts from a new
    /// graph, so repeated runs give identical results.
    pub fn plan_with(&mut self, strategy: &dyn TraversalStrategy) -> PlannerResult<DualGraph> {
        let result = self.run(strategy);
        if result.is_err() {
            self.state = PlannerState::Unstarted;
        }
        result
    }

    fn run(&mut self, strategy: &dyn TraversalStrategy) -> PlannerResult<DualGraph> {
        let mut graph = self.build_graph()?;

        self.state = PlannerState::Seeding;
        let Some(mut current) = strategy.seed(&graph) else {
            log::debug!("Empty mesh, nothing to plan");
            self.state = PlannerState::Complete;
            return Ok(graph);
        };
        log::debug!("Path starts at node {current}");

        for step in 0..graph.len() {
            self.state = PlannerState::Stepping { step };
            graph.visit(current);
            let next = match strategy.step(&graph, current) {
                Some(Step::Adjacent(next)) => next,
                Some(Step::Jump(next)) => {
                    log::warn!("No free neighbor at node {current}, jumping to node {next}");
                    graph.record_interruption();
                    next
                }
                // Every node is on the path.
                None => break,
            };
            graph.connect(current, next)?;
            current = next;
        }

        // A lone face never gets an edge to fix its frame.
        if graph.edges().is_empty() {
            if let Some(&only) = graph.path().first() {
                graph.ensure_frame(only)?;
            }
        }

        self.state = PlannerState::Complete;
        log::debug!(
            "Planned {} of {} nodes with {} edges and {} interruptions",
            graph.path().len(),
            graph.len(),
            graph.edges().len(),
            graph.interruptions()
        );
        Ok(graph)
    }
}

/// Check that `path` visits every node of `graph` exactly once.
pub fn is_complete_tour(graph: &DualGraph) -> bool {
    let mut seen = vec![false; graph.len()];
    for &NodeId(i) in graph.path() {
        if i >= seen.len() || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    seen.into_iter().all(|s| s)
}
