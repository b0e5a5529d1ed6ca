/// Traversal strategies over the dual graph.
///
/// Swiss-cheese layer: **Strategy selection**
/// Extension point: implement `TraversalStrategy` to add spiral, contour-parallel
/// or any other ordering; the planner only drives the seed/step protocol.
use crate::geometry::{OrientationAxis, Vec3};
use crate::graph::{DualGraph, NodeId};

// ── Strategy trait (the "hole") ──────────────────────────────────────

/// One move of the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue onto an adjacent face.
    Adjacent(NodeId),
    /// Jump to a face that does not share an edge with the current one.
    Jump(NodeId),
}

impl Step {
    pub fn target(self) -> NodeId {
        match self {
            Step::Adjacent(id) | Step::Jump(id) => id,
        }
    }
}

pub trait TraversalStrategy {
    /// Node the path starts from, `None` for an empty graph.
    fn seed(&self, graph: &DualGraph) -> Option<NodeId>;
    /// Where to go from `current`, or `None` once every node is connected.
    fn step(&self, graph: &DualGraph, current: NodeId) -> Option<Step>;
}

// ── Lowest-axis strategy ─────────────────────────────────────────────

/// Greedy sweep that always moves to the free neighbor lowest along `axis`,
/// producing a zig-zag over regular quad grids.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestAxisStrategy {
    pub axis: OrientationAxis,
}

impl LowestAxisStrategy {
    pub fn new(axis: OrientationAxis) -> Self {
        Self { axis }
    }

    /// First node with the smallest coordinate along the axis.
    fn lowest<I>(&self, graph: &DualGraph, ids: I) -> Option<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        ids.into_iter().min_by(|&a, &b| {
            let pa = graph.node(a).position.along(self.axis);
            let pb = graph.node(b).position.along(self.axis);
            pa.total_cmp(&pb)
        })
    }
}

impl TraversalStrategy for LowestAxisStrategy {
    fn seed(&self, graph: &DualGraph) -> Option<NodeId> {
        if graph.is_empty() {
            return None;
        }
        // Corner faces of a quad grid have exactly two neighbors.
        let corners = graph
            .nodes()
            .iter()
            .filter(|n| n.neighbors.len() == 2)
            .map(|n| n.id);
        self.lowest(graph, corners).or(Some(NodeId(0)))
    }

    fn step(&self, graph: &DualGraph, current: NodeId) -> Option<Step> {
        let free = graph
            .node(current)
            .neighbors
            .iter()
            .copied()
            .filter(|&n| n != current && graph.degree(n) == 0);
        if let Some(next) = self.lowest(graph, free) {
            return Some(Step::Adjacent(next));
        }
        if graph.is_connected() {
            return None;
        }
        closest_unconnected(graph, current).map(Step::Jump)
    }
}

/// Nearest node, other than `current`, without any incident edge.
pub fn closest_unconnected(graph: &DualGraph, current: NodeId) -> Option<NodeId> {
    let origin = graph.node(current).position;
    graph
        .nodes()
        .iter()
        .filter(|n| n.id != current && graph.degree(n.id) == 0)
        .map(|n| (n.id, Vec3::dist(origin, n.position)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
