/// Dual graph over mesh faces.
///
/// Swiss-cheese layer: **Traversal representation**
/// One node per face, kept in an arena indexed by `NodeId`. Geometry copied from
/// the mesh is immutable; everything the planner and the parameter pipeline
/// produce lives in a separate `NodeState` per node.
use crate::error::{PlannerError, PlannerResult};
use crate::geometry::{Frame, Rgb, Vec3};
use crate::mesh::FaceMesh;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Faces with less area than this count as zero-area.
const MIN_AREA: f64 = 1e-12;

/// Identifier of a node; equal to the index of its face in the mesh.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable per-face geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec3,
    pub normal: Vec3,
    pub area: f64,
    pub neighbors: Vec<NodeId>,
    /// Calibration color baked into the mesh face.
    pub color: Option<Rgb>,
}

/// Deposition parameters derived for one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deposition {
    pub radius: f64,
    pub thickness: f64,
    /// Standoff from the surface derived from the bead radius.
    pub distance: f64,
    /// Extra standoff for material already deposited in earlier layers.
    pub distance_thickness: f64,
    pub tool_frame: Frame,
    pub velocity: f64,
}

/// Mutable planning attributes of a node. `None` means not computed yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeState {
    pub frame: Option<Frame>,
    /// Calibration color assigned from the color map when the face had none.
    pub assigned_color: Option<Rgb>,
    pub deposition: Option<Deposition>,
}

// ── Graph ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DualGraph {
    nodes: Vec<Node>,
    states: Vec<NodeState>,
    degree: Vec<usize>,
    edges: Vec<(NodeId, NodeId)>,
    path: Vec<NodeId>,
    interruptions: usize,
}

impl DualGraph {
    /// One node per mesh face, all planning attributes unset.
    pub fn from_mesh(mesh: &dyn FaceMesh) -> PlannerResult<Self> {
        let count = mesh.face_count();
        let mut nodes = Vec::with_capacity(count);
        for face in 0..count {
            let mut neighbors: Vec<NodeId> = Vec::new();
            for n in mesh.face_neighbors(face) {
                if n >= count || n == face {
                    return Err(PlannerError::InvalidMesh(format!(
                        "face {face} lists neighbor {n}, mesh has {count} faces"
                    )));
                }
                if !neighbors.contains(&NodeId(n)) {
                    neighbors.push(NodeId(n));
                }
            }
            let area = mesh.face_area(face);
            if neighbors.is_empty() && area < MIN_AREA {
                return Err(PlannerError::degenerate(
                    NodeId(face),
                    "face has zero area and no neighbors",
                ));
            }
            nodes.push(Node {
                id: NodeId(face),
                position: mesh.face_center(face),
                normal: mesh.face_normal(face),
                area,
                neighbors,
                color: mesh.face_color(face),
            });
        }
        log::debug!("Dual graph: {} nodes", nodes.len());
        Ok(Self {
            states: vec![NodeState::default(); count],
            degree: vec![0; count],
            edges: Vec::new(),
            path: Vec::with_capacity(count),
            interruptions: 0,
            nodes,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn state(&self, id: NodeId) -> &NodeState {
        &self.states[id.0]
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    pub(crate) fn states_mut(&mut self) -> &mut [NodeState] {
        &mut self.states
    }

    /// Number of edges incident on `id`.
    pub fn degree(&self, id: NodeId) -> usize {
        self.degree[id.0]
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Face ids in visitation order.
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Number of jumps to a non-adjacent face.
    pub fn interruptions(&self) -> usize {
        self.interruptions
    }

    /// True once the edges form a single spanning path.
    pub fn is_connected(&self) -> bool {
        self.edges.len() + 1 >= self.nodes.len()
    }

    /// Calibration color of a node: the baked face color, else the assigned one.
    pub fn color(&self, id: NodeId) -> Option<Rgb> {
        self.nodes[id.0].color.or(self.states[id.0].assigned_color)
    }

    pub(crate) fn visit(&mut self, id: NodeId) {
        self.path.push(id);
    }

    pub(crate) fn record_interruption(&mut self) {
        self.interruptions += 1;
    }

    /// Add the edge `a`–`b`, fixing the frame of any endpoint that has none.
    pub(crate) fn connect(&mut self, a: NodeId, b: NodeId) -> PlannerResult<()> {
        self.edges.push((a, b));
        self.degree[a.0] += 1;
        self.degree[b.0] += 1;
        self.ensure_frame(a)?;
        self.ensure_frame(b)
    }

    /// Assign the local frame of `id` unless it already has one.
    pub(crate) fn ensure_frame(&mut self, id: NodeId) -> PlannerResult<()> {
        if self.states[id.0].frame.is_some() {
            return Ok(());
        }
        let node = &self.nodes[id.0];
        let frame = Frame::from_normal(node.position, node.normal)
            .ok_or_else(|| PlannerError::degenerate(id, "face normal has zero length"))?;
        self.states[id.0].frame = Some(frame);
        Ok(())
    }
}

// ── Side attributes ──────────────────────────────────────────────────

/// Caller-supplied per-node values kept apart from the node records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes<T> {
    values: BTreeMap<NodeId, T>,
}

impl<T> Default for NodeAttributes<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T> NodeAttributes<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, value: T) -> Option<T> {
        self.values.insert(id, value)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.values.iter().map(|(id, v)| (*id, v))
    }
}

impl<T> FromIterator<(NodeId, T)> for NodeAttributes<T> {
    fn from_iter<I: IntoIterator<Item = (NodeId, T)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::grid;
    use crate::mesh::{QuadMesh, Vertex};

    #[test]
    fn test_one_node_per_face() {
        let mesh = grid(3, 2);
        let graph = DualGraph::from_mesh(&mesh).unwrap();
        assert_eq!(graph.len(), 6);
        for (i, node) in graph.nodes().iter().enumerate() {
            assert_eq!(node.id, NodeId(i));
            assert_eq!(node.position, mesh.face_center(i));
            assert_eq!(node.neighbors.len(), mesh.face_neighbors(i).len());
        }
    }

    #[test]
    fn test_planning_state_starts_unset() {
        let graph = DualGraph::from_mesh(&grid(2, 2)).unwrap();
        assert!(graph.states().iter().all(|s| *s == NodeState::default()));
        assert!(graph.edges().is_empty());
        assert!(graph.path().is_empty());
        assert_eq!(graph.interruptions(), 0);
    }

    #[test]
    fn test_connect_assigns_frames_once() {
        let mut graph = DualGraph::from_mesh(&grid(2, 2)).unwrap();
        graph.connect(NodeId(0), NodeId(1)).unwrap();
        let first = graph.state(NodeId(1)).frame.unwrap();
        graph.connect(NodeId(1), NodeId(3)).unwrap();
        assert_eq!(graph.state(NodeId(1)).frame.unwrap(), first);
        assert_eq!(graph.degree(NodeId(1)), 2);
        assert!(graph.state(NodeId(2)).frame.is_none());
    }

    #[test]
    fn test_zero_area_isolated_face_is_degenerate() {
        let vertices = vec![
            Vertex::new(Vec3::new(0.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(2.0, 0.0, 0.0)),
        ];
        let mesh = QuadMesh::from_vertices_and_faces(vertices, vec![vec![0, 1, 2]]).unwrap();
        let err = DualGraph::from_mesh(&mesh).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::DegenerateTopology { node: NodeId(0), .. }
        ));
    }

    /// Unit squares in a row, with the neighbor lists supplied verbatim.
    struct ListedMesh {
        neighbors: Vec<Vec<usize>>,
    }

    impl FaceMesh for ListedMesh {
        fn face_count(&self) -> usize {
            self.neighbors.len()
        }
        fn face_center(&self, face: usize) -> Vec3 {
            Vec3::new(face as f64, 0.0, 0.0)
        }
        fn face_normal(&self, _face: usize) -> Vec3 {
            Vec3::Z
        }
        fn face_area(&self, _face: usize) -> f64 {
            1.0
        }
        fn face_neighbors(&self, face: usize) -> Vec<usize> {
            self.neighbors[face].clone()
        }
        fn face_color(&self, _face: usize) -> Option<Rgb> {
            None
        }
    }

    #[test]
    fn test_duplicate_neighbors_collapse() {
        let mesh = ListedMesh {
            neighbors: vec![vec![1, 1, 2], vec![0], vec![0]],
        };
        let graph = DualGraph::from_mesh(&mesh).unwrap();
        assert_eq!(graph.node(NodeId(0)).neighbors, vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_bad_neighbor_ids_rejected() {
        let out_of_range = ListedMesh {
            neighbors: vec![vec![1], vec![5]],
        };
        assert!(matches!(
            DualGraph::from_mesh(&out_of_range),
            Err(PlannerError::InvalidMesh(_))
        ));
        let self_loop = ListedMesh {
            neighbors: vec![vec![0, 1], vec![0]],
        };
        assert!(matches!(
            DualGraph::from_mesh(&self_loop),
            Err(PlannerError::InvalidMesh(_))
        ));
    }

    #[test]
    fn test_node_attributes_side_map() {
        let mut attrs: NodeAttributes<&str> = NodeAttributes::new();
        assert!(attrs.is_empty());
        attrs.insert(NodeId(3), "seam");
        assert_eq!(attrs.insert(NodeId(3), "start"), Some("seam"));
        assert_eq!(attrs.get(NodeId(3)), Some(&"start"));
        assert_eq!(attrs.get(NodeId(0)), None);

        let collected: NodeAttributes<u8> = [(NodeId(2), 1), (NodeId(1), 2)].into_iter().collect();
        let ids: Vec<NodeId> = collected.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
    }
}
