/// Face-indexed surface meshes.
///
/// Swiss-cheese layer: **Geometry Input**
/// Plug a different mesh source here (scans, CAD tessellations, …) by
/// implementing `FaceMesh`; the planner only ever asks per-face questions.
use crate::error::{PlannerError, PlannerResult};
use crate::geometry::{Rgb, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-face queries the planner needs from a mesh.
///
/// Faces are identified by their index in `0..face_count()`.
pub trait FaceMesh {
    fn face_count(&self) -> usize;
    fn face_center(&self, face: usize) -> Vec3;
    /// Unit normal, or the zero vector for a face with no well-defined plane.
    fn face_normal(&self, face: usize) -> Vec3;
    fn face_area(&self, face: usize) -> f64;
    /// Faces sharing an edge with `face`, in the face's own edge order.
    fn face_neighbors(&self, face: usize) -> Vec<usize>;
    /// Calibration color baked into the face, if any.
    fn face_color(&self, face: usize) -> Option<Rgb>;
}

/// A parametric surface sampled over the unit square.
pub trait Surface {
    fn point_at(&self, u: f64, v: f64) -> Vec3;
}

impl<F> Surface for F
where
    F: Fn(f64, f64) -> Vec3,
{
    fn point_at(&self, u: f64, v: f64) -> Vec3 {
        self(u, v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    #[serde(default)]
    pub color: Option<Rgb>,
}

impl Vertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: None,
        }
    }

    pub fn colored(position: Vec3, color: Rgb) -> Self {
        Self {
            position,
            color: Some(color),
        }
    }
}

// ── Quad mesh ────────────────────────────────────────────────────────

/// Polygon mesh made of quads (and triangles where a quad collapses).
#[derive(Debug, Clone)]
pub struct QuadMesh {
    vertices: Vec<Vertex>,
    faces: Vec<Vec<usize>>,
    neighbors: Vec<Vec<usize>>,
}

impl QuadMesh {
    /// Build a mesh from vertices and vertex loops.
    ///
    /// A four-vertex loop whose last vertex repeats the first or the third is
    /// stored as a triangle.
    pub fn from_vertices_and_faces(
        vertices: Vec<Vertex>,
        faces: Vec<Vec<usize>>,
    ) -> PlannerResult<Self> {
        let mut loops = Vec::with_capacity(faces.len());
        for (index, mut face) in faces.into_iter().enumerate() {
            if matches!(face.as_slice(), &[a, _, c, d] if d == a || d == c) {
                face.truncate(3);
            }
            if face.len() < 3 {
                return Err(PlannerError::InvalidMesh(format!(
                    "face {index} has {} vertices, need at least 3",
                    face.len()
                )));
            }
            if let Some(bad) = face.iter().find(|&&v| v >= vertices.len()) {
                return Err(PlannerError::InvalidMesh(format!(
                    "face {index} references vertex {bad}, mesh has {}",
                    vertices.len()
                )));
            }
            loops.push(face);
        }
        let neighbors = face_adjacency(&loops);
        log::debug!(
            "Built quad mesh: {} vertices, {} faces",
            vertices.len(),
            loops.len()
        );
        Ok(Self {
            vertices,
            faces: loops,
            neighbors,
        })
    }

    /// Sample `surface` on an `(nu + 1) × (nv + 1)` grid and connect the samples
    /// into `nu × nv` quads. `nv` defaults to `nu`.
    pub fn from_surface(
        surface: &dyn Surface,
        nu: usize,
        nv: Option<usize>,
    ) -> PlannerResult<Self> {
        let nv = nv.unwrap_or(nu);
        if nu == 0 || nv == 0 {
            return Err(PlannerError::InvalidMesh(format!(
                "surface sampling needs at least one row and column, got {nu}x{nv}"
            )));
        }
        let mut vertices = Vec::with_capacity((nu + 1) * (nv + 1));
        for i in 0..=nu {
            let u = i as f64 / nu as f64;
            for j in 0..=nv {
                let v = j as f64 / nv as f64;
                vertices.push(Vertex::new(surface.point_at(u, v)));
            }
        }
        let mut faces = Vec::with_capacity(nu * nv);
        for i in 0..nu {
            for j in 0..nv {
                faces.push(vec![
                    i * (nv + 1) + j,
                    (i + 1) * (nv + 1) + j,
                    (i + 1) * (nv + 1) + j + 1,
                    i * (nv + 1) + j + 1,
                ]);
            }
        }
        Self::from_vertices_and_faces(vertices, faces)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    /// Paint every vertex with the same color.
    pub fn with_uniform_color(mut self, color: Rgb) -> Self {
        for v in &mut self.vertices {
            v.color = Some(color);
        }
        self
    }

    /// Replace the color of a single vertex.
    pub fn set_vertex_color(&mut self, vertex: usize, color: Rgb) {
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.color = Some(color);
        }
    }

    fn face_points(&self, face: usize) -> Vec<Vec3> {
        self.faces[face]
            .iter()
            .map(|&v| self.vertices[v].position)
            .collect()
    }
}

/// For each face, the faces across each of its edges.
fn face_adjacency(faces: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut by_edge: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (f, face) in faces.iter().enumerate() {
        for (a, b) in loop_edges(face) {
            by_edge.entry((a.min(b), a.max(b))).or_default().push(f);
        }
    }
    faces
        .iter()
        .enumerate()
        .map(|(f, face)| {
            let mut adjacent = Vec::new();
            for (a, b) in loop_edges(face) {
                if let Some(shared) = by_edge.get(&(a.min(b), a.max(b))) {
                    for &other in shared {
                        if other != f && !adjacent.contains(&other) {
                            adjacent.push(other);
                        }
                    }
                }
            }
            adjacent
        })
        .collect()
}

fn loop_edges(face: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let n = face.len();
    (0..n).map(move |i| (face[i], face[(i + 1) % n]))
}

impl FaceMesh for QuadMesh {
    fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn face_center(&self, face: usize) -> Vec3 {
        Vec3::centroid(&self.face_points(face)).unwrap_or_default()
    }

    fn face_normal(&self, face: usize) -> Vec3 {
        let pts = self.face_points(face);
        let c = self.face_center(face);
        let n = pts.len();
        let sum = (0..n).fold(Vec3::default(), |acc, i| {
            acc + (pts[i] - c).cross(pts[(i + 1) % n] - c)
        });
        sum.normalized().unwrap_or_default()
    }

    fn face_area(&self, face: usize) -> f64 {
        let pts = self.face_points(face);
        let c = self.face_center(face);
        let n = pts.len();
        (0..n)
            .map(|i| 0.5 * (pts[i] - c).cross(pts[(i + 1) % n] - c).length())
            .sum()
    }

    fn face_neighbors(&self, face: usize) -> Vec<usize> {
        self.neighbors[face].clone()
    }

    /// Vertex colors averaged with each vertex weighted by its distance to the
    /// face center. `None` unless every vertex carries a color.
    fn face_color(&self, face: usize) -> Option<Rgb> {
        let c = self.face_center(face);
        let mut sum = [0.0; 3];
        let mut plain = [0.0; 3];
        let mut total = 0.0;
        let verts = &self.faces[face];
        for &v in verts {
            let vertex = &self.vertices[v];
            let ch = vertex.color?.channels();
            let w = Vec3::dist(c, vertex.position);
            for i in 0..3 {
                sum[i] += ch[i] * w;
                plain[i] += ch[i];
            }
            total += w;
        }
        if total > 0.0 {
            Some(Rgb::from_channels(sum.map(|s| s / total)))
        } else {
            Some(Rgb::from_channels(plain.map(|s| s / verts.len() as f64)))
        }
    }
}

// ── Serialized input ─────────────────────────────────────────────────

/// Mesh as it arrives from JavaScript: flat vertex and face lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshInput {
    pub vertices: Vec<[f64; 3]>,
    /// Optional per-vertex colors; must match `vertices` in length when given.
    #[serde(default)]
    pub colors: Vec<[u8; 3]>,
    pub faces: Vec<Vec<usize>>,
}

impl TryFrom<MeshInput> for QuadMesh {
    type Error = PlannerError;

    fn try_from(input: MeshInput) -> PlannerResult<Self> {
        if !input.colors.is_empty() && input.colors.len() != input.vertices.len() {
            return Err(PlannerError::InvalidMesh(format!(
                "{} colors given for {} vertices",
                input.colors.len(),
                input.vertices.len()
            )));
        }
        let vertices = input
            .vertices
            .iter()
            .enumerate()
            .map(|(i, p)| Vertex {
                position: Vec3::new(p[0], p[1], p[2]),
                color: input.colors.get(i).map(|c| Rgb(c[0], c[1], c[2])),
            })
            .collect();
        QuadMesh::from_vertices_and_faces(vertices, input.faces)
    }
}
