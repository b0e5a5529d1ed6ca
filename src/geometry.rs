/// Core geometry types for the planning pipeline.
///
/// Swiss-cheese layer: **Geometry representation**
/// Extension point: add new primitives here and expose them to meshes through
/// the `FaceMesh` trait.
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Below this length a vector is treated as zero.
pub const EPSILON: f64 = 1e-9;

// ── 3-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        Self {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            z: a.z + (b.z - a.z) * t,
        }
    }
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }
    pub fn dist(a: Self, b: Self) -> f64 {
        (a - b).length()
    }
    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len < EPSILON {
            None
        } else {
            Some(self * (1.0 / len))
        }
    }
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Self::default(), |acc, p| acc + *p);
        Some(sum * (1.0 / points.len() as f64))
    }
    /// Coordinate of this point along `axis`.
    pub fn along(self, axis: OrientationAxis) -> f64 {
        match axis {
            OrientationAxis::X => self.x,
            OrientationAxis::Y => self.y,
            OrientationAxis::Z => self.z,
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// World axis the planner sweeps along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationAxis {
    #[default]
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Self> {
        let mut points = points.into_iter().peekable();
        points.peek()?;
        let mut min = Vec3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Vec3::new(f64::MIN, f64::MIN, f64::MIN);
        for v in points {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }
        Some(Self { min, max })
    }

    /// Position of `p` along `axis` as a fraction of the box extent, clamped to
    /// `[0, 1]`. A flat extent maps everything to 0.
    pub fn fraction_along(&self, p: Vec3, axis: OrientationAxis) -> f64 {
        let lo = self.min.along(axis);
        let span = self.max.along(axis) - lo;
        if span < EPSILON {
            return 0.0;
        }
        ((p.along(axis) - lo) / span).clamp(0.0, 1.0)
    }
}

// ── Color ────────────────────────────────────────────────────────────

/// 8-bit RGB color used as the calibration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    pub fn channels(self) -> [f64; 3] {
        [self.0 as f64, self.1 as f64, self.2 as f64]
    }

    /// Build a color from floating channels, rounding and clamping to `0..=255`.
    pub fn from_channels(c: [f64; 3]) -> Self {
        let q = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        Rgb(q(c[0]), q(c[1]), q(c[2]))
    }

    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        let (ca, cb) = (a.channels(), b.channels());
        Self::from_channels([
            ca[0] + (cb[0] - ca[0]) * t,
            ca[1] + (cb[1] - ca[1]) * t,
            ca[2] + (cb[2] - ca[2]) * t,
        ])
    }

    /// Euclidean distance in RGB space.
    pub fn dist(a: Self, b: Self) -> f64 {
        let (ca, cb) = (a.channels(), b.channels());
        ((ca[0] - cb[0]).powi(2) + (ca[1] - cb[1]).powi(2) + (ca[2] - cb[2]).powi(2)).sqrt()
    }
}

// ── Frame ────────────────────────────────────────────────────────────

/// Right-handed orthonormal frame: `xaxis × yaxis == zaxis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Vec3,
    pub xaxis: Vec3,
    pub yaxis: Vec3,
    pub zaxis: Vec3,
}

impl Frame {
    /// Local frame at `origin` whose z-axis is `normal`.
    ///
    /// The x-axis is `normal × Y`; when the normal is parallel to world Y the
    /// world X axis is used as reference instead. Returns `None` if `normal`
    /// has no direction.
    pub fn from_normal(origin: Vec3, normal: Vec3) -> Option<Self> {
        let n = normal.normalized()?;
        let u = match n.cross(Vec3::Y).normalized() {
            Some(u) => u,
            None => {
                log::warn!("normal parallel to world Y, using world X as frame reference");
                n.cross(Vec3::X).normalized()?
            }
        };
        let v = n.cross(u).normalized()?;
        Some(Self {
            origin,
            xaxis: u,
            yaxis: v,
            zaxis: n,
        })
    }

    /// Copy of this frame with its origin moved by `offset`.
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            origin: self.origin + offset,
            ..*self
        }
    }
}
