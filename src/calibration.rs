/// Calibration tables mapping the color channel of a face to a layer thickness.
///
/// Swiss-cheese layer: **Material calibration**
/// Extension point: add lookup policies to `ColorLookup` without touching the
/// table builders.
use crate::error::{PlannerError, PlannerResult};
use crate::geometry::Rgb;
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

/// Number of entries in an interpolated table.
pub const TABLE_SIZE: usize = 256;
const HALF_TABLE: usize = TABLE_SIZE / 2;

/// Interpolate thickness control values into a lookup table.
///
/// Two values give 256 samples from the first to the second, three give two
/// runs of 128 samples through the middle value, and longer lists are used as
/// the table verbatim.
pub fn build_thickness_map(control: &[f64]) -> PlannerResult<Vec<f64>> {
    match control {
        [] | [_] => Err(PlannerError::InvalidCalibration(format!(
            "need at least 2 thickness control values, got {}",
            control.len()
        ))),
        [t0, t1] => Ok(linspace(*t0, *t1, TABLE_SIZE)),
        [t0, t1, t2] => {
            let mut table = linspace(*t0, *t1, HALF_TABLE);
            table.extend(linspace(*t1, *t2, HALF_TABLE));
            Ok(table)
        }
        _ => Ok(control.to_vec()),
    }
}

/// Interpolate control colors into a palette of the same shape as
/// [`build_thickness_map`]. A single color is repeated across the table.
pub fn build_color_map(colors: &[Rgb]) -> PlannerResult<Vec<Rgb>> {
    match colors {
        [] => Err(PlannerError::InvalidCalibration(
            "need at least 1 control color".into(),
        )),
        [c] => Ok(vec![*c; TABLE_SIZE]),
        [c0, c1] => Ok(color_ramp(*c0, *c1, TABLE_SIZE)),
        [c0, c1, c2] => {
            let mut map = color_ramp(*c0, *c1, HALF_TABLE);
            map.extend(color_ramp(*c1, *c2, HALF_TABLE));
            Ok(map)
        }
        _ => Ok(colors.to_vec()),
    }
}

fn ramp_t(i: usize, n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        i as f64 / (n - 1) as f64
    }
}

fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| a + (b - a) * ramp_t(i, n)).collect()
}

fn color_ramp(a: Rgb, b: Rgb, n: usize) -> Vec<Rgb> {
    (0..n).map(|i| Rgb::lerp(a, b, ramp_t(i, n))).collect()
}

// ── Lookup ───────────────────────────────────────────────────────────

/// How a node color is matched against the color map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ColorLookup {
    /// First entry, scanning from index 0, that equals the color exactly.
    #[default]
    FirstExact,
    /// Closest entry in RGB space, if it lies within `max_distance`.
    /// Ties go to the lowest index.
    Nearest { max_distance: f64 },
}

/// Color map paired with the thickness values it keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    colors: Vec<Rgb>,
    thicknesses: Vec<f64>,
    lookup: ColorLookup,
}

impl CalibrationTable {
    pub fn new(colors: Vec<Rgb>, thicknesses: Vec<f64>) -> PlannerResult<Self> {
        if colors.is_empty() {
            return Err(PlannerError::InvalidCalibration(
                "calibration table is empty".into(),
            ));
        }
        if colors.len() != thicknesses.len() {
            return Err(PlannerError::InvalidCalibration(format!(
                "{} colors for {} thickness values",
                colors.len(),
                thicknesses.len()
            )));
        }
        Ok(Self {
            colors,
            thicknesses,
            lookup: ColorLookup::default(),
        })
    }

    /// Build both maps from control points.
    pub fn from_controls(
        control_colors: &[Rgb],
        control_thicknesses: &[f64],
    ) -> PlannerResult<Self> {
        let thicknesses = build_thickness_map(control_thicknesses)?;
        let colors = build_color_map(control_colors)?;
        Self::new(colors, thicknesses)
    }

    pub fn with_lookup(mut self, lookup: ColorLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn thicknesses(&self) -> &[f64] {
        &self.thicknesses
    }

    /// Color at a fractional position in `[0, 1]` along the map.
    pub fn color_at(&self, fraction: f64) -> Rgb {
        let last = self.colors.len() - 1;
        let index = (fraction.clamp(0.0, 1.0) * last as f64).round() as usize;
        self.colors[index.min(last)]
    }

    /// Table index matching `color` under the configured policy.
    pub fn index_of(&self, color: Rgb) -> Option<usize> {
        match self.lookup {
            ColorLookup::FirstExact => self.colors.iter().position(|&c| c == color),
            ColorLookup::Nearest { max_distance } => self
                .colors
                .iter()
                .enumerate()
                .map(|(i, &c)| (i, Rgb::dist(c, color)))
                .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((i, d)),
                })
                .filter(|&(_, d)| d <= max_distance)
                .map(|(i, _)| i),
        }
    }

    /// Layer thickness for the node with calibration color `color`.
    pub fn thickness_for(&self, node: NodeId, color: Rgb) -> PlannerResult<f64> {
        self.index_of(color)
            .map(|i| self.thicknesses[i])
            .ok_or(PlannerError::CalibrationMiss { node, color })
    }
}
