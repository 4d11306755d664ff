//! Axis lookups and per-level pixel sizes.

use crate::metadata::Axis;

/// Index of the axis called `name`.
pub fn axis_index(axes: &[Axis], name: &str) -> Option<usize> {
    axes.iter().position(|a| a.name == name)
}

/// Physical size of one pixel along each axis of a pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSize {
    axes: Vec<String>,
    scale: Vec<f64>,
}

impl PixelSize {
    pub fn new(axes: &[Axis], scale: Vec<f64>) -> crate::Result<Self> {
        if axes.len() != scale.len() {
            return Err(crate::Error::shape_mismatch(format!(
                "{} axes but {} scale values",
                axes.len(),
                scale.len()
            )));
        }
        Ok(Self {
            axes: axes.iter().map(|a| a.name.clone()).collect(),
            scale,
        })
    }

    /// Scale for `axis`, or 1.0 if the axis is absent.
    pub fn get(&self, axis: &str) -> f64 {
        self.axes
            .iter()
            .position(|a| a == axis)
            .map_or(1.0, |i| self.scale[i])
    }

    pub fn x(&self) -> f64 {
        self.get("x")
    }

    pub fn y(&self) -> f64 {
        self.get("y")
    }

    pub fn z(&self) -> f64 {
        self.get("z")
    }

    pub fn t(&self) -> f64 {
        self.get("t")
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scale
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.scale
    }

    /// Sum of absolute differences on the spatial axes.
    pub fn spatial_distance(&self, other: &PixelSize) -> f64 {
        ["x", "y", "z"]
            .iter()
            .map(|a| (self.get(a) - other.get(a)).abs())
            .sum()
    }
}

/// Downsampling factor of each axis between two consecutive pyramid levels.
///
/// Only `y` and `x` are decimated.
pub fn level_factors(axes: &[Axis]) -> Vec<u64> {
    axes.iter()
        .map(|a| match a.name.as_str() {
            "x" | "y" => 2,
            _ => 1,
        })
        .collect()
}

/// Shapes of all pyramid levels, starting with `base`.
pub fn level_shapes(axes: &[Axis], base: &[u64], levels: usize) -> Vec<Vec<u64>> {
    let factors = level_factors(axes);
    let mut out: Vec<Vec<u64>> = Vec::with_capacity(levels);
    let mut shape = base.to_vec();
    for _ in 0..levels {
        out.push(shape.clone());
        shape = shape
            .iter()
            .zip(&factors)
            .map(|(n, f)| n.div_ceil(*f))
            .collect();
    }
    out
}

/// Scales of all pyramid levels, starting with `base`.
pub fn level_scales(axes: &[Axis], base: &[f64], levels: usize) -> Vec<Vec<f64>> {
    let factors = level_factors(axes);
    let mut out: Vec<Vec<f64>> = Vec::with_capacity(levels);
    let mut scale = base.to_vec();
    for _ in 0..levels {
        out.push(scale.clone());
        scale = scale
            .iter()
            .zip(&factors)
            .map(|(s, f)| s * *f as f64)
            .collect();
    }
    out
}

/// Default chunk shape: whole planes of at most 1024x1024, 10 z slices.
pub fn default_chunks(axes: &[Axis], shape: &[u64]) -> Vec<u64> {
    axes.iter()
        .zip(shape)
        .map(|(a, &n)| {
            let limit = match a.name.as_str() {
                "x" | "y" => 1024,
                "z" => 10,
                _ => 1,
            };
            n.clamp(1, limit)
        })
        .collect()
}
