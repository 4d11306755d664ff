use serde::{Deserialize, Serialize};
use zarrs::array::ArraySubset;

use crate::axes::PixelSize;
use crate::metadata::Axis;

const SPATIAL_AXES: [&str; 3] = ["x", "y", "z"];

/// An axis-aligned box in physical (micrometer) coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub name: String,
    #[serde(rename = "x_micrometer")]
    pub x: f64,
    #[serde(rename = "y_micrometer")]
    pub y: f64,
    #[serde(rename = "z_micrometer")]
    pub z: f64,
    #[serde(rename = "len_x_micrometer")]
    pub x_length: f64,
    #[serde(rename = "len_y_micrometer")]
    pub y_length: f64,
    #[serde(rename = "len_z_micrometer")]
    pub z_length: f64,
    /// Instance ID bounded by this ROI, for masking tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<u64>,
}

impl Roi {
    pub fn new(
        name: impl Into<String>,
        origin: [f64; 3],
        lengths: [f64; 3],
    ) -> crate::Result<Self> {
        let roi = Self {
            name: name.into(),
            x: origin[0],
            y: origin[1],
            z: origin[2],
            x_length: lengths[0],
            y_length: lengths[1],
            z_length: lengths[2],
            label: None,
        };
        roi.validate()?;
        Ok(roi)
    }

    pub fn with_label(mut self, label: u64) -> Self {
        self.label = Some(label);
        self
    }

    /// This ROI moved by `offset` (x, y, z).
    pub fn translated(&self, offset: [f64; 3]) -> Self {
        Self {
            x: self.x + offset[0],
            y: self.y + offset[1],
            z: self.z + offset[2],
            ..self.clone()
        }
    }

    /// Check that every coordinate is finite and every extent non-negative.
    pub fn validate(&self) -> crate::Result<()> {
        for (axis, origin, length) in [
            ("x", self.x, self.x_length),
            ("y", self.y, self.y_length),
            ("z", self.z, self.z_length),
        ] {
            if !origin.is_finite() || !length.is_finite() {
                return Err(crate::Error::InvalidRoi(format!(
                    "ROI {:?} has a non-finite {axis} coordinate",
                    self.name
                )));
            }
            if length < 0.0 {
                return Err(crate::Error::InvalidRoi(format!(
                    "ROI {:?} has negative {axis} extent {length}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn origin_and_length(&self, axis: &str) -> Option<(f64, f64)> {
        match axis {
            "x" => Some((self.x, self.x_length)),
            "y" => Some((self.y, self.y_length)),
            "z" => Some((self.z, self.z_length)),
            _ => None,
        }
    }

    /// The pixel ranges covered by this ROI in an array of `shape`.
    ///
    /// Non-spatial axes are covered in full.
    pub fn to_subset(
        &self,
        axes: &[Axis],
        pixel_size: &PixelSize,
        shape: &[u64],
    ) -> crate::Result<ArraySubset> {
        self.validate()?;
        if axes.len() != shape.len() {
            return Err(crate::Error::shape_mismatch(format!(
                "{} axes for an array of shape {shape:?}",
                axes.len()
            )));
        }
        let mut ranges = Vec::with_capacity(shape.len());
        for (axis, &n) in axes.iter().zip(shape) {
            let Some((origin, length)) = self.origin_and_length(&axis.name) else {
                ranges.push(0..n);
                continue;
            };
            let px = pixel_size.get(&axis.name);
            let start = (origin / px).round();
            let end = ((origin + length) / px).round();
            if start < 0.0 || end > n as f64 {
                return Err(crate::Error::OutOfBounds(format!(
                    "ROI {:?} spans pixels {start}..{end} on axis {} of length {n}",
                    self.name, axis.name
                )));
            }
            ranges.push(start as u64..end as u64);
        }
        Ok(ArraySubset::new_with_ranges(&ranges))
    }

    /// The ROI spanning inclusive pixel bounds `lo..=hi`.
    ///
    /// Spatial axes missing from `axes` get origin 0 and the length of one pixel.
    pub fn from_pixel_bounds(
        name: impl Into<String>,
        axes: &[Axis],
        pixel_size: &PixelSize,
        lo: &[u64],
        hi: &[u64],
    ) -> Self {
        let mut origin = [0.0; 3];
        let mut lengths = [0.0; 3];
        for (i, axis) in SPATIAL_AXES.iter().enumerate() {
            let px = pixel_size.get(axis);
            match axes.iter().position(|a| a.name == *axis) {
                Some(d) => {
                    origin[i] = lo[d] as f64 * px;
                    lengths[i] = (hi[d] - lo[d] + 1) as f64 * px;
                }
                None => lengths[i] = px,
            }
        }
        Self {
            name: name.into(),
            x: origin[0],
            y: origin[1],
            z: origin[2],
            x_length: lengths[0],
            y_length: lengths[1],
            z_length: lengths[2],
            label: None,
        }
    }

    /// The ROI covering a whole array of `shape`.
    pub fn full_extent(
        name: impl Into<String>,
        axes: &[Axis],
        pixel_size: &PixelSize,
        shape: &[u64],
    ) -> Self {
        let lo = vec![0; shape.len()];
        let hi: Vec<u64> = shape.iter().map(|n| n.saturating_sub(1)).collect();
        let mut roi = Self::from_pixel_bounds(name, axes, pixel_size, &lo, &hi);
        // an empty axis has no extent
        for (axis, &n) in axes.iter().zip(shape) {
            if n == 0 {
                match axis.name.as_str() {
                    "x" => roi.x_length = 0.0,
                    "y" => roi.y_length = 0.0,
                    "z" => roi.z_length = 0.0,
                    _ => {}
                }
            }
        }
        roi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zyx() -> (Vec<Axis>, PixelSize) {
        let axes = vec![
            Axis::new("z", "space", Some("micrometer")),
            Axis::new("y", "space", Some("micrometer")),
            Axis::new("x", "space", Some("micrometer")),
        ];
        let px = PixelSize::new(&axes, vec![1.0, 0.65, 0.65]).unwrap();
        (axes, px)
    }

    #[test]
    fn negative_extent_is_rejected() {
        assert!(matches!(
            Roi::new("bad", [0.0; 3], [1.0, -1.0, 1.0]),
            Err(crate::Error::InvalidRoi(_))
        ));
        assert!(Roi::new("nan", [f64::NAN, 0.0, 0.0], [1.0; 3]).is_err());
    }

    #[test]
    fn full_extent_maps_back_to_whole_array() {
        let (axes, px) = zyx();
        let shape = [4, 100, 60];
        let roi = Roi::full_extent("image", &axes, &px, &shape);
        assert_eq!(roi.x_length, 60.0 * 0.65);
        assert_eq!(roi.z_length, 4.0);
        let subset = roi.to_subset(&axes, &px, &shape).unwrap();
        assert_eq!(subset, ArraySubset::new_with_ranges(&[0..4, 0..100, 0..60]));
    }

    #[test]
    fn partial_roi() {
        let (axes, px) = zyx();
        let roi = Roi::new("r", [6.5, 1.3, 1.0], [13.0, 6.5, 2.0]).unwrap();
        let subset = roi.to_subset(&axes, &px, &[4, 100, 60]).unwrap();
        assert_eq!(subset, ArraySubset::new_with_ranges(&[1..3, 2..12, 10..30]));
    }

    #[test]
    fn roi_outside_array_fails() {
        let (axes, px) = zyx();
        let roi = Roi::new("r", [0.0; 3], [100.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            roi.to_subset(&axes, &px, &[4, 100, 60]),
            Err(crate::Error::OutOfBounds(_))
        ));
    }

    #[test]
    fn channel_axis_is_taken_whole() {
        let (mut axes, _) = zyx();
        axes.insert(0, Axis::new("c", "channel", None));
        let px = PixelSize::new(&axes, vec![1.0, 1.0, 0.65, 0.65]).unwrap();
        let roi = Roi::new("r", [0.0; 3], [0.65, 0.65, 1.0]).unwrap();
        let subset = roi.to_subset(&axes, &px, &[3, 4, 100, 60]).unwrap();
        assert_eq!(
            subset,
            ArraySubset::new_with_ranges(&[0..3, 0..1, 0..1, 0..1])
        );
    }

    #[test]
    fn pixel_bounds_are_inclusive() {
        let (axes, px) = zyx();
        let roi = Roi::from_pixel_bounds("5", &axes, &px, &[1, 2, 3], &[1, 4, 3]);
        assert_eq!(roi.z, 1.0);
        assert_eq!(roi.z_length, 1.0);
        assert!((roi.y - 1.3).abs() < 1e-12);
        assert!((roi.y_length - 1.95).abs() < 1e-12);
        assert!((roi.x_length - 0.65).abs() < 1e-12);
    }
}
