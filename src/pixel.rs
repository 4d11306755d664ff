//! Typed n-dimensional pixel arrays and their transfer to and from Zarr arrays.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::Display;
use std::str::FromStr;

use ndarray::{ArrayD, Dimension, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use zarrs::array::{Array, ArrayBuilder, ArraySubset, data_type};
use zarrs::plugin::ExtensionName;
use zarrs::storage::ReadableWritableListableStorageTraits;

pub type ZarrArray = Array<dyn ReadableWritableListableStorageTraits>;

/// Element types supported for images and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

/// Run `$body` with `$T` bound to the element type of `$pixel_type`.
macro_rules! with_pixel_type {
    ($pixel_type:expr, $T:ident => $body:expr) => {
        match $pixel_type {
            PixelType::UInt8 => {
                type $T = u8;
                $body
            }
            PixelType::UInt16 => {
                type $T = u16;
                $body
            }
            PixelType::UInt32 => {
                type $T = u32;
                $body
            }
            PixelType::UInt64 => {
                type $T = u64;
                $body
            }
            PixelType::Int8 => {
                type $T = i8;
                $body
            }
            PixelType::Int16 => {
                type $T = i16;
                $body
            }
            PixelType::Int32 => {
                type $T = i32;
                $body
            }
            PixelType::Int64 => {
                type $T = i64;
                $body
            }
            PixelType::Float32 => {
                type $T = f32;
                $body
            }
            PixelType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

/// Run `$body` with `$a` bound to the typed array inside a [`PixelArray`].
macro_rules! with_array {
    ($pixels:expr, $a:ident => $body:expr) => {
        match $pixels {
            PixelArray::UInt8($a) => $body,
            PixelArray::UInt16($a) => $body,
            PixelArray::UInt32($a) => $body,
            PixelArray::UInt64($a) => $body,
            PixelArray::Int8($a) => $body,
            PixelArray::Int16($a) => $body,
            PixelArray::Int32($a) => $body,
            PixelArray::Int64($a) => $body,
            PixelArray::Float32($a) => $body,
            PixelArray::Float64($a) => $body,
        }
    };
}

impl PixelType {
    pub fn name(&self) -> &'static str {
        match self {
            PixelType::UInt8 => "uint8",
            PixelType::UInt16 => "uint16",
            PixelType::UInt32 => "uint32",
            PixelType::UInt64 => "uint64",
            PixelType::Int8 => "int8",
            PixelType::Int16 => "int16",
            PixelType::Int32 => "int32",
            PixelType::Int64 => "int64",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Default display range: the full integer range, or 0..1 for floats.
    pub fn value_range(&self) -> (f64, f64) {
        with_pixel_type!(self, T => (0.0, T::DISPLAY_MAX))
    }

    /// Element type of an existing array.
    pub fn of_array(array: &ZarrArray) -> crate::Result<Self> {
        let name = array
            .data_type()
            .name_v3()
            .ok_or_else(|| crate::Error::general("array data type has no name"))?;
        name.parse()
    }

    pub(crate) fn array_builder(&self, shape: Vec<u64>, chunks: Vec<u64>) -> ArrayBuilder {
        match self {
            PixelType::UInt8 => ArrayBuilder::new(shape, chunks, data_type::uint8(), 0u8),
            PixelType::UInt16 => ArrayBuilder::new(shape, chunks, data_type::uint16(), 0u16),
            PixelType::UInt32 => ArrayBuilder::new(shape, chunks, data_type::uint32(), 0u32),
            PixelType::UInt64 => ArrayBuilder::new(shape, chunks, data_type::uint64(), 0u64),
            PixelType::Int8 => ArrayBuilder::new(shape, chunks, data_type::int8(), 0i8),
            PixelType::Int16 => ArrayBuilder::new(shape, chunks, data_type::int16(), 0i16),
            PixelType::Int32 => ArrayBuilder::new(shape, chunks, data_type::int32(), 0i32),
            PixelType::Int64 => ArrayBuilder::new(shape, chunks, data_type::int64(), 0i64),
            PixelType::Float32 => ArrayBuilder::new(shape, chunks, data_type::float32(), 0f32),
            PixelType::Float64 => ArrayBuilder::new(shape, chunks, data_type::float64(), 0f64),
        }
    }
}

impl FromStr for PixelType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let out = match s {
            "uint8" => PixelType::UInt8,
            "uint16" => PixelType::UInt16,
            "uint32" => PixelType::UInt32,
            "uint64" => PixelType::UInt64,
            "int8" => PixelType::Int8,
            "int16" => PixelType::Int16,
            "int32" => PixelType::Int32,
            "int64" => PixelType::Int64,
            "float32" => PixelType::Float32,
            "float64" => PixelType::Float64,
            s => return Err(crate::Error::general(format!("unsupported data type: {s}"))),
        };
        Ok(out)
    }
}

impl Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric element of a pixel array.
pub trait Pixel: Copy + PartialEq + Default + std::fmt::Debug + 'static {
    const DISPLAY_MAX: f64;

    fn to_f64(self) -> f64;

    /// Rounds and saturates for integer types.
    fn from_f64(value: f64) -> Self;

    /// The instance ID this value represents, if it is a positive integer.
    fn label_id(self) -> Option<u64>;

    fn into_pixels(array: ArrayD<Self>) -> PixelArray;

    /// The typed array inside `pixels`, if it holds this element type.
    fn view(pixels: &PixelArray) -> Option<&ArrayD<Self>>;
}

macro_rules! impl_pixel_int {
    ($($variant:ident($t:ty)),*) => {
        $(
            impl Pixel for $t {
                const DISPLAY_MAX: f64 = <$t>::MAX as f64;

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value.round() as $t
                }

                fn label_id(self) -> Option<u64> {
                    (self > 0).then_some(self as u64)
                }

                fn into_pixels(array: ArrayD<Self>) -> PixelArray {
                    PixelArray::$variant(array)
                }

                fn view(pixels: &PixelArray) -> Option<&ArrayD<Self>> {
                    match pixels {
                        PixelArray::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )*
    };
}

macro_rules! impl_pixel_float {
    ($($variant:ident($t:ty)),*) => {
        $(
            impl Pixel for $t {
                const DISPLAY_MAX: f64 = 1.0;

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn label_id(self) -> Option<u64> {
                    (self >= 1.0 && self.fract() == 0.0).then_some(self as u64)
                }

                fn into_pixels(array: ArrayD<Self>) -> PixelArray {
                    PixelArray::$variant(array)
                }

                fn view(pixels: &PixelArray) -> Option<&ArrayD<Self>> {
                    match pixels {
                        PixelArray::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_pixel_int!(
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64)
);
impl_pixel_float!(Float32(f32), Float64(f64));

/// How coarser pyramid levels are computed from finer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    /// Mean of each block; for intensity images.
    Mean,
    /// First element of each block; for labels, so no new IDs appear.
    Nearest,
}

/// An n-dimensional block of pixels of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelArray {
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

impl PixelArray {
    /// A C-ordered array of `shape` holding `data`.
    pub fn new<T: Pixel>(shape: Vec<u64>, data: Vec<T>) -> crate::Result<Self> {
        let dims: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
        let array = ArrayD::from_shape_vec(IxDyn(&dims), data).map_err(|e| {
            crate::Error::shape_mismatch(format!("cannot arrange pixels as {shape:?}: {e}"))
        })?;
        Ok(T::into_pixels(array))
    }

    pub fn as_array<T: Pixel>(&self) -> Option<&ArrayD<T>> {
        T::view(self)
    }

    pub fn shape(&self) -> Vec<u64> {
        with_array!(self, a => a.shape().iter().map(|&n| n as u64).collect())
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelArray::UInt8(_) => PixelType::UInt8,
            PixelArray::UInt16(_) => PixelType::UInt16,
            PixelArray::UInt32(_) => PixelType::UInt32,
            PixelArray::UInt64(_) => PixelType::UInt64,
            PixelArray::Int8(_) => PixelType::Int8,
            PixelArray::Int16(_) => PixelType::Int16,
            PixelArray::Int32(_) => PixelType::Int32,
            PixelArray::Int64(_) => PixelType::Int64,
            PixelArray::Float32(_) => PixelType::Float32,
            PixelArray::Float64(_) => PixelType::Float64,
        }
    }

    /// Convert every element to `pixel_type`, rounding and saturating as needed.
    pub fn cast(&self, pixel_type: PixelType) -> PixelArray {
        if self.pixel_type() == pixel_type {
            return self.clone();
        }
        with_array!(self, a => with_pixel_type!(pixel_type, T => {
            T::into_pixels(a.mapv(|p| T::from_f64(p.to_f64())))
        }))
    }

    pub fn downsample(&self, factors: &[u64], resampling: Resampling) -> crate::Result<Self> {
        let shape = self.shape();
        if factors.len() != shape.len() || factors.contains(&0) {
            return Err(crate::Error::general(format!(
                "invalid downsampling factors {factors:?} for shape {shape:?}"
            )));
        }
        let factors: Vec<usize> = factors.iter().map(|&f| f as usize).collect();
        Ok(with_array!(self, a => downsample(a, &factors, resampling)))
    }

    /// Inclusive per-axis index bounds of every positive instance ID.
    pub fn label_bounds(&self) -> BTreeMap<u64, (Vec<u64>, Vec<u64>)> {
        with_array!(self, a => label_bounds(a))
    }
}

/// Partial blocks at the upper edges are kept, so each axis shrinks to `ceil(n / f)`.
fn downsample<T: Pixel>(array: &ArrayD<T>, factors: &[usize], resampling: Resampling) -> PixelArray {
    let out = match resampling {
        Resampling::Nearest => array
            .slice_each_axis(|ax| Slice::from(..).step_by(factors[ax.axis.index()] as isize))
            .to_owned(),
        Resampling::Mean => {
            let shape: Vec<usize> = array
                .shape()
                .iter()
                .zip(factors)
                .map(|(n, f)| n.div_ceil(*f))
                .collect();
            ArrayD::from_shape_fn(IxDyn(&shape), |index| {
                let block = array.slice_each_axis(|ax| {
                    let d = ax.axis.index();
                    let start = index[d] * factors[d];
                    Slice::from(start..(start + factors[d]).min(ax.len))
                });
                let sum: f64 = block.iter().map(|v| v.to_f64()).sum();
                T::from_f64(sum / block.len() as f64)
            })
        }
    };
    T::into_pixels(out)
}

fn label_bounds<T: Pixel>(array: &ArrayD<T>) -> BTreeMap<u64, (Vec<u64>, Vec<u64>)> {
    let mut out: BTreeMap<u64, (Vec<u64>, Vec<u64>)> = BTreeMap::new();
    for (index, value) in array.indexed_iter() {
        let Some(id) = value.label_id() else {
            continue;
        };
        let index: Vec<u64> = index.slice().iter().map(|&i| i as u64).collect();
        match out.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert((index.clone(), index));
            }
            Entry::Occupied(mut entry) => {
                let (lo, hi) = entry.get_mut();
                for (d, &i) in index.iter().enumerate() {
                    lo[d] = lo[d].min(i);
                    hi[d] = hi[d].max(i);
                }
            }
        }
    }
    out
}

/// Read `subset` of `array` as elements of `pixel_type`.
pub fn read_subset(
    array: &ZarrArray,
    pixel_type: PixelType,
    subset: &ArraySubset,
) -> crate::Result<PixelArray> {
    Ok(with_pixel_type!(pixel_type, T => T::into_pixels(
        array
            .retrieve_array_subset::<ArrayD<T>>(subset)
            .map_err(crate::Error::wrap)?
    )))
}

/// Write `pixels` into `subset` of `array`.
pub fn write_subset(
    array: &ZarrArray,
    subset: &ArraySubset,
    pixels: &PixelArray,
) -> crate::Result<()> {
    let shape = pixels.shape();
    if subset.shape() != shape.as_slice() {
        return Err(crate::Error::shape_mismatch(format!(
            "cannot write pixels of shape {shape:?} into subset of shape {:?}",
            subset.shape()
        )));
    }
    if pixels.is_empty() {
        return Ok(());
    }
    with_array!(pixels, a => {
        // logical iteration order is C order whatever the memory layout
        let elements: Vec<_> = a.iter().copied().collect();
        array
            .store_array_subset(subset, &elements)
            .map_err(crate::Error::wrap)
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, arr3};

    use super::*;

    #[test]
    fn pixel_type_names_round_trip() {
        for name in ["uint8", "uint16", "int32", "float64"] {
            assert_eq!(name.parse::<PixelType>().unwrap().name(), name);
        }
        assert!("complex64".parse::<PixelType>().is_err());
        assert_eq!(
            serde_json::to_string(&PixelType::UInt16).unwrap(),
            r#""uint16""#
        );
    }

    #[test]
    fn new_checks_element_count() {
        assert!(PixelArray::new(vec![2, 3], vec![0u8; 6]).is_ok());
        assert!(matches!(
            PixelArray::new(vec![2, 3], vec![0u8; 5]),
            Err(crate::Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn typed_access() {
        let pixels = PixelArray::new(vec![2, 2], vec![1u16, 2, 3, 4]).unwrap();
        assert_eq!(pixels.pixel_type(), PixelType::UInt16);
        assert_eq!(pixels.shape(), [2, 2]);
        assert_eq!(pixels.as_array::<u16>().unwrap()[[1, 0]], 3);
        assert!(pixels.as_array::<u8>().is_none());
    }

    #[test]
    fn mean_downsampling_averages_blocks() {
        #[rustfmt::skip]
        let data: Vec<u16> = vec![
            0, 2, 10, 10, 7,
            4, 6, 20, 20, 9,
            1, 1, 3, 3, 100,
        ];
        let array = PixelArray::new(vec![3, 5], data).unwrap();
        let out = array.downsample(&[2, 2], Resampling::Mean).unwrap();
        assert_eq!(out.shape(), [2, 3]);
        assert_eq!(
            out.as_array::<u16>().unwrap(),
            &arr2(&[[3u16, 15, 8], [1, 3, 100]]).into_dyn()
        );
    }

    #[test]
    fn nearest_downsampling_keeps_ids() {
        #[rustfmt::skip]
        let data: Vec<u32> = vec![
            1, 2, 3,
            4, 5, 6,
            7, 8, 9,
        ];
        let array = PixelArray::new(vec![1, 3, 3], data).unwrap();
        let out = array.downsample(&[1, 2, 2], Resampling::Nearest).unwrap();
        assert_eq!(out.shape(), [1, 2, 2]);
        assert_eq!(
            out.as_array::<u32>().unwrap(),
            &arr3(&[[[1u32, 3], [7, 9]]]).into_dyn()
        );
    }

    #[test]
    fn downsampling_rejects_bad_factors() {
        let array = PixelArray::new(vec![2, 2], vec![0u8; 4]).unwrap();
        assert!(array.downsample(&[2], Resampling::Mean).is_err());
        assert!(array.downsample(&[0, 2], Resampling::Mean).is_err());
    }

    #[test]
    fn downsampling_is_deterministic() {
        let data: Vec<u8> = (0..64).collect();
        let array = PixelArray::new(vec![8, 8], data).unwrap();
        let a = array.downsample(&[2, 2], Resampling::Mean).unwrap();
        let b = array.downsample(&[2, 2], Resampling::Mean).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bounds_skip_background() {
        #[rustfmt::skip]
        let data: Vec<u16> = vec![
            0, 0, 0, 0,
            0, 3, 3, 0,
            0, 0, 3, 0,
            7, 0, 0, 0,
        ];
        let array = PixelArray::new(vec![4, 4], data).unwrap();
        let bounds = array.label_bounds();
        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[&3], (vec![1, 1], vec![2, 2]));
        assert_eq!(bounds[&7], (vec![3, 0], vec![3, 0]));
        assert!(!bounds.contains_key(&0));
    }

    #[test]
    fn cast_saturates() {
        let pixels = PixelArray::new(vec![3], vec![-5i32, 300, 7]).unwrap();
        assert_eq!(
            pixels.cast(PixelType::UInt8),
            PixelArray::new(vec![3], vec![0u8, 255, 7]).unwrap()
        );
    }

    #[test]
    fn integer_display_range() {
        assert_eq!(PixelType::UInt16.value_range(), (0.0, 65535.0));
        assert_eq!(PixelType::Float32.value_range(), (0.0, 1.0));
    }
}
