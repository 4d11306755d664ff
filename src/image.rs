//! Handles on the levels of image and label pyramids.

use std::ops::Deref;

use log::{debug, info};
use zarrs::array::Array;
use zarrs::group::Group;

use crate::axes::{PixelSize, level_factors};
use crate::metadata::{Axis, Channel, ImageAttributes, Multiscale, read_ngff};
use crate::pixel::{PixelArray, PixelType, Resampling, ZarrArray, read_subset, write_subset};
use crate::roi::Roi;
use crate::storage::{Store, join_node_path};
use crate::table::{RoiTable, build_masking_table};

/// A multiscale group: metadata plus the arrays of every level.
#[derive(Clone)]
pub struct Pyramid {
    store: Store,
    path: String,
    attributes: ImageAttributes,
    resampling: Resampling,
}

impl std::fmt::Debug for Pyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pyramid")
            .field("path", &self.path)
            .field("levels", &self.level_paths())
            .field("resampling", &self.resampling)
            .finish()
    }
}

impl Pyramid {
    pub(crate) fn open(store: Store, path: &str, resampling: Resampling) -> crate::Result<Self> {
        let group = Group::open(store.clone(), path)
            .map_err(|e| crate::Error::not_found(format!("group at {path}: {e}")))?;
        if !group.attributes().contains_key("multiscales")
            && !group
                .attributes()
                .get("ome")
                .and_then(|ome| ome.get("multiscales"))
                .is_some()
        {
            return Err(crate::Error::not_found(format!(
                "multiscales metadata at {path}"
            )));
        }
        let attributes: ImageAttributes = read_ngff(group.attributes())?;
        if attributes.multiscales.is_empty() {
            return Err(crate::Error::not_found(format!(
                "multiscales metadata at {path}"
            )));
        }
        Ok(Self {
            store,
            path: path.to_string(),
            attributes,
            resampling,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attributes(&self) -> &ImageAttributes {
        &self.attributes
    }

    pub fn multiscale(&self) -> &Multiscale {
        &self.attributes.multiscales[0]
    }

    pub fn axes(&self) -> &[Axis] {
        &self.multiscale().axes
    }

    pub fn num_levels(&self) -> usize {
        self.multiscale().datasets.len()
    }

    pub fn level_paths(&self) -> Vec<&str> {
        self.multiscale()
            .datasets
            .iter()
            .map(|d| d.path.as_str())
            .collect()
    }

    pub fn pixel_size(&self, index: usize) -> crate::Result<PixelSize> {
        PixelSize::new(self.axes(), self.multiscale().scale(index)?)
    }

    /// Physical position (x, y, z) of the first pixel of level `index`.
    pub fn origin(&self, index: usize) -> crate::Result<[f64; 3]> {
        let translation = self.multiscale().translation(index)?;
        let mut out = [0.0; 3];
        for (axis, t) in self.axes().iter().zip(translation) {
            match axis.name.as_str() {
                "x" => out[0] = t,
                "y" => out[1] = t,
                "z" => out[2] = t,
                _ => {}
            }
        }
        Ok(out)
    }

    fn open_array(&self, index: usize) -> crate::Result<ZarrArray> {
        let dataset = &self.multiscale().datasets[index];
        let array_path = join_node_path(&self.path, &dataset.path);
        Array::open(self.store.clone(), &array_path).map_err(crate::Error::wrap)
    }

    pub fn level(&self, index: usize) -> crate::Result<Level> {
        if index >= self.num_levels() {
            return Err(crate::Error::not_found(format!(
                "level {index} of {} ({} levels)",
                self.path,
                self.num_levels()
            )));
        }
        let array = self.open_array(index)?;
        let pixel_type = PixelType::of_array(&array)?;
        let pixel_size = self.pixel_size(index)?;
        let origin = self.origin(index)?;
        if array.shape().len() != self.axes().len() {
            return Err(crate::Error::shape_mismatch(format!(
                "level {index} of {} has {} dimensions but {} axes are declared",
                self.path,
                array.shape().len(),
                self.axes().len()
            )));
        }
        Ok(Level {
            pyramid: self.clone(),
            index,
            shape: array.shape().to_vec(),
            pixel_type,
            pixel_size,
            origin,
        })
    }

    pub fn level_by_path(&self, path: &str) -> crate::Result<Level> {
        let index = self
            .multiscale()
            .dataset_index(path)
            .ok_or_else(|| crate::Error::not_found(format!("level {path:?} of {}", self.path)))?;
        self.level(index)
    }

    /// The level whose pixel size is closest to `pixel_size`.
    pub fn level_for_pixel_size(&self, pixel_size: &PixelSize) -> crate::Result<Level> {
        let mut best: Option<(usize, f64)> = None;
        for index in 0..self.num_levels() {
            let distance = self.pixel_size(index)?.spatial_distance(pixel_size);
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }
        let (index, distance) = best.ok_or_else(|| {
            crate::Error::not_found(format!("any level of {}", self.path))
        })?;
        if distance > 1e-6 {
            debug!(
                "No exact pixel size match in {}; using level {index} (distance {distance})",
                self.path
            );
        }
        self.level(index)
    }

    /// Regenerate every level below the base from the base.
    pub fn consolidate(&self) -> crate::Result<()> {
        let base = self.level(0)?;
        let factors = level_factors(self.axes());
        let mut current = base.get_array()?;
        for index in 1..self.num_levels() {
            current = current.downsample(&factors, self.resampling)?;
            let array = self.open_array(index)?;
            if array.shape() != current.shape().as_slice() {
                return Err(crate::Error::shape_mismatch(format!(
                    "level {index} of {} has shape {:?}, downsampled base has {:?}",
                    self.path,
                    array.shape(),
                    current.shape()
                )));
            }
            write_subset(&array, &array.subset_all(), &current)?;
        }
        info!(
            "Consolidated {} levels of {}",
            self.num_levels(),
            self.path
        );
        Ok(())
    }
}

/// One level of a [`Pyramid`].
#[derive(Debug, Clone)]
pub struct Level {
    pyramid: Pyramid,
    index: usize,
    shape: Vec<u64>,
    pixel_type: PixelType,
    pixel_size: PixelSize,
    origin: [f64; 3],
}

impl Level {
    pub fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn level_path(&self) -> &str {
        &self.pyramid.multiscale().datasets[self.index].path
    }

    pub fn axes(&self) -> &[Axis] {
        self.pyramid.axes()
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn node_path(&self) -> String {
        join_node_path(&self.pyramid.path, self.level_path())
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn pixel_size(&self) -> &PixelSize {
        &self.pixel_size
    }

    /// Physical position (x, y, z) of the first pixel.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn num_levels(&self) -> usize {
        self.pyramid.num_levels()
    }

    fn axis_len(&self, name: &str) -> Option<u64> {
        crate::axes::axis_index(self.axes(), name).map(|i| self.shape()[i])
    }

    pub fn is_3d(&self) -> bool {
        self.axis_len("z").is_some_and(|n| n > 1)
    }

    pub fn is_2d(&self) -> bool {
        !self.is_3d()
    }

    pub fn is_time_series(&self) -> bool {
        self.axis_len("t").is_some_and(|n| n > 1)
    }

    /// The whole level.
    pub fn get_array(&self) -> crate::Result<PixelArray> {
        let array = self.pyramid.open_array(self.index)?;
        read_subset(&array, self.pixel_type, &array.subset_all())
    }

    /// The part of this level covered by `roi`, given in physical coordinates.
    pub fn get_roi(&self, roi: &Roi) -> crate::Result<PixelArray> {
        let local = roi.translated(self.origin.map(|o| -o));
        let subset = local.to_subset(self.axes(), &self.pixel_size, self.shape())?;
        let array = self.pyramid.open_array(self.index)?;
        read_subset(&array, self.pixel_type, &subset)
    }

    /// Replace the whole level.
    ///
    /// Fails with [`crate::Error::ShapeMismatch`] unless `pixels` matches the declared shape and type.
    pub fn set_array(&self, pixels: &PixelArray) -> crate::Result<()> {
        if pixels.shape().as_slice() != self.shape() {
            return Err(crate::Error::shape_mismatch(format!(
                "cannot write an array of shape {:?} into {} of shape {:?}",
                pixels.shape(),
                self.node_path(),
                self.shape()
            )));
        }
        if pixels.pixel_type() != self.pixel_type {
            return Err(crate::Error::shape_mismatch(format!(
                "cannot write {} pixels into {} of type {}",
                pixels.pixel_type(),
                self.node_path(),
                self.pixel_type
            )));
        }
        let array = self.pyramid.open_array(self.index)?;
        write_subset(&array, &array.subset_all(), pixels)
    }

    /// See [`Pyramid::consolidate`].
    pub fn consolidate(&self) -> crate::Result<()> {
        self.pyramid.consolidate()
    }

    /// An ROI spanning this whole level.
    pub fn full_roi(&self, name: &str) -> Roi {
        Roi::full_extent(name, self.axes(), &self.pixel_size, self.shape()).translated(self.origin)
    }
}

/// A level of an intensity image.
#[derive(Debug, Clone)]
pub struct Image {
    level: Level,
}

impl Image {
    pub(crate) fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn channels(&self) -> &[Channel] {
        self.level
            .pyramid
            .attributes
            .omero
            .as_ref()
            .map_or(&[], |o| o.channels.as_slice())
    }

    pub fn channel_labels(&self) -> Vec<String> {
        self.channels().iter().map(|c| c.label.clone()).collect()
    }
}

impl Deref for Image {
    type Target = Level;

    fn deref(&self) -> &Self::Target {
        &self.level
    }
}

/// A level of a label image.
#[derive(Debug, Clone)]
pub struct Label {
    name: String,
    level: Level,
}

impl Label {
    pub(crate) fn new(name: &str, level: Level) -> Self {
        Self {
            name: name.to_string(),
            level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The base level of the same label.
    pub fn base(&self) -> crate::Result<Label> {
        if self.level.index == 0 {
            return Ok(self.clone());
        }
        Ok(Self::new(&self.name, self.level.pyramid.level(0)?))
    }

    /// See [`crate::table::build_masking_table`].
    pub fn build_masking_roi_table(&self) -> crate::Result<RoiTable> {
        build_masking_table(self)
    }
}

impl Deref for Label {
    type Target = Level;

    fn deref(&self) -> &Self::Target {
        &self.level
    }
}
