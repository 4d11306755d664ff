//! Open and create single-image OME-Zarr containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use zarrs::array::codec::GzipCodec;
use zarrs::group::{Group, GroupBuilder};

use crate::axes::{PixelSize, default_chunks, level_scales, level_shapes};
use crate::image::{Image, Label, Pyramid};
use crate::metadata::{
    Axis, Channel, Dataset, ImageAttributes, ImageLabel, ImageLabelSource, LabelsAttributes,
    Multiscale, Omero, Window, read_ngff, write_ngff,
};
use crate::pixel::{PixelType, Resampling};
use crate::roi::Roi;
use crate::storage::{Store, create_store, erase_node, join_node_path, node_exists, open_store};
use crate::table::{self, RoiTable, TableBackend};

const LABELS_PATH: &str = "/labels";
const TABLES_PATH: &str = "/tables";
const IMAGE_ROI_NAME: &str = "image";
const LABEL_PIXEL_TYPE: PixelType = PixelType::UInt32;
const GZIP_LEVEL: u32 = 5;

/// Default channel colors, cycled through when no display metadata is given.
pub const DEFAULT_COLORS: [&str; 7] = [
    "00FFFF", "FF00FF", "FFFF00", "FF0000", "00FF00", "0000FF", "FFFFFF",
];

/// Geometry and metadata of a new image container.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    pub shape: Vec<u64>,
    pub axes: Vec<Axis>,
    /// Pixel size of the base level, aligned with `axes`.
    pub scale: Vec<f64>,
    pub pixel_type: PixelType,
    pub levels: usize,
    pub name: Option<String>,
    pub channel_labels: Option<Vec<String>>,
    /// Full display metadata; takes precedence over `channel_labels`.
    pub channels: Option<Vec<Channel>>,
    pub chunks: Option<Vec<u64>>,
}

impl ImageSpec {
    pub fn new(shape: Vec<u64>, axes: Vec<Axis>, scale: Vec<f64>, pixel_type: PixelType) -> Self {
        Self {
            shape,
            axes,
            scale,
            pixel_type,
            levels: 1,
            name: None,
            channel_labels: None,
            channels: None,
            chunks: None,
        }
    }

    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_channel_labels(mut self, labels: Vec<String>) -> Self {
        self.channel_labels = Some(labels);
        self
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_chunks(mut self, chunks: Vec<u64>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    fn num_channels(&self) -> u64 {
        self.axes
            .iter()
            .position(Axis::is_channel)
            .map_or(1, |i| self.shape[i])
    }

    fn validate(&self) -> crate::Result<()> {
        let ndim = self.shape.len();
        if self.axes.len() != ndim || self.scale.len() != ndim {
            return Err(crate::Error::shape_mismatch(format!(
                "shape {:?}, {} axes and {} scale values do not agree",
                self.shape,
                self.axes.len(),
                self.scale.len()
            )));
        }
        if let Some(chunks) = &self.chunks {
            if chunks.len() != ndim || chunks.contains(&0) {
                return Err(crate::Error::shape_mismatch(format!(
                    "invalid chunk shape {chunks:?} for shape {:?}",
                    self.shape
                )));
            }
        }
        if self.levels == 0 {
            return Err(crate::Error::general("an image needs at least one level"));
        }
        let n = self.num_channels() as usize;
        if let Some(channels) = &self.channels {
            if channels.len() != n {
                return Err(crate::Error::shape_mismatch(format!(
                    "{} channel descriptors for {n} channels",
                    channels.len()
                )));
            }
        }
        if let Some(labels) = &self.channel_labels {
            if labels.len() != n {
                return Err(crate::Error::shape_mismatch(format!(
                    "{} channel labels for {n} channels",
                    labels.len()
                )));
            }
        }
        Ok(())
    }

    /// The channel display metadata to write.
    ///
    /// Fails like [`OmeZarrContainer::create`] when the channel descriptors or labels
    /// do not match the channel axis. Descriptors without a color get one from the palette.
    pub fn resolved_channels(&self) -> crate::Result<Vec<Channel>> {
        self.validate()?;
        if let Some(channels) = &self.channels {
            return Ok(channels
                .iter()
                .enumerate()
                .map(|(i, channel)| {
                    let mut channel = channel.clone();
                    if channel.color.is_empty() {
                        channel.color = palette_color(i);
                    }
                    channel
                })
                .collect());
        }
        let (start, end) = self.pixel_type.value_range();
        let labels = self.channel_labels.as_deref().unwrap_or_default();
        Ok((0..self.num_channels() as usize)
            .map(|i| Channel {
                label: labels
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("channel_{i}")),
                wavelength_id: None,
                color: palette_color(i),
                active: true,
                window: Window {
                    start,
                    end,
                    min: start,
                    max: end,
                },
                extra: Default::default(),
            })
            .collect())
    }
}

fn palette_color(index: usize) -> String {
    DEFAULT_COLORS[index % DEFAULT_COLORS.len()].to_string()
}

/// Create one array per level and return the multiscale metadata describing them.
#[allow(clippy::too_many_arguments)]
fn create_levels(
    store: &Store,
    group_path: &str,
    axes: &[Axis],
    shapes: &[Vec<u64>],
    scales: &[Vec<f64>],
    pixel_type: PixelType,
    chunks: Option<&[u64]>,
    name: Option<String>,
) -> crate::Result<Multiscale> {
    let dimension_names: Vec<&str> = axes.iter().map(|a| a.name.as_str()).collect();
    let mut datasets = Vec::with_capacity(shapes.len());
    for (index, (shape, scale)) in shapes.iter().zip(scales).enumerate() {
        let level_chunks: Vec<u64> = match chunks {
            Some(c) => c.iter().zip(shape).map(|(c, n)| (*c).min(*n).max(1)).collect(),
            None => default_chunks(axes, shape),
        };
        let codecs: Vec<Arc<dyn zarrs_codec::BytesToBytesCodecTraits>> =
            vec![Arc::new(GzipCodec::new(GZIP_LEVEL).map_err(crate::Error::wrap)?)];
        let path = index.to_string();
        let array = pixel_type
            .array_builder(shape.clone(), level_chunks)
            .bytes_to_bytes_codecs(codecs)
            .dimension_names(Some(dimension_names.clone()))
            .build(store.clone(), &join_node_path(group_path, &path))
            .map_err(crate::Error::wrap)?;
        array.store_metadata().map_err(crate::Error::wrap)?;
        datasets.push(Dataset::with_scale(path, scale.clone()));
    }
    Ok(Multiscale {
        version: None,
        name,
        axes: axes.to_vec(),
        datasets,
        coordinate_transformations: None,
    })
}

fn store_group(
    store: &Store,
    path: &str,
    attributes: serde_json::Map<String, serde_json::Value>,
) -> crate::Result<()> {
    let group = GroupBuilder::new()
        .attributes(attributes)
        .build(store.clone(), path)
        .map_err(crate::Error::wrap)?;
    group.store_metadata().map_err(crate::Error::wrap)
}

/// An OME-Zarr image container: one image pyramid, optional labels and tables.
#[derive(Clone)]
pub struct OmeZarrContainer {
    root: PathBuf,
    store: Store,
    image: Pyramid,
}

impl std::fmt::Debug for OmeZarrContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmeZarrContainer")
            .field("root", &self.root)
            .field("image", &self.image)
            .finish()
    }
}

impl OmeZarrContainer {
    /// Open an existing container.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let root = path.as_ref().to_path_buf();
        let store = open_store(&root)?;
        let image = Pyramid::open(store.clone(), "/", Resampling::Mean)?;
        Ok(Self { root, store, image })
    }

    /// Create an empty container at `path` with the geometry of `spec`.
    pub fn create(path: impl AsRef<Path>, spec: &ImageSpec, overwrite: bool) -> crate::Result<Self> {
        spec.validate()?;
        let root = path.as_ref().to_path_buf();
        let store = create_store(&root, overwrite)?;

        let shapes = level_shapes(&spec.axes, &spec.shape, spec.levels);
        let scales = level_scales(&spec.axes, &spec.scale, spec.levels);
        let multiscale = create_levels(
            &store,
            "/",
            &spec.axes,
            &shapes,
            &scales,
            spec.pixel_type,
            spec.chunks.as_deref(),
            spec.name.clone(),
        )?;
        let attributes = ImageAttributes {
            multiscales: vec![multiscale],
            omero: Some(Omero {
                channels: spec.resolved_channels()?,
                extra: Default::default(),
            }),
            image_label: None,
        };
        store_group(&store, "/", write_ngff(&attributes)?)?;
        info!(
            "Created container at {} with shape {:?} and {} levels",
            root.display(),
            spec.shape,
            spec.levels
        );

        let image = Pyramid::open(store.clone(), "/", Resampling::Mean)?;
        Ok(Self { root, store, image })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn pyramid(&self) -> &Pyramid {
        &self.image
    }

    pub fn level_paths(&self) -> Vec<&str> {
        self.image.level_paths()
    }

    /// The image at level `path`, or the base level.
    pub fn get_image(&self, path: Option<&str>) -> crate::Result<Image> {
        let level = match path {
            Some(p) => self.image.level_by_path(p)?,
            None => self.image.level(0)?,
        };
        Ok(Image::new(level))
    }

    /// A single-row table with the full extent of the image at level `path`.
    pub fn build_image_roi_table(&self, path: Option<&str>) -> crate::Result<RoiTable> {
        let image = self.get_image(path)?;
        RoiTable::new(vec![image.full_roi(IMAGE_ROI_NAME)])
    }

    fn labels_attributes(&self) -> crate::Result<LabelsAttributes> {
        if !node_exists(&self.store, LABELS_PATH)? {
            return Ok(LabelsAttributes::default());
        }
        let group = Group::open(self.store.clone(), LABELS_PATH).map_err(crate::Error::wrap)?;
        read_ngff(group.attributes())
    }

    pub fn list_labels(&self) -> crate::Result<Vec<String>> {
        Ok(self.labels_attributes()?.labels)
    }

    /// The label called `name`, at the level closest to `pixel_size` or the base level.
    pub fn get_label(&self, name: &str, pixel_size: Option<&PixelSize>) -> crate::Result<Label> {
        let path = join_node_path(LABELS_PATH, name);
        if !node_exists(&self.store, &path)? {
            return Err(crate::Error::not_found(format!(
                "label {name:?} in {}",
                self.root.display()
            )));
        }
        let pyramid = Pyramid::open(self.store.clone(), &path, Resampling::Nearest)?;
        let level = match pixel_size {
            Some(px) => pyramid.level_for_pixel_size(px)?,
            None => pyramid.level(0)?,
        };
        Ok(Label::new(name, level))
    }

    /// Create an empty label aligned with `reference`.
    ///
    /// The label has the pyramid depth, pixel sizes and shape of `reference`
    /// with the channel axis removed, whatever the source of its pixels.
    pub fn derive_label(
        &self,
        name: &str,
        reference: &Image,
        overwrite: bool,
    ) -> crate::Result<Label> {
        let path = join_node_path(LABELS_PATH, name);
        if node_exists(&self.store, &path)? {
            if !overwrite {
                return Err(crate::Error::AlreadyExists(format!(
                    "label {name:?} in {}",
                    self.root.display()
                )));
            }
            erase_node(&self.store, &path)?;
        }

        let pyramid = reference.pyramid();
        let keep: Vec<usize> = (0..pyramid.axes().len())
            .filter(|&i| !pyramid.axes()[i].is_channel())
            .collect();
        let axes: Vec<Axis> = keep.iter().map(|&i| pyramid.axes()[i].clone()).collect();
        let mut shapes = Vec::with_capacity(pyramid.num_levels());
        let mut scales = Vec::with_capacity(pyramid.num_levels());
        for index in 0..pyramid.num_levels() {
            let level = pyramid.level(index)?;
            shapes.push(keep.iter().map(|&i| level.shape()[i]).collect::<Vec<_>>());
            let scale = level.pixel_size().as_slice();
            scales.push(keep.iter().map(|&i| scale[i]).collect::<Vec<_>>());
        }

        let multiscale = create_levels(
            &self.store,
            &path,
            &axes,
            &shapes,
            &scales,
            LABEL_PIXEL_TYPE,
            None,
            Some(name.to_string()),
        )?;
        let attributes = ImageAttributes {
            multiscales: vec![multiscale],
            omero: None,
            image_label: Some(ImageLabel {
                source: Some(ImageLabelSource {
                    image: "../../".into(),
                }),
                extra: Default::default(),
            }),
        };
        store_group(&self.store, &path, write_ngff(&attributes)?)?;

        let mut labels = self.labels_attributes()?;
        if !labels.labels.iter().any(|l| l == name) {
            labels.labels.push(name.to_string());
        }
        store_group(&self.store, LABELS_PATH, write_ngff(&labels)?)?;
        info!("Derived label {name:?} with {} levels", shapes.len());

        self.get_label(name, None)
    }

    pub fn list_tables(&self) -> crate::Result<Vec<String>> {
        table::list_tables(&self.store, TABLES_PATH)
    }

    /// Attach `table` under `name`.
    pub fn add_table(
        &self,
        name: &str,
        table: &RoiTable,
        backend: TableBackend,
        overwrite: bool,
    ) -> crate::Result<()> {
        table::write_table(&self.store, TABLES_PATH, name, table, backend, overwrite)
    }

    pub fn get_table(&self, name: &str) -> crate::Result<RoiTable> {
        table::read_table(&self.store, TABLES_PATH, name)
    }

    /// Look up a single ROI by name in the table `table_name`.
    pub fn get_roi(&self, table_name: &str, roi_name: &str) -> crate::Result<Roi> {
        let table = self.get_table(table_name)?;
        table
            .get(roi_name)
            .cloned()
            .ok_or_else(|| crate::Error::not_found(format!("ROI {roi_name:?} in {table_name}")))
    }
}
