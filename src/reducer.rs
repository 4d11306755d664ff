//! Derive a small fixture container from a larger sample dataset.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::container::{ImageSpec, OmeZarrContainer};
use crate::plate::{ImageInWellPath, create_empty_plate};
use crate::region::select_roi;
use crate::roi::Roi;
use crate::table::{RoiTable, TableBackend, build_explicit_table};

/// The registered dataset a default config downloads.
pub const DEFAULT_DATASET: &str = "CardiomyocyteSmall";

/// Where the source dataset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A registered sample dataset, cached below `cache_dir`.
    Download {
        dataset: String,
        cache_dir: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// A container (usually a plate) already on disk.
    Local { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Download {
            dataset: DEFAULT_DATASET.into(),
            cache_dir: PathBuf::from("data/downloaded_dataset"),
            url: None,
        }
    }
}

impl SourceConfig {
    /// Path of the source dataset, downloading it first if needed.
    pub fn resolve(&self) -> crate::Result<PathBuf> {
        match self {
            SourceConfig::Local { path } => Ok(path.clone()),
            #[cfg(feature = "download")]
            SourceConfig::Download {
                dataset,
                cache_dir,
                url,
            } => crate::download::download_dataset(dataset, cache_dir, url.as_deref()),
            #[cfg(not(feature = "download"))]
            SourceConfig::Download { dataset, .. } => Err(crate::Error::general(format!(
                "cannot fetch {dataset:?}: built without the download feature"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub backend: TableBackend,
}

/// A table of nested ROIs sharing the image origin.
///
/// Row `i` keeps the z extent and divides the x and y extents by `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FovTableConfig {
    pub name: String,
    #[serde(default)]
    pub backend: TableBackend,
    pub roi_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    pub source: SourceConfig,
    /// Image inside the source dataset, relative to its root.
    pub image_path: String,
    /// Level of the source image to copy.
    pub source_level: String,
    pub target_path: PathBuf,
    pub target_name: String,
    pub levels: usize,
    pub well: ImageInWellPath,
    /// Crop to `roi_name` in the source table `roi_table` instead of copying the whole image.
    pub crop_to_roi: bool,
    pub roi_table: String,
    pub roi_name: Option<String>,
    /// Copy channel colors and windows as well as labels.
    pub copy_channel_metadata: bool,
    pub wrap_in_plate: bool,
    /// Label to carry over; `None` skips the label and its masking table.
    pub label_name: Option<String>,
    pub masking_table: Option<TableConfig>,
    pub fov_table: Option<FovTableConfig>,
    pub overwrite: bool,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            image_path: "B/03/0".into(),
            source_level: "2".into(),
            target_path: PathBuf::from("data/test_data.zarr"),
            target_name: "Test Dataset".into(),
            levels: 3,
            well: ImageInWellPath::new("A", "01", "0"),
            crop_to_roi: false,
            roi_table: "FOV_ROI_table".into(),
            roi_name: None,
            copy_channel_metadata: true,
            wrap_in_plate: true,
            label_name: Some("nuclei".into()),
            masking_table: Some(TableConfig {
                name: "nuclei_ROI_table".into(),
                backend: TableBackend::Json,
            }),
            fov_table: Some(FovTableConfig {
                name: "FOV_ROI_table".into(),
                backend: TableBackend::Columnar,
                roi_names: (1..=4).map(|i| format!("ROI_{i}")).collect(),
            }),
            overwrite: true,
        }
    }
}

impl ReducerConfig {
    /// Read a JSON config; missing fields take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Where the image container is written.
    pub fn image_container_path(&self) -> PathBuf {
        if self.wrap_in_plate {
            self.target_path
                .join(&self.well.row)
                .join(&self.well.column)
                .join(&self.well.path)
        } else {
            self.target_path.clone()
        }
    }
}

/// What a reduction produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerReport {
    pub container_path: PathBuf,
    pub plate_path: Option<PathBuf>,
    pub roi: Roi,
    pub image_shape: Vec<u64>,
    pub label_shape: Option<Vec<u64>>,
    pub tables: Vec<String>,
    pub is_2d: bool,
    pub is_3d: bool,
}

/// The rows of the nested FOV table for an image spanning `full`.
pub fn nested_rois(full: &Roi, names: &[String]) -> crate::Result<Vec<Roi>> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let shrink = (i + 1) as f64;
            Roi::new(
                name.clone(),
                [full.x, full.y, full.z],
                [full.x_length / shrink, full.y_length / shrink, full.z_length],
            )
        })
        .collect()
}

/// Build the fixture described by `config`.
pub fn reduce_dataset(config: &ReducerConfig) -> crate::Result<ReducerReport> {
    let source_root = config.source.resolve()?;
    let source = OmeZarrContainer::open(source_root.join(&config.image_path))?;
    let source_image = source.get_image(Some(&config.source_level))?;
    info!(
        "Source image {} level {} has shape {:?}",
        source.path().display(),
        config.source_level,
        source_image.shape()
    );

    let roi = if config.crop_to_roi {
        select_roi(&source.get_table(&config.roi_table)?, config.roi_name.as_deref())?
    } else {
        select_roi(&source.build_image_roi_table(Some(&config.source_level))?, None)?
    };
    let source_array = source_image.get_roi(&roi)?;

    let plate_path = if config.wrap_in_plate {
        let plate = create_empty_plate(
            &config.target_path,
            &config.target_name,
            std::slice::from_ref(&config.well),
            config.overwrite,
        )?;
        Some(plate.path().to_path_buf())
    } else {
        None
    };

    let mut spec = ImageSpec::new(
        source_array.shape(),
        source_image.axes().to_vec(),
        source_image.pixel_size().as_slice().to_vec(),
        source_image.pixel_type(),
    )
    .with_levels(config.levels)
    .with_name(config.target_name.clone());
    let source_channels = source_image.channels();
    if !source_channels.is_empty() {
        spec = if config.copy_channel_metadata {
            spec.with_channels(source_channels.to_vec())
        } else {
            spec.with_channel_labels(source_image.channel_labels())
        };
    }
    let target = OmeZarrContainer::create(config.image_container_path(), &spec, config.overwrite)?;

    let target_image = target.get_image(None)?;
    target_image.set_array(&source_array)?;
    target_image.consolidate()?;

    let mut tables = Vec::new();
    let mut label_shape = None;
    if let Some(label_name) = &config.label_name {
        let source_label = source.get_label(label_name, Some(source_image.pixel_size()))?;
        let label_array = source_label.get_roi(&roi)?;
        let target_label = target.derive_label(label_name, &target_image, true)?;
        target_label.set_array(&label_array.cast(target_label.pixel_type()))?;
        target_label.consolidate()?;
        label_shape = Some(target_label.shape().to_vec());

        if let Some(masking) = &config.masking_table {
            if masking.backend == TableBackend::Columnar {
                warn!(
                    "Masking table {:?} requested with the columnar backend; readers expecting json may reject it",
                    masking.name
                );
            }
            let table = target_label.build_masking_roi_table()?;
            target.add_table(&masking.name, &table, masking.backend, true)?;
            tables.push(masking.name.clone());
        }
    }

    if let Some(fov) = &config.fov_table {
        let full = target_image.full_roi("image");
        let table: RoiTable = build_explicit_table(nested_rois(&full, &fov.roi_names)?)?;
        target.add_table(&fov.name, &table, fov.backend, true)?;
        tables.push(fov.name.clone());
    }

    let report = ReducerReport {
        container_path: target.path().to_path_buf(),
        plate_path,
        roi,
        image_shape: target_image.shape().to_vec(),
        label_shape,
        tables,
        is_2d: target_image.is_2d(),
        is_3d: target_image.is_3d(),
    };
    info!(
        "Wrote {} (is_2d={}, is_3d={})",
        report.container_path.display(),
        report.is_2d,
        report.is_3d
    );
    Ok(report)
}

/// Open the container at `path` and print the table `table_name` to stdout.
pub fn print_roi_table(path: impl AsRef<Path>, table_name: &str) -> crate::Result<RoiTable> {
    let container = OmeZarrContainer::open(path)?;
    let table = container.get_table(table_name)?;
    println!("{table_name} ({} rows):", table.len());
    print!("{table}");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: ReducerConfig = serde_json::from_str(
            r#"{"source": {"kind": "local", "path": "source.zarr"}, "levels": 2}"#,
        )
        .unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Local {
                path: "source.zarr".into()
            }
        );
        assert_eq!(config.levels, 2);
        assert_eq!(config.image_path, "B/03/0");
        assert_eq!(config.source_level, "2");
        assert_eq!(
            config.image_container_path(),
            PathBuf::from("data/test_data.zarr/A/01/0")
        );
        assert!(matches!(
            ReducerConfig::default().source,
            SourceConfig::Download { dataset, .. } if dataset == "CardiomyocyteSmall"
        ));
        let fov = config.fov_table.unwrap();
        assert_eq!(fov.roi_names, ["ROI_1", "ROI_2", "ROI_3", "ROI_4"]);
    }

    #[test]
    fn nested_rois_shrink_in_xy() {
        let full = Roi::new("image", [0.0; 3], [100.0, 60.0, 10.0]).unwrap();
        let names: Vec<String> = (1..=4).map(|i| format!("ROI_{i}")).collect();
        let rois = nested_rois(&full, &names).unwrap();
        assert_eq!(rois.len(), 4);
        assert_eq!(rois[0].x_length, 100.0);
        assert_eq!(rois[3].x_length, 25.0);
        assert_eq!(rois[3].y_length, 15.0);
        assert!(rois.iter().all(|r| r.z_length == 10.0));
    }
}
