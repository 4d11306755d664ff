use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// The OME-NGFF version written by this crate.
pub const NGFF_VERSION: &str = "0.5";

const OME_KEY: &str = "ome";

/// Layout of the NGFF attributes of a node.
///
/// Version 0.4 (Zarr V2) keeps the NGFF keys at the top level of the attributes,
/// version 0.5 (Zarr V3) nests them under `"ome"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NgffLayout {
    TopLevel,
    Nested,
}

/// One axis of a multiscale image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    /// Kept as a string so that it round-trips unchanged.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<String>,
    /// Kept as a string so that it round-trips unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    pub fn new(name: &str, axis_type: &str, unit: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            axis_type: Some(axis_type.to_string()),
            unit: unit.map(str::to_string),
        }
    }

    pub fn is_channel(&self) -> bool {
        match &self.axis_type {
            Some(t) => t == "channel",
            None => self.name == "c",
        }
    }

    pub fn is_spatial(&self) -> bool {
        match &self.axis_type {
            Some(t) => t == "space",
            None => matches!(self.name.as_str(), "x" | "y" | "z"),
        }
    }
}

/// Per-dataset (or per-multiscale) transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Identity,
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub path: String,
    #[serde(default)]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

impl Dataset {
    pub fn with_scale(path: impl Into<String>, scale: Vec<f64>) -> Self {
        Self {
            path: path.into(),
            coordinate_transformations: vec![CoordinateTransformation::Scale { scale }],
        }
    }
}

/// A single entry of the `multiscales` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Multiscale {
    /// Present in 0.4; 0.5 records the version once at the `ome` level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub axes: Vec<Axis>,
    pub datasets: Vec<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate_transformations: Option<Vec<CoordinateTransformation>>,
}

impl Multiscale {
    /// Scale and translation of dataset `index`.
    ///
    /// Multiscale-level transformations apply after the dataset's own.
    /// Axes without an entry get scale 1.0 and translation 0.0.
    fn transform(&self, index: usize) -> crate::Result<(Vec<f64>, Vec<f64>)> {
        let dataset = self.datasets.get(index).ok_or_else(|| {
            crate::Error::not_found(format!("multiscale dataset with index {index}"))
        })?;
        let ndim = self.axes.len();
        let mut scale = vec![1.0; ndim];
        let mut offset = vec![0.0; ndim];
        let global = self.coordinate_transformations.iter().flatten();
        for transformation in dataset.coordinate_transformations.iter().chain(global) {
            let values = match transformation {
                CoordinateTransformation::Identity => continue,
                CoordinateTransformation::Scale { scale } => scale,
                CoordinateTransformation::Translation { translation } => translation,
            };
            if values.len() != ndim {
                return Err(crate::Error::general(format!(
                    "transformation {values:?} does not match {ndim} axes"
                )));
            }
            for i in 0..ndim {
                match transformation {
                    CoordinateTransformation::Scale { .. } => {
                        scale[i] *= values[i];
                        offset[i] *= values[i];
                    }
                    _ => offset[i] += values[i],
                }
            }
        }
        Ok((scale, offset))
    }

    /// Pixel size of dataset `index` along each axis.
    pub fn scale(&self, index: usize) -> crate::Result<Vec<f64>> {
        Ok(self.transform(index)?.0)
    }

    /// Physical position of the first pixel of dataset `index` along each axis.
    pub fn translation(&self, index: usize) -> crate::Result<Vec<f64>> {
        Ok(self.transform(index)?.1)
    }

    pub fn dataset_index(&self, path: &str) -> Option<usize> {
        self.datasets.iter().position(|d| d.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

/// Display metadata of one channel (`omero.channels[i]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wavelength_id: Option<String>,
    /// Hex RGB, e.g. `"00FFFF"`; empty when the source did not record one.
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub window: Window,
    /// Keys this crate does not interpret (`family`, `coefficient`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Omero {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLabelSource {
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLabel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ImageLabelSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// NGFF attributes of an image or label group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttributes {
    pub multiscales: Vec<Multiscale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omero: Option<Omero>,
    #[serde(
        rename = "image-label",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_label: Option<ImageLabel>,
}

/// NGFF attributes of the `labels` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LabelsAttributes {
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateAxisName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateWell {
    pub path: String,
    pub row_index: usize,
    pub column_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub rows: Vec<PlateAxisName>,
    pub columns: Vec<PlateAxisName>,
    pub wells: Vec<PlateWell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateAttributes {
    pub plate: Plate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellImage {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Well {
    pub images: Vec<WellImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellAttributes {
    pub well: Well,
}

/// Locate the NGFF section of a node's attributes.
pub fn ngff_section(attributes: &Map<String, Value>) -> (&Map<String, Value>, NgffLayout) {
    match attributes.get(OME_KEY) {
        Some(Value::Object(ome)) => (ome, NgffLayout::Nested),
        _ => (attributes, NgffLayout::TopLevel),
    }
}

/// Deserialize NGFF attributes written in either layout.
pub fn read_ngff<T: DeserializeOwned>(attributes: &Map<String, Value>) -> crate::Result<T> {
    let (section, _) = ngff_section(attributes);
    Ok(serde_json::from_value(Value::Object(section.clone()))?)
}

/// Serialize NGFF attributes in the nested (0.5) layout.
pub fn write_ngff<T: Serialize>(value: &T) -> crate::Result<Map<String, Value>> {
    let Value::Object(mut section) = serde_json::to_value(value)? else {
        return Err(crate::Error::general(
            "NGFF attributes should serialize to a JSON object",
        ));
    };
    section.insert("version".into(), Value::String(NGFF_VERSION.into()));
    let mut out = Map::new();
    out.insert(OME_KEY.into(), Value::Object(section));
    Ok(out)
}
