//! ROI tables: the json and columnar backends written here, plus AnnData tables read from other tools.

use std::fmt::Display;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use zarrs::array::Array;
use zarrs::group::{Group, GroupBuilder};

use crate::image::Label;
use crate::pixel::{PixelArray, PixelType, read_subset, write_subset};
use crate::roi::Roi;
use crate::storage::{Store, erase_node, join_node_path, node_exists};

const COORDINATE_COLUMNS: [&str; 6] = [
    "x_micrometer",
    "y_micrometer",
    "z_micrometer",
    "len_x_micrometer",
    "len_y_micrometer",
    "len_z_micrometer",
];
const LABEL_COLUMN: &str = "label";

/// The label group a masking table refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegion {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableKind {
    /// Caller supplied rows.
    RoiTable,
    /// One row per instance of a label.
    MaskingRoiTable {
        region: TableRegion,
        instance_key: String,
    },
}

/// How a table is laid out in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableBackend {
    /// Rows as a JSON array in the table group's attributes.
    #[default]
    Json,
    /// One 1-D array per column.
    Columnar,
}

impl Display for TableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableBackend::Json => f.write_str("json"),
            TableBackend::Columnar => f.write_str("columnar"),
        }
    }
}

/// An ordered list of ROIs.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiTable {
    kind: TableKind,
    rois: Vec<Roi>,
}

impl RoiTable {
    pub fn new(rois: Vec<Roi>) -> crate::Result<Self> {
        build_explicit_table(rois)
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rois.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Roi> {
        self.rois.iter().find(|r| r.name == name)
    }

    pub fn is_masking(&self) -> bool {
        matches!(self.kind, TableKind::MaskingRoiTable { .. })
    }
}

impl Display for RoiTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .rois
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max(4);
        write!(f, "{:<width$}", "name")?;
        for column in COORDINATE_COLUMNS {
            write!(f, " {column:>16}")?;
        }
        if self.is_masking() {
            write!(f, " {LABEL_COLUMN:>8}")?;
        }
        writeln!(f)?;
        for roi in &self.rois {
            write!(f, "{:<width$}", roi.name)?;
            for value in [roi.x, roi.y, roi.z, roi.x_length, roi.y_length, roi.z_length] {
                write!(f, " {value:>16.4}")?;
            }
            if self.is_masking() {
                match roi.label {
                    Some(id) => write!(f, " {id:>8}")?,
                    None => write!(f, " {:>8}", "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Wrap caller rows, checking only that every ROI is well-formed.
pub fn build_explicit_table(rois: Vec<Roi>) -> crate::Result<RoiTable> {
    for roi in &rois {
        roi.validate()?;
    }
    Ok(RoiTable {
        kind: TableKind::RoiTable,
        rois,
    })
}

/// One ROI per instance of `label`, bounding its voxels at the base level.
///
/// Rows are in ascending ID order and named by ID. Background (0) is skipped.
pub fn build_masking_table(label: &Label) -> crate::Result<RoiTable> {
    let base = label.base()?;
    let pixels = base.get_array()?;
    let rois = pixels
        .label_bounds()
        .into_iter()
        .map(|(id, (lo, hi))| {
            Roi::from_pixel_bounds(id.to_string(), base.axes(), base.pixel_size(), &lo, &hi)
                .translated(base.origin())
                .with_label(id)
        })
        .collect::<Vec<_>>();
    debug!("Found {} instances in label {:?}", rois.len(), label.name());
    Ok(RoiTable {
        kind: TableKind::MaskingRoiTable {
            region: TableRegion {
                path: format!("../labels/{}", label.name()),
            },
            instance_key: LABEL_COLUMN.to_string(),
        },
        rois,
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TablesAttributes {
    #[serde(default)]
    tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableHeader {
    backend: TableBackend,
    table_info: TableKind,
}

fn read_group_attributes(store: &Store, path: &str) -> crate::Result<Map<String, Value>> {
    let group = Group::open(store.clone(), path).map_err(crate::Error::wrap)?;
    Ok(group.attributes().clone())
}

fn store_group(store: &Store, path: &str, attributes: Map<String, Value>) -> crate::Result<()> {
    let group = GroupBuilder::new()
        .attributes(attributes)
        .build(store.clone(), path)
        .map_err(crate::Error::wrap)?;
    group.store_metadata().map_err(crate::Error::wrap)
}

fn to_attributes(value: Value) -> crate::Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(crate::Error::general("table attributes must be an object")),
    }
}

/// Names of the tables attached below `tables_path`.
pub(crate) fn list_tables(store: &Store, tables_path: &str) -> crate::Result<Vec<String>> {
    if !node_exists(store, tables_path)? {
        return Ok(Vec::new());
    }
    let attributes = read_group_attributes(store, tables_path)?;
    let tables: TablesAttributes = serde_json::from_value(Value::Object(attributes))?;
    Ok(tables.tables)
}

pub(crate) fn write_table(
    store: &Store,
    tables_path: &str,
    name: &str,
    table: &RoiTable,
    backend: TableBackend,
    overwrite: bool,
) -> crate::Result<()> {
    let path = join_node_path(tables_path, name);
    if node_exists(store, &path)? {
        if !overwrite {
            return Err(crate::Error::AlreadyExists(format!("table {name:?}")));
        }
        erase_node(store, &path)?;
    }

    let header = TableHeader {
        backend,
        table_info: table.kind.clone(),
    };
    let mut attributes = to_attributes(serde_json::to_value(&header)?)?;
    match backend {
        TableBackend::Json => {
            attributes.insert("rois".into(), serde_json::to_value(&table.rois)?);
        }
        TableBackend::Columnar => {
            attributes.insert("row_names".into(), json!(table.names()));
            write_columns(store, &path, table)?;
        }
    }
    store_group(store, &path, attributes)?;

    let mut tables = list_tables(store, tables_path)?;
    if !tables.iter().any(|t| t == name) {
        tables.push(name.to_string());
    }
    store_group(
        store,
        tables_path,
        to_attributes(serde_json::to_value(TablesAttributes { tables })?)?,
    )?;
    info!(
        "Wrote table {name:?} with {} rows ({backend} backend)",
        table.len()
    );
    Ok(())
}

fn write_column(store: &Store, path: &str, pixels: &PixelArray) -> crate::Result<()> {
    let rows = pixels.shape()[0];
    let array = pixels
        .pixel_type()
        .array_builder(vec![rows], vec![rows.max(1)])
        .dimension_names(Some(["row"]))
        .build(store.clone(), path)
        .map_err(crate::Error::wrap)?;
    array.store_metadata().map_err(crate::Error::wrap)?;
    write_subset(&array, &array.subset_all(), pixels)
}

fn write_columns(store: &Store, path: &str, table: &RoiTable) -> crate::Result<()> {
    let rows = table.len() as u64;
    let columns: [fn(&Roi) -> f64; 6] = [
        |r| r.x,
        |r| r.y,
        |r| r.z,
        |r| r.x_length,
        |r| r.y_length,
        |r| r.z_length,
    ];
    for (name, column) in COORDINATE_COLUMNS.iter().zip(columns) {
        let values: Vec<f64> = table.rois.iter().map(column).collect();
        write_column(
            store,
            &join_node_path(path, name),
            &PixelArray::new(vec![rows], values)?,
        )?;
    }
    if table.is_masking() {
        let labels: Vec<u64> = table.rois.iter().map(|r| r.label.unwrap_or(0)).collect();
        write_column(
            store,
            &join_node_path(path, LABEL_COLUMN),
            &PixelArray::new(vec![rows], labels)?,
        )?;
    }
    Ok(())
}

fn read_column(store: &Store, path: &str, pixel_type: PixelType, rows: usize) -> crate::Result<PixelArray> {
    let array = Array::open(store.clone(), path).map_err(crate::Error::wrap)?;
    let stored = PixelType::of_array(&array)?;
    let pixels = read_subset(&array, stored, &array.subset_all())?;
    if pixels.shape() != [rows as u64] {
        return Err(crate::Error::shape_mismatch(format!(
            "column {path} has shape {:?}, expected {rows} rows",
            pixels.shape()
        )));
    }
    Ok(pixels.cast(pixel_type))
}

fn read_f64_column(store: &Store, path: &str, rows: usize) -> crate::Result<Vec<f64>> {
    let pixels = read_column(store, path, PixelType::Float64, rows)?;
    pixels
        .as_array::<f64>()
        .map(|a| a.iter().copied().collect())
        .ok_or_else(|| crate::Error::general(format!("column {path} is not float64")))
}

fn read_columns(
    store: &Store,
    path: &str,
    kind: &TableKind,
    names: Vec<String>,
) -> crate::Result<Vec<Roi>> {
    let rows = names.len();
    let mut columns = Vec::with_capacity(COORDINATE_COLUMNS.len());
    for column in COORDINATE_COLUMNS {
        columns.push(read_f64_column(store, &join_node_path(path, column), rows)?);
    }
    let labels = match kind {
        TableKind::MaskingRoiTable { .. } => {
            let pixels = read_column(
                store,
                &join_node_path(path, LABEL_COLUMN),
                PixelType::UInt64,
                rows,
            )?;
            pixels
                .as_array::<u64>()
                .map(|a| a.iter().copied().collect::<Vec<_>>())
        }
        TableKind::RoiTable => None,
    };
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut roi = Roi::new(
                name,
                [columns[0][i], columns[1][i], columns[2][i]],
                [columns[3][i], columns[4][i], columns[5][i]],
            )?;
            roi.label = labels.as_ref().map(|l| l[i]);
            Ok(roi)
        })
        .collect()
}

fn is_anndata(attributes: &Map<String, Value>) -> bool {
    attributes.get("encoding-type").and_then(Value::as_str) == Some("anndata")
}

fn read_strings(store: &Store, path: &str) -> crate::Result<Vec<String>> {
    let array = Array::open(store.clone(), path).map_err(crate::Error::wrap)?;
    array
        .retrieve_array_subset::<Vec<String>>(&array.subset_all())
        .map_err(crate::Error::wrap)
}

/// The index of an AnnData dataframe group (`obs` or `var`).
fn read_dataframe_index(store: &Store, path: &str) -> crate::Result<Vec<String>> {
    let attributes = read_group_attributes(store, path)?;
    let index = attributes
        .get("_index")
        .and_then(Value::as_str)
        .unwrap_or("_index");
    read_strings(store, &join_node_path(path, index))
}

/// Rows of an AnnData table: ROI names in `obs`, column names in `var`, values in `X`.
///
/// `z_micrometer` and `len_z_micrometer` may be absent (0 and 1).
/// Masking rows take their ID from a `label` column, or else from the row name.
fn read_anndata(
    store: &Store,
    path: &str,
    attributes: &Map<String, Value>,
) -> crate::Result<RoiTable> {
    let kind = match attributes.get("type") {
        Some(_) => serde_json::from_value(Value::Object(attributes.clone()))?,
        None => TableKind::RoiTable,
    };
    let names = read_dataframe_index(store, &join_node_path(path, "obs"))?;
    let columns = read_dataframe_index(store, &join_node_path(path, "var"))?;

    let x = Array::open(store.clone(), &join_node_path(path, "X")).map_err(crate::Error::wrap)?;
    let values = read_subset(&x, PixelType::of_array(&x)?, &x.subset_all())?
        .cast(PixelType::Float64);
    let values = values
        .as_array::<f64>()
        .ok_or_else(|| crate::Error::general(format!("{path}/X is not numeric")))?;
    if values.shape() != [names.len(), columns.len()] {
        return Err(crate::Error::shape_mismatch(format!(
            "{path}/X has shape {:?} for {} rows and {} columns",
            values.shape(),
            names.len(),
            columns.len()
        )));
    }

    let position = |name: &str| columns.iter().position(|c| c == name);
    let require = |name: &str| {
        position(name)
            .ok_or_else(|| crate::Error::not_found(format!("column {name} in table {path}")))
    };
    let [x_col, y_col, len_x_col, len_y_col] = [
        require("x_micrometer")?,
        require("y_micrometer")?,
        require("len_x_micrometer")?,
        require("len_y_micrometer")?,
    ];
    let z_col = position("z_micrometer");
    let len_z_col = position("len_z_micrometer");
    let label_col = position(LABEL_COLUMN);

    let mut rois = Vec::with_capacity(names.len());
    for (i, name) in names.into_iter().enumerate() {
        let value = |j: usize| values[[i, j]];
        let label = match (&kind, label_col) {
            (_, Some(j)) => Some(value(j) as u64),
            (TableKind::MaskingRoiTable { .. }, None) => name.parse().ok(),
            (TableKind::RoiTable, None) => None,
        };
        let mut roi = Roi::new(
            name,
            [value(x_col), value(y_col), z_col.map_or(0.0, value)],
            [value(len_x_col), value(len_y_col), len_z_col.map_or(1.0, value)],
        )?;
        roi.label = label;
        rois.push(roi);
    }
    Ok(RoiTable { kind, rois })
}

/// Read the table `name`: json, columnar or AnnData.
pub(crate) fn read_table(store: &Store, tables_path: &str, name: &str) -> crate::Result<RoiTable> {
    let path = join_node_path(tables_path, name);
    if !node_exists(store, &path)? {
        return Err(crate::Error::not_found(format!("table {name:?}")));
    }
    let mut attributes = read_group_attributes(store, &path)?;
    if is_anndata(&attributes) {
        let table = read_anndata(store, &path, &attributes)?;
        debug!("Read AnnData table {name:?} with {} rows", table.len());
        return Ok(table);
    }
    let header: TableHeader = serde_json::from_value(Value::Object(attributes.clone()))?;
    let rois = match header.backend {
        TableBackend::Json => {
            let rows = attributes.remove("rois").unwrap_or(Value::Array(Vec::new()));
            serde_json::from_value(rows)?
        }
        TableBackend::Columnar => {
            let names = attributes
                .remove("row_names")
                .unwrap_or(Value::Array(Vec::new()));
            read_columns(store, &path, &header.table_info, serde_json::from_value(names)?)?
        }
    };
    debug!("Read table {name:?} ({} backend)", header.backend);
    Ok(RoiTable {
        kind: header.table_info,
        rois,
    })
}
