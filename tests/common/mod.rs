//! On-disk layouts written by other tools, produced here without this crate.
#![allow(dead_code)]

use std::path::Path;

use serde_json::{Value, json};

fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn write_bytes(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

/// Element count, then each string prefixed by its byte length (all u32 little endian).
fn vlen_utf8(items: &[&str]) -> Vec<u8> {
    let mut out = (items.len() as u32).to_le_bytes().to_vec();
    for item in items {
        out.extend_from_slice(&(item.len() as u32).to_le_bytes());
        out.extend_from_slice(item.as_bytes());
    }
    out
}

fn v3_group(dir: &Path, attributes: Value) {
    write_json(
        &dir.join("zarr.json"),
        &json!({"zarr_format": 3, "node_type": "group", "attributes": attributes}),
    );
}

fn v3_array(dir: &Path, shape: &[u64], data_type: &str, fill_value: Value, codecs: Value) {
    write_json(
        &dir.join("zarr.json"),
        &json!({
            "zarr_format": 3,
            "node_type": "array",
            "shape": shape,
            "data_type": data_type,
            "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": shape}},
            "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
            "fill_value": fill_value,
            "codecs": codecs,
            "attributes": {},
        }),
    );
}

fn v3_strings(dir: &Path, items: &[&str]) {
    v3_array(
        dir,
        &[items.len() as u64],
        "string",
        json!(""),
        json!([{"name": "vlen-utf8", "configuration": {}}]),
    );
    write_bytes(&dir.join("c/0"), &vlen_utf8(items));
}

fn dataframe(dir: &Path, index_name: &str, index: &[&str]) {
    v3_group(
        dir,
        json!({
            "_index": index_name,
            "column-order": [],
            "encoding-type": "dataframe",
            "encoding-version": "0.2.0",
        }),
    );
    v3_strings(&dir.join(index_name), index);
}

/// Write an AnnData table the way ngio lays it out in a Zarr V3 container,
/// and register it in `tables/zarr.json`.
///
/// `extra` is merged into the table group's attributes (e.g. `type`, `region`).
pub fn write_anndata_table(
    container: &Path,
    name: &str,
    extra: Value,
    rows: &[&str],
    columns: &[&str],
    values: &[f32],
) {
    assert_eq!(values.len(), rows.len() * columns.len());
    let tables = container.join("tables");
    let mut listed: Vec<String> = std::fs::read(tables.join("zarr.json"))
        .ok()
        .and_then(|b| serde_json::from_slice::<Value>(&b).ok())
        .and_then(|v| serde_json::from_value(v["attributes"]["tables"].clone()).ok())
        .unwrap_or_default();
    if !listed.iter().any(|t| t == name) {
        listed.push(name.to_string());
    }
    v3_group(&tables, json!({"tables": listed}));

    let dir = tables.join(name);
    let mut attributes = json!({
        "encoding-type": "anndata",
        "encoding-version": "0.1.0",
        "backend": "anndata_v1",
        "fractal_table_version": "1",
    });
    if let (Some(target), Value::Object(extra)) = (attributes.as_object_mut(), extra) {
        target.extend(extra);
    }
    v3_group(&dir, attributes);
    dataframe(&dir.join("obs"), "FieldIndex", rows);
    dataframe(&dir.join("var"), "_index", columns);

    let shape = [rows.len() as u64, columns.len() as u64];
    v3_array(
        &dir.join("X"),
        &shape,
        "float32",
        json!(0.0),
        json!([{"name": "bytes", "configuration": {"endian": "little"}}]),
    );
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    write_bytes(&dir.join("X/c/0/0"), &bytes);
}

fn v2_group(dir: &Path, attributes: Value) {
    write_json(&dir.join(".zgroup"), &json!({"zarr_format": 2}));
    write_json(&dir.join(".zattrs"), &attributes);
}

/// An uncompressed Zarr V2 array stored as a single chunk.
fn v2_array(dir: &Path, shape: &[u64], dtype: &str, bytes: &[u8]) {
    write_json(
        &dir.join(".zarray"),
        &json!({
            "zarr_format": 2,
            "shape": shape,
            "chunks": shape,
            "dtype": dtype,
            "compressor": null,
            "fill_value": 0,
            "order": "C",
            "filters": null,
            "dimension_separator": "/",
        }),
    );
    let key = vec!["0"; shape.len()].join("/");
    write_bytes(&dir.join(key), bytes);
}

fn v2_multiscales(axes: Value, scales: &[Vec<f64>]) -> Value {
    let datasets: Vec<Value> = scales
        .iter()
        .enumerate()
        .map(|(i, scale)| {
            json!({
                "path": i.to_string(),
                "coordinateTransformations": [{"type": "scale", "scale": scale}],
            })
        })
        .collect();
    json!([{"version": "0.4", "axes": axes, "datasets": datasets}])
}

/// Pixel `(c, z, y, x)` of the V2 image written by [`write_v2_image`].
pub fn v2_pixel(c: u64, z: u64, y: u64, x: u64) -> u16 {
    (c * 1000 + z * 100 + y * 10 + x) as u16
}

/// An NGFF 0.4 image on Zarr V2 with the layout of older sample datasets.
///
/// Two channels, 2 z slices and 8x12 pixels of 0.5 um, two levels, and a
/// `nuclei` label whose only instance (ID 4) covers z 0, y 2..4, x 6..10.
pub fn write_v2_image(root: &Path) {
    let axes = json!([
        {"name": "c", "type": "channel"},
        {"name": "z", "type": "space", "unit": "micrometer"},
        {"name": "y", "type": "space", "unit": "micrometer"},
        {"name": "x", "type": "space", "unit": "micrometer"},
    ]);
    v2_group(
        root,
        json!({
            "multiscales": v2_multiscales(axes, &[vec![1.0, 1.0, 0.5, 0.5], vec![1.0, 1.0, 1.0, 1.0]]),
            "omero": {
                "channels": [
                    {"label": "DAPI", "wavelength_id": "A01_C01", "color": "00FFFF",
                     "window": {"min": 0, "max": 65535, "start": 110, "end": 800}},
                    {"label": "nanog", "wavelength_id": "A01_C02", "color": "FF00FF",
                     "window": {"min": 0, "max": 65535, "start": 110, "end": 290}},
                ],
            },
        }),
    );
    for (level, (ny, nx)) in [(8u64, 12u64), (4, 6)].into_iter().enumerate() {
        let mut bytes = Vec::new();
        for c in 0..2 {
            for z in 0..2 {
                for y in 0..ny {
                    for x in 0..nx {
                        let scale = 1 << level;
                        bytes.extend_from_slice(
                            &v2_pixel(c, z, y * scale, x * scale).to_le_bytes(),
                        );
                    }
                }
            }
        }
        v2_array(&root.join(level.to_string()), &[2, 2, ny, nx], "<u2", &bytes);
    }

    let labels = root.join("labels");
    v2_group(&labels, json!({"labels": ["nuclei"]}));
    let label_axes = json!([
        {"name": "z", "type": "space", "unit": "micrometer"},
        {"name": "y", "type": "space", "unit": "micrometer"},
        {"name": "x", "type": "space", "unit": "micrometer"},
    ]);
    let nuclei = labels.join("nuclei");
    v2_group(
        &nuclei,
        json!({
            "multiscales": v2_multiscales(label_axes, &[vec![1.0, 0.5, 0.5], vec![1.0, 1.0, 1.0]]),
            "image-label": {"version": "0.4", "source": {"image": "../../"}},
        }),
    );
    for (level, (ny, nx)) in [(8u64, 12u64), (4, 6)].into_iter().enumerate() {
        let scale = 1 << level;
        let mut bytes = Vec::new();
        for z in 0..2u64 {
            for y in 0..ny {
                for x in 0..nx {
                    let (y, x) = (y * scale, x * scale);
                    let id: u32 = if z == 0 && (2..4).contains(&y) && (6..10).contains(&x) {
                        4
                    } else {
                        0
                    };
                    bytes.extend_from_slice(&id.to_le_bytes());
                }
            }
        }
        v2_array(&nuclei.join(level.to_string()), &[2, ny, nx], "<u4", &bytes);
    }
}
