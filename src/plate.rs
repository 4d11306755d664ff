//! Multi-well plate layout.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use zarrs::group::{Group, GroupBuilder};

use crate::container::OmeZarrContainer;
use crate::metadata::{
    Plate, PlateAttributes, PlateAxisName, PlateWell, Well, WellAttributes, WellImage, read_ngff,
    write_ngff,
};
use crate::storage::{Store, create_store, open_store};

/// Where one image sits in a plate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageInWellPath {
    pub row: String,
    pub column: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<i64>,
}

impl ImageInWellPath {
    pub fn new(row: impl Into<String>, column: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
            path: path.into(),
            acquisition: None,
        }
    }

    pub fn well_path(&self) -> String {
        format!("{}/{}", self.row, self.column)
    }

    /// Path of the image relative to the plate root.
    pub fn image_path(&self) -> String {
        format!("{}/{}/{}", self.row, self.column, self.path)
    }
}

fn store_group<T: Serialize>(store: &Store, path: &str, attributes: Option<&T>) -> crate::Result<()> {
    let attributes = match attributes {
        Some(a) => write_ngff(a)?,
        None => Default::default(),
    };
    let group = GroupBuilder::new()
        .attributes(attributes)
        .build(store.clone(), path)
        .map_err(crate::Error::wrap)?;
    group.store_metadata().map_err(crate::Error::wrap)
}

/// Create a plate holding no images yet, with one well per distinct (row, column).
///
/// Row and column lists are sorted and deduplicated.
pub fn create_empty_plate(
    path: impl AsRef<Path>,
    name: &str,
    images: &[ImageInWellPath],
    overwrite: bool,
) -> crate::Result<OmeZarrPlate> {
    if images.is_empty() {
        return Err(crate::Error::general("a plate needs at least one image"));
    }
    let root = path.as_ref().to_path_buf();
    let store = create_store(&root, overwrite)?;

    let rows: Vec<String> = images
        .iter()
        .map(|i| i.row.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let columns: Vec<String> = images
        .iter()
        .map(|i| i.column.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut wells: Vec<PlateWell> = Vec::new();
    for image in images {
        let path = image.well_path();
        if wells.iter().any(|w| w.path == path) {
            continue;
        }
        wells.push(PlateWell {
            path,
            row_index: rows.iter().position(|r| *r == image.row).unwrap_or_default(),
            column_index: columns
                .iter()
                .position(|c| *c == image.column)
                .unwrap_or_default(),
        });
    }

    let attributes = PlateAttributes {
        plate: Plate {
            name: Some(name.to_string()),
            version: None,
            rows: rows.iter().map(|r| PlateAxisName { name: r.clone() }).collect(),
            columns: columns
                .iter()
                .map(|c| PlateAxisName { name: c.clone() })
                .collect(),
            wells: wells.clone(),
        },
    };
    store_group(&store, "/", Some(&attributes))?;
    for row in &rows {
        store_group::<()>(&store, &format!("/{row}"), None)?;
    }
    for well in &wells {
        let well_images = images
            .iter()
            .filter(|i| i.well_path() == well.path)
            .map(|i| WellImage {
                path: i.path.clone(),
                acquisition: i.acquisition,
            })
            .collect();
        let well_attributes = WellAttributes {
            well: Well {
                images: well_images,
                version: None,
            },
        };
        store_group(&store, &format!("/{}", well.path), Some(&well_attributes))?;
    }
    info!(
        "Created plate {name:?} at {} with {} wells",
        root.display(),
        wells.len()
    );
    Ok(OmeZarrPlate {
        root,
        store,
        attributes,
    })
}

/// An NGFF plate group.
#[derive(Clone)]
pub struct OmeZarrPlate {
    root: PathBuf,
    store: Store,
    attributes: PlateAttributes,
}

impl std::fmt::Debug for OmeZarrPlate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmeZarrPlate")
            .field("root", &self.root)
            .field("plate", &self.attributes.plate)
            .finish()
    }
}

impl OmeZarrPlate {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let root = path.as_ref().to_path_buf();
        let store = open_store(&root)?;
        let group = Group::open(store.clone(), "/").map_err(crate::Error::wrap)?;
        let attributes: PlateAttributes = read_ngff(group.attributes())
            .map_err(|e| crate::Error::not_found(format!("plate metadata at {}: {e}", root.display())))?;
        Ok(Self {
            root,
            store,
            attributes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn plate(&self) -> &Plate {
        &self.attributes.plate
    }

    pub fn wells(&self) -> Vec<&str> {
        self.plate().wells.iter().map(|w| w.path.as_str()).collect()
    }

    /// Image paths listed by the well at `row`/`column`.
    pub fn well_images(&self, row: &str, column: &str) -> crate::Result<Vec<String>> {
        let well_path = format!("{row}/{column}");
        if !self.wells().contains(&well_path.as_str()) {
            return Err(crate::Error::not_found(format!(
                "well {well_path} in {}",
                self.root.display()
            )));
        }
        let group = Group::open(self.store.clone(), &format!("/{well_path}"))
            .map_err(crate::Error::wrap)?;
        let attributes: WellAttributes = read_ngff(group.attributes())?;
        Ok(attributes.well.images.into_iter().map(|i| i.path).collect())
    }

    pub fn image_path(&self, row: &str, column: &str, path: &str) -> PathBuf {
        self.root.join(row).join(column).join(path)
    }

    pub fn get_image(&self, row: &str, column: &str, path: &str) -> crate::Result<OmeZarrContainer> {
        if !self.well_images(row, column)?.iter().any(|p| p == path) {
            return Err(crate::Error::not_found(format!(
                "image {row}/{column}/{path} in {}",
                self.root.display()
            )));
        }
        OmeZarrContainer::open(self.image_path(row, column, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let images = [
            ImageInWellPath::new("B", "03", "0"),
            ImageInWellPath::new("A", "01", "0"),
            ImageInWellPath::new("A", "01", "1"),
        ];
        let plate = create_empty_plate(dir.path().join("plate.zarr"), "Test", &images, false)
            .unwrap();
        let names = |axes: &[PlateAxisName]| axes.iter().map(|a| a.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&plate.plate().rows), ["A", "B"]);
        assert_eq!(names(&plate.plate().columns), ["01", "03"]);
        assert_eq!(plate.wells(), ["B/03", "A/01"]);
        assert_eq!(plate.plate().wells[0].row_index, 1);
        assert_eq!(plate.plate().wells[0].column_index, 1);

        let reopened = OmeZarrPlate::open(plate.path()).unwrap();
        assert_eq!(reopened.plate().name.as_deref(), Some("Test"));
        assert_eq!(reopened.well_images("A", "01").unwrap(), ["0", "1"]);
        assert!(matches!(
            reopened.well_images("C", "01"),
            Err(crate::Error::NotFound(_))
        ));
    }
}
