use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{
    ListableStorageTraits, ReadableWritableListableStorage, StorePrefix, WritableStorageTraits,
};

/// Shared handle to the store backing a container.
pub type Store = ReadableWritableListableStorage;

/// Open the store rooted at an existing directory.
pub fn open_store(path: &Path) -> crate::Result<Store> {
    if !path.is_dir() {
        return Err(crate::Error::not_found(format!(
            "no directory at {}",
            path.display()
        )));
    }
    let store = FilesystemStore::new(path).map_err(crate::Error::wrap)?;
    Ok(Arc::new(store))
}

/// Create the store for a new container at `path`.
///
/// An existing path is removed if `overwrite` is set,
/// otherwise this fails with [`crate::Error::AlreadyExists`] and leaves it untouched.
pub fn create_store(path: &Path, overwrite: bool) -> crate::Result<Store> {
    if path.exists() {
        if !overwrite {
            return Err(crate::Error::AlreadyExists(path.display().to_string()));
        }
        info!("Removing existing contents of {}", path.display());
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
    }
    std::fs::create_dir_all(path)?;
    open_store(path)
}

/// Join a child name onto a node path, e.g. `("/", "0") -> "/0"`.
pub fn join_node_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_matches('/');
    format!("{parent}/{child}")
}

/// The store prefix holding everything below a non-root node path.
fn node_prefix(node_path: &str) -> crate::Result<StorePrefix> {
    let trimmed = node_path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(crate::Error::general("the root node has no prefix"));
    }
    StorePrefix::new(format!("{trimmed}/")).map_err(crate::Error::wrap)
}

/// Whether any key exists below `node_path`.
pub(crate) fn node_exists(store: &Store, node_path: &str) -> crate::Result<bool> {
    let keys = store
        .list_prefix(&node_prefix(node_path)?)
        .map_err(crate::Error::wrap)?;
    Ok(!keys.is_empty())
}

/// Erase a node and all of its children.
pub(crate) fn erase_node(store: &Store, node_path: &str) -> crate::Result<()> {
    debug!("Erasing node {node_path}");
    store
        .erase_prefix(&node_prefix(node_path)?)
        .map_err(crate::Error::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_paths() {
        assert_eq!(join_node_path("/", "0"), "/0");
        assert_eq!(join_node_path("/labels", "nuclei"), "/labels/nuclei");
        assert_eq!(join_node_path("/labels/", "/nuclei/"), "/labels/nuclei");
    }

    #[test]
    fn create_respects_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.zarr");
        std::fs::create_dir_all(path.join("keep")).unwrap();

        assert!(matches!(
            create_store(&path, false),
            Err(crate::Error::AlreadyExists(_))
        ));
        assert!(path.join("keep").exists());

        create_store(&path, true).unwrap();
        assert!(path.exists());
        assert!(!path.join("keep").exists());
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_store(&dir.path().join("missing")),
            Err(crate::Error::NotFound(_))
        ));
    }
}
