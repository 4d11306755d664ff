//! Fetch sample datasets into a local cache.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

/// A downloadable sample dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredDataset {
    pub name: &'static str,
    pub url: &'static str,
}

pub const DATASETS: &[RegisteredDataset] = &[
    RegisteredDataset {
        name: "CardiomyocyteSmall",
        url: "https://zenodo.org/records/13305316/files/20200812-CardiomyocyteDifferentiation14-Cycle1-small.zarr.zip",
    },
    RegisteredDataset {
        name: "CardiomyocyteTiny",
        url: "https://zenodo.org/records/13305156/files/20200812-CardiomyocyteDifferentiation14-Cycle1.zarr.zip",
    },
    RegisteredDataset {
        name: "CardiomyocyteSmallMip",
        url: "https://zenodo.org/records/13305316/files/20200812-CardiomyocyteDifferentiation14-Cycle1_mip.zarr.zip",
    },
];

pub fn find_dataset(name: &str) -> crate::Result<&'static RegisteredDataset> {
    DATASETS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| crate::Error::not_found(format!("dataset {name:?} in the registry")))
}

/// The first `*.zarr` directory directly inside `dir`.
fn find_zarr_dir(dir: &Path) -> crate::Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && path.extension().is_some_and(|e| e == "zarr") {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Download and extract the dataset `name` below `cache_dir`, returning the path of the container.
///
/// A previously extracted copy is reused. `url` overrides the registry location.
pub fn download_dataset(name: &str, cache_dir: &Path, url: Option<&str>) -> crate::Result<PathBuf> {
    let url = match url {
        Some(u) => u,
        None => find_dataset(name)?.url,
    };
    if let Some(path) = find_zarr_dir(&cache_dir.join(name))? {
        info!("Using cached dataset {name:?} at {}", path.display());
        return Ok(path);
    }

    info!("Downloading dataset {name:?} from {url}");
    let data = fetch(url)?;
    install_archive(&data, name, cache_dir, url)
}

/// Extract `data` into `cache_dir/name`.
///
/// The archive is unpacked into a staging directory next to the destination,
/// which only takes the final name once a `.zarr` directory was found in it.
/// On failure the staging directory is removed and the cache is left as it was.
fn install_archive(data: &[u8], name: &str, cache_dir: &Path, url: &str) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}-"))
        .tempdir_in(cache_dir)?;
    extract_zip(data, staging.path())?;
    if find_zarr_dir(staging.path())?.is_none() {
        return Err(crate::Error::not_found(format!(
            "a .zarr directory in the archive from {url}"
        )));
    }

    let dest = cache_dir.join(name);
    if dest.exists() {
        debug!("Replacing incomplete cache entry {}", dest.display());
        std::fs::remove_dir_all(&dest)?;
    }
    std::fs::rename(staging.path(), &dest)?;
    find_zarr_dir(&dest)?.ok_or_else(|| {
        crate::Error::not_found(format!("a .zarr directory in {}", dest.display()))
    })
}

fn fetch(url: &str) -> crate::Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(None::<Duration>)
        .build()
        .map_err(crate::Error::wrap)?;
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(crate::Error::wrap)?;
    let bytes = response.bytes().map_err(crate::Error::wrap)?;
    debug!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}

fn extract_zip(data: &[u8], dest: &Path) -> crate::Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(crate::Error::wrap)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(crate::Error::wrap)?;
        // skip entries that would escape `dest`
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(relative);
        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }
    debug!("Extracted {} entries into {}", archive.len(), dest.display());
    Ok(())
}
