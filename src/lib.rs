//! Build small OME-Zarr test fixtures from a sample dataset.
//!
//! [`reducer::reduce_dataset`] opens (or downloads) a multiscale source image,
//! selects a region, and writes it with a derived label and ROI tables
//! into a new OME-NGFF 0.5 container, optionally wrapped in a plate.
pub mod axes;
pub mod container;
#[cfg(feature = "download")]
pub mod download;
mod error;
pub mod image;
pub mod metadata;
pub mod pixel;
pub mod plate;
pub mod reducer;
pub mod region;
pub mod roi;
pub mod storage;
pub mod table;

pub use zarrs;

pub use container::{ImageSpec, OmeZarrContainer};
pub use error::{Error, Result};
pub use reducer::{ReducerConfig, reduce_dataset};
pub use roi::Roi;
pub use table::{RoiTable, TableBackend};
