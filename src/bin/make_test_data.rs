use std::path::PathBuf;

use clap::Parser;
use env_logger::{Builder, Env};
use zarrs_ome_fixtures::reducer::SourceConfig;
use zarrs_ome_fixtures::{ReducerConfig, reduce_dataset};

#[derive(Debug, Parser)]
#[command(name = "make_test_data")]
#[command(about = "Derive a small OME-Zarr fixture from a sample dataset")]
struct Cli {
    /// JSON reducer config; missing fields take their defaults
    config: Option<PathBuf>,

    /// Read the source from this local container instead of downloading it
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Where the fixture is written
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Crop to this ROI of the source FOV table
    #[arg(long)]
    roi: Option<String>,

    /// Fail instead of replacing an existing fixture
    #[arg(long)]
    no_overwrite: bool,
}

impl Cli {
    fn into_config(self) -> zarrs_ome_fixtures::Result<ReducerConfig> {
        let mut config = match &self.config {
            Some(path) => ReducerConfig::from_path(path)?,
            None => ReducerConfig::default(),
        };
        if let Some(path) = self.source {
            config.source = SourceConfig::Local { path };
        }
        if let Some(target) = self.target {
            config.target_path = target;
        }
        if let Some(roi) = self.roi {
            config.crop_to_roi = true;
            config.roi_name = Some(roi);
        }
        if self.no_overwrite {
            config.overwrite = false;
        }
        Ok(config)
    }
}

fn main() -> zarrs_ome_fixtures::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;
    let report = reduce_dataset(&config)?;

    println!("container: {}", report.container_path.display());
    println!("image shape: {:?}", report.image_shape);
    if let Some(shape) = &report.label_shape {
        println!("label shape: {shape:?}");
    }
    println!("tables: {}", report.tables.join(", "));
    println!("is_2d={} is_3d={}", report.is_2d, report.is_3d);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_without_arguments() {
        let config = Cli::parse_from(["make_test_data"]).into_config().unwrap();
        assert_eq!(config, ReducerConfig::default());
    }

    #[test]
    fn flags_override_the_config() {
        let cli = Cli::parse_from([
            "make_test_data",
            "--source",
            "local.zarr",
            "-t",
            "out.zarr",
            "--roi",
            "FOV_2",
            "--no-overwrite",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Local {
                path: "local.zarr".into()
            }
        );
        assert_eq!(config.target_path, PathBuf::from("out.zarr"));
        assert!(config.crop_to_roi);
        assert_eq!(config.roi_name.as_deref(), Some("FOV_2"));
        assert!(!config.overwrite);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["make_test_data", "--bogus"]).is_err());
    }
}
