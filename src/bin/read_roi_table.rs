use std::path::PathBuf;

use clap::Parser;
use env_logger::{Builder, Env};
use zarrs_ome_fixtures::reducer::print_roi_table;

#[derive(Debug, Parser)]
#[command(name = "read_roi_table")]
#[command(about = "Print a ROI table of an OME-Zarr image container")]
struct Cli {
    /// Image container holding the table
    #[arg(default_value = "data/test_data.zarr/A/01/0")]
    container: PathBuf,

    /// Name of the table below `tables/`
    #[arg(default_value = "nuclei_ROI_table")]
    table: String,
}

fn main() -> zarrs_ome_fixtures::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    print_roi_table(&cli.container, &cli.table)?;
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
    fn positional_defaults() {
        let cli = Cli::parse_from(["read_roi_table"]);
        assert_eq!(cli.container, PathBuf::from("data/test_data.zarr/A/01/0"));
        assert_eq!(cli.table, "nuclei_ROI_table");

        let cli = Cli::parse_from(["read_roi_table", "other.zarr", "FOV_ROI_table"]);
        assert_eq!(cli.container, PathBuf::from("other.zarr"));
        assert_eq!(cli.table, "FOV_ROI_table");
    }

    #[test]
    fn extra_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["read_roi_table", "a", "b", "c"]).is_err());
    }
}
