use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use ndvi_explorer::config::WalkthroughConfig;
use ndvi_explorer::walkthrough;

/// Run the burn-scar walkthrough described by a JSON config.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Walkthrough config; relative paths inside it resolve against its directory.
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = WalkthroughConfig::load(&args.config)?;
    let results = walkthrough::run(&config)?;

    let report = &results.report;
    println!(
        "{} layers, {}x{} cells, {} sampled pixels, zones {:?} ({:?})",
        report.layers.len(),
        report.rows,
        report.cols,
        report.sampled_pixels,
        report.zone_ids,
        report.zone_origin
    );
    for c in &report.components {
        println!(
            "{:>4}  sdev {:>8.4}  proportion {:>6.3}  cumulative {:>6.3}",
            c.name, c.sdev, c.proportion, c.cumulative
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn config_path_is_required() {
        let err = Args::try_parse_from(["walkthrough"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn help_is_printed_instead_of_read_as_a_path() {
        let err = Args::try_parse_from(["walkthrough", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn extra_arguments_are_rejected() {
        let err = Args::try_parse_from(["walkthrough", "a.json", "extra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        let args = Args::try_parse_from(["walkthrough", "a.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("a.json"));
    }
}
