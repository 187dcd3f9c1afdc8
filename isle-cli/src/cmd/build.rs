use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use isle_core::{BuildReport, build_site};

use crate::config::load_build_config;

pub fn add_build_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .help("Project root directory"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file [default: <root>/isle.toml]"),
        )
        .arg(
            Arg::new("site")
                .long("site")
                .value_name("URL")
                .help("Public origin of the site, overrides build_options.site"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every page and module")
                .action(ArgAction::SetTrue)
                .conflicts_with("silent"),
        )
        .arg(
            Arg::new("silent")
                .short('q')
                .long("silent")
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
}

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("build")).about("Render every page of the site into the output directory")
}

/// Returns the process exit status.
pub async fn execute(args: &ArgMatches) -> Result<i32> {
    // Load cascading configuration
    let isle_config = load_build_config(args)?;
    tracing::debug!(config = ?isle_config, "resolved configuration");

    let report = BuildReport::new();
    let summary = build_site(isle_config.site_config(), &isle_config.overrides(), &report).await?;

    let output_dir = isle_config.site_config().dist_dir();
    if summary.failures.is_empty() {
        println!(
            "Built {} pages in {}",
            summary.pages.len(),
            output_dir.display()
        );
    } else {
        eprintln!(
            "Built {} pages in {}, {} failed:",
            summary.pages.len(),
            output_dir.display(),
            summary.failures.len()
        );
        for failure in &summary.failures {
            eprintln!("  {}: {}", failure.url, failure.error);
        }
    }

    Ok(summary.status_code())
}
