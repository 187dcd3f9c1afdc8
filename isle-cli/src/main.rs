use clap::{ArgMatches, Command};
use tracing_subscriber::EnvFilter;

mod cmd;
mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("isle")
        .about("Build component-island sites into static HTML")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(cmd::build::make_subcommand())
        .get_matches();

    match matches.subcommand() {
        Some(("build", args)) => {
            init_tracing(args);
            let status = cmd::build::execute(args).await?;
            std::process::exit(status);
        }
        _ => Ok(()),
    }
}

/// `RUST_LOG` wins over `--verbose` / `--silent`.
fn init_tracing(args: &ArgMatches) {
    let level = if args.get_flag("silent") {
        "error"
    } else if args.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
