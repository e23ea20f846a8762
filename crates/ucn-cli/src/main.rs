use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::CliConfig::resolve(&cli)?;
    init_tracing(&config.log_level, cli.verbose);
    commands::run_command(cli, config)
}

/// `RUST_LOG` wins; otherwise the configured level, or `debug` with `--verbose`.
fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
