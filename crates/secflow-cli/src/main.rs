mod commands;

use clap::Parser;
use commands::Cli;
use secflow_core::ConverterConfig;

fn main() {
    let cli = Cli::parse();

    let config = match ConverterConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(_) if cli.creates_config() && cli.config.as_ref().is_some_and(|p| !p.exists()) => {
            ConverterConfig::default()
        }
        Err(e) => {
            eprintln!("\x1b[1;31merror:\x1b[0m {e}");
            std::process::exit(1);
        }
    };

    let fallback = if cli.verbose {
        "secflow=debug,secflow_core=debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::run(cli, config) {
        eprintln!("\x1b[1;31merror:\x1b[0m {e:#}");
        std::process::exit(1);
    }
}
