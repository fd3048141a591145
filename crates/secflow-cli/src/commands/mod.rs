pub mod config;
pub mod convert;
pub mod pdns;
pub mod schema;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use secflow_core::ConverterConfig;

#[derive(Parser)]
#[command(
    name = "secflow",
    about = "Convert network traffic records into Secflows",
    long_about = "secflow - converts packet captures, Zeek connection logs and Interflow\n\
                  JSON logs into endpoint-named, duration-bearing Secflow files.",
    version,
    propagate_version = true,
    styles = get_styles(),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: the per-user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one input file into a Secflow artifact
    Convert(convert::ConvertArgs),

    /// Print the JSON Schema of the Secflow artifact
    Schema,

    /// Inspect the passive DNS repository
    Pdns(pdns::PdnsArgs),

    /// Show or create the configuration file
    Config(config::ConfigArgs),
}

impl Cli {
    /// `config init` may name a file that does not exist yet.
    pub fn creates_config(&self) -> bool {
        matches!(
            self.command,
            Commands::Config(config::ConfigArgs {
                action: config::ConfigAction::Init { .. }
            })
        )
    }
}

pub fn run(cli: Cli, config: ConverterConfig) -> Result<()> {
    match cli.command {
        Commands::Convert(args) => convert::run(args, config),
        Commands::Schema => schema::run(),
        Commands::Pdns(args) => pdns::run(args, &config),
        Commands::Config(args) => config::run(args, &config, cli.config),
    }
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .header(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .usage(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .literal(
            clap::builder::styling::AnsiColor::BrightGreen
                .on_default()
                .bold(),
        )
        .placeholder(
            clap::builder::styling::AnsiColor::BrightWhite
                .on_default()
                .dimmed(),
        )
}
