use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use secflow_core::ConverterConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config: &ConverterConfig, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(ConverterConfig::default_path);

    match args.action {
        ConfigAction::Show => {
            println!("# {}", path.display());
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "  {} {}",
                console::style("wrote").green().bold(),
                path.display(),
            );
        }
    }

    Ok(())
}
