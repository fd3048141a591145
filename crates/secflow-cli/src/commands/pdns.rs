use std::net::IpAddr;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use secflow_core::pdns::{PassiveDnsStore, Provenance};
use secflow_core::ConverterConfig;

#[derive(Args)]
pub struct PdnsArgs {
    #[command(subcommand)]
    pub action: PdnsAction,
}

#[derive(Subcommand)]
pub enum PdnsAction {
    /// Show every name recorded for an address, oldest first
    Lookup {
        ip: IpAddr,
    },

    /// Summarize the repository
    Stats {
        /// Also list every entry
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

pub fn run(args: PdnsArgs, config: &ConverterConfig) -> Result<()> {
    let store = PassiveDnsStore::load(&config.pdns_repository)
        .with_context(|| format!("failed to open {}", config.pdns_repository.display()))?;

    match args.action {
        PdnsAction::Lookup { ip } => match store.entry(ip) {
            Some(entry) => {
                println!("  {} {}", console::style(ip).cyan().bold(), entry.latest().unwrap_or("-"));
                for name in entry.hostnames.iter().rev().skip(1) {
                    println!("        {}", console::style(name).dim());
                }
            }
            None => println!("  {} no names recorded for {ip}", console::style("note:").yellow().bold()),
        },
        PdnsAction::Stats { all } => {
            let names: usize = store.iter().map(|(_, entry)| entry.hostnames.len()).sum();
            println!(
                "  {} {}",
                console::style("repository").cyan().bold(),
                config.pdns_repository.display(),
            );
            println!(
                "        {} addresses, {} names",
                console::style(store.len()).green().bold(),
                names,
            );
            if all {
                for (ip, entry) in store.iter() {
                    let marker = match entry.provenance {
                        Provenance::Repository => "",
                        Provenance::Observed => " (unsaved)",
                    };
                    println!("        {ip:<40} {}{marker}", entry.latest().unwrap_or("-"));
                }
            }
        }
    }

    Ok(())
}
