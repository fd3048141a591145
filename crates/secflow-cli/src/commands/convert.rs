use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};

use secflow_core::{ConverterConfig, Input, Outcome};

#[derive(Args)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["pcap", "zeek_conn_log", "interflow_log"]),
))]
pub struct ConvertArgs {
    /// Packet capture (pcap or pcapng)
    #[arg(short, long)]
    pub pcap: Option<PathBuf>,

    /// Zeek conn.log
    #[arg(short = 'z', long)]
    pub zeek_conn_log: Option<PathBuf>,

    /// Zeek dns.log used to name destinations of the conn.log
    #[arg(long, requires = "zeek_conn_log")]
    pub zeek_dns_log: Option<PathBuf>,

    /// Interflow JSON log
    #[arg(long)]
    pub interflow_log: Option<PathBuf>,

    /// Directory the finished Secflow file is moved to
    #[arg(short = 'o', long)]
    pub out_dir: Option<PathBuf>,

    /// Do not write newly observed names back to the passive DNS repository
    #[arg(long, default_value_t = false)]
    pub no_pdns_update: bool,
}

impl ConvertArgs {
    fn input(&self) -> Option<Input> {
        if let Some(pcap) = &self.pcap {
            return Some(Input::Capture(pcap.clone()));
        }
        if let Some(conn) = &self.zeek_conn_log {
            return Some(Input::ConnLog {
                conn: conn.clone(),
                dns: self.zeek_dns_log.clone(),
            });
        }
        self.interflow_log.clone().map(Input::Interflow)
    }
}

pub fn run(args: ConvertArgs, mut config: ConverterConfig) -> Result<()> {
    let started = Instant::now();
    let input = args.input().context("no input file given")?;

    if let Some(dir) = &args.out_dir {
        config.output_dir = Some(dir.clone());
    }
    if args.no_pdns_update {
        config.update_passive_dns = false;
    }
    tracing::debug!(?config, "effective configuration");

    println!(
        "  {} {} ({})",
        console::style("converting").cyan().bold(),
        input.path().display(),
        input.sample_type(),
    );

    let outcome = secflow_core::convert(&input, &config)
        .with_context(|| format!("failed to convert {}", input.path().display()))?;

    match outcome {
        Outcome::Converted(artifact) => {
            println!(
                "  {} {} Secflows in {:.2}s",
                console::style("done").green().bold(),
                console::style(artifact.secflow_count).green().bold(),
                started.elapsed().as_secs_f64(),
            );
            println!("        sample id: {}", artifact.sample_id);
            println!("        hash:      {}", artifact.hash);
            println!("        output:    {}", console::style(artifact.path.display()).bold());
        }
        Outcome::NoTraffic => {
            println!(
                "  {} no traffic converted (everything was local-to-local or unusable)",
                console::style("note:").yellow().bold(),
            );
        }
    }

    Ok(())
}
