mod config;
mod scenarios;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

use crate::scenarios::Scenario;

#[derive(Parser)]
#[command(
    name = "otter-ic-stress",
    version,
    about = "Inline cache stress scenarios for the Otter object model"
)]
struct Cli {
    /// Path to an otter-ic.toml (searched upwards from the current directory otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable inline caching regardless of the config file
    #[arg(long, global = true)]
    no_ic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario, or all of them
    Run {
        #[arg(value_enum)]
        scenario: Option<Scenario>,
        /// Iterations per scenario
        #[arg(long)]
        loop_count: Option<usize>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available scenarios
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref())?;
    if cli.no_ic {
        config.runtime.inline_caches_enabled = false;
    }

    match cli.command {
        Commands::Run {
            scenario,
            loop_count,
            json,
        } => {
            let loop_count = loop_count.unwrap_or(config.stress.loop_count);
            let selected = match scenario {
                Some(scenario) => vec![scenario],
                None => Scenario::all().to_vec(),
            };
            for scenario in selected {
                let report = scenario.run(&config.runtime, loop_count)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!(
                        "{:<24} ok  checks={} traps={} ic_hits={} ic_misses={} watchpoints_fired={}",
                        scenario.name(),
                        report.checks,
                        report.stats.trap_invocations,
                        report.stats.ic_hits,
                        report.stats.ic_misses,
                        report.stats.watchpoints_fired,
                    );
                }
            }
        }
        Commands::List => {
            for scenario in Scenario::all() {
                println!("{:<24} {}", scenario.name(), scenario.description());
            }
        }
    }

    Ok(())
}
