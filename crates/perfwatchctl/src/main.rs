//! Perfwatch Control - CLI host for the perfwatch analytics library
//!
//! Reads metric samples from a JSONL file, runs one analysis and prints the
//! result. Results are appended to the state directory for `history`.

mod cli;
mod commands;
mod logging;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::Globals;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let globals = Globals::from(&cli);

    match cli.command {
        Commands::Analyze {
            metrics,
            period,
            min_severity,
        } => commands::analyze(&globals, &metrics, period, min_severity),
        Commands::Anomalies {
            metrics,
            period,
            min_severity,
        } => commands::anomalies(&globals, &metrics, period, min_severity),
        Commands::Forecast { metric, horizon } => commands::forecast(&globals, &metric, horizon),
        Commands::Insights {
            period,
            min_priority,
            category,
        } => commands::insights(&globals, period, min_priority, category),
        Commands::History {
            kind,
            metrics,
            limit,
        } => commands::history(&globals, kind, &metrics, limit),
    }
}
