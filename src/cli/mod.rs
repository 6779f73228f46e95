pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "promentity")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconciles Prometheus metrics into monitored entities", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run one collection cycle and write the entity topology as JSON")]
    Collect {
        #[arg(short, long, help = "Path to the YAML configuration")]
        config: PathBuf,

        #[arg(short, long, help = "Output file path (stdout when omitted)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,

        #[arg(
            long,
            help = "Answer queries from a captured response file instead of the configured servers"
        )]
        replay: Option<PathBuf>,

        #[arg(long, help = "Write engine self-metrics in Prometheus text format to this file")]
        self_metrics: Option<PathBuf>,

        #[arg(long, help = "Print skipped work to stderr")]
        show_skipped: bool,
    },
    #[command(about = "Validate a configuration file and summarize it")]
    CheckConfig {
        #[arg(short, long, help = "Path to the YAML configuration")]
        config: PathBuf,
    },
}
