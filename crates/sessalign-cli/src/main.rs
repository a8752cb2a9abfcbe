mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sessalign", about = "Align imaging sessions to a reference session")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions and their source metadata
    Info(commands::info::InfoArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
    /// Save mean-frame previews of every session
    Mean(commands::mean::MeanArgs),
    /// Search transforms and update the parameter file
    Align(commands::align::AlignArgs),
    /// Write all sessions, aligned, into one stack
    Export(commands::export::ExportArgs),
    /// Show or set a session's parameters by hand
    Params(commands::params::ParamsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Mean(args) => commands::mean::run(args),
        Commands::Align(args) => commands::align::run(args),
        Commands::Export(args) => commands::export::run(args),
        Commands::Params(args) => commands::params::run(args),
    }
}
