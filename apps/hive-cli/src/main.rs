use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ConfigArgs, LinkArgs, SimulateArgs};

#[derive(Parser)]
#[command(name = "hive", version, about = "Hive archive manager utilities")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a share link and print the archive key
    Link(LinkArgs),
    /// Drive a scripted swarm against the in-memory engine and stream bus events
    Simulate(SimulateArgs),
    /// Print the effective manager configuration
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        hive_otel::init_with_default("hive=debug,info");
    } else {
        hive_otel::init_with_default("warn");
    }

    match cli.command {
        Commands::Link(args) => commands::link::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
