//! CLI interface for guardrail
//!
//! Provides subcommands for:
//! - `run`: Paper-trade one symbol against a synthetic price walk
//! - `config`: Print the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "guardrail")]
#[command(about = "Risk-controlled execution and position lifecycle engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Paper-trade against a random-walk venue
    Run(RunArgs),
    /// Print the effective configuration as JSON
    Config,
}
