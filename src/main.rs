use clap::Parser;
use guardrail::cli::{Cli, Commands};
use guardrail::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config from {}: {:#}",
                cli.config, e
            );
            eprintln!("Using built-in example configuration");
            Config::parse(include_str!("../config.toml.example"))?
        }
    };

    let _telemetry = guardrail::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(symbol = %config.bot.symbol, "Starting paper trading");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
