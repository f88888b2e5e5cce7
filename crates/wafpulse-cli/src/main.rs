//! wafpulse main entry point

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use wafpulse_cli::{init_tracing, redacted, run, score_payload, shutdown_signal, Cli, Commands};
use wafpulse_streaming::Shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Run(args) => {
            let shutdown = Shutdown::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                match shutdown_signal().await {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        signal.trigger();
                    }
                    Err(e) => error!(error = %e, "Failed to install signal handler"),
                }
            });

            let report = run(&args, shutdown).await?;
            info!(report = %serde_json::to_string(&report)?, "Processor report");
        }
        Commands::Config(args) => {
            let config = args.to_config();
            println!("{}", serde_json::to_string_pretty(&redacted(&config))?);
            config.validate().context("Invalid configuration")?;
        }
        Commands::Score { file, json } => {
            let payload = match (file, json) {
                (Some(path), None) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(json)) => json.into_bytes(),
                _ => bail!("Provide exactly one of --file or --json"),
            };
            let summary = score_payload(&payload)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
