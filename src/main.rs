// src/main.rs — harmony-agent entry point

use clap::Parser;

use harmony_agent::cli::{Cli, Commands};
use harmony_agent::infra::config::Config;
use harmony_agent::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        let mut config = Config::load_from(std::path::Path::new(path))?;
        config.apply_env();
        config
    } else {
        Config::load()?
    };

    // Respects RUST_LOG
    logger::init_logging(&config.server.log_level);

    match cli.command {
        Some(Commands::Cost {
            model,
            input,
            output,
        }) => {
            harmony_agent::cli::cost::run_cost(&model, input, output);
            Ok(())
        }
        Some(Commands::CheckConfig) => {
            print!("{}", toml::to_string(&config.redacted())?);
            Ok(())
        }
        Some(Commands::Serve { host, port }) => {
            harmony_agent::cli::serve::run_serve(config, host, port).await
        }
        None => harmony_agent::cli::serve::run_serve(config, None, None).await,
    }
}
