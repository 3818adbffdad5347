// src/cli/mod.rs — CLI definition (clap derive)

pub mod cost;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "harmony-agent", about = "Agent server with Harmony usage tracking", version)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket agent server (default)
    Serve {
        /// Bind address, overrides config and HOST
        #[arg(long)]
        host: Option<String>,
        /// Port, overrides config and PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Estimate the cost of a call from the built-in price table
    Cost {
        /// Model name, e.g. gemini-2.5-flash
        model: String,
        /// Input tokens
        #[arg(long, default_value = "0")]
        input: u64,
        /// Output tokens
        #[arg(long, default_value = "0")]
        output: u64,
    },
    /// Print the effective configuration with secrets redacted
    CheckConfig,
}
