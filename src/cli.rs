use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::engine::Engine;
use crate::server;

#[derive(Parser)]
#[command(name = "quantdesk")]
#[command(about = "Expression-based market analytics server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen port (overrides QD_LISTEN_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate the environment configuration and exit
    CheckConfig,
}

pub async fn run() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.listen_port);
            let engine = match Engine::new(&config) {
                Ok(engine) => Arc::new(engine),
                Err(err) => {
                    eprintln!("startup error: {}", err);
                    std::process::exit(1);
                }
            };
            if let Err(err) = server::serve(engine, port).await {
                eprintln!("server error: {}", err);
                std::process::exit(1);
            }
        }
        Commands::CheckConfig => {
            println!("gateway: {}", config.gateway_base_url());
            println!("client id: {}", config.client_id);
            println!("state dir: {}", config.state_dir.display());
            println!(
                "pacing: {}/min, slots: {}",
                config.rate_limit_per_min, config.inflight_slots
            );
            println!("ok");
        }
    }
}
