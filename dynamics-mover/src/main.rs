//! dynamics-mover: move portal records between Dynamics 365 environments

use clap::Parser;

mod api;
mod cli;
mod config;
mod export;
mod files;
mod import;
mod records;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
