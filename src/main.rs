
pub mod cli;
pub mod config;
pub mod fetch_core;
pub mod pipeline;
pub mod registry;
pub mod snapshot_core;
pub mod store;

use clap::Parser;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();

    log::info!("🚀 Starting snapshot run...");
    pipeline::run(args).await?;

    Ok(())
}
