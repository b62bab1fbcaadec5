use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};
use tokio::sync::Mutex;

use fleeting::{App, Cli, GlobalConfig, RecordStorage, Result};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => GlobalConfig::default_path()?,
    };
    let config = GlobalConfig::load(&config_path)?;

    let storage = RecordStorage::open(config, config_path)?;
    let app = App::new(Arc::new(Mutex::new(storage)), cli.verbose);
    app.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");
    match run(cli).await {
        Ok(()) => {
            info!("Application shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", console::style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
