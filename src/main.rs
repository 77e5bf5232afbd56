use std::{fs, io::Result};

use crate::core::settings::Settings;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod core;
mod error;
mod server;
mod types;

const SETTINGS_PATH: &str = "settings.json";

#[actix_web::main]
async fn main() -> Result<()> {
    init_logging();

    let settings = match Settings::load(SETTINGS_PATH) {
        Ok(settings) => settings,
        Err(error) => {
            error!(path = SETTINGS_PATH, %error, "failed to load settings");
            std::process::exit(1);
        }
    };
    init_local_files(&settings)?;

    server::start_server(settings).await
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info,actix_web=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .init();
}

fn init_local_files(settings: &Settings) -> Result<()> {
    if !settings.uploads_dir.exists() {
        fs::create_dir_all(&settings.uploads_dir)?;
        info!(path = %settings.uploads_dir.display(), "created uploads directory");
    }
    Ok(())
}
