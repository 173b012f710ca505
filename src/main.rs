use std::sync::Arc;

use milkboard_lib::config::load_config;
use milkboard_lib::dashboard::HerdDashboard;
use milkboard_lib::google_api::http_client;
use milkboard_lib::google_api::sheets::GoogleSheetsSource;
use milkboard_lib::loader::{DatasetLoader, LoaderSettings};
use milkboard_lib::report::render;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let client = match http_client(config.request_timeout()) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let loader = DatasetLoader::new(
        Arc::new(GoogleSheetsSource::new(client)),
        LoaderSettings::from_config(&config),
    );
    let dashboard = HerdDashboard::new(loader, &config);

    print!("{}", render(&dashboard.refresh().await));

    let Some(interval) = config.refresh_interval() else {
        return;
    };
    log::info!("Refreshing every {:?}; Ctrl-C to stop", interval);

    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print!("\n{}", render(&dashboard.refresh().await));
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Stopping");
                break;
            }
        }
    }
}
