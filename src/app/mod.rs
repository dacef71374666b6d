mod config;
mod error;
mod logging;
mod runtime;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        vendista_base_url = %config.vendista_base_url,
        terminal_ids = ?config.terminal_ids,
        poll_interval_secs = config.poll_interval_secs,
        csv_path = %config.csv_path,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
