use actix_web::web;
use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use video_insight::api;
use video_insight::config::Config;
use video_insight::downloader::YtDlpFetcher;
use video_insight::gemini::GeminiClient;
use video_insight::{SessionController, SessionSettings};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::from_env().context("cannot start without configuration")?;

    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("cannot create temp dir {}", config.temp_dir.display()))?;

    // One client for the life of the process.
    let agent = GeminiClient::new(&config.api_key, &config.model, config.api_base.as_deref())
        .with_web_search(config.web_search);
    info!("Using model {}", config.model);

    let session = SessionController::new(
        Arc::new(agent),
        Arc::new(YtDlpFetcher::new(&config.ytdlp_bin)),
        SessionSettings {
            temp_dir: config.temp_dir.clone(),
            accepted_extensions: config.accepted_extensions.clone(),
        },
    );

    api::run_api_server(web::Data::new(session), config.bind_addr, config.max_upload_bytes)
        .await
        .context("API server failed")?;
    Ok(())
}
