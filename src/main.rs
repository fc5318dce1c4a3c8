//! Edge Filter
//!
//! This is the main entry point for the edge filter service.
//! It loads configuration, connects the backing store and starts the web server.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;

use edge_filter::api::{self, ApiState};
use edge_filter::config::load_config;
use edge_filter::core::{Pipeline, ProtectionMode, TelegramChannel};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting edge filter...");

    let config = load_config().context("Failed to load configuration")?;
    let config = Arc::new(config);

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    };

    let mode = ProtectionMode::connect(&config.redis).await;
    let channel = TelegramChannel::from_config(&config.notifier);
    let pipeline = Pipeline::new(&config, mode, channel);
    info!(
        "Protection mode: {}; {} blocked countries, {} allowed identity patterns",
        pipeline.mode_label(),
        config.filter.blocked_countries.len(),
        config.filter.allowed_identities.len()
    );

    let state = web::Data::new(ApiState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
        metrics,
    });

    info!("Listening on {}:{}", config.server.host, config.server.port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
