mod cache;
mod config;
mod error;
mod handlers;
mod models;
mod routes;
mod scraping;
mod selection;

use actix_web::{App, HttpServer, web};
use config::BotConfig;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::from_env()?;
    tracing::info!(
        "Listening on {}:{} (auto submit: {}, time ordering: {:?})",
        config.bind_addr,
        config.port,
        config.auto_submit,
        config.time_ordering
    );

    let bind = (config.bind_addr.clone(), config.port);
    let data = web::Data::new(config);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::init))
        .bind(bind)?
        .run()
        .await?;

    Ok(())
}
