#[macro_use]
extern crate tracing;

mod api;
mod clients;
mod composeinfo;
mod config;
mod error;
mod expirer;
mod helpers;
mod manifest;
mod repo_file;
mod resolver;
mod reuse_index;
mod scheduler;
mod state;
mod store;
mod tool_config;
mod worker;

use config::odcs_config;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

async fn app() -> anyhow::Result<()> {
  let config = odcs_config();
  logger::init(&config.log)?;

  info!("ODCS version: v{}", env!("CARGO_PKG_VERSION"));
  info!("serving target dir {}", config.target_dir.display());

  state::init_store().await;

  scheduler::spawn();
  expirer::spawn();

  let router = api::app()
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

  let listener =
    tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
  info!("ODCS listening on :{}", config.port);
  axum::serve(listener, router).await?;

  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  app().await
}
