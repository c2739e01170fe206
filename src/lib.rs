pub mod config;
pub mod config_store;
pub mod error;
pub mod handlers;
pub mod load_balancer;
pub mod logging;
pub mod model_list;
pub mod models;
pub mod oauth;
pub mod router;
pub mod server;
pub mod signals;
pub mod stats;
pub mod templates;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
