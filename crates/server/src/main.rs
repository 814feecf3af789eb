use std::sync::Arc;

use coordinator_config::CoordinatorConfig;
use coordinator_server::app;

#[tokio::main]
async fn main() {
    coordinator_observability::init();

    let config = match std::env::var("COORDINATOR_CONFIG_PATH") {
        Ok(path) => CoordinatorConfig::from_file(std::path::Path::new(&path))
            .unwrap_or_else(|e| panic!("failed to load config from {path}: {e}")),
        Err(_) => CoordinatorConfig::default(),
    };

    if let Err(e) = config.validate() {
        panic!("invalid configuration: {e}");
    }
    let config = Arc::new(config);

    let (state, workers) = app::build_in_memory(config.clone());
    let router = app::build_app(state);

    let bind_addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!(addr = %bind_addr, "coordinator server listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining workers");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server error");

    workers.shutdown().await;
}
