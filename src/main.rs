use std::sync::Arc;

use rota::{
    build_service, build_store, create_router, init_tracing, shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "rota",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        backend = ?config.storage.backend,
        "Starting server"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    // Migrations and the initial pool fill block, keep them off the runtime.
    let store = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || build_store(&config)).await
    };
    let store = match store {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(
                error = %e,
                database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
                "Failed to open store"
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Store initialisation task failed");
            std::process::exit(1);
        }
    };

    info!("Store ready");

    let service = Arc::new(build_service(store, &config));
    let state = AppState::new(service, &config);
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            match result {
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(true);
            let grace = config.timeouts.shutdown();
            info!(grace_secs = grace.as_secs(), "Draining in-flight requests");

            if tokio::time::timeout(grace, &mut server).await.is_err() {
                warn!("Shutdown grace period elapsed with requests still in flight");
            }
        }
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
