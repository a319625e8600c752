pub mod config;
pub mod db;
pub mod distribution;
pub mod error;
pub mod latest;
pub mod revenue;
pub mod server;
pub mod settlement;

use config::ServerConfig;
use db::Database;
use server::AppState;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Handle to a running server.
pub struct ServerHandle {
    pub url: String,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl ServerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

/// Start the API server. Returns a handle.
pub async fn start(config: ServerConfig) -> anyhow::Result<ServerHandle> {
    let db = Database::open(&config.db_path)?;

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        start_time: Instant::now(),
    });

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let url = format!("http://{}", listener.local_addr()?);
    info!(%url, "server listening");

    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .ok();
    });

    Ok(ServerHandle { url, shutdown: tx })
}
