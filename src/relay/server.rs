//! HTTP + WebSocket surface of the relay
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};

use super::{Frame, Health, Relay};
use crate::config::RelayConfig;
use crate::error::Result;

pub fn router(relay: Arc<Relay>, static_dir: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(relay)
}

async fn health(State(relay): State<Arc<Relay>>) -> Json<Health> {
    Json(relay.health())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(mut socket: WebSocket, relay: Arc<Relay>) {
    let (sender, mut outgoing) = mpsc::unbounded_channel();
    let client = relay.on_connect(sender);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    relay.on_message(client, text);
                }
                Some(Ok(Message::Binary(bytes))) => {
                    relay.on_message(client, bytes);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Connection {} errored: {}", client, e);
                    break;
                }
            },
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    let message = match frame {
                        Frame::Text(text) => Message::Text(text),
                        Frame::Binary(bytes) => Message::Binary(bytes),
                    };
                    if let Err(e) = socket.send(message).await {
                        tracing::debug!("Send to {} failed: {}", client, e);
                        break;
                    }
                }
                None => break,
            },
        }
    }

    relay.on_disconnect(client);
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn run(config: RelayConfig) -> Result<()> {
    let relay = Arc::new(Relay::new(config.mode));
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;

    tracing::info!(
        "Groovebox Server running at http://localhost:{} ({:?})",
        config.port,
        config.mode
    );

    serve(listener, router(relay, &config.static_dir), shutdown_signal()).await?;
    tracing::info!("Groovebox Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
