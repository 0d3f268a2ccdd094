//! The huddle signaling hub.
//!
//! Keeps track of open rooms and ferries negotiation fragments, presence
//! and chat between the browsers in each room. Media never passes through
//! here; once peers have exchanged their fragments they talk to each other
//! directly.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use huddle_protocol::signaling::ConnectionId;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod admin;
mod config;
mod connection;
mod handlers;
mod rooms;

use config::Options;
use rooms::Rooms;

/// Everything the connection tasks share. The registry is the only mutable
/// part; it is injected here rather than living in a global so that tests
/// can spin up as many hubs as they like.
pub struct AppState {
   pub rooms: Arc<Rooms>,
   pub options: Options,
   next_connection_id: AtomicU64,
}

impl AppState {
   pub fn new(options: Options) -> Self {
      let rooms = Arc::new(Rooms::new(
         options.max_participants,
         Duration::from_secs(options.idle_room_timeout * 60),
      ));
      Self {
         rooms,
         options,
         next_connection_id: AtomicU64::new(0),
      }
   }

   /// Hands out the next connection ID. IDs start at 1 and are never
   /// reused within a process.
   pub fn allocate_connection_id(&self) -> ConnectionId {
      ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1)
   }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
      .init();
   let options = Options::parse();

   let state = Arc::new(AppState::new(options.clone()));
   rooms::spawn_sweeper(
      Arc::clone(&state.rooms),
      Duration::from_secs(options.sweep_interval),
   );

   let app = Router::new()
      .route("/ws", get(connection::ws_handler))
      // Alias for deployments whose reverse proxy still targets the upgrade
      // path of the socket.io-era hub. Plain WebSocket upgrades only.
      .route("/socket.io/", get(connection::ws_handler))
      .route("/health", get(admin::health))
      .route("/stats", get(admin::stats))
      .layer(cors_layer(&options.cors_origins)?)
      .with_state(state);

   let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, options.port))
      .await
      .with_context(|| format!("failed to bind port {}", options.port))?;
   info!(
      "huddle hub {} listening on {}",
      env!("CARGO_PKG_VERSION"),
      listener.local_addr()?
   );

   axum::serve(listener, app)
      .with_graceful_shutdown(shutdown_signal())
      .await?;
   Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
   let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
   if origins.is_empty() {
      return Ok(layer.allow_origin(Any));
   }
   let origins = origins
      .iter()
      .map(|origin| {
         origin
            .trim()
            .parse::<HeaderValue>()
            .with_context(|| format!("invalid CORS origin {origin:?}"))
      })
      .collect::<anyhow::Result<Vec<_>>>()?;
   Ok(layer.allow_origin(origins))
}

/// Resolves when the process is asked to stop. axum then stops accepting
/// new connections and drains the live ones before exit.
async fn shutdown_signal() {
   let interrupt = async {
      if tokio::signal::ctrl_c().await.is_ok() {
         info!("interrupt received, shutting down");
      }
   };
   #[cfg(unix)]
   let terminate = async {
      use tokio::signal::unix::{signal, SignalKind};
      match signal(SignalKind::terminate()) {
         Ok(mut stream) => {
            stream.recv().await;
            info!("termination signal received, shutting down");
         }
         Err(_) => std::future::pending().await,
      }
   };
   #[cfg(not(unix))]
   let terminate = std::future::pending::<()>();

   tokio::select! {
      _ = interrupt => (),
      _ = terminate => (),
   }
}
