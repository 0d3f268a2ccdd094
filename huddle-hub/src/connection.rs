//! One live client connection.
//!
//! Every accepted socket gets a reader loop (this task) and a writer task.
//! The reader parses frames and funnels them into the message router; the
//! writer drains the connection's outbound queue and keeps the client alive
//! with periodic pings. Whichever side stops first tears the whole
//! connection down, and teardown runs the same departure path as an
//! explicit leave.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use huddle_protocol::signaling::{ClientMessage, ConnectionId, ServerMessage, MAX_FRAME_SIZE};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handlers;
use crate::rooms::PeerSender;
use crate::AppState;

/// A connection's binding to the room it joined. The strings are lookup
/// keys into the registry, not owners of any room state.
pub struct Membership {
   pub room_code: String,
   pub peer_id: String,
   pub name: String,
}

/// Connection-scoped state. Owned by the connection's reader task; other
/// tasks only ever see the sender half of the outbound queue. At most one
/// room membership at a time.
pub struct Connection {
   pub id: ConnectionId,
   pub sender: PeerSender,
   pub membership: Option<Membership>,
}

impl Connection {
   /// Queues a message for delivery to this client.
   pub fn send(&self, message: ServerMessage) {
      // A closed queue means the writer task is gone and the connection is
      // on its way down; the departure path will run shortly.
      let _ = self.sender.send(message);
   }
}

/// Accepts the HTTP upgrade and hands the socket to [`handle_socket`].
pub async fn ws_handler(
   State(state): State<Arc<AppState>>,
   ws: WebSocketUpgrade,
) -> impl IntoResponse {
   ws.max_message_size(MAX_FRAME_SIZE)
      .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
   let id = state.allocate_connection_id();
   info!(%id, "client connected");

   let (sender, outbox) = mpsc::unbounded_channel();
   let (socket_tx, socket_rx) = socket.split();

   let last_seen = Arc::new(Mutex::new(Instant::now()));
   let mut writer = tokio::spawn(write_loop(
      socket_tx,
      outbox,
      Duration::from_secs(state.options.ping_interval),
      Duration::from_secs(state.options.ping_timeout),
      Arc::clone(&last_seen),
   ));

   let mut connection = Connection {
      id,
      sender,
      membership: None,
   };
   tokio::select! {
      _ = read_loop(&mut connection, socket_rx, &state, &last_seen) => (),
      _ = &mut writer => (),
   }

   // Runs the departure path exactly once, whether the client left with a
   // close frame, vanished mid-write, or timed out on keepalive.
   handlers::handle_disconnect(&state, &mut connection);
   writer.abort();
   info!(%id, "client disconnected");
}

async fn read_loop(
   connection: &mut Connection,
   mut socket: SplitStream<WebSocket>,
   state: &AppState,
   last_seen: &Mutex<Instant>,
) {
   while let Some(frame) = socket.next().await {
      let frame = match frame {
         Ok(frame) => frame,
         Err(error) => {
            debug!(id = %connection.id, %error, "transport error");
            break;
         }
      };
      *last_seen.lock() = Instant::now();
      match frame {
         Message::Text(text) => {
            let message: ClientMessage = match serde_json::from_str(&text) {
               Ok(message) => message,
               Err(error) => {
                  warn!(id = %connection.id, %error, "dropping frame that does not parse");
                  continue;
               }
            };
            handlers::handle_message(state, connection, message);
         }
         Message::Binary(_) => {
            debug!(id = %connection.id, "dropping unexpected binary frame");
         }
         // Inbound pings are answered by the socket layer; here both
         // directions only matter as proof of life.
         Message::Ping(_) | Message::Pong(_) => (),
         Message::Close(_) => break,
      }
   }
}

/// Drains the outbound queue into the socket and pings the client on an
/// interval. Exits when the queue closes, the socket dies, or the client
/// has been silent for longer than the keepalive timeout.
async fn write_loop(
   mut socket: SplitSink<WebSocket, Message>,
   mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
   ping_interval: Duration,
   ping_timeout: Duration,
   last_seen: Arc<Mutex<Instant>>,
) {
   let mut ping = tokio::time::interval(ping_interval);
   ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
   // The first tick completes immediately; skip it.
   ping.tick().await;
   loop {
      tokio::select! {
         message = outbox.recv() => {
            let Some(message) = message else { break };
            let text = match serde_json::to_string(&message) {
               Ok(text) => text,
               Err(error) => {
                  warn!(%error, "failed to encode outbound message");
                  continue;
               }
            };
            if socket.send(Message::Text(text)).await.is_err() {
               break;
            }
         }
         _ = ping.tick() => {
            if last_seen.lock().elapsed() > ping_timeout {
               debug!("client went silent past the keepalive timeout");
               break;
            }
            if socket.send(Message::Ping(Vec::new())).await.is_err() {
               break;
            }
         }
      }
   }
   let _ = socket.close().await;
}
