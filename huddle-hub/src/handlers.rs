//! Inbound message routing.
//!
//! Every parsed frame comes through [`handle_message`]. Join failures are
//! answered with a `room-error`; any other message that fails its
//! precondition is dropped with a log line, since a client that
//! missequences messages cannot be helped by a reply.

use std::time::{SystemTime, UNIX_EPOCH};

use huddle_protocol::signaling::{
   ClientMessage, ConnectionId, ErrorCode, ServerMessage, MAX_CHAT_MESSAGE_LEN,
};
use tracing::{debug, info, warn};

use crate::connection::{Connection, Membership};
use crate::rooms::normalize_code;
use crate::AppState;

pub fn handle_message(state: &AppState, connection: &mut Connection, message: ClientMessage) {
   match message {
      ClientMessage::JoinRoom {
         room_code,
         peer_id,
         name,
         is_host,
      } => handle_join(state, connection, room_code, peer_id, name, is_host),
      ClientMessage::LeaveRoom => handle_leave(state, connection, true),
      ClientMessage::WebrtcOffer { to, offer } => {
         relay_fragment(state, connection, to, |to, from| {
            ServerMessage::WebrtcOffer { to, from, offer }
         });
      }
      ClientMessage::WebrtcAnswer { to, answer } => {
         relay_fragment(state, connection, to, |to, from| {
            ServerMessage::WebrtcAnswer { to, from, answer }
         });
      }
      ClientMessage::WebrtcIceCandidate { to, candidate } => {
         relay_fragment(state, connection, to, |to, from| {
            ServerMessage::WebrtcIceCandidate { to, from, candidate }
         });
      }
      ClientMessage::MediaState {
         video_enabled,
         audio_enabled,
         screen_sharing,
      } => handle_media_state(state, connection, video_enabled, audio_enabled, screen_sharing),
      ClientMessage::ChatMessage { message } => handle_chat(state, connection, message),
      ClientMessage::ScreenShareStart => handle_screen_share(state, connection, true),
      ClientMessage::ScreenShareStop => handle_screen_share(state, connection, false),
   }
}

/// Runs the departure path for a closing connection. Unlike an explicit
/// leave, the client is not told anything; it is gone.
pub fn handle_disconnect(state: &AppState, connection: &mut Connection) {
   if connection.membership.is_some() {
      handle_leave(state, connection, false);
   }
}

fn handle_join(
   state: &AppState,
   connection: &mut Connection,
   room_code: Option<String>,
   peer_id: Option<String>,
   name: Option<String>,
   is_host: bool,
) {
   if connection.membership.is_some() {
      return room_error(connection, ErrorCode::AlreadyInRoom);
   }
   let code = room_code.as_deref().map(normalize_code).unwrap_or_default();
   if code.is_empty() {
      return room_error(connection, ErrorCode::InvalidRoomCode);
   }
   let peer_id = peer_id.map(|peer| peer.trim().to_owned()).unwrap_or_default();
   if peer_id.is_empty() {
      return room_error(connection, ErrorCode::PeerIdRequired);
   }
   let name = name.map(|name| name.trim().to_owned()).unwrap_or_default();
   if name.is_empty() {
      return room_error(connection, ErrorCode::NameRequired);
   }

   let admitted = if is_host {
      state
         .rooms
         .create(&code, connection.id, &peer_id, &name, connection.sender.clone())
   } else {
      state
         .rooms
         .join(&code, connection.id, &peer_id, &name, connection.sender.clone())
   };
   let participants = match admitted {
      Ok(participants) => participants,
      Err(error) => {
         info!(id = %connection.id, room = %code, %error, "join refused");
         return room_error(connection, error.code());
      }
   };

   connection.membership = Some(Membership {
      room_code: code.clone(),
      peer_id,
      name,
   });

   let me = participants
      .iter()
      .find(|participant| participant.id == connection.id)
      .cloned();
   connection.send(ServerMessage::RoomJoined {
      room_code: code.clone(),
      is_host: me.as_ref().map(|me| me.is_host).unwrap_or(is_host),
      participants: participants.clone(),
   });
   if let Some(participant) = me {
      broadcast(
         state,
         &code,
         connection.id,
         ServerMessage::ParticipantJoined { participant },
      );
   }
   broadcast(
      state,
      &code,
      connection.id,
      ServerMessage::ParticipantsUpdate { participants },
   );
}

fn handle_leave(state: &AppState, connection: &mut Connection, notify_self: bool) {
   let Some(membership) = connection.membership.take() else {
      debug!(id = %connection.id, "leave without a room, dropping");
      return;
   };
   if let Some(departure) = state.rooms.leave(&membership.room_code, connection.id) {
      if !departure.room_deleted {
         broadcast(
            state,
            &membership.room_code,
            connection.id,
            ServerMessage::ParticipantLeft {
               participant_id: connection.id,
               peer_id: departure.peer_id,
            },
         );
         // The roster carries the new host flags, so a host handover needs
         // no event of its own.
         if let Some(participants) = state.rooms.participants_of(&membership.room_code) {
            broadcast(
               state,
               &membership.room_code,
               connection.id,
               ServerMessage::ParticipantsUpdate { participants },
            );
         }
      }
   }
   if notify_self {
      connection.send(ServerMessage::RoomLeft);
   }
}

/// Delivers a negotiation fragment to the one peer it names. The fragment
/// itself is never looked at.
fn relay_fragment(
   state: &AppState,
   connection: &Connection,
   to: String,
   build: impl FnOnce(String, String) -> ServerMessage,
) {
   let Some(membership) = &connection.membership else {
      debug!(id = %connection.id, "relay from outside a room, dropping");
      return;
   };
   state.rooms.touch(&membership.room_code);
   let Some(sender) = state.rooms.peer_sender(&membership.room_code, &to) else {
      warn!(
         id = %connection.id,
         room = %membership.room_code,
         to = %to,
         "relay to unknown peer, dropping"
      );
      return;
   };
   // `from` comes from our own participant record; whatever the client put
   // in the payload is not consulted.
   let _ = sender.send(build(to, membership.peer_id.clone()));
}

fn handle_media_state(
   state: &AppState,
   connection: &Connection,
   video_enabled: bool,
   audio_enabled: bool,
   screen_sharing: Option<bool>,
) {
   let Some(membership) = &connection.membership else {
      debug!(id = %connection.id, "media state from outside a room, dropping");
      return;
   };
   state.rooms.touch(&membership.room_code);
   broadcast(
      state,
      &membership.room_code,
      connection.id,
      ServerMessage::MediaStateChanged {
         participant_id: connection.id,
         peer_id: membership.peer_id.clone(),
         video_enabled,
         audio_enabled,
         screen_sharing,
      },
   );
}

fn handle_chat(state: &AppState, connection: &Connection, message: String) {
   let Some(membership) = &connection.membership else {
      debug!(id = %connection.id, "chat from outside a room, dropping");
      return;
   };
   let message = message.trim();
   if message.is_empty() {
      debug!(id = %connection.id, "empty chat message, dropping");
      return;
   }
   let message: String = message.chars().take(MAX_CHAT_MESSAGE_LEN).collect();
   state.rooms.touch(&membership.room_code);
   broadcast(
      state,
      &membership.room_code,
      connection.id,
      ServerMessage::ChatMessage {
         from: connection.id,
         from_name: membership.name.clone(),
         message,
         timestamp: unix_millis(),
      },
   );
}

fn handle_screen_share(state: &AppState, connection: &Connection, started: bool) {
   let Some(membership) = &connection.membership else {
      debug!(id = %connection.id, "screen share event from outside a room, dropping");
      return;
   };
   state.rooms.touch(&membership.room_code);
   let message = if started {
      ServerMessage::ScreenShareStarted {
         participant_id: connection.id,
         peer_id: membership.peer_id.clone(),
      }
   } else {
      ServerMessage::ScreenShareStopped {
         participant_id: connection.id,
         peer_id: membership.peer_id.clone(),
      }
   };
   broadcast(state, &membership.room_code, connection.id, message);
}

/// Fans an event out to everyone in the room except the originator. The
/// recipient snapshot is taken before any send, so no send ever runs under
/// a room lock, and a slow or dead recipient cannot hold up the rest.
fn broadcast(state: &AppState, code: &str, except: ConnectionId, message: ServerMessage) {
   for recipient in state.rooms.recipients(code, except) {
      // A closed queue belongs to a connection that is going down; its own
      // task cleans up after it.
      let _ = recipient.send(message.clone());
   }
}

fn room_error(connection: &Connection, code: ErrorCode) {
   connection.send(ServerMessage::RoomError {
      code,
      message: code.message().to_owned(),
   });
}

/// Hub time in Unix milliseconds.
pub fn unix_millis() -> u64 {
   SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_millis() as u64)
      .unwrap_or(0)
}

#[cfg(test)]
mod tests {
   use clap::Parser;
   use huddle_protocol::signaling::Participant;
   use serde_json::json;
   use tokio::sync::mpsc;

   use super::*;
   use crate::config::Options;

   fn hub() -> AppState {
      AppState::new(Options::parse_from(["huddle-hub"]))
   }

   fn connect(state: &AppState) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
      let (sender, receiver) = mpsc::unbounded_channel();
      let connection = Connection {
         id: state.allocate_connection_id(),
         sender,
         membership: None,
      };
      (connection, receiver)
   }

   fn join(
      state: &AppState,
      connection: &mut Connection,
      code: &str,
      peer_id: &str,
      name: &str,
      is_host: bool,
   ) {
      handle_message(state, connection, ClientMessage::JoinRoom {
         room_code: Some(code.into()),
         peer_id: Some(peer_id.into()),
         name: Some(name.into()),
         is_host,
      });
   }

   fn next(receiver: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
      receiver.try_recv().expect("expected a queued message")
   }

   fn assert_silent(receiver: &mut mpsc::UnboundedReceiver<ServerMessage>) {
      assert!(receiver.try_recv().is_err(), "expected no queued messages");
   }

   #[test]
   fn host_join_answers_with_the_initial_roster() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);

      match next(&mut alice_rx) {
         ServerMessage::RoomJoined {
            room_code,
            is_host,
            participants,
         } => {
            assert_eq!(room_code, "abc");
            assert!(is_host);
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].peer_id, "pA");
         }
         other => panic!("unexpected message: {other:?}"),
      }
      assert_silent(&mut alice_rx);
   }

   #[test]
   fn guest_join_normalizes_the_code_and_notifies_the_room() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      let _ = next(&mut alice_rx);

      join(&state, &mut bob, "ABC ", "pB", "Bob", false);

      match next(&mut bob_rx) {
         ServerMessage::RoomJoined {
            room_code,
            is_host,
            participants,
         } => {
            assert_eq!(room_code, "abc");
            assert!(!is_host);
            assert_eq!(participants.len(), 2);
         }
         other => panic!("unexpected message: {other:?}"),
      }
      match next(&mut alice_rx) {
         ServerMessage::ParticipantJoined { participant } => {
            assert_eq!(participant.peer_id, "pB");
            assert_eq!(participant.name, "Bob");
            assert!(!participant.is_host);
         }
         other => panic!("unexpected message: {other:?}"),
      }
      match next(&mut alice_rx) {
         ServerMessage::ParticipantsUpdate { participants } => {
            assert_eq!(participants.len(), 2);
         }
         other => panic!("unexpected message: {other:?}"),
      }
   }

   #[test]
   fn join_validation_answers_with_error_codes() {
      let state = hub();

      let (mut c1, mut rx1) = connect(&state);
      handle_message(&state, &mut c1, ClientMessage::JoinRoom {
         room_code: None,
         peer_id: Some("p".into()),
         name: Some("n".into()),
         is_host: true,
      });
      assert_room_error(&mut rx1, ErrorCode::InvalidRoomCode);

      let (mut c2, mut rx2) = connect(&state);
      handle_message(&state, &mut c2, ClientMessage::JoinRoom {
         room_code: Some("abc".into()),
         peer_id: None,
         name: Some("n".into()),
         is_host: true,
      });
      assert_room_error(&mut rx2, ErrorCode::PeerIdRequired);

      let (mut c3, mut rx3) = connect(&state);
      handle_message(&state, &mut c3, ClientMessage::JoinRoom {
         room_code: Some("abc".into()),
         peer_id: Some("p".into()),
         name: Some("   ".into()),
         is_host: true,
      });
      assert_room_error(&mut rx3, ErrorCode::NameRequired);
   }

   #[test]
   fn join_refusals_surface_the_registry_error() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      let _ = next(&mut alice_rx);

      // Unknown code.
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut bob, "nope", "pB", "Bob", false);
      assert_room_error(&mut bob_rx, ErrorCode::RoomNotFound);

      // Hosting a taken code.
      let (mut carol, mut carol_rx) = connect(&state);
      join(&state, &mut carol, "abc", "pC", "Carol", true);
      assert_room_error(&mut carol_rx, ErrorCode::RoomAlreadyExists);

      // Taken peer id.
      let (mut dave, mut dave_rx) = connect(&state);
      join(&state, &mut dave, "abc", "pA", "Dave", false);
      assert_room_error(&mut dave_rx, ErrorCode::PeerIdTaken);

      // Joining while already a member somewhere.
      join(&state, &mut alice, "other", "pX", "Alice", true);
      assert_room_error(&mut alice_rx, ErrorCode::AlreadyInRoom);
   }

   #[test]
   fn join_refused_at_capacity() {
      let state = AppState::new(Options::parse_from([
         "huddle-hub",
         "--max-participants",
         "2",
      ]));
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      let (mut carol, mut carol_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      // One below the cap succeeds.
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      assert!(matches!(next(&mut bob_rx), ServerMessage::RoomJoined { .. }));
      // At the cap the join is refused and the room is untouched.
      join(&state, &mut carol, "abc", "pC", "Carol", false);
      assert_room_error(&mut carol_rx, ErrorCode::RoomFull);
      let _ = next(&mut alice_rx);
      assert!(matches!(
         next(&mut alice_rx),
         ServerMessage::ParticipantJoined { .. }
      ));
   }

   #[test]
   fn relay_stamps_from_and_reaches_only_the_addressee() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      let (mut carol, mut carol_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      join(&state, &mut carol, "abc", "pC", "Carol", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);
      drain(&mut carol_rx);

      // The fragment claims to be from somebody else; the envelope must
      // carry Bob's peer id regardless.
      let fragment = json!({ "sdp": "v=0...", "from": "forged" });
      handle_message(&state, &mut bob, ClientMessage::WebrtcOffer {
         to: "pA".into(),
         offer: fragment.clone(),
      });

      match next(&mut alice_rx) {
         ServerMessage::WebrtcOffer { to, from, offer } => {
            assert_eq!(to, "pA");
            assert_eq!(from, "pB");
            assert_eq!(offer, fragment);
         }
         other => panic!("unexpected message: {other:?}"),
      }
      assert_silent(&mut bob_rx);
      assert_silent(&mut carol_rx);
   }

   #[test]
   fn relay_to_an_unknown_peer_is_dropped() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::WebrtcAnswer {
         to: "pZ".into(),
         answer: json!({}),
      });
      assert_silent(&mut alice_rx);
      assert_silent(&mut bob_rx);
   }

   #[test]
   fn relay_from_outside_a_room_is_dropped() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      handle_message(&state, &mut alice, ClientMessage::WebrtcIceCandidate {
         to: "pA".into(),
         candidate: json!({}),
      });
      assert_silent(&mut alice_rx);
   }

   #[test]
   fn chat_is_trimmed_stamped_and_kept_from_the_sender() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::ChatMessage {
         message: "  hello  ".into(),
      });

      match next(&mut alice_rx) {
         ServerMessage::ChatMessage {
            from,
            from_name,
            message,
            timestamp,
         } => {
            assert_eq!(from, bob.id);
            assert_eq!(from_name, "Bob");
            assert_eq!(message, "hello");
            assert!(timestamp > 0);
         }
         other => panic!("unexpected message: {other:?}"),
      }
      assert_silent(&mut bob_rx);
   }

   #[test]
   fn overlong_chat_is_truncated_and_empty_chat_is_dropped() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::ChatMessage {
         message: "x".repeat(MAX_CHAT_MESSAGE_LEN + 1),
      });
      match next(&mut alice_rx) {
         ServerMessage::ChatMessage { message, .. } => {
            assert_eq!(message.chars().count(), MAX_CHAT_MESSAGE_LEN);
         }
         other => panic!("unexpected message: {other:?}"),
      }

      handle_message(&state, &mut bob, ClientMessage::ChatMessage {
         message: "   ".into(),
      });
      assert_silent(&mut alice_rx);
   }

   #[test]
   fn media_state_fans_out_to_the_rest_of_the_room() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::MediaState {
         video_enabled: false,
         audio_enabled: true,
         screen_sharing: Some(false),
      });

      match next(&mut alice_rx) {
         ServerMessage::MediaStateChanged {
            participant_id,
            peer_id,
            video_enabled,
            audio_enabled,
            screen_sharing,
         } => {
            assert_eq!(participant_id, bob.id);
            assert_eq!(peer_id, "pB");
            assert!(!video_enabled);
            assert!(audio_enabled);
            assert_eq!(screen_sharing, Some(false));
         }
         other => panic!("unexpected message: {other:?}"),
      }
      assert_silent(&mut bob_rx);
   }

   #[test]
   fn screen_share_events_fan_out() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::ScreenShareStart);
      assert!(matches!(
         next(&mut alice_rx),
         ServerMessage::ScreenShareStarted { peer_id, .. } if peer_id == "pB"
      ));
      handle_message(&state, &mut bob, ClientMessage::ScreenShareStop);
      assert!(matches!(
         next(&mut alice_rx),
         ServerMessage::ScreenShareStopped { peer_id, .. } if peer_id == "pB"
      ));
      assert_silent(&mut bob_rx);
   }

   #[test]
   fn leave_notifies_the_leaver_and_the_room() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut bob_rx);

      handle_message(&state, &mut bob, ClientMessage::LeaveRoom);

      assert!(matches!(next(&mut bob_rx), ServerMessage::RoomLeft));
      match next(&mut alice_rx) {
         ServerMessage::ParticipantLeft {
            participant_id,
            peer_id,
         } => {
            assert_eq!(participant_id, bob.id);
            assert_eq!(peer_id, "pB");
         }
         other => panic!("unexpected message: {other:?}"),
      }
      assert!(matches!(
         next(&mut alice_rx),
         ServerMessage::ParticipantsUpdate { participants } if participants.len() == 1
      ));

      // A second leave is a silent no-op.
      handle_message(&state, &mut bob, ClientMessage::LeaveRoom);
      assert_silent(&mut bob_rx);
      assert_silent(&mut alice_rx);
   }

   #[test]
   fn host_disconnect_promotes_the_earliest_joiner() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      let (mut carol, mut carol_rx) = connect(&state);
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      join(&state, &mut carol, "abc", "pC", "Carol", false);
      join(&state, &mut bob, "abc", "pB", "Bob", false);
      drain(&mut alice_rx);
      drain(&mut carol_rx);
      drain(&mut bob_rx);

      handle_disconnect(&state, &mut alice);

      // The disconnected host is told nothing.
      assert_silent(&mut alice_rx);
      for receiver in [&mut carol_rx, &mut bob_rx] {
         assert!(matches!(
            next(receiver),
            ServerMessage::ParticipantLeft { peer_id, .. } if peer_id == "pA"
         ));
         match next(receiver) {
            ServerMessage::ParticipantsUpdate { participants } => {
               let hosts: Vec<&Participant> =
                  participants.iter().filter(|p| p.is_host).collect();
               assert_eq!(hosts.len(), 1);
               assert_eq!(hosts[0].id, carol.id);
            }
            other => panic!("unexpected message: {other:?}"),
         }
      }

      // Disconnect teardown is idempotent.
      handle_disconnect(&state, &mut alice);
      assert_silent(&mut carol_rx);
      assert_silent(&mut bob_rx);
   }

   #[test]
   fn last_disconnect_deletes_the_room() {
      let state = hub();
      let (mut alice, mut alice_rx) = connect(&state);
      join(&state, &mut alice, "abc", "pA", "Alice", true);
      drain(&mut alice_rx);

      handle_disconnect(&state, &mut alice);
      assert_silent(&mut alice_rx);
      assert_eq!(state.rooms.stats().total_rooms, 0);

      // The code is free again.
      let (mut bob, mut bob_rx) = connect(&state);
      join(&state, &mut bob, "abc", "pB", "Bob", true);
      assert!(matches!(next(&mut bob_rx), ServerMessage::RoomJoined { .. }));
   }

   fn assert_room_error(
      receiver: &mut mpsc::UnboundedReceiver<ServerMessage>,
      expected: ErrorCode,
   ) {
      match next(receiver) {
         ServerMessage::RoomError { code, message } => {
            assert_eq!(code, expected);
            assert!(!message.is_empty());
         }
         other => panic!("unexpected message: {other:?}"),
      }
   }

   fn drain(receiver: &mut mpsc::UnboundedReceiver<ServerMessage>) {
      while receiver.try_recv().is_ok() {}
   }
}
