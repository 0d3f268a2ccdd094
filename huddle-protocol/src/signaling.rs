//! Signaling messages.
//!
//! Every frame on the wire is a JSON object whose `type` field names the
//! message; the remaining fields are the payload. Negotiation fragments
//! (offers, answers, ICE candidates) are carried as raw [`Value`]s and are
//! never interpreted by the hub.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The default hub port.
pub const DEFAULT_PORT: u16 = 3001;

/// The maximum length of a chat message, in code points. Longer messages are
/// truncated before being fanned out.
pub const MAX_CHAT_MESSAGE_LEN: usize = 1000;

/// The maximum length of an inbound frame. If a frame is larger than this
/// amount, the connection shall be closed.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// The inner type for storing a connection ID.
type ConnectionIdInner = u64;

/// The unique ID of a live connection, assigned by the hub.
///
/// Doubles as the participant ID inside a room. Not to be confused with the
/// peer ID, which clients pick themselves and use to address each other.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct ConnectionId(pub ConnectionIdInner);

impl Display for ConnectionId {
   fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
      write!(f, "c:{}", self.0)
   }
}

impl fmt::Debug for ConnectionId {
   fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self)
   }
}

/// One row of a room roster, as seen by clients.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
   /// The participant's connection ID.
   pub id: ConnectionId,
   /// The peer ID the participant announced on join. Other clients address
   /// their negotiation fragments to this.
   pub peer_id: String,
   /// Display name, trimmed by the hub.
   pub name: String,
   /// Whether this participant is the room's host.
   pub is_host: bool,
}

/// Codes carried by a `room-error` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
   /// A join referenced a room code that is not in use.
   RoomNotFound,
   /// The room is at its participant cap.
   RoomFull,
   /// A host join referenced a room code that is already in use.
   RoomAlreadyExists,
   /// The room code was missing or empty after normalization.
   InvalidRoomCode,
   /// The connection is already a member of a room.
   AlreadyInRoom,
   /// The display name was missing or empty after trimming.
   NameRequired,
   /// The peer ID was missing or empty.
   PeerIdRequired,
   /// Another participant in the room already announced this peer ID.
   PeerIdTaken,
   /// The hub failed internally while admitting the participant.
   ServerError,
}

impl ErrorCode {
   /// A human-readable description, sent alongside the code.
   pub fn message(self) -> &'static str {
      match self {
         ErrorCode::RoomNotFound => "room not found",
         ErrorCode::RoomFull => "room is full",
         ErrorCode::RoomAlreadyExists => "room already exists",
         ErrorCode::InvalidRoomCode => "a room code is required",
         ErrorCode::AlreadyInRoom => "already in a room",
         ErrorCode::NameRequired => "a display name is required",
         ErrorCode::PeerIdRequired => "a peer id is required",
         ErrorCode::PeerIdTaken => "peer id is already taken in this room",
         ErrorCode::ServerError => "internal server error",
      }
   }
}

impl Display for ErrorCode {
   fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.message())
   }
}

/// Tolerates a field that is absent, null, or not a string at all, mapping
/// every non-string to `None`. A join whose `roomCode` is a number must
/// still parse as a join, so that validation can answer it with the right
/// `room-error` code rather than the frame being dropped as malformed.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
   D: serde::Deserializer<'de>,
{
   let value = Option::<Value>::deserialize(deserializer)?;
   Ok(match value {
      Some(Value::String(string)) => Some(string),
      _ => None,
   })
}

/// Messages sent by clients to the hub.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
   /// Request to create (`isHost`) or join a room.
   ///
   /// The identifying fields are lenient at the serde level: missing and
   /// non-string values both come through as `None`, to be answered with
   /// the right `room-error` code instead of being dropped as malformed.
   JoinRoom {
      #[serde(default, deserialize_with = "lenient_string")]
      room_code: Option<String>,
      #[serde(default, deserialize_with = "lenient_string")]
      peer_id: Option<String>,
      #[serde(default, deserialize_with = "lenient_string")]
      name: Option<String>,
      #[serde(default)]
      is_host: bool,
   },
   /// Leave the current room.
   LeaveRoom,
   /// A session description offer for the peer named by `to`.
   WebrtcOffer { to: String, offer: Value },
   /// A session description answer for the peer named by `to`.
   WebrtcAnswer { to: String, answer: Value },
   /// An ICE candidate for the peer named by `to`.
   WebrtcIceCandidate { to: String, candidate: Value },
   /// The sender's current media toggles, to be fanned out to the room.
   MediaState {
      video_enabled: bool,
      audio_enabled: bool,
      #[serde(default, skip_serializing_if = "Option::is_none")]
      screen_sharing: Option<bool>,
   },
   /// A chat line, to be fanned out to everyone else in the room.
   ChatMessage { message: String },
   /// The sender started sharing their screen.
   ScreenShareStart,
   /// The sender stopped sharing their screen.
   ScreenShareStop,
}

/// Messages sent by the hub to clients.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
   /// Response to a successful join, with the full roster (sender included).
   RoomJoined {
      room_code: String,
      is_host: bool,
      participants: Vec<Participant>,
   },
   /// Response to a failed join.
   RoomError { code: ErrorCode, message: String },
   /// Response to a successful leave.
   RoomLeft,
   /// Someone else joined the sender's room.
   ParticipantJoined { participant: Participant },
   /// Someone else left the sender's room.
   ParticipantLeft {
      participant_id: ConnectionId,
      peer_id: String,
   },
   /// The authoritative roster after any change. Host handover is visible
   /// only through this message, via the roster's `isHost` flags.
   ParticipantsUpdate { participants: Vec<Participant> },
   /// A relayed offer. `from` is the sending peer's ID, stamped by the hub.
   WebrtcOffer {
      to: String,
      from: String,
      offer: Value,
   },
   /// A relayed answer. `from` is stamped by the hub.
   WebrtcAnswer {
      to: String,
      from: String,
      answer: Value,
   },
   /// A relayed ICE candidate. `from` is stamped by the hub.
   WebrtcIceCandidate {
      to: String,
      from: String,
      candidate: Value,
   },
   /// Another participant toggled their media.
   MediaStateChanged {
      participant_id: ConnectionId,
      peer_id: String,
      video_enabled: bool,
      audio_enabled: bool,
      #[serde(default, skip_serializing_if = "Option::is_none")]
      screen_sharing: Option<bool>,
   },
   /// A chat line from another participant. The timestamp is hub time in
   /// Unix milliseconds.
   ChatMessage {
      from: ConnectionId,
      from_name: String,
      message: String,
      timestamp: u64,
   },
   /// Another participant started sharing their screen.
   ScreenShareStarted {
      participant_id: ConnectionId,
      peer_id: String,
   },
   /// Another participant stopped sharing their screen.
   ScreenShareStopped {
      participant_id: ConnectionId,
      peer_id: String,
   },
}
