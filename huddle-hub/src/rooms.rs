//! The room registry.
//!
//! Keeps track of open rooms and who is in them. Each room sits behind its
//! own mutex inside the registry map, so that working on one room does not
//! require locking the whole registry for writing. Everything room-scoped
//! takes the registry read lock plus the room's mutex; only the operations
//! that add or remove registry entries (create, the idle sweep, and the
//! deletion step of a last departure) take the write lock. The registry
//! lock is always acquired before a room lock, and no lock is ever held
//! across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use huddle_protocol::signaling::{ConnectionId, ErrorCode, Participant, ServerMessage};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sender half of a connection's outbound queue. Sends never block; a slow
/// client only ever delays its own writer task.
pub type PeerSender = mpsc::UnboundedSender<ServerMessage>;

/// Why a create or join request was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
   #[error("room {0} already exists")]
   RoomAlreadyExists(String),
   #[error("room {0} does not exist")]
   RoomNotFound(String),
   #[error("room {0} is full")]
   RoomFull(String),
   #[error("peer id {0} is already taken in this room")]
   PeerIdTaken(String),
}

impl RoomError {
   /// The wire code this error surfaces as in a `room-error` message.
   pub fn code(&self) -> ErrorCode {
      match self {
         RoomError::RoomAlreadyExists(_) => ErrorCode::RoomAlreadyExists,
         RoomError::RoomNotFound(_) => ErrorCode::RoomNotFound,
         RoomError::RoomFull(_) => ErrorCode::RoomFull,
         RoomError::PeerIdTaken(_) => ErrorCode::PeerIdTaken,
      }
   }
}

/// A single participant's record. Owned by its room; removed on departure.
struct Member {
   id: ConnectionId,
   peer_id: String,
   name: String,
   is_host: bool,
   joined_at: Instant,
   sender: PeerSender,
}

impl Member {
   fn view(&self) -> Participant {
      Participant {
         id: self.id,
         peer_id: self.peer_id.clone(),
         name: self.name.clone(),
         is_host: self.is_host,
      }
   }
}

/// The mutable state of one room. Only ever touched under the room's mutex.
struct Room {
   host: ConnectionId,
   members: HashMap<ConnectionId, Member>,
   created_at: Instant,
   last_activity: Instant,
}

impl Room {
   fn new(now: Instant) -> Self {
      Self {
         host: ConnectionId(0),
         members: HashMap::new(),
         created_at: now,
         last_activity: now,
      }
   }

   /// The roster in join order. Ties on the join instant are broken by
   /// connection ID, so the order is deterministic.
   fn roster(&self) -> Vec<Participant> {
      let mut members: Vec<&Member> = self.members.values().collect();
      members.sort_by_key(|member| (member.joined_at, member.id));
      members.iter().map(|member| member.view()).collect()
   }

   /// Picks the member that has been in the room the longest (smallest
   /// connection ID on a tie) and makes them host.
   fn promote_successor(&mut self) -> Option<ConnectionId> {
      let successor = self
         .members
         .values()
         .min_by_key(|member| (member.joined_at, member.id))
         .map(|member| member.id)?;
      if let Some(member) = self.members.get_mut(&successor) {
         member.is_host = true;
      }
      self.host = successor;
      Some(successor)
   }
}

/// What a successful `leave` did, beyond removing the participant.
#[derive(Debug)]
pub struct Departure {
   /// The peer ID the departing participant had announced.
   pub peer_id: String,
   /// Whether the departing participant was the room's host.
   pub was_host: bool,
   /// The connection promoted to host, if the room still has members and the
   /// departing participant was the host.
   pub new_host: Option<ConnectionId>,
   /// Whether the room was deleted because this was the last participant.
   pub room_deleted: bool,
}

/// A point-in-time census of the registry.
#[derive(Debug, PartialEq, Eq)]
pub struct RegistryStats {
   pub total_rooms: usize,
   pub total_participants: usize,
   /// How many rooms currently have each participant count.
   pub rooms_by_size: BTreeMap<usize, usize>,
}

/// Normalizes a room code the way the registry stores it.
///
/// Codes are case-insensitive and insensitive to surrounding whitespace, so
/// `"ABC "` and `"abc"` name the same room.
pub fn normalize_code(code: &str) -> String {
   code.trim().to_lowercase()
}

/// The registry of open rooms. Shared across all connection tasks.
pub struct Rooms {
   max_participants: usize,
   idle_timeout: Duration,
   rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
}

impl Rooms {
   pub fn new(max_participants: usize, idle_timeout: Duration) -> Self {
      Self {
         max_participants,
         idle_timeout,
         rooms: RwLock::new(HashMap::new()),
      }
   }

   /// Creates a room and admits its creator as host. Returns the initial
   /// roster.
   pub fn create(
      &self,
      code: &str,
      id: ConnectionId,
      peer_id: &str,
      name: &str,
      sender: PeerSender,
   ) -> Result<Vec<Participant>, RoomError> {
      let code = normalize_code(code);
      let now = Instant::now();
      let mut rooms = self.rooms.write();
      if let Some(existing) = rooms.get(&code) {
         // A drained room whose leaver has not finished deleting the entry
         // yet no longer exists as far as new traffic is concerned; its
         // code may be taken over.
         if !existing.lock().members.is_empty() {
            return Err(RoomError::RoomAlreadyExists(code));
         }
      }

      let mut room = Room::new(now);
      room.host = id;
      room.members.insert(id, Member {
         id,
         peer_id: peer_id.to_owned(),
         name: display_name(name, id),
         is_host: true,
         joined_at: now,
         sender,
      });
      let roster = room.roster();
      rooms.insert(code.clone(), Arc::new(Mutex::new(room)));
      info!(room = %code, %id, "room created");
      Ok(roster)
   }

   /// Admits a participant into an existing room. Returns the roster after
   /// the admit. Joining a room one is already in returns the current roster
   /// without changing anything.
   pub fn join(
      &self,
      code: &str,
      id: ConnectionId,
      peer_id: &str,
      name: &str,
      sender: PeerSender,
   ) -> Result<Vec<Participant>, RoomError> {
      let code = normalize_code(code);
      // The read guard stays held across the mutation so that a concurrent
      // leave or sweep (which both take the write lock) cannot delete the
      // room out from under the new member.
      let rooms = self.rooms.read();
      let room = rooms
         .get(&code)
         .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;
      let mut room = room.lock();
      if room.members.is_empty() {
         // The last member just left and the entry is about to be dropped.
         return Err(RoomError::RoomNotFound(code));
      }
      room.last_activity = Instant::now();

      if room.members.contains_key(&id) {
         return Ok(room.roster());
      }
      if room.members.len() >= self.max_participants {
         return Err(RoomError::RoomFull(code));
      }
      if room.members.values().any(|member| member.peer_id == peer_id) {
         return Err(RoomError::PeerIdTaken(peer_id.to_owned()));
      }

      room.members.insert(id, Member {
         id,
         peer_id: peer_id.to_owned(),
         name: display_name(name, id),
         is_host: false,
         joined_at: Instant::now(),
         sender,
      });
      info!(room = %code, %id, count = room.members.len(), "participant joined");
      Ok(room.roster())
   }

   /// Removes a participant from a room. Promotes a successor if the host
   /// left, and deletes the room if it is now empty. Returns `None` if the
   /// room or the participant was not present, in which case nothing
   /// changed.
   pub fn leave(&self, code: &str, id: ConnectionId) -> Option<Departure> {
      let code = normalize_code(code);

      // Removal and host handover are room-scoped, so they run under the
      // read lock plus the room's mutex like every other per-room mutation.
      let departure = {
         let rooms = self.rooms.read();
         let mut room = rooms.get(&code)?.lock();

         let member = room.members.remove(&id)?;
         room.last_activity = Instant::now();
         let was_host = room.host == member.id;

         let mut new_host = None;
         let room_deleted = room.members.is_empty();
         if !room_deleted {
            if was_host {
               new_host = room.promote_successor();
               if let Some(host) = new_host {
                  info!(room = %code, old = %id, new = %host, "host handed over");
               }
            }
            info!(room = %code, %id, count = room.members.len(), "participant left");
         }

         Departure {
            peer_id: member.peer_id,
            was_host,
            new_host,
            room_deleted,
         }
      };

      // Dropping the registry entry is a registry-wide mutation, so only
      // this part escalates to the write lock. Emptiness is re-checked
      // because the locks were released in between; `join` and `create`
      // both treat a drained entry as already gone, so nobody can have
      // slipped into the room meanwhile.
      if departure.room_deleted {
         let mut rooms = self.rooms.write();
         let still_empty = rooms
            .get(&code)
            .map_or(false, |room| room.lock().members.is_empty());
         if still_empty {
            rooms.remove(&code);
            info!(room = %code, %id, "last participant left, room deleted");
         }
      }

      Some(departure)
   }

   /// A roster snapshot, or `None` if no such room exists. The snapshot is
   /// safe to hand across task boundaries.
   pub fn participants_of(&self, code: &str) -> Option<Vec<Participant>> {
      let rooms = self.rooms.read();
      let room = rooms.get(&normalize_code(code))?.lock();
      Some(room.roster())
   }

   /// Resolves a peer ID to its outbound queue within one room.
   pub fn peer_sender(&self, code: &str, peer_id: &str) -> Option<PeerSender> {
      let rooms = self.rooms.read();
      let room = rooms.get(&normalize_code(code))?.lock();
      room
         .members
         .values()
         .find(|member| member.peer_id == peer_id)
         .map(|member| member.sender.clone())
   }

   /// Outbound queues of every member except `except`, for fan-out. The
   /// snapshot is taken under the room lock; the sends happen after it is
   /// released.
   pub fn recipients(&self, code: &str, except: ConnectionId) -> Vec<PeerSender> {
      let rooms = self.rooms.read();
      let Some(room) = rooms.get(&normalize_code(code)) else {
         return Vec::new();
      };
      let room = room.lock();
      room
         .members
         .values()
         .filter(|member| member.id != except)
         .map(|member| member.sender.clone())
         .collect()
   }

   /// Marks semantic traffic on a room, pushing its idle deadline out.
   /// Transport-level pings deliberately do not come through here.
   pub fn touch(&self, code: &str) {
      self.touch_at(code, Instant::now());
   }

   fn touch_at(&self, code: &str, now: Instant) {
      let rooms = self.rooms.read();
      if let Some(room) = rooms.get(&normalize_code(code)) {
         room.lock().last_activity = now;
      }
   }

   /// Deletes every room whose last activity is older than the idle
   /// threshold, as seen from `now`. Returns how many rooms were evicted.
   pub fn sweep(&self, now: Instant) -> usize {
      let mut rooms = self.rooms.write();
      let before = rooms.len();
      rooms.retain(|code, room| {
         let room = room.lock();
         let stale = now.saturating_duration_since(room.last_activity) > self.idle_timeout;
         if stale {
            info!(
               room = %code,
               participants = room.members.len(),
               age = ?now.saturating_duration_since(room.created_at),
               "sweeping idle room"
            );
         }
         !stale
      });
      let evicted = before - rooms.len();
      if evicted > 0 {
         debug!(evicted, remaining = rooms.len(), "idle sweep finished");
      }
      evicted
   }

   pub fn stats(&self) -> RegistryStats {
      let rooms = self.rooms.read();
      let mut stats = RegistryStats {
         total_rooms: rooms.len(),
         total_participants: 0,
         rooms_by_size: BTreeMap::new(),
      };
      for room in rooms.values() {
         let size = room.lock().members.len();
         stats.total_participants += size;
         *stats.rooms_by_size.entry(size).or_insert(0) += 1;
      }
      stats
   }

   #[cfg(test)]
   fn set_joined_at(&self, code: &str, id: ConnectionId, joined_at: Instant) {
      let rooms = self.rooms.read();
      let room = rooms.get(&normalize_code(code)).unwrap();
      room.lock().members.get_mut(&id).unwrap().joined_at = joined_at;
   }
}

/// The name stored for a participant. An empty name falls back to a
/// deterministic one derived from the connection ID.
fn display_name(name: &str, id: ConnectionId) -> String {
   let name = name.trim();
   if name.is_empty() {
      format!("guest-{}", id.0)
   } else {
      name.to_owned()
   }
}

/// Spawns the periodic idle sweep over the registry.
pub fn spawn_sweeper(rooms: Arc<Rooms>, every: Duration) {
   tokio::spawn(async move {
      let mut interval = tokio::time::interval(every);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick completes immediately; skip it so a fresh hub does
      // not sweep before anything has happened.
      interval.tick().await;
      loop {
         interval.tick().await;
         rooms.sweep(Instant::now());
      }
   });
}
