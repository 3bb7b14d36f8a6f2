//! Room membership and fan-out.

use crate::event::EventKind;
use crate::packet::Packet;
use crate::session::{Session, SessionId};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tungstenite::Message;

/// Unique identifier for a room.
pub type RoomId = String;

/// Recipient selector for an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single session
    Session(SessionId),
    /// Every member of a room
    Room(RoomId),
    /// Every connected session
    All,
}

#[derive(Debug, Default)]
struct Members {
    ids: HashSet<SessionId>,
    // Set when the room has been pruned from the registry; joins must retry.
    retired: bool,
}

/// A room for grouping sessions.
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    members: Mutex<Members>,
}

impl Room {
    /// Create a new room.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Mutex::new(Members::default()),
        }
    }

    /// Check if a session is in the room.
    pub fn contains(&self, session_id: &str) -> bool {
        self.members.lock().ids.contains(session_id)
    }

    /// Get the number of sessions in the room.
    pub fn len(&self) -> usize {
        self.members.lock().ids.len()
    }

    /// Check if the room is empty.
    pub fn is_empty(&self) -> bool {
        self.members.lock().ids.is_empty()
    }

    /// Snapshot of the member ids.
    pub fn members(&self) -> Vec<SessionId> {
        self.members.lock().ids.iter().cloned().collect()
    }
}

/// Server-side registry of sessions and the rooms they belong to.
///
/// Two indexes are kept in step: room → members and session → rooms. Every
/// mutation of a room happens under that room's member lock, so a broadcast
/// sees a consistent snapshot while joins and leaves on other rooms proceed
/// independently.
///
/// Lock order: a room's member lock may be held while touching the session
/// indexes, never the other way round.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
    session_rooms: DashMap<SessionId, HashSet<RoomId>>,
    sessions: DashMap<SessionId, Session>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            session_rooms: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a session so it can join rooms and receive fan-out.
    pub fn register_session(&self, session: Session) {
        let id = session.id.clone();
        self.session_rooms.entry(id.clone()).or_default();
        self.sessions.insert(id, session);
    }

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Add a session to a room. Returns `true` if it was not a member yet.
    ///
    /// Unknown sessions are ignored.
    pub fn join(&self, session_id: &str, room_id: &str) -> bool {
        if !self.sessions.contains_key(session_id) {
            tracing::info!(session_id = %session_id, room = %room_id, "Join from unknown session ignored");
            return false;
        }

        loop {
            let room = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Room::new(room_id.to_string())))
                .clone();

            let mut members = room.members.lock();
            if members.retired {
                continue;
            }

            // The session may have been dropped since the check above.
            let Some(mut joined) = self.session_rooms.get_mut(session_id) else {
                tracing::info!(session_id = %session_id, room = %room_id, "Join raced with disconnect");
                return false;
            };
            joined.insert(room_id.to_string());
            return members.ids.insert(session_id.to_string());
        }
    }

    /// Remove a session from a room. Returns `true` if it was a member.
    pub fn leave(&self, session_id: &str, room_id: &str) -> bool {
        let Some(room) = self.get_room(room_id) else {
            tracing::info!(session_id = %session_id, room = %room_id, "Leave for unknown room ignored");
            return false;
        };

        let removed = {
            let mut members = room.members.lock();
            let removed = members.ids.remove(session_id);
            if let Some(mut joined) = self.session_rooms.get_mut(session_id) {
                joined.remove(room_id);
            }
            removed
        };

        self.prune(room_id);
        removed
    }

    /// Remove a session from every room and from the session table.
    ///
    /// Returns the rooms it was in, or `None` if the session was unknown
    /// (for example because it was already dropped).
    pub fn drop_session(&self, session_id: &str) -> Option<Vec<RoomId>> {
        // Stop direct and room fan-out first.
        let known = self.sessions.remove(session_id).is_some();
        let (_, joined) = self.session_rooms.remove(session_id)?;

        for room_id in &joined {
            if let Some(room) = self.get_room(room_id) {
                room.members.lock().ids.remove(session_id);
            }
            self.prune(room_id);
        }

        if !known {
            tracing::debug!(session_id = %session_id, "Dropped membership of unregistered session");
        }
        Some(joined.into_iter().collect())
    }

    // Remove the room entry if it is empty. The emptiness check and the
    // retirement flag are decided under the room lock so a concurrent join
    // either lands before (and the room stays) or retries on a fresh room.
    fn prune(&self, room_id: &str) {
        self.rooms.remove_if(room_id, |_, room| {
            let mut members = room.members.lock();
            if members.ids.is_empty() {
                members.retired = true;
                true
            } else {
                false
            }
        });
    }

    /// Get a room by ID.
    pub fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    /// Deliver an event to every current member of a room.
    ///
    /// Returns how many sessions accepted the frame. Unknown rooms are a
    /// logged no-op.
    pub fn broadcast(&self, room_id: &str, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        match Packet::event(event, data).to_message() {
            Ok(message) => self.broadcast_message(room_id, message),
            Err(e) => {
                tracing::warn!(room = %room_id, error = %e, "Failed to encode broadcast");
                0
            }
        }
    }

    pub(crate) fn broadcast_message(&self, room_id: &str, message: Message) -> usize {
        let Some(room) = self.get_room(room_id) else {
            tracing::info!(room = %room_id, "Broadcast to unknown room ignored");
            return 0;
        };

        // Held for the whole fan-out: joins on this room wait until it is done.
        let members = room.members.lock();
        let mut sent_count = 0;
        for member_id in members.ids.iter() {
            match self.sessions.get(member_id) {
                Some(session) => {
                    if session.deliver(message.clone()) {
                        sent_count += 1;
                    }
                }
                None => {
                    tracing::info!(session_id = %member_id, room = %room_id, "Skipping unreachable member");
                }
            }
        }

        sent_count
    }

    /// Deliver an event to every connected session.
    pub fn broadcast_all(&self, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        let message = match Packet::event(event, data).to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let mut sent_count = 0;
        for session in self.sessions.iter() {
            if session.deliver(message.clone()) {
                sent_count += 1;
            }
        }
        sent_count
    }

    /// Deliver an event to a target. Returns the number of sessions reached.
    pub fn emit(&self, target: &Target, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        match target {
            Target::Session(id) => match self.sessions.get(id) {
                Some(session) => usize::from(session.emit(event, data)),
                None => {
                    tracing::info!(session_id = %id, "Emit to unknown session ignored");
                    0
                }
            },
            Target::Room(room_id) => self.broadcast(room_id, event, data),
            Target::All => self.broadcast_all(event, data),
        }
    }

    /// Rooms a session currently belongs to.
    pub fn rooms_of(&self, session_id: &str) -> Vec<RoomId> {
        self.session_rooms
            .get(session_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Members of a room. Empty for unknown rooms.
    pub fn members(&self, room_id: &str) -> Vec<SessionId> {
        self.get_room(room_id)
            .map(|room| room.members())
            .unwrap_or_default()
    }

    /// Check whether a session is a member of a room.
    pub fn contains(&self, session_id: &str, room_id: &str) -> bool {
        self.get_room(room_id)
            .is_some_and(|room| room.contains(session_id))
    }

    /// Get all room IDs.
    pub fn room_names(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    /// Get all session IDs.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    /// Get the total number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the total number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{detached, drain};
    use serde_json::json;
    use std::thread;

    fn registry_with(ids: &[&str]) -> (RoomRegistry, Vec<tokio::sync::mpsc::UnboundedReceiver<Message>>) {
        let registry = RoomRegistry::new();
        let mut receivers = Vec::new();
        for id in ids {
            let (session, rx) = detached(id);
            registry.register_session(session);
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn assert_consistent(registry: &RoomRegistry) {
        for room in registry.room_names() {
            for member in registry.members(&room) {
                assert!(registry.rooms_of(&member).contains(&room));
            }
        }
        for session in registry.session_ids() {
            for room in registry.rooms_of(&session) {
                assert!(registry.contains(&session, &room));
            }
        }
    }

    #[test]
    fn test_membership_follows_operation_parity() {
        let (registry, _rx) = registry_with(&["s1"]);

        for count in 1..=6 {
            let joined = count % 2 == 1;
            if joined {
                registry.join("s1", "room1");
            } else {
                registry.leave("s1", "room1");
            }
            assert_eq!(registry.contains("s1", "room1"), joined);
            assert_eq!(registry.rooms_of("s1").contains(&"room1".to_string()), joined);
        }
    }

    #[test]
    fn test_join_and_leave_are_idempotent() {
        let (registry, _rx) = registry_with(&["s1"]);

        assert!(registry.join("s1", "room1"));
        assert!(!registry.join("s1", "room1"));
        assert_eq!(registry.members("room1"), vec!["s1".to_string()]);

        assert!(registry.leave("s1", "room1"));
        assert!(!registry.leave("s1", "room1"));
        assert!(registry.members("room1").is_empty());
    }

    #[test]
    fn test_unknown_session_and_room_are_noops() {
        let (registry, _rx) = registry_with(&["s1"]);

        assert!(!registry.join("ghost", "room1"));
        assert!(!registry.leave("s1", "nowhere"));
        assert_eq!(registry.broadcast("nowhere", EventKind::Message, None), 0);
        assert_eq!(
            registry.emit(&Target::Session("ghost".into()), EventKind::Message, None),
            0
        );
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_empty_rooms_are_pruned() {
        let (registry, _rx) = registry_with(&["s1", "s2"]);
        registry.join("s1", "room1");
        registry.join("s2", "room1");
        registry.leave("s1", "room1");
        assert_eq!(registry.room_count(), 1);

        registry.leave("s2", "room1");
        assert_eq!(registry.room_count(), 0);

        // and come back on the next join
        assert!(registry.join("s1", "room1"));
        assert_eq!(registry.members("room1"), vec!["s1".to_string()]);
    }

    #[test]
    fn test_broadcast_reaches_only_members() {
        let (registry, mut rx) = registry_with(&["s1", "s2", "s3"]);
        registry.join("s1", "room1");
        registry.join("s2", "room1");
        registry.join("s3", "room2");

        let sent = registry.broadcast("room1", EventKind::Message, Some(json!("hi")));
        assert_eq!(sent, 2);

        let expected = vec![Packet::event(EventKind::Message, Some(json!("hi")))];
        assert_eq!(drain(&mut rx[0]), expected);
        assert_eq!(drain(&mut rx[1]), expected);
        assert!(drain(&mut rx[2]).is_empty());
    }

    #[test]
    fn test_leave_stops_delivery() {
        let (registry, mut rx) = registry_with(&["s1", "s2"]);
        registry.join("s1", "room1");
        registry.join("s2", "room1");
        registry.leave("s1", "room1");

        assert_eq!(registry.broadcast("room1", EventKind::Message, None), 1);
        assert!(drain(&mut rx[0]).is_empty());
        assert_eq!(drain(&mut rx[1]).len(), 1);
    }

    #[test]
    fn test_drop_session_leaves_every_room() {
        let (registry, mut rx) = registry_with(&["s1", "s2"]);
        registry.join("s1", "room1");
        registry.join("s1", "room2");
        registry.join("s2", "room2");

        let mut left = registry.drop_session("s1").unwrap();
        left.sort();
        assert_eq!(left, vec!["room1".to_string(), "room2".to_string()]);

        assert_eq!(registry.broadcast("room1", EventKind::Message, None), 0);
        assert_eq!(registry.broadcast("room2", EventKind::Message, None), 1);
        assert!(drain(&mut rx[0]).is_empty());
        assert!(registry.get_session("s1").is_none());
        assert_eq!(registry.room_count(), 1);

        // second teardown is a no-op
        assert!(registry.drop_session("s1").is_none());
    }

    #[test]
    fn test_emit_targets() {
        let (registry, mut rx) = registry_with(&["s1", "s2"]);
        registry.join("s2", "room1");

        assert_eq!(registry.emit(&Target::Session("s1".into()), "ping", None), 1);
        assert_eq!(registry.emit(&Target::Room("room1".into()), "ping", None), 1);
        assert_eq!(registry.emit(&Target::All, "ping", None), 2);

        assert_eq!(drain(&mut rx[0]).len(), 2);
        assert_eq!(drain(&mut rx[1]).len(), 2);
    }

    #[test]
    fn test_closed_members_are_skipped() {
        let (registry, _rx) = registry_with(&["s1", "s2"]);
        registry.join("s1", "room1");
        registry.join("s2", "room1");
        registry.get_session("s1").unwrap().close();

        assert_eq!(registry.broadcast("room1", EventKind::Message, None), 1);
    }

    #[test]
    fn test_join_after_broadcast_misses_it() {
        let (registry, mut rx) = registry_with(&["s1", "s2"]);
        registry.join("s1", "room1");

        registry.broadcast("room1", EventKind::Message, Some(json!("first")));
        registry.join("s2", "room1");

        assert_eq!(drain(&mut rx[0]).len(), 1);
        assert!(drain(&mut rx[1]).is_empty());
    }

    #[test]
    fn test_joins_racing_a_broadcast_miss_it() {
        let members: Vec<String> = (0..2000).map(|i| format!("m{i}")).collect();
        let late: Vec<String> = (0..8).map(|i| format!("late{i}")).collect();
        let refs: Vec<&str> = members.iter().chain(&late).map(String::as_str).collect();
        let (registry, mut rx) = registry_with(&refs);
        for id in &members {
            registry.join(id, "room1");
        }
        let mut late_rx = rx.split_off(members.len());
        let mut watched = rx.swap_remove(0);

        let started = std::sync::atomic::AtomicBool::new(false);
        let barrier = std::sync::Barrier::new(late.len() + 2);
        let sent = thread::scope(|scope| {
            scope.spawn(|| {
                barrier.wait();
                // m0 sees the frame while the fan-out still holds the room
                while watched.try_recv().is_err() {
                    thread::yield_now();
                }
                started.store(true, std::sync::atomic::Ordering::SeqCst);
            });
            for id in &late {
                let (registry, barrier, started) = (&registry, &barrier, &started);
                scope.spawn(move || {
                    barrier.wait();
                    while !started.load(std::sync::atomic::Ordering::SeqCst) {
                        thread::yield_now();
                    }
                    assert!(registry.join(id, "room1"));
                });
            }
            let broadcaster = scope.spawn(|| {
                barrier.wait();
                registry.broadcast("room1", EventKind::Message, Some(json!("snapshot")))
            });
            broadcaster.join().unwrap()
        });

        assert_eq!(sent, members.len());
        for (id, rx) in late.iter().zip(late_rx.iter_mut()) {
            assert!(registry.contains(id, "room1"));
            assert!(drain(rx).is_empty(), "{id} joined mid-broadcast but got the frame");
        }
        assert_consistent(&registry);
    }

    #[test]
    fn test_concurrent_mutation_keeps_indexes_consistent() {
        let ids: Vec<String> = (0..8).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (registry, _rx) = registry_with(&refs);
        let registry = Arc::new(registry);

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, id)| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..200 {
                        let room = format!("room{}", (i + round) % 3);
                        registry.join(&id, &room);
                        registry.broadcast(&room, EventKind::Message, None);
                        if round % 2 == 0 {
                            registry.leave(&id, &room);
                        }
                        if round == 150 && i % 4 == 0 {
                            registry.drop_session(&id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_consistent(&registry);
        for dropped in ["s0", "s4"] {
            assert!(registry.rooms_of(dropped).is_empty());
            for room in registry.room_names() {
                assert!(!registry.contains(dropped, &room));
            }
        }
    }
}
