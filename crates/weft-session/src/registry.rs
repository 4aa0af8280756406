//! The per-room registry of live sessions.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use weft_core::RoomId;

use crate::session::Session;

/// Room-keyed set of live sessions on this node.
///
/// A session belongs to at most one room (the binding lives on the
/// session itself). Broadcast reads take a snapshot, so no lock is held
/// while frames are being fanned out; a concurrently-added session may or
/// may not see an in-flight broadcast, which is accepted. Empty room
/// entries are pruned on removal.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: DashMap<RoomId, Vec<Arc<Session>>>,
    total: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its room.
    pub fn add(&self, session: Arc<Session>) {
        debug!(session = %session.id(), room = %session.room(), "session registered");
        self.rooms
            .entry(session.room())
            .or_default()
            .push(session);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove a session. Idempotent; returns whether it was present.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let room = session.room();
        let mut removed = false;
        if let Some(mut entry) = self.rooms.get_mut(&room) {
            let before = entry.len();
            entry.retain(|s| s.id() != session.id());
            removed = entry.len() < before;
        }
        if removed {
            self.total.fetch_sub(1, Ordering::Relaxed);
            debug!(session = %session.id(), room = %room, "session unregistered");
        }
        // Prune the room entry once its last session is gone.
        self.rooms.remove_if(&room, |_, sessions| sessions.is_empty());
        removed
    }

    /// A point-in-time copy of a room's sessions, safe to iterate without
    /// blocking writers.
    #[must_use]
    pub fn snapshot_room(&self, room: RoomId) -> Vec<Arc<Session>> {
        self.rooms
            .get(&room)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Every live session across all rooms.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        self.rooms
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Rooms with at least one live session.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Live sessions on this node.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}
