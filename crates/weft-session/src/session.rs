//! One live socket connection bound to a room.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use weft_core::{RoomId, SessionId};

use crate::sink::{SessionSink, SinkError};

/// A live session.
///
/// Created at connect time, owned by the registry while live, closed on
/// disconnect or the first write error. The room binding is immutable for
/// the lifetime of the connection. The write queue and work-in-progress
/// counter belong to the write serializer's protocol; everything else in
/// the fabric only reads identity fields.
pub struct Session {
    id: SessionId,
    room: RoomId,
    peer: String,
    capacity: usize,
    open: AtomicBool,
    queue: Mutex<VecDeque<String>>,
    wip: AtomicUsize,
    user_id: Mutex<Option<String>>,
    sink: Box<dyn SessionSink>,
}

impl Session {
    /// Create a session bound to `room`, writing through `sink`.
    #[must_use]
    pub fn new(
        room: RoomId,
        peer: impl Into<String>,
        capacity: usize,
        sink: Box<dyn SessionSink>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            room,
            peer: peer.into(),
            capacity,
            open: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            wip: AtomicUsize::new(0),
            user_id: Mutex::new(None),
            sink,
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Bound room.
    #[must_use]
    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Peer address of the socket.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the session is still live.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the session closed. Idempotent; returns whether this call
    /// performed the transition.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Record the user id seen on this session's frames.
    pub fn set_user_id(&self, user_id: &str) {
        let mut slot = self.user_id.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_deref() != Some(user_id) {
            *slot = Some(user_id.to_owned());
        }
    }

    /// The last user id seen on this session, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Offer a frame to the write queue. `false` means dropped (queue at
    /// capacity or session closed).
    pub(crate) fn offer(&self, frame: String) -> bool {
        if !self.is_open() {
            return false;
        }
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(frame);
        true
    }

    /// Take the next queued frame.
    pub(crate) fn pop(&self) -> Option<String> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Drop everything still queued, returning how many frames died.
    pub(crate) fn discard_queue(&self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    /// Announce one unit of pending write work. Returns the previous
    /// counter value; zero means the caller must schedule a drain.
    pub(crate) fn begin_work(&self) -> usize {
        self.wip.fetch_add(1, Ordering::AcqRel)
    }

    /// Consume `done` units of observed work. Returns what is left; a
    /// non-zero result means more frames arrived while draining.
    pub(crate) fn end_work(&self, done: usize) -> usize {
        let prev = self.wip.fetch_sub(done, Ordering::AcqRel);
        prev - done
    }

    /// Write through the sink. Serialized externally by the drain
    /// protocol; never call concurrently for one session.
    pub(crate) async fn write(&self, frame: String) -> Result<(), SinkError> {
        self.sink.send_text(frame).await
    }

    /// Queued frame count, for tests and debugging.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}
