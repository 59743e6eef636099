// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! The room registry: id -> [`Room`] lookup, lazy creation, and teardown.
//!
//! A single [`std::sync::Mutex`] serializes every membership mutation across
//! every room. No call in this module ever awaits while holding the lock —
//! fan-out uses non-blocking `try_send` — so a synchronous mutex is both
//! simpler and cheaper than an async one here, and gives a total order that
//! is strictly stronger than the per-room ordering the specification
//! requires.

use crate::conn::ConnId;
use crate::error::ServerError;
use crate::room::{Outbox, Room};
use conference_proto::Envelope;
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide mapping from room id to [`Room`].
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `conn_id` under `username` into `room_id`, creating the room if
    /// it does not yet exist. Sends the `WELCOME` notice on success.
    pub fn attach(
        &self,
        room_id: &str,
        conn_id: ConnId,
        username: &str,
        outbox: Outbox,
    ) -> Result<(), ServerError> {
        let mut rooms = self.lock();
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| Room::new(room_id));
        match room.admit(conn_id, username, outbox) {
            Ok(()) => {
                room.send_welcome(conn_id);
                Ok(())
            }
            Err(()) => {
                // Roll back a freshly-created empty room rather than leak it.
                if room.is_empty() {
                    rooms.remove(room_id);
                }
                Err(ServerError::AlreadyExists(format!(
                    "username \"{username}\" is already taken in room \"{room_id}\""
                )))
            }
        }
    }

    /// Remove `conn_id` from `room_id`. Idempotent: a second call is a no-op.
    /// Tears the room down once it becomes empty.
    pub fn detach(&self, room_id: &str, conn_id: ConnId) {
        let mut rooms = self.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        room.release(conn_id);
        if room.is_empty() {
            rooms.remove(room_id);
        }
    }

    /// Fan out `envelope` to every member of its room except `exclude`.
    pub fn broadcast(&self, room_id: &str, envelope: Envelope, exclude: ConnId) {
        let rooms = self.lock();
        if let Some(room) = rooms.get(room_id) {
            room.broadcast(envelope, exclude);
        }
    }

    /// Route a private message within `room_id`.
    pub fn send_private(
        &self,
        room_id: &str,
        sender: &str,
        sender_conn: ConnId,
        recipient: &str,
        content: &str,
    ) {
        let rooms = self.lock();
        if let Some(room) = rooms.get(room_id) {
            room.send_private(sender, sender_conn, recipient, content);
        }
    }

    /// Deliver the file-request sentinel to `recipient` in `room_id`.
    /// Returns `NotFound` if the recipient is not a current member.
    pub fn notify_file_request(
        &self,
        room_id: &str,
        recipient: &str,
        sentinel: String,
    ) -> Result<(), ServerError> {
        let rooms = self.lock();
        let delivered = rooms
            .get(room_id)
            .is_some_and(|room| room.notify_file_request(recipient, sentinel));
        if delivered {
            Ok(())
        } else {
            Err(ServerError::NotFound(format!(
                "recipient \"{recipient}\" is not in room \"{room_id}\""
            )))
        }
    }

    /// Number of currently live rooms. Exposed for tests.
    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Room>> {
        match self.rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
