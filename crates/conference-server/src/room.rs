// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! A single room: membership, fan-out, and private routing.
//!
//! Membership is kept in two maps — by connection id and by lowercased
//! username — that are always mutated together so they never drift apart
//! (testable property 1 in the specification).

use crate::conn::ConnId;
use conference_proto::{wire, CommandKind, Envelope, Payload, FILE_TRANSFER_SENDER, SERVER_SENDER};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::warn;

/// Sending half of a participant's bounded outbound queue. The bytes are a
/// pre-encoded frame, ready to write straight to the socket.
pub type Outbox = Sender<Vec<u8>>;

struct Member {
    username: String,
    outbox: Outbox,
}

/// Membership and fan-out for one room.
pub struct Room {
    id: String,
    by_conn: HashMap<ConnId, Member>,
    by_username: HashMap<String, ConnId>,
}

impl Room {
    /// Create an empty room with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            by_conn: HashMap::new(),
            by_username: HashMap::new(),
        }
    }

    /// Number of connections currently admitted. The registry consults this
    /// to decide whether the room should be torn down.
    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }

    /// Invariant check used by tests: both membership views agree in size.
    #[cfg(test)]
    pub fn views_agree(&self) -> bool {
        self.by_conn.len() == self.by_username.len()
    }

    /// Admit `conn_id` under `username`. Fails without mutating membership if
    /// the case-insensitive username is already present.
    pub fn admit(&mut self, conn_id: ConnId, username: &str, outbox: Outbox) -> Result<(), ()> {
        let key = username.to_lowercase();
        if self.by_username.contains_key(&key) {
            return Err(());
        }
        self.by_username.insert(key, conn_id);
        self.by_conn.insert(
            conn_id,
            Member {
                username: username.to_string(),
                outbox,
            },
        );
        self.broadcast_system(CommandKind::UserJoined, username, Some(conn_id));
        Ok(())
    }

    /// Remove `conn_id` if present. A second call for the same id is a no-op.
    pub fn release(&mut self, conn_id: ConnId) {
        if let Some(member) = self.by_conn.remove(&conn_id) {
            self.by_username.remove(&member.username.to_lowercase());
            self.broadcast_system(CommandKind::UserLeft, &member.username, None);
        }
    }

    /// Fan out `envelope` to every member except `exclude`. A slow member's
    /// full queue drops this message for that member only.
    pub fn broadcast(&self, envelope: Envelope, exclude: ConnId) {
        let Some(bytes) = Self::encode(&envelope) else {
            return;
        };
        for (conn_id, member) in &self.by_conn {
            if *conn_id == exclude {
                continue;
            }
            Self::enqueue(member, &bytes);
        }
    }

    /// Route a private message from `sender` (occupying `sender_conn`) to
    /// `recipient`. On miss, an error envelope is queued back to the sender.
    pub fn send_private(&self, sender: &str, sender_conn: ConnId, recipient: &str, content: &str) {
        let key = recipient.to_lowercase();
        match self.by_username.get(&key) {
            Some(&target_conn) => {
                let rewritten = format!("(private from {sender}) {content}");
                let envelope = Envelope::new(
                    sender,
                    &self.id,
                    Payload::Private {
                        recipient: recipient.to_string(),
                        content: rewritten,
                    },
                );
                if let (Some(bytes), Some(member)) =
                    (Self::encode(&envelope), self.by_conn.get(&target_conn))
                {
                    Self::enqueue(member, &bytes);
                }
            }
            None => {
                self.send_error(sender_conn, format!("no such user \"{recipient}\" in this room"));
            }
        }
    }

    /// Deliver the legacy file-request notification sentinel to `recipient`
    /// as ordinary text from the reserved `Sistema-FileTransfer` sender.
    /// Returns `false` if `recipient` is not currently a member.
    pub fn notify_file_request(&self, recipient: &str, sentinel: String) -> bool {
        let key = recipient.to_lowercase();
        let Some(&target_conn) = self.by_username.get(&key) else {
            return false;
        };
        let envelope = Envelope::new(
            FILE_TRANSFER_SENDER,
            &self.id,
            Payload::Text {
                content: sentinel,
                timestamp: 0,
                trace_id: String::new(),
            },
        );
        if let (Some(bytes), Some(member)) =
            (Self::encode(&envelope), self.by_conn.get(&target_conn))
        {
            Self::enqueue(member, &bytes);
        }
        true
    }

    /// Queue an `ERROR` control envelope to a single connection (used both
    /// for `send_private` misses and username-collision rejections).
    pub fn send_error(&self, conn_id: ConnId, reason: String) {
        let envelope = Envelope::new(
            SERVER_SENDER,
            &self.id,
            Payload::Command {
                kind: CommandKind::Error,
                value: reason,
            },
        );
        if let (Some(bytes), Some(member)) = (Self::encode(&envelope), self.by_conn.get(&conn_id)) {
            Self::enqueue(member, &bytes);
        }
    }

    /// Queue a `WELCOME` control envelope to a single, just-admitted connection.
    pub fn send_welcome(&self, conn_id: ConnId) {
        let envelope = Envelope::new(
            SERVER_SENDER,
            &self.id,
            Payload::Command {
                kind: CommandKind::Welcome,
                value: self.id.clone(),
            },
        );
        if let (Some(bytes), Some(member)) = (Self::encode(&envelope), self.by_conn.get(&conn_id)) {
            Self::enqueue(member, &bytes);
        }
    }

    fn broadcast_system(&self, kind: CommandKind, username: &str, exclude: Option<ConnId>) {
        let envelope = Envelope::new(
            SERVER_SENDER,
            &self.id,
            Payload::Command {
                kind,
                value: username.to_string(),
            },
        );
        let Some(bytes) = Self::encode(&envelope) else {
            return;
        };
        for (conn_id, member) in &self.by_conn {
            if Some(*conn_id) == exclude {
                continue;
            }
            Self::enqueue(member, &bytes);
        }
    }

    fn encode(envelope: &Envelope) -> Option<Vec<u8>> {
        match wire::encode_frame(envelope) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(?err, "failed to encode envelope, dropping");
                None
            }
        }
    }

    fn enqueue(member: &Member, bytes: &[u8]) {
        match member.outbox.try_send(bytes.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(username = %member.username, "outbound queue full, dropping message for recipient");
            }
            Err(TrySendError::Closed(_)) => {
                // Connection is tearing down; its own release will run shortly.
            }
        }
    }
}
