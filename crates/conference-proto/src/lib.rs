// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Wire schema for the conference hub: envelopes carried on the `Join` stream,
//! the unary file-transfer negotiation RPCs, and the `Chunk` framing used by
//! the bulk-transfer relay.

pub mod rpc;
pub mod sentinel;
pub mod wire;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved sender identity for server-originated control envelopes
/// (welcome, user-joined, user-left, error).
pub const SERVER_SENDER: &str = "Server";

/// Reserved sender identity for the in-text file-transfer request
/// notification, kept for wire compatibility with legacy client parsers.
pub const FILE_TRANSFER_SENDER: &str = "Sistema-FileTransfer";

/// Transfer identifier. Always a UUID so concurrent rendezvous never collide.
pub type TransferId = Uuid;

/// Top-level unit carried on the `Join` stream. The payload is a
/// discriminated union; exactly one variant is present per envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Username of the originator. Server-generated envelopes use one of the
    /// reserved sender identities above.
    pub sender: String,
    /// Room the envelope belongs to.
    pub room_id: String,
    /// The discriminated payload.
    pub payload: Payload,
}

impl Envelope {
    /// Construct an envelope.
    pub fn new(sender: impl Into<String>, room_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            sender: sender.into(),
            room_id: room_id.into(),
            payload,
        }
    }
}

/// Payload variants carried by an [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    /// Plain chat text, fanned out to the room.
    Text {
        /// Message body.
        content: String,
        /// Sender-side Unix timestamp in milliseconds.
        timestamp: i64,
        /// Opaque correlation id set by the client, echoed through untouched.
        trace_id: String,
    },
    /// A point-to-point message routed to a single recipient by username.
    Private {
        /// Destination username.
        recipient: String,
        /// Message body.
        content: String,
    },
    /// Opaque audio samples. The server never interprets the bytes.
    AudioFrame {
        /// Raw frame bytes (conventionally PCM 44.1kHz/16-bit/mono).
        data: Vec<u8>,
    },
    /// Announces an in-room broadcast file transfer.
    FileAnnouncement {
        /// Name of the file being offered.
        filename: String,
        /// Size in bytes.
        byte_size: u64,
        /// Identifier of the transfer this announcement opens.
        transfer_id: TransferId,
    },
    /// A server-originated (or server-only) control message.
    Command {
        /// Discriminates the control message.
        kind: CommandKind,
        /// Human-readable or structured value (e.g. an error reason).
        value: String,
    },
}

/// Discriminates [`Payload::Command`] messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandKind {
    /// Sent to a newly admitted participant with its room id as `value`.
    Welcome,
    /// Broadcast to existing members when someone joins; `value` is their username.
    UserJoined,
    /// Broadcast to existing members when someone leaves; `value` is their username.
    UserLeft,
    /// A human-readable error, e.g. username collision or private-message miss.
    Error,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_cbor() {
        let env = Envelope::new(
            "alice",
            "r1",
            Payload::Text {
                content: "hi".into(),
                timestamp: 1000,
                trace_id: "t-1".into(),
            },
        );
        let bytes = wire::encode(&env).unwrap();
        let decoded: Envelope = wire::decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }
}
