// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Constants and small shared types for the transfer state machine.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// How long `RequestFileTransfer` waits for a response before treating the
/// transfer as rejected.
pub const ARBITRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an accepted point-to-point transfer waits for both roles to
/// attach their `TransferFile` stream before failing.
pub const ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest encoded `Chunk` frame the proxy will accept, bounding a single
/// allocation per chunk regardless of the declared file size.
pub const MAX_CHUNK_FRAME_BYTES: usize = 1 << 20;

/// Depth of a broadcast receiver's private outbox, mirroring a Room
/// member's bounded queue.
pub const BROADCAST_RECEIVER_QUEUE: usize = 64;

/// Which side of a transfer a `TransferFile` stream plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Exactly one sender and one receiver.
    PointToPoint,
    /// One sender, zero or more receivers that may attach over the
    /// transfer's lifetime.
    Broadcast,
}

/// State parked in the point-to-point rendezvous table by whichever role
/// attaches first; the other role delivers its stream through the held
/// sender half.
pub enum Parked {
    /// A sender is waiting; hand it the receiver's stream.
    Sender(oneshot::Sender<TcpStream>),
    /// A receiver is waiting; hand it the sender's stream.
    Receiver(oneshot::Sender<TcpStream>),
}
