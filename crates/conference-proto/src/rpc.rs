// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Request/response shapes for the four RPC surfaces the hub exposes, plus
//! the `ConnectionKind` envelope a client sends as the very first frame on
//! any newly accepted connection so the single listener can route it.

use crate::TransferId;
use serde::{Deserialize, Serialize};

/// The first frame on every connection. It tells the hub which of the four
/// RPCs this connection is for, since all four share one listening endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionKind {
    /// Open the long-lived bidirectional `Join` stream.
    Join(JoinRequest),
    /// A unary `RequestFileTransfer` call.
    RequestFileTransfer(RequestFileTransferRequest),
    /// A unary `RespondFileTransfer` call.
    RespondFileTransfer(RespondFileTransferRequest),
    /// Attach this connection to a transfer's chunk stream.
    TransferFile(TransferFileMeta),
}

/// First-message payload for the `Join` RPC. Both fields are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequest {
    /// Username the participant wants to join under.
    pub sender: String,
    /// Room to join (created lazily if absent).
    pub room_id: String,
}

/// Input to the unary `RequestFileTransfer` RPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestFileTransferRequest {
    /// Caller-assigned transfer identifier (UUID).
    pub transfer_id: TransferId,
    /// Requesting username.
    pub sender: String,
    /// Destination username.
    pub recipient: String,
    /// Room both parties share.
    pub room_id: String,
    /// Name of the file being offered.
    pub filename: String,
    /// Size in bytes.
    pub byte_size: u64,
    /// Sender-side Unix timestamp in milliseconds.
    pub timestamp: i64,
}

/// Output of the unary `RequestFileTransfer` RPC: the arbitration outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestFileTransferResponse {
    /// Echoes the request's transfer id.
    pub transfer_id: TransferId,
    /// Whether the destination accepted within the arbitration window.
    pub accepted: bool,
}

/// Input to the unary `RespondFileTransfer` RPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RespondFileTransferRequest {
    /// The transfer being responded to.
    pub transfer_id: TransferId,
    /// Whether the destination accepts the transfer.
    pub accepted: bool,
    /// Original requesting username (echoed for validation).
    pub sender: String,
    /// Responding username.
    pub recipient: String,
    /// Room both parties share.
    pub room_id: String,
}

/// Output of the unary `RespondFileTransfer` RPC: echoed on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RespondFileTransferResponse {
    /// Echoes the request's transfer id.
    pub transfer_id: TransferId,
    /// Echoes the acceptance decision.
    pub accepted: bool,
}

/// Role a `TransferFile` stream attaches in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    /// This connection feeds chunks into the transfer.
    Sender,
    /// This connection receives chunks from the transfer.
    Receiver,
}

/// Metadata that opens a `TransferFile` stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferFileMeta {
    /// The transfer to attach to.
    pub transfer_id: TransferId,
    /// The role this connection plays.
    pub role: Role,
}

/// A single framed chunk of transfer payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The transfer this chunk belongs to.
    pub transfer_id: TransferId,
    /// Monotone sequence number, opaque to the server beyond ordering.
    pub seq: u64,
    /// Raw bytes. Empty on the terminal chunk is conventional but not required.
    pub data: Vec<u8>,
    /// Once true, no further chunks follow for this transfer.
    pub terminal: bool,
}

/// The hub's error taxonomy, carried on the wire. Mirrors the server-side
/// `ServerError` variants without pulling the server crate into this one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing first-message fields, missing transfer metadata, or an
    /// unknown role.
    InvalidArgument,
    /// Username already taken in the target room.
    AlreadyExists,
    /// Recipient or transfer id not registered.
    NotFound,
    /// Arbitration or attachment timeout elapsed.
    DeadlineExceeded,
    /// Peer stream closed unexpectedly mid-transfer.
    Unavailable,
    /// Unexpected failure in the relay path.
    Internal,
}

/// A taxonomy code plus a human-readable reason, sent in place of a unary
/// response or a stream-open acknowledgement when a call fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcError {
    /// The taxonomy category.
    pub code: ErrorCode,
    /// Human-readable detail, safe to surface to the caller.
    pub message: String,
}

/// Envelope around a unary RPC's output, or a stream-open acknowledgement:
/// either the value the caller asked for, or the reason it could not be
/// produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcReply<T> {
    /// The call succeeded.
    Ok(T),
    /// The call failed; no further frames follow on this connection.
    Err(RpcError),
}
