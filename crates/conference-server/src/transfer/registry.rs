// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! The transfer registry: arbitration rendezvous, stream-attachment racing,
//! and bookkeeping for active transfers.
//!
//! Three independent tables, each locked separately and only ever held
//! across a synchronous critical section:
//!
//! - `pending_responses` — the one-shot rendezvous between
//!   `RequestFileTransfer` and `RespondFileTransfer`, keyed by transfer id
//!   so overlapping requests from the same sender can never collide.
//! - `active` — which transfers currently accept a `TransferFile`
//!   attachment, and whether they are point-to-point or broadcast.
//! - `p2p_rendezvous` / `broadcast_receivers` — kind-specific attachment
//!   state.

use super::proxy;
use super::state::{Parked, TransferKind, ARBITRATION_TIMEOUT, ATTACHMENT_TIMEOUT, BROADCAST_RECEIVER_QUEUE};
use crate::error::ServerError;
use crate::registry::RoomRegistry;
use conference_proto::rpc::{ErrorCode, Role, RpcError, RpcReply, TransferFileMeta};
use conference_proto::sentinel::FileRequestNotice;
use conference_proto::{wire, TransferId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};

/// Per-broadcast receiver bookkeeping: each attached receiver gets its own
/// bounded outbox, mirroring a Room member's queue.
pub(crate) struct BroadcastReceivers {
    next_id: Mutex<u64>,
    pub(crate) outboxes: Mutex<HashMap<u64, mpsc::Sender<Vec<u8>>>>,
    sender_attached: Mutex<bool>,
    closed: Notify,
}

impl Default for BroadcastReceivers {
    fn default() -> Self {
        Self {
            next_id: Mutex::new(0),
            outboxes: Mutex::new(HashMap::new()),
            sender_attached: Mutex::new(false),
            closed: Notify::new(),
        }
    }
}

impl BroadcastReceivers {
    fn take_sender_slot(&self) -> bool {
        let mut attached = self
            .sender_attached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *attached {
            false
        } else {
            *attached = true;
            true
        }
    }

    fn shutdown(&self) {
        self.outboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.closed.notify_waiters();
    }
}

/// Process-wide registry of in-flight and active file transfers.
#[derive(Default)]
pub struct TransferRegistry {
    pending_responses: Mutex<HashMap<TransferId, oneshot::Sender<bool>>>,
    active: Mutex<HashMap<TransferId, TransferKind>>,
    p2p_rendezvous: Mutex<HashMap<TransferId, Parked>>,
    broadcast_receivers: Mutex<HashMap<TransferId, Arc<BroadcastReceivers>>>,
}

impl TransferRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arbitrate a point-to-point request: deliver the file-request sentinel
    /// to `req.recipient` and await a response (or the 60s arbitration
    /// timeout). Returns the outcome, never the destination's absence,
    /// since that is reported up front as a `NotFound`.
    pub async fn request_file_transfer(
        &self,
        rooms: &RoomRegistry,
        req: &conference_proto::rpc::RequestFileTransferRequest,
    ) -> Result<bool, ServerError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if pending.contains_key(&req.transfer_id) {
                return Err(ServerError::InvalidArgument(format!(
                    "transfer \"{}\" is already pending",
                    req.transfer_id
                )));
            }
            pending.insert(req.transfer_id, tx);
        }

        let notice = FileRequestNotice {
            transfer_id: req.transfer_id,
            source: req.sender.clone(),
            filename: req.filename.clone(),
            byte_size: req.byte_size,
            timestamp: req.timestamp,
        };
        if let Err(err) = rooms.notify_file_request(&req.room_id, &req.recipient, notice.to_sentinel()) {
            self.pending_responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&req.transfer_id);
            return Err(err);
        }

        let accepted = match tokio::time::timeout(ARBITRATION_TIMEOUT, rx).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(_)) | Err(_) => false,
        };
        self.pending_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&req.transfer_id);

        if accepted {
            self.active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(req.transfer_id, TransferKind::PointToPoint);
        }
        Ok(accepted)
    }

    /// Deliver a responder's decision to the waiting `RequestFileTransfer`
    /// call. Fails with `NotFound` if no request is pending for this id
    /// (already timed out, already responded, or never requested).
    pub fn respond_file_transfer(&self, transfer_id: TransferId, accepted: bool) -> Result<(), ServerError> {
        let sender = self
            .pending_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&transfer_id)
            .ok_or_else(|| ServerError::NotFound(format!("no pending transfer request \"{transfer_id}\"")))?;
        let _ = sender.send(accepted);
        Ok(())
    }

    /// Register a broadcast transfer opened by a `file-announcement`
    /// envelope. Fails if the transfer id is already active.
    pub fn register_broadcast(&self, transfer_id: TransferId) -> Result<(), ServerError> {
        let mut active = self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if active.contains_key(&transfer_id) {
            return Err(ServerError::InvalidArgument(format!(
                "transfer \"{transfer_id}\" is already active"
            )));
        }
        active.insert(transfer_id, TransferKind::Broadcast);
        drop(active);
        self.broadcast_receivers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(transfer_id, Arc::new(BroadcastReceivers::default()));
        Ok(())
    }

    /// Attach a newly accepted `TransferFile` connection to its transfer.
    /// Consumes the caller's task until the role's side of the relay is
    /// done (terminal chunk, failure, or — for a receiver handed off during
    /// rendezvous — immediately). Writes a single `RpcReply<()>`
    /// acknowledgement frame once the stream is durably attached to its
    /// role, *before* any `Chunk` traffic, and an `RpcReply::Err` frame for
    /// any attachment failure (unknown transfer id, or a role already
    /// occupied) instead — never an `Ok(())` ack followed by a silent drop.
    pub async fn attach_stream(&self, meta: TransferFileMeta, mut stream: TcpStream) -> Result<(), ServerError> {
        let kind = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&meta.transfer_id)
            .copied();

        let Some(kind) = kind else {
            let not_found = ServerError::NotFound(format!("no active transfer \"{}\"", meta.transfer_id));
            Self::write_ack_err(&mut stream, &not_found, ErrorCode::NotFound).await;
            return Err(not_found);
        };

        match kind {
            TransferKind::PointToPoint => self.attach_point_to_point(meta.transfer_id, meta.role, stream).await,
            TransferKind::Broadcast => self.attach_broadcast(meta.transfer_id, meta.role, stream).await,
        }
    }

    /// Write the `Ok(())` attachment acknowledgement. Any write failure is
    /// reported as `Unavailable` so the caller never proceeds to relay
    /// chunks over a half-broken stream.
    async fn write_ack_ok(stream: &mut TcpStream) -> Result<(), ServerError> {
        wire::write_frame(stream, &RpcReply::<()>::Ok(()))
            .await
            .map_err(|err| ServerError::Unavailable(format!("failed to acknowledge attachment: {err}")))
    }

    /// Write an `Err` attachment reply. Best-effort: the caller is already
    /// returning `err` regardless of whether this write lands.
    async fn write_ack_err(stream: &mut TcpStream, err: &ServerError, code: ErrorCode) {
        let reply: RpcReply<()> = RpcReply::Err(RpcError {
            code,
            message: err.reason(),
        });
        let _ = wire::write_frame(stream, &reply).await;
    }

    async fn attach_point_to_point(&self, transfer_id: TransferId, role: Role, mut stream: TcpStream) -> Result<(), ServerError> {
        enum Outcome {
            Conflict,
            HandOff(oneshot::Sender<TcpStream>),
            ParkedSelf(oneshot::Receiver<TcpStream>),
        }

        let outcome = {
            let mut table = self
                .p2p_rendezvous
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match table.remove(&transfer_id) {
                None => {
                    let (tx, rx) = oneshot::channel();
                    table.insert(
                        transfer_id,
                        match role {
                            Role::Sender => Parked::Sender(tx),
                            Role::Receiver => Parked::Receiver(tx),
                        },
                    );
                    Outcome::ParkedSelf(rx)
                }
                Some(Parked::Sender(tx)) if role == Role::Receiver => Outcome::HandOff(tx),
                Some(Parked::Receiver(tx)) if role == Role::Sender => Outcome::HandOff(tx),
                Some(other) => {
                    table.insert(transfer_id, other);
                    Outcome::Conflict
                }
            }
        };

        match outcome {
            Outcome::Conflict => {
                let err = ServerError::InvalidArgument(format!(
                    "transfer \"{transfer_id}\" already has a {role:?} waiting"
                ));
                Self::write_ack_err(&mut stream, &err, ErrorCode::InvalidArgument).await;
                Err(err)
            }
            Outcome::HandOff(tx) => {
                Self::write_ack_ok(&mut stream).await?;
                let _ = tx.send(stream);
                Ok(())
            }
            Outcome::ParkedSelf(rx) => {
                Self::write_ack_ok(&mut stream).await?;
                match tokio::time::timeout(ATTACHMENT_TIMEOUT, rx).await {
                    Ok(Ok(peer_stream)) => {
                        let (sender_stream, receiver_stream) = match role {
                            Role::Sender => (stream, peer_stream),
                            Role::Receiver => (peer_stream, stream),
                        };
                        let result = proxy::run_point_to_point(sender_stream, receiver_stream).await;
                        self.close(&transfer_id);
                        result
                    }
                    Ok(Err(_)) | Err(_) => {
                        self.p2p_rendezvous
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .remove(&transfer_id);
                        self.close(&transfer_id);
                        Err(ServerError::DeadlineExceeded(format!(
                            "transfer \"{transfer_id}\" attachment timed out"
                        )))
                    }
                }
            }
        }
    }

    async fn attach_broadcast(&self, transfer_id: TransferId, role: Role, mut stream: TcpStream) -> Result<(), ServerError> {
        let receivers = match self
            .broadcast_receivers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&transfer_id)
            .cloned()
        {
            Some(receivers) => receivers,
            None => {
                let err = ServerError::NotFound(format!("no active transfer \"{transfer_id}\""));
                Self::write_ack_err(&mut stream, &err, ErrorCode::NotFound).await;
                return Err(err);
            }
        };

        match role {
            Role::Sender => {
                if !receivers.take_sender_slot() {
                    let err = ServerError::InvalidArgument(format!(
                        "transfer \"{transfer_id}\" already has a sender attached"
                    ));
                    Self::write_ack_err(&mut stream, &err, ErrorCode::InvalidArgument).await;
                    return Err(err);
                }
                Self::write_ack_ok(&mut stream).await?;
                let result = proxy::run_broadcast_sender(stream, receivers).await;
                self.close(&transfer_id);
                result
            }
            Role::Receiver => {
                Self::write_ack_ok(&mut stream).await?;
                self.attach_broadcast_receiver(stream, receivers).await;
                Ok(())
            }
        }
    }

    async fn attach_broadcast_receiver(&self, stream: TcpStream, receivers: Arc<BroadcastReceivers>) {
        let id = {
            let mut next = receivers.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let id = *next;
            *next += 1;
            id
        };
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(BROADCAST_RECEIVER_QUEUE);
        receivers
            .outboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);

        let (mut read_half, mut write_half) = stream.into_split();
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            while let Some(buf) = rx.recv().await {
                if write_half.write_all(&buf).await.is_err() {
                    break;
                }
            }
        });

        let mut discard = [0u8; 64];
        loop {
            tokio::select! {
                res = read_half.read(&mut discard) => {
                    match res {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                () = receivers.closed.notified() => break,
            }
        }

        receivers
            .outboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
        let _ = writer.await;
    }

    fn close(&self, transfer_id: &TransferId) {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(transfer_id);
        if let Some(receivers) = self
            .broadcast_receivers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(transfer_id)
        {
            receivers.shutdown();
        }
    }

    /// Whether `transfer_id` currently accepts a `TransferFile` attachment.
    /// Exposed for tests.
    #[cfg(test)]
    pub fn is_active(&self, transfer_id: &TransferId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(transfer_id)
    }
}
