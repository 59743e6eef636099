// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! The Participant Dispatcher: one per `Join` connection. Two concurrent
//! duties — draining inbound envelopes into the Room/Transfer Registry, and
//! draining the participant's outbound queue into the socket — coordinated
//! so that either one ending closes the other.

use crate::conn::ConnId;
use crate::registry::RoomRegistry;
use crate::transfer::TransferRegistry;
use conference_proto::rpc::JoinRequest;
use conference_proto::{wire, CommandKind, Envelope, Payload, SERVER_SENDER};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Drive one `Join` connection end to end: validate the first frame, admit
/// the participant, then run inbound classification and outbound draining
/// concurrently until either duty ends.
pub async fn run(
    conn_id: ConnId,
    stream: TcpStream,
    join: JoinRequest,
    rooms: Arc<RoomRegistry>,
    transfers: Arc<TransferRegistry>,
    max_frame_bytes: usize,
    outbound_queue_capacity: usize,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    if join.sender.trim().is_empty() || join.room_id.trim().is_empty() {
        warn!(conn_id, "rejecting join with empty sender or room id");
        reject(&mut write_half, "sender and room id are required").await;
        return;
    }

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Vec<u8>>(outbound_queue_capacity);

    if let Err(err) = rooms.attach(&join.room_id, conn_id, &join.sender, outbox_tx) {
        warn!(conn_id, %err, "join rejected");
        reject(&mut write_half, &err.reason()).await;
        return;
    }

    info!(conn_id, sender = %join.sender, room_id = %join.room_id, "participant joined");

    let outbound = async {
        while let Some(bytes) = outbox_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    };

    let inbound = async {
        loop {
            let envelope: Envelope = match wire::read_frame(&mut read_half, max_frame_bytes).await {
                Ok(envelope) => envelope,
                Err(_) => break,
            };
            dispatch(&envelope, &join, conn_id, &rooms, &transfers).await;
        }
    };

    tokio::select! {
        () = outbound => {},
        () = inbound => {},
    }

    rooms.detach(&join.room_id, conn_id);
    info!(conn_id, sender = %join.sender, room_id = %join.room_id, "participant released");
}

async fn dispatch(
    envelope: &Envelope,
    join: &JoinRequest,
    conn_id: ConnId,
    rooms: &RoomRegistry,
    transfers: &TransferRegistry,
) {
    match &envelope.payload {
        Payload::Text { .. } | Payload::AudioFrame { .. } => {
            rooms.broadcast(&join.room_id, envelope.clone(), conn_id);
        }
        Payload::FileAnnouncement { transfer_id, .. } => {
            if let Err(err) = transfers.register_broadcast(*transfer_id) {
                warn!(conn_id, %err, "rejecting duplicate broadcast announcement");
                return;
            }
            rooms.broadcast(&join.room_id, envelope.clone(), conn_id);
        }
        Payload::Private { recipient, content } => {
            rooms.send_private(&join.room_id, &join.sender, conn_id, recipient, content);
        }
        Payload::Command { .. } => {
            // Control envelopes are server-originated only; one arriving
            // from a participant is ignored per the dispatcher's contract.
        }
    }
}

/// Write a `Command::Error` envelope straight to a connection that was
/// never admitted to a Room, then let the caller close the stream.
async fn reject(write_half: &mut tokio::net::tcp::OwnedWriteHalf, reason: &str) {
    let envelope = Envelope::new(
        SERVER_SENDER,
        "",
        Payload::Command {
            kind: CommandKind::Error,
            value: reason.to_string(),
        },
    );
    if let Ok(frame) = wire::encode_frame(&envelope) {
        let _ = write_half.write_all(&frame).await;
    }
}
