// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Chunk Proxy: the relay loops that move `Chunk` frames from a sender's
//! stream to its receiver(s) once both sides of a transfer are attached.

use super::registry::BroadcastReceivers;
use super::state::MAX_CHUNK_FRAME_BYTES;
use crate::error::ServerError;
use conference_proto::{rpc::Chunk, wire};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::warn;

/// Relay chunks from `sender` to `receiver` until the terminal chunk is
/// forwarded or either side fails. Point-to-point only: a single failure on
/// either stream is fatal to the whole transfer.
pub async fn run_point_to_point(mut sender: TcpStream, mut receiver: TcpStream) -> Result<(), ServerError> {
    loop {
        let chunk: Chunk = wire::read_frame(&mut sender, MAX_CHUNK_FRAME_BYTES)
            .await
            .map_err(|err| ServerError::Unavailable(format!("sender stream ended: {err}")))?;
        let terminal = chunk.terminal;
        wire::write_frame(&mut receiver, &chunk)
            .await
            .map_err(|err| ServerError::Unavailable(format!("receiver stream failed: {err}")))?;
        if terminal {
            return Ok(());
        }
    }
}

/// Drive a broadcast transfer's sender side: read chunks from `stream` and
/// fan each one out to every currently registered receiver, evicting any
/// receiver whose outbox is full or closed without stopping the relay for
/// the rest. Runs until the terminal chunk is read or the sender's stream
/// fails.
///
/// Fan-out uses `try_send`, never an awaited `send`: a receiver whose queue
/// is merely full (alive, just slow to drain) must not block delivery to
/// every other receiver or stall the read off the sender's own socket.
pub async fn run_broadcast_sender(
    mut stream: TcpStream,
    receivers: Arc<BroadcastReceivers>,
) -> Result<(), ServerError> {
    loop {
        let chunk: Chunk = wire::read_frame(&mut stream, MAX_CHUNK_FRAME_BYTES)
            .await
            .map_err(|err| ServerError::Unavailable(format!("sender stream ended: {err}")))?;
        let terminal = chunk.terminal;
        let bytes = match wire::encode_frame(&chunk) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(?err, "failed to encode chunk, dropping for all receivers");
                if terminal {
                    return Ok(());
                }
                continue;
            }
        };

        let mut outboxes = receivers
            .outboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        outboxes.retain(|_, tx| match tx.try_send(bytes.clone()) {
            Ok(()) => true,
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                warn!("broadcast receiver outbox full, dropping chunk for recipient");
                false
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => false,
        });
        drop(outboxes);

        if terminal {
            return Ok(());
        }
    }
}
