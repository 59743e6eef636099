// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Real-time multi-room conference hub: room relay, private routing, and
//! file-transfer arbitration over one listening endpoint.
//!
//! `main.rs` is a thin wrapper around [`serve`]; the accept loop lives here
//! so integration tests can run a hub on an ephemeral port in-process.

pub mod config;
mod conn;
pub mod error;
mod participant;
mod registry;
mod room;
pub mod transfer;

use conference_proto::rpc::{ConnectionKind, ErrorCode, RpcError, RpcReply};
use conference_proto::wire;
use conn::ConnIdGen;
use error::ServerError;
use registry::RoomRegistry;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use transfer::TransferRegistry;

const CONNECTION_KIND_FRAME_BYTES: usize = 64 << 10;

/// Accept connections on `listener` forever, dispatching each to the RPC
/// surface named by its first frame. Returns only if `accept` itself
/// returns a fatal error; individual connection failures are logged and
/// otherwise contained.
pub async fn serve(listener: TcpListener, config: Arc<config::ServerConfig>) -> anyhow::Result<()> {
    let rooms = Arc::new(RoomRegistry::new());
    let transfers = Arc::new(TransferRegistry::new());
    let conn_ids = Arc::new(ConnIdGen::default());

    loop {
        let (stream, peer) = listener.accept().await?;
        let conn_id = conn_ids.next();
        let rooms = rooms.clone();
        let transfers = transfers.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(conn_id, stream, rooms, transfers, config).await {
                warn!(conn_id, %peer, %err, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    conn_id: conn::ConnId,
    mut stream: TcpStream,
    rooms: Arc<RoomRegistry>,
    transfers: Arc<TransferRegistry>,
    config: Arc<config::ServerConfig>,
) -> Result<(), ServerError> {
    let kind: ConnectionKind = wire::read_frame(&mut stream, CONNECTION_KIND_FRAME_BYTES)
        .await
        .map_err(|err| ServerError::InvalidArgument(format!("failed to read connection kind: {err}")))?;

    match kind {
        ConnectionKind::Join(join) => {
            participant::run(
                conn_id,
                stream,
                join,
                rooms,
                transfers,
                config.max_frame_bytes,
                config.outbound_queue_capacity,
            )
            .await;
            Ok(())
        }
        ConnectionKind::RequestFileTransfer(req) => {
            let result = transfers.request_file_transfer(&rooms, &req).await;
            reply_unary(
                &mut stream,
                result.map(|accepted| conference_proto::rpc::RequestFileTransferResponse {
                    transfer_id: req.transfer_id,
                    accepted,
                }),
            )
            .await
        }
        ConnectionKind::RespondFileTransfer(req) => {
            let result = transfers
                .respond_file_transfer(req.transfer_id, req.accepted)
                .map(|()| conference_proto::rpc::RespondFileTransferResponse {
                    transfer_id: req.transfer_id,
                    accepted: req.accepted,
                });
            reply_unary(&mut stream, result).await
        }
        ConnectionKind::TransferFile(meta) => {
            let transfer_id = meta.transfer_id;
            match transfers.attach_stream(meta, stream).await {
                Ok(()) => {
                    info!(conn_id, %transfer_id, "transfer attachment closed cleanly");
                    Ok(())
                }
                Err(err) => {
                    error!(conn_id, %transfer_id, %err, "transfer attachment failed");
                    Err(err)
                }
            }
        }
    }
}

async fn reply_unary<T>(stream: &mut TcpStream, result: Result<T, ServerError>) -> Result<(), ServerError>
where
    T: serde::Serialize,
{
    match result {
        Ok(value) => wire::write_frame(stream, &RpcReply::Ok(value))
            .await
            .map_err(|err| ServerError::Unavailable(format!("failed to write reply: {err}"))),
        Err(err) => {
            let reply: RpcReply<T> = RpcReply::Err(RpcError {
                code: error_code(&err),
                message: err.reason(),
            });
            let _ = wire::write_frame(stream, &reply).await;
            Err(err)
        }
    }
}

fn error_code(err: &ServerError) -> ErrorCode {
    match err {
        ServerError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        ServerError::AlreadyExists(_) => ErrorCode::AlreadyExists,
        ServerError::NotFound(_) => ErrorCode::NotFound,
        ServerError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
        ServerError::Unavailable(_) => ErrorCode::Unavailable,
        ServerError::Internal(_) => ErrorCode::Internal,
    }
}
