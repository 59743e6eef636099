// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Client helper for talking to the conference hub: open a `Join` stream,
//! drive the unary file-transfer RPCs, and attach a `TransferFile` chunk
//! stream. Used by the hub's own integration tests and available to any
//! binary that wants a minimal TCP client without re-deriving the wire
//! protocol.

use conference_proto::rpc::{
    ConnectionKind, JoinRequest, RequestFileTransferRequest, RequestFileTransferResponse,
    RespondFileTransferRequest, RespondFileTransferResponse, Role, RpcReply, TransferFileMeta,
};
use conference_proto::{wire, wire::ProtoError, Envelope, Payload, TransferId};
use tokio::net::TcpStream;

const DEFAULT_MAX_FRAME_BYTES: usize = 4 << 20;

/// A joined connection: the `Join` stream's read and write halves, plus the
/// identity this client joined under.
pub struct JoinedClient {
    stream: TcpStream,
    sender: String,
    room_id: String,
}

impl JoinedClient {
    /// Connect to `addr` and open a `Join` stream as `sender` in `room_id`.
    /// Does not wait for the server's `welcome`/`error` response; call
    /// [`JoinedClient::recv`] for that.
    pub async fn join(addr: &str, sender: impl Into<String>, room_id: impl Into<String>) -> Result<Self, ProtoError> {
        let sender = sender.into();
        let room_id = room_id.into();
        let mut stream = TcpStream::connect(addr).await?;
        wire::write_frame(
            &mut stream,
            &ConnectionKind::Join(JoinRequest {
                sender: sender.clone(),
                room_id: room_id.clone(),
            }),
        )
        .await?;
        Ok(Self {
            stream,
            sender,
            room_id,
        })
    }

    /// Username this client joined under.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Room this client joined.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Send a payload as an envelope from this client.
    pub async fn send(&mut self, payload: Payload) -> Result<(), ProtoError> {
        let envelope = Envelope::new(self.sender.clone(), self.room_id.clone(), payload);
        wire::write_frame(&mut self.stream, &envelope).await
    }

    /// Receive the next envelope addressed to this client.
    pub async fn recv(&mut self) -> Result<Envelope, ProtoError> {
        wire::read_frame(&mut self.stream, DEFAULT_MAX_FRAME_BYTES).await
    }
}

/// Call the unary `RequestFileTransfer` RPC and return its reply.
pub async fn request_file_transfer(
    addr: &str,
    req: RequestFileTransferRequest,
) -> Result<RpcReply<RequestFileTransferResponse>, ProtoError> {
    let mut stream = TcpStream::connect(addr).await?;
    wire::write_frame(&mut stream, &ConnectionKind::RequestFileTransfer(req)).await?;
    wire::read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES).await
}

/// Call the unary `RespondFileTransfer` RPC and return its reply.
pub async fn respond_file_transfer(
    addr: &str,
    req: RespondFileTransferRequest,
) -> Result<RpcReply<RespondFileTransferResponse>, ProtoError> {
    let mut stream = TcpStream::connect(addr).await?;
    wire::write_frame(&mut stream, &ConnectionKind::RespondFileTransfer(req)).await?;
    wire::read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES).await
}

/// Open a `TransferFile` stream attached to `transfer_id` in the given
/// role and wait for the hub's attachment acknowledgement. On `RpcReply::Ok`
/// the returned stream carries raw `Chunk` frames, which the caller reads or
/// writes directly with [`conference_proto::wire`]. On `RpcReply::Err` (for
/// example `NotFound` for an unknown or already-closed transfer id) the hub
/// has already closed its side.
pub async fn attach_transfer_file(
    addr: &str,
    transfer_id: TransferId,
    role: Role,
) -> Result<(RpcReply<()>, TcpStream), ProtoError> {
    let mut stream = TcpStream::connect(addr).await?;
    wire::write_frame(&mut stream, &ConnectionKind::TransferFile(TransferFileMeta { transfer_id, role })).await?;
    let ack: RpcReply<()> = wire::read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES).await?;
    Ok((ack, stream))
}
