// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! End-to-end scenarios driven over real TCP sockets: a hub bound to an
//! ephemeral port, one or more `conference-client` connections, and the
//! envelopes/replies those connections actually observe.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use conference_client::{attach_transfer_file, request_file_transfer, respond_file_transfer, JoinedClient};
use conference_proto::rpc::{
    Chunk, ErrorCode, RequestFileTransferRequest, RespondFileTransferRequest, Role, RpcReply,
};
use conference_proto::{wire, CommandKind, Payload};
use conference_server::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Bind an ephemeral port, run the hub on it in the background, and return
/// the address clients should connect to.
async fn spawn_hub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr").to_string();
    let config = Arc::new(ServerConfig::default());
    tokio::spawn(async move {
        let _ = conference_server::serve(listener, config).await;
    });
    addr
}

async fn recv_timeout(client: &mut JoinedClient) -> conference_proto::Envelope {
    tokio::time::timeout(Duration::from_secs(2), client.recv())
        .await
        .expect("envelope within timeout")
        .expect("connection still open")
}

#[tokio::test]
async fn basic_fan_out_excludes_the_sender() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let welcome = recv_timeout(&mut alice).await;
    assert!(matches!(
        welcome.payload,
        Payload::Command {
            kind: CommandKind::Welcome,
            ..
        }
    ));

    let mut bob = JoinedClient::join(&addr, "bob", "r1").await.expect("bob joins");
    let _bob_welcome = recv_timeout(&mut bob).await;

    let joined_notice = recv_timeout(&mut alice).await;
    match joined_notice.payload {
        Payload::Command {
            kind: CommandKind::UserJoined,
            value,
        } => assert_eq!(value, "bob"),
        other => panic!("expected user-joined notice, got {other:?}"),
    }

    alice
        .send(Payload::Text {
            content: "hi".into(),
            timestamp: 0,
            trace_id: String::new(),
        })
        .await
        .expect("alice sends text");

    let received = recv_timeout(&mut bob).await;
    assert_eq!(received.sender, "alice");
    match received.payload {
        Payload::Text { content, .. } => assert_eq!(content, "hi"),
        other => panic!("expected text, got {other:?}"),
    }

    // alice never sees her own message echoed back.
    alice
        .send(Payload::Text {
            content: "still just me".into(),
            timestamp: 0,
            trace_id: String::new(),
        })
        .await
        .expect("alice sends again");
    let from_bob_side = recv_timeout(&mut bob).await;
    assert_eq!(from_bob_side.sender, "alice");
}

#[tokio::test]
async fn empty_sender_or_room_id_is_rejected_with_invalid_argument() {
    let addr = spawn_hub().await;

    let mut empty_sender = JoinedClient::join(&addr, "", "r1").await.expect("connects");
    let rejection = recv_timeout(&mut empty_sender).await;
    match rejection.payload {
        Payload::Command {
            kind: CommandKind::Error,
            ..
        } => {}
        other => panic!("expected error envelope for empty sender, got {other:?}"),
    }
    let closed = tokio::time::timeout(Duration::from_secs(2), empty_sender.recv()).await;
    assert!(matches!(closed, Ok(Err(_))), "rejected stream should close");

    let mut empty_room = JoinedClient::join(&addr, "alice", "").await.expect("connects");
    let rejection = recv_timeout(&mut empty_room).await;
    match rejection.payload {
        Payload::Command {
            kind: CommandKind::Error,
            ..
        } => {}
        other => panic!("expected error envelope for empty room id, got {other:?}"),
    }
    let closed = tokio::time::timeout(Duration::from_secs(2), empty_room.recv()).await;
    assert!(matches!(closed, Ok(Err(_))), "rejected stream should close");
}

#[tokio::test]
async fn username_collision_is_rejected_without_disturbing_others() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let _ = recv_timeout(&mut alice).await;
    let mut bob = JoinedClient::join(&addr, "bob", "r1").await.expect("bob joins");
    let _ = recv_timeout(&mut bob).await;
    let _ = recv_timeout(&mut alice).await; // alice sees bob's join notice

    let mut carol = JoinedClient::join(&addr, "Alice", "r1").await.expect("connects");
    let rejection = recv_timeout(&mut carol).await;
    match rejection.payload {
        Payload::Command {
            kind: CommandKind::Error,
            value,
        } => assert!(value.to_lowercase().contains("alice")),
        other => panic!("expected error envelope, got {other:?}"),
    }
    let closed = tokio::time::timeout(Duration::from_secs(2), carol.recv()).await;
    assert!(matches!(closed, Ok(Err(_))), "rejected stream should close");

    // alice and bob are unaffected: a normal message still reaches bob.
    alice
        .send(Payload::Text {
            content: "still here".into(),
            timestamp: 0,
            trace_id: String::new(),
        })
        .await
        .expect("alice still connected");
    let still_works = recv_timeout(&mut bob).await;
    assert_eq!(still_works.sender, "alice");
}

#[tokio::test]
async fn private_message_to_unknown_recipient_errors_back_to_sender_only() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let _ = recv_timeout(&mut alice).await;
    let mut bob = JoinedClient::join(&addr, "bob", "r1").await.expect("bob joins");
    let _ = recv_timeout(&mut bob).await;
    let _ = recv_timeout(&mut alice).await; // bob's join notice

    alice
        .send(Payload::Private {
            recipient: "carol".into(),
            content: "psst".into(),
        })
        .await
        .expect("alice sends private");

    let reply = recv_timeout(&mut alice).await;
    match reply.payload {
        Payload::Command {
            kind: CommandKind::Error,
            value,
        } => assert!(value.contains("carol")),
        other => panic!("expected error envelope, got {other:?}"),
    }

    let nothing = tokio::time::timeout(Duration::from_millis(200), bob.recv()).await;
    assert!(nothing.is_err(), "bob must not observe a misrouted private message");
}

#[tokio::test]
async fn rejected_file_transfer_leaves_no_attachable_transfer() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let _ = recv_timeout(&mut alice).await;
    let mut bob = JoinedClient::join(&addr, "bob", "r1").await.expect("bob joins");
    let _ = recv_timeout(&mut bob).await;
    let _ = recv_timeout(&mut alice).await; // bob's join notice

    let transfer_id = Uuid::new_v4();
    let addr_for_request = addr.clone();
    let request = tokio::spawn(async move {
        request_file_transfer(
            &addr_for_request,
            RequestFileTransferRequest {
                transfer_id,
                sender: "alice".into(),
                recipient: "bob".into(),
                room_id: "r1".into(),
                filename: "a.bin".into(),
                byte_size: 10,
                timestamp: 0,
            },
        )
        .await
        .expect("request RPC completes")
    });

    let notice = recv_timeout(&mut bob).await;
    assert_eq!(notice.sender, conference_proto::FILE_TRANSFER_SENDER);

    let reply = respond_file_transfer(
        &addr,
        RespondFileTransferRequest {
            transfer_id,
            accepted: false,
            sender: "alice".into(),
            recipient: "bob".into(),
            room_id: "r1".into(),
        },
    )
    .await
    .expect("respond RPC completes");
    assert!(matches!(reply, RpcReply::Ok(resp) if !resp.accepted));

    let outcome = request.await.expect("request task joins");
    match outcome {
        RpcReply::Ok(resp) => assert!(!resp.accepted),
        RpcReply::Err(err) => panic!("unexpected RPC error {err:?}"),
    }

    let (ack, _stream) = attach_transfer_file(&addr, transfer_id, Role::Sender)
        .await
        .expect("attachment connects");
    match ack {
        RpcReply::Err(err) => assert_eq!(err.code, ErrorCode::NotFound),
        RpcReply::Ok(()) => panic!("rejected transfer must not be attachable"),
    }
}

#[tokio::test]
async fn accepted_point_to_point_transfer_relays_chunks_in_order() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let _ = recv_timeout(&mut alice).await;
    let mut bob = JoinedClient::join(&addr, "bob", "r1").await.expect("bob joins");
    let _ = recv_timeout(&mut bob).await;
    let _ = recv_timeout(&mut alice).await;

    let transfer_id = Uuid::new_v4();
    let addr_for_request = addr.clone();
    let request = tokio::spawn(async move {
        request_file_transfer(
            &addr_for_request,
            RequestFileTransferRequest {
                transfer_id,
                sender: "alice".into(),
                recipient: "bob".into(),
                room_id: "r1".into(),
                filename: "a.bin".into(),
                byte_size: 12,
                timestamp: 0,
            },
        )
        .await
        .expect("request RPC completes")
    });

    let _notice = recv_timeout(&mut bob).await;
    respond_file_transfer(
        &addr,
        RespondFileTransferRequest {
            transfer_id,
            accepted: true,
            sender: "alice".into(),
            recipient: "bob".into(),
            room_id: "r1".into(),
        },
    )
    .await
    .expect("respond RPC completes");

    let outcome = request.await.expect("request task joins");
    assert!(matches!(outcome, RpcReply::Ok(resp) if resp.accepted));

    let (sender_ack, mut sender_stream) = attach_transfer_file(&addr, transfer_id, Role::Sender)
        .await
        .expect("sender attaches");
    assert!(matches!(sender_ack, RpcReply::Ok(())));
    let (receiver_ack, mut receiver_stream) = attach_transfer_file(&addr, transfer_id, Role::Receiver)
        .await
        .expect("receiver attaches");
    assert!(matches!(receiver_ack, RpcReply::Ok(())));

    for (seq, data, terminal) in [
        (0u64, b"AAAA".to_vec(), false),
        (1, b"BBBB".to_vec(), false),
        (2, b"CCCC".to_vec(), false),
        (3, Vec::new(), true),
    ] {
        wire::write_frame(
            &mut sender_stream,
            &Chunk {
                transfer_id,
                seq,
                data,
                terminal,
            },
        )
        .await
        .expect("chunk written");
    }

    let mut observed = Vec::new();
    loop {
        let chunk: Chunk = wire::read_frame(&mut receiver_stream, 1 << 20).await.expect("chunk read");
        let terminal = chunk.terminal;
        observed.push(chunk);
        if terminal {
            break;
        }
    }

    assert_eq!(observed.len(), 4);
    assert_eq!(observed[0].data, b"AAAA");
    assert_eq!(observed[1].data, b"BBBB");
    assert_eq!(observed[2].data, b"CCCC");
    assert!(observed[3].terminal);

    let (late_ack, _late_stream) = attach_transfer_file(&addr, transfer_id, Role::Receiver)
        .await
        .expect("attachment connects");
    assert!(matches!(late_ack, RpcReply::Err(_)), "closed transfer must no longer be attachable");
}

#[tokio::test]
async fn broadcast_transfer_late_joiner_sees_only_a_suffix() {
    let addr = spawn_hub().await;

    let mut alice = JoinedClient::join(&addr, "alice", "r1").await.expect("alice joins");
    let _ = recv_timeout(&mut alice).await;

    let transfer_id = Uuid::new_v4();
    alice
        .send(Payload::FileAnnouncement {
            filename: "movie.mp4".into(),
            byte_size: 12,
            transfer_id,
        })
        .await
        .expect("alice announces broadcast transfer");

    let (sender_ack, mut sender_stream) = attach_transfer_file(&addr, transfer_id, Role::Sender)
        .await
        .expect("sender attaches");
    assert!(matches!(sender_ack, RpcReply::Ok(())));

    let (b_ack, mut b_stream) = attach_transfer_file(&addr, transfer_id, Role::Receiver)
        .await
        .expect("b attaches early");
    assert!(matches!(b_ack, RpcReply::Ok(())));

    wire::write_frame(
        &mut sender_stream,
        &Chunk {
            transfer_id,
            seq: 0,
            data: b"AAAA".to_vec(),
            terminal: false,
        },
    )
    .await
    .expect("chunk 0 written");

    let b_first: Chunk = wire::read_frame(&mut b_stream, 1 << 20).await.expect("b reads chunk 0");
    assert_eq!(b_first.data, b"AAAA");

    let (c_ack, mut c_stream) = attach_transfer_file(&addr, transfer_id, Role::Receiver)
        .await
        .expect("c attaches late");
    assert!(matches!(c_ack, RpcReply::Ok(())));

    for (seq, data, terminal) in [(1u64, b"BBBB".to_vec(), false), (2, Vec::new(), true)] {
        wire::write_frame(
            &mut sender_stream,
            &Chunk {
                transfer_id,
                seq,
                data,
                terminal,
            },
        )
        .await
        .expect("chunk written");
    }

    let b_second: Chunk = wire::read_frame(&mut b_stream, 1 << 20).await.expect("b reads chunk 1");
    assert_eq!(b_second.data, b"BBBB");
    let b_third: Chunk = wire::read_frame(&mut b_stream, 1 << 20).await.expect("b reads terminal");
    assert!(b_third.terminal);

    let c_first: Chunk = wire::read_frame(&mut c_stream, 1 << 20).await.expect("c reads chunk 1");
    assert_eq!(c_first.data, b"BBBB");
    let c_second: Chunk = wire::read_frame(&mut c_stream, 1 << 20).await.expect("c reads terminal");
    assert!(c_second.terminal);
}
