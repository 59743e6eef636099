// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Length-prefixed CBOR framing for every stream the hub speaks: `len: u32`
//! (big-endian) followed by exactly `len` bytes of CBOR payload.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors raised while encoding, decoding, or transporting a frame.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The declared frame length exceeded the caller's configured maximum.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The CBOR body failed to serialize.
    #[error("encode error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// The CBOR body failed to deserialize.
    #[error("decode error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
    /// The underlying transport returned an I/O error (includes clean EOF,
    /// surfaced as `UnexpectedEof`).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize `value` to a bare CBOR body (no length prefix).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)?;
    Ok(out)
}

/// Deserialize a bare CBOR body (no length prefix).
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Encode `value` into a length-prefixed frame ready to write to a stream.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let body = encode(value)?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&u32::try_from(body.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Read exactly one length-prefixed frame from `reader` and decode it.
///
/// `max_payload` bounds the declared length so a malformed or hostile peer
/// cannot force an unbounded allocation.
pub async fn read_frame<R, T>(reader: &mut R, max_payload: usize) -> Result<T, ProtoError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(ProtoError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body)
}

/// Encode `value` as a length-prefixed frame and write it to `writer`.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ProtoError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{CommandKind, Envelope, Payload};

    #[tokio::test]
    async fn frame_round_trips_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let env = Envelope::new(
            "Server",
            "r1",
            Payload::Command {
                kind: CommandKind::Welcome,
                value: "r1".into(),
            },
        );
        write_frame(&mut client, &env).await.unwrap();
        let decoded: Envelope = read_frame(&mut server, 1 << 20).await.unwrap();
        assert_eq!(env, decoded);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocating() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&1_000_000u32.to_be_bytes()).await.unwrap();
        let err = read_frame::<_, Envelope>(&mut server, 16).await.unwrap_err();
        assert!(matches!(err, ProtoError::FrameTooLarge { .. }));
    }
}
