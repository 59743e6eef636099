// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! The legacy file-request notification sentinel.
//!
//! A file-transfer request is, on the wire, also delivered to the
//! destination participant as ordinary [`crate::Payload::Text`] from the
//! reserved sender [`crate::FILE_TRANSFER_SENDER`], so that client parsers
//! written against the old text-only protocol keep working. The content is
//! the colon-separated string `FILE_REQUEST:<transfer id>:<source
//! username>:<filename>:<byte size>:<timestamp>`.

use crate::TransferId;
use std::fmt;

/// A parsed file-request sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequestNotice {
    /// Transfer id carried by the sentinel.
    pub transfer_id: TransferId,
    /// Source (requesting) username.
    pub source: String,
    /// Name of the offered file.
    pub filename: String,
    /// Size in bytes.
    pub byte_size: u64,
    /// Sender-side Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl fmt::Display for FileRequestNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FILE_REQUEST:{}:{}:{}:{}:{}",
            self.transfer_id, self.source, self.filename, self.byte_size, self.timestamp
        )
    }
}

/// Error returned when a string does not match the sentinel grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SentinelParseError {
    /// The string did not start with the `FILE_REQUEST:` tag, or had the
    /// wrong number of colon-separated fields.
    #[error("malformed FILE_REQUEST sentinel")]
    Malformed,
    /// The transfer id field was not a valid UUID.
    #[error("invalid transfer id in FILE_REQUEST sentinel")]
    InvalidTransferId,
    /// The byte size field did not parse as `u64`.
    #[error("invalid byte size in FILE_REQUEST sentinel")]
    InvalidByteSize,
    /// The timestamp field did not parse as `i64`.
    #[error("invalid timestamp in FILE_REQUEST sentinel")]
    InvalidTimestamp,
}

impl FileRequestNotice {
    /// Render the sentinel string for this notice.
    pub fn to_sentinel(&self) -> String {
        self.to_string()
    }

    /// Parse a sentinel string produced by [`FileRequestNotice::to_sentinel`].
    pub fn parse(content: &str) -> Result<Self, SentinelParseError> {
        let mut parts = content.splitn(6, ':');
        let tag = parts.next().ok_or(SentinelParseError::Malformed)?;
        if tag != "FILE_REQUEST" {
            return Err(SentinelParseError::Malformed);
        }
        let transfer_id = parts.next().ok_or(SentinelParseError::Malformed)?;
        let source = parts.next().ok_or(SentinelParseError::Malformed)?;
        let filename = parts.next().ok_or(SentinelParseError::Malformed)?;
        let byte_size = parts.next().ok_or(SentinelParseError::Malformed)?;
        let timestamp = parts.next().ok_or(SentinelParseError::Malformed)?;
        if parts.next().is_some() {
            return Err(SentinelParseError::Malformed);
        }

        Ok(Self {
            transfer_id: transfer_id
                .parse()
                .map_err(|_| SentinelParseError::InvalidTransferId)?,
            source: source.to_string(),
            filename: filename.to_string(),
            byte_size: byte_size
                .parse()
                .map_err(|_| SentinelParseError::InvalidByteSize)?,
            timestamp: timestamp
                .parse()
                .map_err(|_| SentinelParseError::InvalidTimestamp)?,
        })
    }
}
