// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Error taxonomy for the relay. Every variant maps to exactly one of the
//! categories in the specification's error design: a participant-local
//! failure closes only that participant's stream, a transfer-scoped failure
//! closes only that transfer, and nothing ever propagates past its smallest
//! containing scope.

use thiserror::Error;

/// The hub's error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Missing first-message fields, missing transfer metadata, or an
    /// unknown `role`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Username already taken in the target room.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Private-message recipient absent, or transfer id not registered.
    #[error("not found: {0}")]
    NotFound(String),
    /// Arbitration or attachment timeout elapsed.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    /// Peer stream closed unexpectedly mid-transfer.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Unexpected failure in the relay path.
    #[error("internal: {0}")]
    Internal(String),
}

impl ServerError {
    /// The human-readable reason carried in a `Command::Error` envelope or
    /// logged alongside the taxonomy name.
    pub fn reason(&self) -> String {
        match self {
            Self::InvalidArgument(m)
            | Self::AlreadyExists(m)
            | Self::NotFound(m)
            | Self::DeadlineExceeded(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => m.clone(),
        }
    }
}
