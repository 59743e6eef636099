// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Connection identity. Every accepted socket gets a small monotone id used
//! as the membership key in place of its transport address — a local TCP
//! peer can reconnect under the same address, but never the same id.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one accepted connection for the lifetime of its task.
pub type ConnId = u64;

/// Monotone generator for [`ConnId`] values, shared across the listener.
#[derive(Default)]
pub struct ConnIdGen(AtomicU64);

impl ConnIdGen {
    /// Allocate the next id.
    pub fn next(&self) -> ConnId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
