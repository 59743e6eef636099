// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! The transfer registry and chunk proxy: arbitration rendezvous, stream
//! attachment, and the relay loops that move chunks from a sender to its
//! receiver(s).

mod proxy;
mod registry;
mod state;

pub use registry::TransferRegistry;
pub use state::TransferKind;
