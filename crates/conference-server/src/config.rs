// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Server configuration: compiled-in defaults, a best-effort persisted
//! override file, and command-line flags, in ascending priority.

use clap::Parser;
use conference_config_core::ConfigService;
use conference_config_fs::FsConfigStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_KEY: &str = "server";

/// Command-line flags. Any flag left unset falls back to the persisted
/// value, and failing that, the compiled-in default.
#[derive(Debug, Parser)]
#[command(name = "conference-hub", about = "Real-time multi-room conference relay")]
pub struct Args {
    /// Address to listen on, e.g. `0.0.0.0:50051`.
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Capacity of each participant's bounded outbound queue.
    #[arg(long)]
    pub outbound_queue_capacity: Option<usize>,

    /// Largest accepted envelope/chunk frame, in bytes.
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Capacity of each participant's bounded outbound queue (§4.2).
    pub outbound_queue_capacity: usize,
    /// Largest accepted envelope/chunk frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:50051".into(),
            outbound_queue_capacity: 256,
            max_frame_bytes: 4 << 20,
        }
    }
}

impl ServerConfig {
    /// Resolve configuration: defaults, overlaid with a persisted file
    /// (best-effort — a missing or unreadable config directory is not
    /// fatal), overlaid with explicit CLI flags.
    pub fn resolve(args: Args) -> Self {
        let mut config = Self::default();

        match FsConfigStore::new() {
            Ok(store) => {
                let service = ConfigService::new(store);
                match service.load::<Self>(CONFIG_KEY) {
                    Ok(Some(persisted)) => config = persisted,
                    Ok(None) => {}
                    Err(err) => warn!(?err, "failed to load persisted config, using defaults"),
                }
            }
            Err(err) => warn!(?err, "config directory unavailable, using defaults"),
        }

        if let Some(bind_addr) = args.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(capacity) = args.outbound_queue_capacity {
            config.outbound_queue_capacity = capacity;
        }
        if let Some(max_frame_bytes) = args.max_frame_bytes {
            config.max_frame_bytes = max_frame_bytes;
        }
        config
    }
}
