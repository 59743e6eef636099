// SPDX-License-Identifier: Apache-2.0
// © conference-hub Ω relay <https://github.com/conference-hub/conference-hub>
//! Binary entry point: parse configuration, bind the listener, and run the
//! hub until an operator interrupts it.

use clap::Parser;
use conference_server::config::{Args, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let config = Arc::new(ServerConfig::resolve(args));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "conference hub listening");

    tokio::select! {
        result = conference_server::serve(listener, config) => {
            result?;
        }
        () = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
