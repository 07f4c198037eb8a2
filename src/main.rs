// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::timeout;
use tracing::info;
use upcn_router::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    runtime::{NullClaFactory, spawn_pipeline, store::InMemoryBundleStore},
};

/// A small demonstration entry point: loads a config, seeds the routing
/// table with its ground stations, and starts the router task and
/// contact manager with a null convergence layer so the pipeline can be
/// exercised without real sockets. Mirrors the teacher's `main.rs`
/// shape (load config, build the runtime, drive it, shut down) without
/// the session/pool machinery this crate has no use for.
#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_arg = args.get(1).map(String::as_str).unwrap_or("config.yaml");

    let cfg = resolve_config_path(config_arg)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let _logger_guard = init_logger(&cfg.runtime.log_config_path)
        .context("failed to initialize logger")?;

    let store = InMemoryBundleStore::new();
    let (router, _contact_manager, mut events, mut contact_events) = spawn_pipeline(
        cfg.router.clone(),
        cfg.runtime.default_gateway_reliability,
        store,
        cfg.runtime.cla_channels,
        cfg.runtime.contact_tx_task_queue_length,
        NullClaFactory,
    );

    let eids = upcn_router::eid::EidTable::new();
    for station in &cfg.stations {
        router
            .submit_command(upcn_router::runtime::RouterCommand::Add {
                eid: eids.intern(&station.eid),
                cla_kind: station.cla_kind.to_string(),
                address: station.address.clone(),
                trustworthiness: station.trustworthiness,
                endpoints: vec![],
                contacts: vec![],
            })
            .await;
    }

    info!(stations = cfg.stations.len(), "router pipeline started");

    // Drain events for a bounded demonstration window; a real deployment
    // would hand these to the bundle processor instead.
    let _ = timeout(Duration::from_secs(1), async {
        tokio::select! {
            event = events.recv() => info!(?event, "bundle processor event"),
            event = contact_events.recv() => info!(?event, "contact event"),
        }
    })
    .await;

    Ok(())
}
