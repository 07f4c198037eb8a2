// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Tokio runtime layer: the contact manager and router task event
//! loops, the channel-based signal surface between them, and the narrow
//! trait boundaries (`Cla`, `BundleStore`) through which they reach
//! collaborators this crate does not implement (socket I/O, persistent
//! storage, discovery).
//!
//! Ported in spirit from `examples/original_source/components/upcn/src/
//! contactManager.c` and `routerTask.c`: FreeRTOS queues and semaphores
//! become Tokio `mpsc` channels, and the coarse mutex around the ground
//! station / contact arena becomes a `tokio::sync::Mutex<RoutingTable>`
//! shared by both tasks, per `spec.md` §5 and §9's "shared mutable
//! routing state" design note.

pub mod cla;
pub mod contact_manager;
pub mod router_task;
pub mod signal;
pub mod store;

pub use cla::{Cla, ClaError, ClaFactory, ClaHandle, ChannelCla, NullCla, NullClaFactory};
pub use contact_manager::{ContactManager, ContactManagerHandle};
pub use router_task::{RouterTask, RouterTaskHandle, spawn_pipeline};
pub use signal::{BundleProcessorEvent, ContactEvent, ContactManagerSignal, RouterCommand, RouterSignal};
pub use store::{BundleMeta, BundleStore, InMemoryBundleStore};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the epoch — the timeline contacts are
/// scheduled on (`spec.md` §6, "Clock").
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
