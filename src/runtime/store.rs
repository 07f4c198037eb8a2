// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The bundle store boundary. Persistent bundle storage is a Non-goal
//! (`SPEC_FULL.md` §2); this module only fixes the shape of the lookup
//! the router task needs to turn a `RouteBundle(id)` signal into a
//! routing decision, plus an in-memory double for tests.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use crate::{bundle::Priority, eid::Eid};

/// The subset of a stored bundle's primary block the router needs to
/// compute a route. Mirrors the fields `find_route` takes directly.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleMeta {
    pub destination: Eid,
    pub size: i64,
    pub priority: Priority,
    pub expiration: u64,
    pub must_not_fragment: bool,
}

/// Read access to stored bundles, keyed by bundle id.
pub trait BundleStore: Send + Sync {
    fn lookup(&self, bundle_id: u64) -> Option<BundleMeta>;
}

/// A `HashMap`-backed store for tests and the demonstration binary.
#[derive(Default)]
pub struct InMemoryBundleStore {
    bundles: Mutex<HashMap<u64, BundleMeta>>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bundle_id: u64, meta: BundleMeta) {
        self.bundles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(bundle_id, meta);
    }

    pub fn remove(&self, bundle_id: u64) {
        self.bundles.lock().unwrap_or_else(|e| e.into_inner()).remove(&bundle_id);
    }
}

impl BundleStore for InMemoryBundleStore {
    fn lookup(&self, bundle_id: u64) -> Option<BundleMeta> {
        self.bundles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&bundle_id)
            .cloned()
    }
}

/// Lets callers share one store between the router task and a test
/// harness (or any other collaborator) via `Arc` instead of forcing a
/// dedicated shared-store wrapper type.
impl<T: BundleStore + ?Sized> BundleStore for Arc<T> {
    fn lookup(&self, bundle_id: u64) -> Option<BundleMeta> {
        (**self).lookup(bundle_id)
    }
}
