// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Endpoint identifier interning.
//!
//! An [`Eid`] is a cheaply-clonable handle (`Arc<str>`) to a canonical
//! `scheme:ssp` string. Identical text always resolves to the same
//! allocation for as long as at least one handle is alive; the intern
//! table itself holds only [`Weak`] references so it never keeps an EID
//! alive on its own.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, Weak},
};

/// A reference-counted, interned endpoint identifier.
#[derive(Debug, Clone)]
pub struct Eid(Arc<str>);

impl Eid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for Eid {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for Eid {}

impl Hash for Eid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide (or, in tests, per-instance) interning table.
///
/// A single mutex guards the table, matching the original's "one mutex
/// guards both table and cache" contract; the cache itself is folded into
/// the table since a `Weak` upgrade is as cheap as a cache hit.
#[derive(Default)]
pub struct EidTable {
    inner: Mutex<HashMap<Box<str>, Weak<str>>>,
}

impl EidTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical handle for `text`, allocating a fresh one only
    /// if no live handle exists for this string.
    pub fn intern(&self, text: &str) -> Eid {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(weak) = guard.get(text)
            && let Some(arc) = weak.upgrade()
        {
            return Eid(arc);
        }
        let arc: Arc<str> = Arc::from(text);
        guard.insert(Box::from(text), Arc::downgrade(&arc));
        Eid(arc)
    }

    /// Number of live entries, including any stale (since-dropped) weak
    /// slots not yet swept by a subsequent [`Self::intern`] miss.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops dead weak entries. Never required for correctness — lookups
    /// self-heal on miss — but useful to bound table growth under churn.
    pub fn sweep(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|_, weak| weak.strong_count() > 0);
    }
}
