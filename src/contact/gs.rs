// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ground station and endpoint-list types.

use crate::{contact::ContactId, eid::Eid};

/// An EID reachable through a ground station, with the per-hop
/// reachability probability the routing table uses to weigh it.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub eid: Eid,
    pub probability: f64,
}

/// A remote DTN node reachable via zero or more contacts.
#[derive(Debug, Clone)]
pub struct GroundStation {
    pub eid: Eid,
    pub cla_kind: String,
    pub address: String,
    /// Trustworthiness in `[0, 1]`, combined with reliability to weigh
    /// contacts to this GS in the router's confidence classification.
    pub trustworthiness: f64,
    pub endpoints: Vec<Endpoint>,
    /// Time-ordered by the parent contact's `from`; never overlapping.
    pub contacts: Vec<ContactId>,
    pub active_contact: Option<ContactId>,
}

impl GroundStation {
    pub fn new(eid: Eid, cla_kind: String, address: String, trustworthiness: f64) -> Self {
        Self {
            eid,
            cla_kind,
            address,
            trustworthiness: trustworthiness.clamp(0.0, 1.0),
            endpoints: Vec::new(),
            contacts: Vec::new(),
            active_contact: None,
        }
    }

    pub fn endpoint_probability(&self, eid: &Eid) -> Option<f64> {
        self.endpoints
            .iter()
            .find(|e| &e.eid == eid)
            .map(|e| e.probability)
    }
}

/// Unions `incoming` into `base`: an endpoint already present keeps the
/// larger probability (a more confident observation should not regress),
/// a new one is appended.
pub fn endpoint_list_union(base: &mut Vec<Endpoint>, incoming: &[Endpoint]) {
    for inc in incoming {
        if let Some(existing) = base.iter_mut().find(|e| e.eid == inc.eid) {
            existing.probability = existing.probability.max(inc.probability);
        } else {
            base.push(inc.clone());
        }
    }
}

/// Removes every endpoint in `remove` from `base` by EID.
pub fn endpoint_list_difference(base: &mut Vec<Endpoint>, remove: &[Endpoint]) {
    base.retain(|e| !remove.iter().any(|r| r.eid == e.eid));
}
