// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The routing table: the arena of ground stations and contacts, plus the
//! `EID -> node table entry` index the router walks to find candidate
//! contacts for a destination.
//!
//! Ported in spirit from `examples/original_source/components/upcn/src/
//! groundStation.c` and the (unretained) `routingTable.c` it calls into;
//! the arena-of-ids shape follows the "cyclic graphs" design note rather
//! than the original's back-pointer linked lists.

use std::collections::HashMap;

use crate::{
    contact::{
        Contact, ContactId, GroundStation, GsId,
        algebra::{self, ContactSpec, DifferenceOutcome, UnionOutcome},
        gs::{self, Endpoint},
    },
    eid::{Eid, EidTable},
    errors::PlanError,
};

/// Per-EID routing entry: every contact known to reach this endpoint,
/// each carrying the per-hop reachability probability that contact's
/// endpoint-list association has (spec §3, "Node table entry").
#[derive(Debug, Default, Clone)]
pub struct NodeTableEntry {
    pub contacts: Vec<(ContactId, f64)>,
}

impl NodeTableEntry {
    pub fn ref_count(&self) -> usize {
        self.contacts.len()
    }
}

/// Arena-owned routing state: every ground station, every contact, and
/// the node table index built from their endpoint lists. A single owner
/// (the router task, per the "shared mutable routing state" design note)
/// holds this behind one lock; no other component mutates it directly.
#[derive(Default)]
pub struct RoutingTable {
    pub ground_stations: Vec<Option<GroundStation>>,
    pub contacts: Vec<Contact>,
    pub node_table: HashMap<Eid, NodeTableEntry>,
    /// GSs flagged as a fallback route when no destination-specific
    /// contact is known (the original's "default gateway" lookup path;
    /// the neighbor-bloom-filter step it also falls back to is an
    /// external discovery-layer concern and is not reimplemented here).
    pub default_gateways: Vec<GsId>,
    /// `router_def_base_reliability`-equivalent: the confidence assigned
    /// to a route found only via the default-gateway fallback.
    pub default_gateway_reliability: f64,
}

impl RoutingTable {
    pub fn new(default_gateway_reliability: f64) -> Self {
        Self {
            ground_stations: Vec::new(),
            contacts: Vec::new(),
            node_table: HashMap::new(),
            default_gateways: Vec::new(),
            default_gateway_reliability,
        }
    }

    pub fn gs(&self, id: GsId) -> Option<&GroundStation> {
        self.ground_stations.get(id).and_then(|g| g.as_ref())
    }

    pub fn gs_mut(&mut self, id: GsId) -> Option<&mut GroundStation> {
        self.ground_stations.get_mut(id).and_then(|g| g.as_mut())
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub fn contact_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contacts.get_mut(id)
    }

    pub fn find_gs_by_eid(&self, eid: &Eid) -> Option<GsId> {
        self.ground_stations
            .iter()
            .enumerate()
            .find_map(|(id, g)| g.as_ref().filter(|g| &g.eid == eid).map(|_| id))
    }

    fn alloc_contact(&mut self, c: Contact) -> ContactId {
        self.contacts.push(c);
        self.contacts.len() - 1
    }

    /// `ROUTER_COMMAND_ADD`: union `contacts`/`endpoints` into the named
    /// GS, creating it first if unknown.
    pub fn add_gs(
        &mut self,
        eid: Eid,
        cla_kind: String,
        address: String,
        trustworthiness: f64,
        endpoints: Vec<Endpoint>,
        contacts: Vec<ContactSpec>,
    ) -> Result<UnionOutcome, PlanError> {
        let gs_id = match self.find_gs_by_eid(&eid) {
            Some(id) => id,
            None => {
                let gs = GroundStation::new(eid, cla_kind, address, trustworthiness);
                self.ground_stations.push(Some(gs));
                self.ground_stations.len() - 1
            },
        };
        {
            let gs = self.gs_mut(gs_id).expect("just inserted or found");
            crate::contact::gs::endpoint_list_union(&mut gs.endpoints, &endpoints);
        }
        let mut gs_contacts = std::mem::take(&mut self.gs_mut(gs_id).unwrap().contacts);
        let outcome = algebra::union_contacts(&mut self.contacts, &mut gs_contacts, gs_id, contacts);
        self.gs_mut(gs_id).unwrap().contacts = gs_contacts;
        let outcome = outcome?;
        self.rebuild_node_table_for_gs(gs_id);
        Ok(outcome)
    }

    /// `ROUTER_COMMAND_UPDATE`: replace the GS's endpoint and contact
    /// lists wholesale. Every previously scheduled bundle on a replaced
    /// contact is returned so the caller can reschedule it (active
    /// contacts are de-associated, not destroyed, per the data model
    /// invariant).
    pub fn update_gs(
        &mut self,
        eid: &Eid,
        cla_kind: String,
        address: String,
        trustworthiness: f64,
        endpoints: Vec<Endpoint>,
        contacts: Vec<ContactSpec>,
    ) -> Result<Vec<u64>, PlanError> {
        let gs_id = self
            .find_gs_by_eid(eid)
            .ok_or_else(|| PlanError::UnknownGs(eid.clone()))?;
        let old_contacts = std::mem::take(&mut self.gs_mut(gs_id).unwrap().contacts);
        let mut displaced = Vec::new();
        for id in old_contacts {
            let still_active = self.contacts[id].active;
            displaced.extend(self.contacts[id].contact_bundles.iter().copied());
            if !still_active {
                self.contacts[id].contact_bundles.clear();
            }
        }
        {
            let gs = self.gs_mut(gs_id).unwrap();
            gs.endpoints = endpoints;
            gs.cla_kind = cla_kind;
            gs.address = address;
            gs.trustworthiness = trustworthiness.clamp(0.0, 1.0);
        }
        let mut gs_contacts = Vec::new();
        algebra::union_contacts(&mut self.contacts, &mut gs_contacts, gs_id, contacts)?;
        self.gs_mut(gs_id).unwrap().contacts = gs_contacts;
        self.rebuild_node_table_for_gs(gs_id);
        Ok(displaced)
    }

    /// `ROUTER_COMMAND_DELETE`: empty `endpoints`/`windows` removes the
    /// whole GS; otherwise only the listed endpoints/contacts are
    /// removed. Returns bundle ids displaced from any removed contact so
    /// the caller can reschedule them.
    pub fn delete_gs(
        &mut self,
        eid: &Eid,
        endpoints: Vec<Eid>,
        windows: Vec<ContactSpec>,
    ) -> Result<Vec<u64>, PlanError> {
        let gs_id = self
            .find_gs_by_eid(eid)
            .ok_or_else(|| PlanError::UnknownGs(eid.clone()))?;

        if endpoints.is_empty() && windows.is_empty() {
            let (absorbed, gs_contacts) = {
                let gs = self.gs_mut(gs_id).unwrap();
                (std::mem::take(&mut gs.endpoints), std::mem::take(&mut gs.contacts))
            };
            let mut displaced = Vec::new();
            let mut still_active = Vec::new();
            for id in gs_contacts {
                if self.contacts[id].active {
                    // Scenario 6: the contact outlives the GS, so it
                    // absorbs the GS's own endpoints before that list is
                    // dropped, keeping it routable until it deactivates.
                    gs::endpoint_list_union(&mut self.contacts[id].endpoints, &absorbed);
                    still_active.push(id);
                } else {
                    displaced.extend(self.contacts[id].contact_bundles.drain(..));
                }
            }
            if still_active.is_empty() {
                self.ground_stations[gs_id] = None;
                self.node_table.retain(|_, entry| {
                    entry.contacts.retain(|(cid, _)| self.contacts[*cid].gs != gs_id);
                    !entry.contacts.is_empty()
                });
            } else {
                // The GS struct is kept alive (de-associated endpoints,
                // no further scheduling) until its last active contact
                // deactivates.
                self.gs_mut(gs_id).unwrap().contacts = still_active;
                self.rebuild_node_table_for_gs(gs_id);
            }
            return Ok(displaced);
        }

        let remove_specs = windows;
        let mut gs_contacts = std::mem::take(&mut self.gs_mut(gs_id).unwrap().contacts);
        let DifferenceOutcome { deleted, modified } =
            algebra::difference_contacts(&self.contacts, &mut gs_contacts, &remove_specs);
        let mut displaced = Vec::new();
        for id in &deleted {
            displaced.extend(self.contacts[*id].contact_bundles.drain(..));
        }
        algebra::apply_difference_endpoint_removal(&mut self.contacts, &remove_specs, &modified);
        self.gs_mut(gs_id).unwrap().contacts = gs_contacts;
        {
            let gs = self.gs_mut(gs_id).unwrap();
            for e in &endpoints {
                gs.endpoints.retain(|ep| &ep.eid != e);
            }
        }
        self.rebuild_node_table_for_gs(gs_id);
        Ok(displaced)
    }

    /// `ROUTER_COMMAND_QUERY`: a read-only diagnostic snapshot.
    pub fn query_gs(&self, eid: &Eid) -> Option<GsSnapshot> {
        let gs_id = self.find_gs_by_eid(eid)?;
        let gs = self.gs(gs_id)?;
        Some(GsSnapshot {
            eid: gs.eid.clone(),
            endpoints: gs.endpoints.clone(),
            contacts: gs.contacts.iter().map(|&id| self.contacts[id].window()).collect(),
        })
    }

    /// Marks the contact inactive, drains its still-queued bundles for
    /// rescheduling, and — if its parent GS was de-associated pending
    /// this deactivation — frees the GS struct now.
    pub fn contact_over(&mut self, contact: ContactId) -> Vec<u64> {
        let gs_id = self.contacts[contact].gs;
        self.contacts[contact].active = false;
        let displaced: Vec<u64> = self.contacts[contact].contact_bundles.drain(..).collect();
        if let Some(gs) = self.gs(gs_id)
            && gs.endpoints.is_empty()
            && gs.contacts.iter().all(|&id| !self.contacts[id].active)
        {
            self.ground_stations[gs_id] = None;
        }
        displaced
    }

    /// Rebuilds the node-table entries reachable through `gs_id`: every
    /// endpoint in the union of the GS's own endpoint list and each of
    /// its contacts' endpoint lists gets an association to that contact,
    /// weighted by the endpoint's own reachability probability.
    fn rebuild_node_table_for_gs(&mut self, gs_id: GsId) {
        self.node_table
            .retain(|_, entry| {
                entry.contacts.retain(|(cid, _)| self.contacts[*cid].gs != gs_id);
                !entry.contacts.is_empty()
            });
        let Some(gs) = self.gs(gs_id) else { return };
        let gs_endpoints = gs.endpoints.clone();
        let contact_ids = gs.contacts.clone();
        for &cid in &contact_ids {
            let contact_endpoints = self.contacts[cid].endpoints.clone();
            for ep in gs_endpoints.iter().chain(contact_endpoints.iter()) {
                let entry = self.node_table.entry(ep.eid.clone()).or_default();
                if !entry.contacts.iter().any(|(id, _)| *id == cid) {
                    entry.contacts.push((cid, ep.probability));
                }
            }
        }
    }

    /// §4.5 step 1-2: candidate `(contact, probability)` pairs for a
    /// destination, ordered by contact `to` ascending. Falls back to the
    /// configured default-gateway GSs (at `default_gateway_reliability`)
    /// when the destination has no direct node-table entry; the
    /// neighbor-bloom-filter step the original also consults between
    /// these two is owned by the external discovery layer.
    pub fn lookup_destination(&self, destination: &Eid) -> Vec<(ContactId, f64)> {
        let mut result: Vec<(ContactId, f64)> = match self.node_table.get(destination) {
            Some(entry) if !entry.contacts.is_empty() => entry.contacts.clone(),
            _ => self
                .default_gateways
                .iter()
                .filter_map(|&gs_id| self.gs(gs_id))
                .flat_map(|gs| gs.contacts.iter().copied())
                .map(|cid| (cid, self.default_gateway_reliability))
                .collect(),
        };
        result.sort_by(|a, b| {
            self.contacts[a.0]
                .to
                .cmp(&self.contacts[b.0].to)
        });
        result
    }
}

/// Diagnostic snapshot returned by a `Query` router command.
#[derive(Debug, Clone, PartialEq)]
pub struct GsSnapshot {
    pub eid: Eid,
    pub endpoints: Vec<Endpoint>,
    pub contacts: Vec<(u64, u64)>,
}

pub fn intern_endpoints(table: &EidTable, pairs: &[(&str, f64)]) -> Vec<Endpoint> {
    pairs
        .iter()
        .map(|(s, p)| Endpoint {
            eid: table.intern(s),
            probability: *p,
        })
        .collect()
}
