// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The router: turns a destination + size + priority into a committed
//! sequence of contacts, fragmenting when no single contact is big
//! enough. Ported from `examples/original_source/components/upcn/src/
//! router.c` (`router_calculate_fragment_route`,
//! `router_get_max_reasonable_fragment_size`, `router_get_first_route_
//! {non,}frag`, `router_add_bundle_to_route`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    bundle::Priority,
    contact::ContactId,
    eid::Eid,
    errors::{PlanError, RoutingError},
    routing::table::RoutingTable,
};

/// Router tunables (`spec.md` §6's "Configuration values" record),
/// validated atomically by [`RouterConfig::validate_and_apply`] exactly
/// as `router_update_config` rejects an out-of-range update wholesale
/// and keeps the prior config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub fragment_min_payload: i64,
    pub min_probability: f64,
    pub min_gs_confidence_opportunistic: f64,
    pub min_gs_confidence_deterministic: f64,
    pub gs_trustworthiness_weight: f64,
    pub gs_reliability_weight: f64,
    pub opt_max_bundles: u32,
    pub opt_max_pre_bundles: u32,
    pub opt_max_pre_bundles_contact: u32,
    pub router_max_contacts: usize,
    /// Upper bound on how many fragments a single bundle may be split
    /// into; `plan_fragment_sizes` gives up once it would need more.
    pub router_max_fragments: usize,
    /// Minimum serialized bytes a first fragment must carry beyond the
    /// primary-block overhead estimate.
    pub first_fragment_min_overhead: i64,
    pub middle_fragment_min_overhead: i64,
    pub last_fragment_min_overhead: i64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fragment_min_payload: 64,
            min_probability: 0.7,
            min_gs_confidence_opportunistic: 0.3,
            min_gs_confidence_deterministic: 0.8,
            gs_trustworthiness_weight: 0.5,
            gs_reliability_weight: 0.5,
            opt_max_bundles: 64,
            opt_max_pre_bundles: 16,
            opt_max_pre_bundles_contact: 4,
            router_max_contacts: 8,
            router_max_fragments: 16,
            first_fragment_min_overhead: 48,
            middle_fragment_min_overhead: 24,
            last_fragment_min_overhead: 24,
        }
    }
}

impl RouterConfig {
    /// `router_update_config`: every rule must hold simultaneously or
    /// `self` is left untouched and the update is rejected.
    pub fn validate_and_apply(&mut self, candidate: RouterConfig) -> Result<(), PlanError> {
        let ok = (0.0..=1.0).contains(&candidate.min_probability)
            && candidate.min_probability > 0.0
            && candidate.min_gs_confidence_deterministic >= candidate.min_gs_confidence_opportunistic
            && (candidate.gs_trustworthiness_weight + candidate.gs_reliability_weight - 1.0).abs() < 1e-9
            && candidate.opt_max_bundles >= 1
            && candidate.opt_max_pre_bundles_contact <= candidate.opt_max_pre_bundles
            && candidate.router_max_contacts >= 1
            && candidate.router_max_fragments >= 1
            && candidate.fragment_min_payload > 0;
        if !ok {
            return Err(PlanError::InvalidConfig(
                "router config rejected: probability bounds, confidence ordering, weight sum, or count bounds violated",
            ));
        }
        *self = candidate;
        Ok(())
    }
}

/// A single fragment, committed to an ordered sequence of contacts.
/// Mirrors `spec.md` §3 "Routed bundle".
#[derive(Debug, Clone)]
pub struct RoutedBundle {
    pub bundle_id: u64,
    pub destination: Eid,
    pub priority: Priority,
    pub size: i64,
    pub expiration: u64,
    pub contacts: Vec<ContactId>,
    pub serialized: u32,
    pub transmitted: u32,
    /// Set when walking the candidate list found contacts that would
    /// have fit this bundle at priority 0 but were already saturated —
    /// a hint that a background optimizer could improve this route by
    /// preempting lower-priority traffic (`spec.md` §4.5 "Preemption
    /// hint"). No consumer is implemented here; see `DESIGN.md` for the
    /// open-question resolution.
    pub preemption_improved: u32,
}

impl RoutedBundle {
    pub fn contact_count(&self) -> u32 {
        self.contacts.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.serialized == self.contact_count()
    }
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub fragments: Vec<RoutedBundle>,
    pub probability: f64,
}

fn contact_confidence(config: &RouterConfig, trustworthiness: f64, node_probability: f64) -> f64 {
    config.gs_trustworthiness_weight * trustworthiness + config.gs_reliability_weight * node_probability
}

struct FragmentPlan {
    contacts: Vec<ContactId>,
    probability: f64,
    preemption_improved: u32,
}

/// `router_calculate_fragment_route`: greedily selects contacts for one
/// fragment of `size` bytes, due by `expiry`, skipping anything in
/// `excluded` or already past its window. `preprocessed_size` is bytes
/// of this same bundle already tentatively placed on earlier fragments'
/// contacts within this routing pass — subtracted uniformly so a
/// contact filled by fragment N naturally falls out of consideration
/// for fragment N+1 before anything is actually committed.
fn calculate_fragment_route(
    table: &RoutingTable,
    config: &RouterConfig,
    destination: &Eid,
    size: i64,
    priority: Priority,
    now: u64,
    expiry: u64,
    mut preprocessed_size: i64,
    excluded: &HashSet<ContactId>,
) -> Result<FragmentPlan, RoutingError> {
    let candidates = table.lookup_destination(destination);
    if candidates.is_empty() {
        return Err(RoutingError::NoRoute);
    }

    let mut selected = Vec::new();
    let mut combined_prob = 0.0_f64;
    let mut preemption_improved = 0u32;

    for (cid, node_prob) in candidates {
        if excluded.contains(&cid) {
            continue;
        }
        let Some(contact) = table.contact(cid) else { continue };
        if contact.to <= now || contact.from > expiry {
            continue;
        }

        // `preprocessed_size` is bytes of this bundle already placed on
        // earlier fragments' contacts, walked off the front of the
        // candidate list one contact's worth at a time — not subtracted
        // flat from every candidate — so a contact fully claimed by an
        // earlier fragment is skipped here and a partially-claimed one
        // offers only what's left.
        let mut cap = contact.remaining_capacity[Priority::Bulk.index()];
        if preprocessed_size != 0 {
            if preprocessed_size >= cap {
                preprocessed_size -= cap;
                continue;
            }
            cap -= preprocessed_size;
        }
        if cap < size {
            if contact.remaining_capacity[priority.index()] - preprocessed_size >= size {
                preemption_improved += 1;
            }
            preprocessed_size = 0;
            continue;
        }
        preprocessed_size = 0;

        let Some(gs) = table.gs(contact.gs) else { continue };
        let confidence = contact_confidence(config, gs.trustworthiness, node_prob);
        if confidence >= config.min_gs_confidence_deterministic {
            return Ok(FragmentPlan {
                contacts: vec![cid],
                probability: confidence,
                preemption_improved,
            });
        }
        if confidence >= config.min_gs_confidence_opportunistic {
            selected.push(cid);
            combined_prob = combined_prob + confidence - combined_prob * confidence;
            if combined_prob >= config.min_probability || selected.len() >= config.router_max_contacts {
                return Ok(FragmentPlan {
                    contacts: selected,
                    probability: combined_prob,
                    preemption_improved,
                });
            }
        }
    }

    if selected.is_empty() {
        Err(RoutingError::NoTimelyContacts)
    } else {
        Ok(FragmentPlan {
            contacts: selected,
            probability: combined_prob,
            preemption_improved,
        })
    }
}

/// Outcome of surveying candidate contacts for a fragmenting route.
struct FragmentCapacitySurvey {
    /// The smallest single qualifying contact's capacity — a fragment
    /// can never be planned larger than this, since `calculate_fragment_
    /// route` only ever seats a fragment on one contact's worth of
    /// capacity at a time.
    max_single_fragment: i64,
    /// Confidence-weighted sum across all qualifying contacts, used only
    /// to reject up front a bundle whose plan could never be seated even
    /// split optimally across every candidate.
    total_weighted_capacity: i64,
}

/// `router_get_max_reasonable_fragment_size`: surveys candidate contacts
/// for `destination` and returns the largest per-fragment size worth
/// planning for (the smallest qualifying contact's capacity, since a
/// fragment is seated on one contact) alongside the confidence-weighted
/// total capacity across all of them (deterministic contacts count
/// fully, opportunistic ones count `confidence * capacity`).
fn survey_fragment_capacity(
    table: &RoutingTable,
    config: &RouterConfig,
    destination: &Eid,
    now: u64,
    expiry: u64,
) -> Option<FragmentCapacitySurvey> {
    let mut max_single_fragment = i64::MAX;
    let mut total_weighted_capacity = 0i64;
    let mut any = false;
    for (cid, node_prob) in table.lookup_destination(destination) {
        let Some(contact) = table.contact(cid) else { continue };
        if contact.to <= now || contact.from > expiry {
            continue;
        }
        let Some(gs) = table.gs(contact.gs) else { continue };
        let confidence = contact_confidence(config, gs.trustworthiness, node_prob);
        let capacity = contact.remaining_capacity[Priority::Bulk.index()].max(0);
        if confidence >= config.min_gs_confidence_deterministic {
            total_weighted_capacity += capacity;
            max_single_fragment = max_single_fragment.min(capacity);
            any = true;
        } else if confidence >= config.min_gs_confidence_opportunistic {
            total_weighted_capacity += (confidence * capacity as f64) as i64;
            max_single_fragment = max_single_fragment.min(capacity);
            any = true;
        }
    }
    any.then_some(FragmentCapacitySurvey {
        max_single_fragment,
        total_weighted_capacity,
    })
}

/// `router_get_max_reasonable_fragment_size`, the single-value form used
/// by callers (tests, diagnostics) that only need the per-fragment
/// ceiling and not the feasibility total.
pub fn max_reasonable_fragment_size(
    table: &RoutingTable,
    config: &RouterConfig,
    destination: &Eid,
    now: u64,
    expiry: u64,
) -> i64 {
    survey_fragment_capacity(table, config, destination, now, expiry)
        .map(|s| s.max_single_fragment)
        .unwrap_or(0)
}

/// Splits `total_payload` bytes into fragment payload sizes, each no
/// larger than `max_fragment_size` minus that position's overhead
/// minimum, and no smaller than `fragment_min_payload` unless it is the
/// only (and therefore also last) fragment.
fn plan_fragment_sizes(
    total_payload: i64,
    max_fragment_size: i64,
    config: &RouterConfig,
) -> Result<Vec<i64>, RoutingError> {
    if total_payload <= 0 {
        return Err(RoutingError::InvalidBundle);
    }
    let mut sizes = Vec::new();
    let mut remaining = total_payload;
    let mut first = true;
    loop {
        let overhead = if first {
            config.first_fragment_min_overhead
        } else if remaining <= max_fragment_size - config.last_fragment_min_overhead {
            config.last_fragment_min_overhead
        } else {
            config.middle_fragment_min_overhead
        };
        let usable = max_fragment_size - overhead;
        if usable < config.fragment_min_payload.min(remaining) {
            return Err(RoutingError::NoTimelyContacts);
        }
        if sizes.len() >= config.router_max_fragments {
            return Err(RoutingError::NoTimelyContacts);
        }
        let take = usable.min(remaining);
        sizes.push(take);
        remaining -= take;
        first = false;
        if remaining <= 0 {
            break;
        }
    }
    Ok(sizes)
}

/// `router_get_first_route_nonfrag` / `_frag`: the full entry point.
/// Fragments only when the bundle doesn't fit the single best route and
/// `allow_fragmentation` is set (the bundle's `must-not-fragment` flag
/// is false).
pub fn find_route(
    table: &RoutingTable,
    config: &RouterConfig,
    bundle_id: u64,
    destination: &Eid,
    size: i64,
    priority: Priority,
    now: u64,
    expiry: u64,
    allow_fragmentation: bool,
) -> Result<RouteOutcome, RoutingError> {
    let excluded = HashSet::new();
    match calculate_fragment_route(table, config, destination, size, priority, now, expiry, 0, &excluded) {
        Ok(plan) => {
            return Ok(RouteOutcome {
                fragments: vec![RoutedBundle {
                    bundle_id,
                    destination: destination.clone(),
                    priority,
                    size,
                    expiration: expiry,
                    contacts: plan.contacts,
                    serialized: 0,
                    transmitted: 0,
                    preemption_improved: plan.preemption_improved,
                }],
                probability: plan.probability,
            });
        },
        Err(RoutingError::NoRoute) => return Err(RoutingError::NoRoute),
        Err(_) if !allow_fragmentation => return Err(RoutingError::NoTimelyContacts),
        Err(_) => {},
    }

    let survey = survey_fragment_capacity(table, config, destination, now, expiry)
        .filter(|s| s.total_weighted_capacity >= size)
        .ok_or(RoutingError::NoTimelyContacts)?;
    let sizes = plan_fragment_sizes(size, survey.max_single_fragment, config)?;

    let mut fragments = Vec::with_capacity(sizes.len());
    let mut probability = 1.0_f64;
    let mut processed = 0i64;
    for fragment_size in sizes {
        let plan = calculate_fragment_route(
            table,
            config,
            destination,
            fragment_size,
            priority,
            now,
            expiry,
            processed,
            &excluded,
        )?;
        probability *= plan.probability;
        fragments.push(RoutedBundle {
            bundle_id,
            destination: destination.clone(),
            priority,
            size: fragment_size,
            expiration: expiry,
            contacts: plan.contacts,
            serialized: 0,
            transmitted: 0,
            preemption_improved: plan.preemption_improved,
        });
        processed += fragment_size;
    }
    Ok(RouteOutcome { fragments, probability })
}

/// `router_add_bundle_to_route`: commits one fragment to every contact
/// in its plan, reserving capacity on each. Rolls back every contact
/// already touched if a later one in the same fragment can't admit the
/// bundle, so the fragment is atomic: all its contacts carry it or none
/// do.
pub fn commit_fragment(table: &mut RoutingTable, fragment: &RoutedBundle) -> Result<(), RoutingError> {
    let mut committed = Vec::new();
    for &cid in &fragment.contacts {
        let Some(contact) = table.contact_mut(cid) else {
            rollback(table, &committed, fragment);
            return Err(RoutingError::NoMemory);
        };
        if !contact.try_reserve(fragment.size, fragment.priority) {
            rollback(table, &committed, fragment);
            return Err(RoutingError::NoMemory);
        }
        contact.contact_bundles.push_back(fragment.bundle_id);
        committed.push(cid);
    }
    Ok(())
}

fn rollback(table: &mut RoutingTable, committed: &[ContactId], fragment: &RoutedBundle) {
    for &cid in committed {
        if let Some(contact) = table.contact_mut(cid) {
            contact.release(fragment.size, fragment.priority);
            if let Some(pos) = contact.contact_bundles.iter().rposition(|&id| id == fragment.bundle_id) {
                contact.contact_bundles.remove(pos);
            }
        }
    }
}

/// `router_remove_bundle_from_route`: reverses [`commit_fragment`],
/// used when a contact ends or a plan mutation displaces a bundle
/// before it transmits.
pub fn uncommit_fragment(table: &mut RoutingTable, fragment: &RoutedBundle) {
    rollback(table, &fragment.contacts, fragment);
}
