// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Contact-plan list algebra: union and difference of time-ordered contact
//! lists, ported from the reference `groundStation.c` (`contact_list_union`,
//! `contact_list_difference`, `merge_contacts`, `contacts_overlap`). Operates
//! on arena-owned [`Contact`] values addressed by [`ContactId`] rather than
//! the original's linked-list pointers, per the "cyclic graphs" design note.

use crate::{
    contact::{
        Contact, ContactId,
        gs::{Endpoint, endpoint_list_difference, endpoint_list_union},
    },
    errors::PlanError,
};

/// One incoming contact to be unioned/differenced against a ground
/// station's existing plan. Endpoints are optional: a `Delete` command
/// with no listed endpoints means "remove the whole contact".
#[derive(Debug, Clone)]
pub struct ContactSpec {
    pub from: u64,
    pub to: u64,
    pub bitrate: u64,
    pub endpoints: Vec<Endpoint>,
}

/// Outcome of unioning a batch of [`ContactSpec`]s into a ground station's
/// existing, time-sorted contact id list.
#[derive(Debug, Default)]
pub struct UnionOutcome {
    /// Ids whose bitrate/capacity or endpoint list changed as a result.
    pub modified: Vec<ContactId>,
    /// Newly created ids, appended to the GS's contact list at the right
    /// sorted position.
    pub inserted: Vec<ContactId>,
}

/// Checks a candidate window against every contact in `existing`
/// (typically a single ground station's contact list): true if it
/// overlaps any of them.
pub fn overlaps_any(existing: impl IntoIterator<Item = (u64, u64)>, candidate: (u64, u64)) -> bool {
    existing
        .into_iter()
        .any(|window| Contact::new(0, window.0, window.1, 0).overlaps(candidate))
}

/// Unions `incoming` contacts into a ground station's plan.
///
/// For each incoming contact:
/// - An exact `(from, to)` match merges: endpoint lists are unioned and,
///   if the bitrate differs, capacity is recalculated and the id is
///   recorded as modified (`merge_contacts` in the original).
/// - A same-`from`-different-`to` match is an invalid duplicate and is
///   silently discarded (matches the original's documented behavior,
///   "contacts beginning at the same time are considered invalid").
/// - Anything else that overlaps an existing contact to the *same* GS is
///   rejected outright with [`PlanError::OverlappingContact`] — the
///   original only discards on exact `from` collision; a genuine time
///   overlap at plan-insertion time is caught by
///   `ground_station_prepare_and_verify`, modeled here as an eager check.
/// - A fresh, non-overlapping window is appended and its id returned in
///   `inserted`.
pub fn union_contacts(
    contacts: &mut Vec<Contact>,
    gs_contacts: &mut Vec<ContactId>,
    gs: crate::contact::GsId,
    incoming: Vec<ContactSpec>,
) -> Result<UnionOutcome, PlanError> {
    let mut outcome = UnionOutcome::default();
    'next: for spec in incoming {
        for &id in gs_contacts.iter() {
            let existing = &contacts[id];
            if existing.from == spec.from {
                if existing.to == spec.to {
                    let mut modified = false;
                    endpoint_list_union(&mut contacts[id].endpoints, &spec.endpoints);
                    if contacts[id].bitrate != spec.bitrate {
                        contacts[id].apply_bitrate_change(spec.bitrate);
                        modified = true;
                    }
                    if modified {
                        outcome.modified.push(id);
                    }
                }
                // Same `from`, different `to`: invalid duplicate, discarded.
                continue 'next;
            }
            if existing.overlaps((spec.from, spec.to)) {
                return Err(PlanError::OverlappingContact {
                    from: spec.from,
                    to: spec.to,
                });
            }
        }
        if spec.to <= spec.from {
            return Err(PlanError::DuplicateFromTime(spec.from));
        }
        let mut contact = Contact::new(gs, spec.from, spec.to, spec.bitrate);
        contact.endpoints = spec.endpoints;
        contacts.push(contact);
        let id = contacts.len() - 1;
        let pos = gs_contacts
            .iter()
            .position(|&c| contacts[c].from > spec.from)
            .unwrap_or(gs_contacts.len());
        gs_contacts.insert(pos, id);
        outcome.inserted.push(id);
    }
    Ok(outcome)
}

/// Outcome of differencing a batch of windows out of a ground station's
/// plan.
#[derive(Debug, Default)]
pub struct DifferenceOutcome {
    /// Ids fully removed from the GS's contact list. An *active* contact
    /// is never included here even on an exact match — the caller
    /// de-associates it from the GS but must not free it until it
    /// deactivates (data-model invariant: "a contact with `active = true`
    /// is not freed until deactivated").
    pub deleted: Vec<ContactId>,
    /// Ids whose endpoint list was narrowed rather than removed, because
    /// the incoming spec carried its own endpoint list (a partial
    /// removal, per `endpoint_list_difference` in the original).
    pub modified: Vec<ContactId>,
}

/// Removes `remove` windows from a ground station's contact list.
///
/// A window with no endpoints listed removes the whole contact (unless
/// it is active, in which case it is only de-associated: the id is
/// dropped from `gs_contacts` but is *not* added to `deleted`, leaving
/// the caller free to let it run to completion). A window with endpoints
/// listed narrows the matching contact's endpoint list instead and is
/// reported as modified.
pub fn difference_contacts(
    contacts: &[Contact],
    gs_contacts: &mut Vec<ContactId>,
    remove: &[ContactSpec],
) -> DifferenceOutcome {
    let mut outcome = DifferenceOutcome::default();
    gs_contacts.retain(|&id| {
        let c = &contacts[id];
        let Some(spec) = remove.iter().find(|s| s.from == c.from && s.to == c.to) else {
            return true;
        };
        if spec.endpoints.is_empty() {
            if c.active {
                return false;
            }
            outcome.deleted.push(id);
            false
        } else {
            outcome.modified.push(id);
            true
        }
    });
    outcome
}

/// Applies the endpoint-list narrowing for the `modified` entries
/// returned by [`difference_contacts`]. Split out because it needs
/// mutable access to `contacts` while `difference_contacts` only reads
/// it (to support the `retain` borrow above).
pub fn apply_difference_endpoint_removal(
    contacts: &mut [Contact],
    remove: &[ContactSpec],
    modified: &[ContactId],
) {
    for &id in modified {
        let (from, to) = (contacts[id].from, contacts[id].to);
        if let Some(spec) = remove.iter().find(|s| s.from == from && s.to == to) {
            endpoint_list_difference(&mut contacts[id].endpoints, &spec.endpoints);
        }
    }
}
