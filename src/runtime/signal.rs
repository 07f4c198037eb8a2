// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Signal and command types exchanged between the router task, the
//! contact manager, and the external callers/collaborators named in
//! `spec.md` §6.

use tokio::sync::oneshot;

use crate::{
    contact::{ContactId, Endpoint, algebra::ContactSpec},
    eid::Eid,
    errors::{PlanError, StatusReportReason},
    routing::{GsSnapshot, RouterConfig},
};

/// The router-command surface (`spec.md` §6, opcodes `0x31..0x34`). The
/// text/JSON wire decoder that produces these from a byte stream is a
/// Non-goal; callers (the demonstration binary, tests, a future wire
/// parser) construct these directly.
#[derive(Debug)]
pub enum RouterCommand {
    /// Union with existing data, creating the ground station if unknown.
    Add {
        eid: Eid,
        cla_kind: String,
        address: String,
        trustworthiness: f64,
        endpoints: Vec<Endpoint>,
        contacts: Vec<ContactSpec>,
    },
    /// Replace the ground station wholesale; bundles on any contact this
    /// displaces are rescheduled.
    Update {
        eid: Eid,
        cla_kind: String,
        address: String,
        trustworthiness: f64,
        endpoints: Vec<Endpoint>,
        contacts: Vec<ContactSpec>,
    },
    /// Empty `endpoints`/`windows` removes the whole ground station;
    /// otherwise only the listed endpoints/contacts are removed. A
    /// window entry with its own non-empty endpoint list narrows that
    /// contact instead of removing it outright (`ContactSpec.bitrate` is
    /// ignored for deletes).
    Delete {
        eid: Eid,
        endpoints: Vec<Eid>,
        windows: Vec<ContactSpec>,
    },
    /// A read-only diagnostic snapshot, delivered on `reply`.
    Query { eid: Eid, reply: oneshot::Sender<Option<GsSnapshot>> },
}

/// Wakeups the router task posts to the contact manager. Per `spec.md`
/// §4.6, a bare wakeup with no payload is also valid and is handled by
/// the contact manager's event loop running one more tick regardless of
/// which signal (or none) arrived — so this enum only needs to exist to
/// distinguish "why we woke" for diagnostics, not to drive behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactManagerSignal {
    /// The contact plan was edited by a router command.
    ContactsUpdated,
    /// A bundle was committed to a currently active contact.
    BundleScheduled,
    /// No reason in particular — e.g. the discovery layer requesting a
    /// beacon-send opportunity.
    Wake,
}

/// The router task's single inbound signal queue (`spec.md` §4.7).
#[derive(Debug)]
pub enum RouterSignal {
    ProcessRouterCommand(RouterCommand),
    /// Fetch the bundle from the store, run `find_route`, commit its
    /// fragments, and notify the bundle processor of the outcome.
    RouteBundle(u64),
    /// Opaque beacon bytes, forwarded to the discovery layer (external;
    /// not reimplemented here).
    ProcessBeacon(Vec<u8>),
    /// A contact ended. The contact manager already finalized the
    /// routing-table side (it holds the same lock during its tick) and
    /// hands over the bundle ids displaced from the contact's FIFO so
    /// the router task can notify the bundle processor they need
    /// rerouting.
    ContactOver { contact: ContactId, displaced: Vec<u64> },
    TransmissionSuccess(u64),
    TransmissionFailure(u64),
    WithdrawStation(Eid),
    /// A background optimizer could not re-seat a preempted bundle;
    /// terminate it with failure. No optimizer is implemented in this
    /// crate (`spec.md` §9 Open Question ii) — the signal exists so the
    /// router task's handling of it is complete and testable.
    OptimizationDrop(u64),
    /// Hot-swap the router configuration; rejected atomically (old
    /// config retained) on validation failure, mirroring
    /// `RouterConfig::validate_and_apply`.
    UpdateConfig(RouterConfig, oneshot::Sender<Result<(), PlanError>>),
}

/// Outgoing events the router task emits for the bundle processor
/// (external; owns the store and administrative-record generation).
#[derive(Debug, Clone, PartialEq)]
pub enum BundleProcessorEvent {
    Routed { bundle_id: u64, fragments: usize },
    RouteFailed { bundle_id: u64, reason: StatusReportReason },
    RescheduleBundle(u64),
    TransmissionOutcome { bundle_id: u64, delivered: bool, reason: StatusReportReason },
}

/// Contact start/end notification (`spec.md` §6, "Contact events
/// (outgoing)"). [`Self::encode`] produces the exact wire layout the
/// spec describes for a `COMM_TYPE_CONTACT_STATE` message; actually
/// sending it over a socket is the CLA's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    Started { gs: Eid },
    Ended { gs: Eid },
}

impl ContactEvent {
    /// `0x00`/`0x01` flag followed by the NUL-terminated ground station
    /// EID.
    pub fn encode(&self) -> Vec<u8> {
        let (flag, gs) = match self {
            ContactEvent::Ended { gs } => (0x00u8, gs),
            ContactEvent::Started { gs } => (0x01u8, gs),
        };
        let mut out = Vec::with_capacity(1 + gs.as_str().len() + 1);
        out.push(flag);
        out.extend_from_slice(gs.as_str().as_bytes());
        out.push(0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_event_encodes_flag_and_nul_terminated_eid() {
        let table = crate::eid::EidTable::new();
        let gs = table.intern("dtn://gs1/");
        let started = ContactEvent::Started { gs: gs.clone() }.encode();
        assert_eq!(started[0], 0x01);
        assert_eq!(&started[1..], b"dtn://gs1/\0");

        let ended = ContactEvent::Ended { gs }.encode();
        assert_eq!(ended[0], 0x00);
    }
}
