// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The contact manager: activates scheduled contacts, drains routed
//! bundles into per-contact transmission queues, and notices when
//! contacts expire. Ported from `examples/original_source/components/
//! upcn/src/contactManager.c` (`remove_expired_contacts`,
//! `process_upcoming_list`/`check_upcoming`, `hand_over_contact_bundles`,
//! `check_for_contacts`, `manage_contacts`, `contact_manager_task`).
//!
//! The original's `contact_manager_task` loop is a single FreeRTOS task
//! blocked on a queue-with-timeout; here it is a Tokio task blocked on
//! `tokio::select!` between a deadline sleep and its control channel.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{Mutex, mpsc};

use crate::{
    contact::ContactId,
    runtime::{
        cla::{Cla, ClaFactory, ClaHandle},
        now_secs,
        signal::{ContactEvent, ContactManagerSignal, RouterSignal},
    },
    routing::RoutingTable,
};

/// Upper bound on how long a tick ever sleeps when nothing is scheduled,
/// so the loop still wakes occasionally even with an empty contact plan.
const MAX_SLEEP_SECS: u64 = 3600;

struct ActiveContact {
    dispatch_tx: mpsc::Sender<u64>,
}

/// A cloneable front end other tasks use to wake the contact manager.
#[derive(Clone)]
pub struct ContactManagerHandle {
    pub(crate) control_tx: mpsc::Sender<ContactManagerSignal>,
}

impl ContactManagerHandle {
    pub async fn notify(&self, signal: ContactManagerSignal) {
        let _ = self.control_tx.send(signal).await;
    }
}

pub struct ContactManager<F: ClaFactory> {
    routing: Arc<Mutex<RoutingTable>>,
    cla_channels: usize,
    contact_tx_task_queue_length: usize,
    active: HashMap<ContactId, ActiveContact>,
    control_rx: mpsc::Receiver<ContactManagerSignal>,
    router_tx: mpsc::Sender<RouterSignal>,
    events_tx: mpsc::Sender<ContactEvent>,
    cla_factory: F,
}

impl<F: ClaFactory> ContactManager<F> {
    pub fn new(
        routing: Arc<Mutex<RoutingTable>>,
        cla_channels: usize,
        contact_tx_task_queue_length: usize,
        router_tx: mpsc::Sender<RouterSignal>,
        events_tx: mpsc::Sender<ContactEvent>,
        cla_factory: F,
    ) -> (Self, ContactManagerHandle) {
        let (control_tx, control_rx) = mpsc::channel(64);
        let manager = Self {
            routing,
            cla_channels,
            contact_tx_task_queue_length,
            active: HashMap::new(),
            control_rx,
            router_tx,
            events_tx,
            cla_factory,
        };
        (manager, ContactManagerHandle { control_tx })
    }

    /// Runs the tick/sleep loop until every [`ContactManagerHandle`] is
    /// dropped and the control channel closes.
    pub async fn run(mut self) {
        loop {
            let now = now_secs();
            let deadline = self.tick(now).await;
            let sleep = match deadline {
                Some(d) if d > now => Duration::from_secs(d - now),
                Some(_) => Duration::from_secs(0),
                None => Duration::from_secs(MAX_SLEEP_SECS),
            };
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {},
                signal = self.control_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                },
            }
        }
    }

    /// One expire/activate/dispatch pass; returns the next wakeup
    /// deadline in wall-clock seconds, if any contact bounds it.
    async fn tick(&mut self, now: u64) -> Option<u64> {
        let mut table = self.routing.lock().await;

        self.expire(&mut table, now).await;
        self.activate(&mut table, now).await;
        self.dispatch(&mut table);

        next_deadline(&table, now, &self.active.keys().copied().collect())
    }

    async fn expire(&mut self, table: &mut RoutingTable, now: u64) {
        let expired: Vec<ContactId> = self
            .active
            .keys()
            .copied()
            .filter(|&cid| table.contact(cid).is_none_or(|c| c.to <= now))
            .collect();
        for cid in expired {
            let gs_eid = table.contact(cid).and_then(|c| table.gs(c.gs)).map(|gs| gs.eid.clone());
            let displaced = table.contact_over(cid);
            self.active.remove(&cid);
            if let Some(gs) = gs_eid {
                let _ = self.events_tx.send(ContactEvent::Ended { gs }).await;
            }
            let _ = self
                .router_tx
                .send(RouterSignal::ContactOver { contact: cid, displaced })
                .await;
        }
    }

    async fn activate(&mut self, table: &mut RoutingTable, now: u64) {
        let free_slots = self.cla_channels.saturating_sub(self.active.len());
        if free_slots == 0 {
            return;
        }
        let mut candidates: Vec<ContactId> = table
            .contacts
            .iter()
            .enumerate()
            .filter(|&(id, c)| {
                c.from <= now && now < c.to && !self.active.contains_key(&id) && table.gs(c.gs).is_some()
            })
            .map(|(id, _)| id)
            .collect();
        candidates.sort_by_key(|&cid| table.contacts[cid].from);

        for cid in candidates.into_iter().take(free_slots) {
            let Some(contact) = table.contact(cid) else { continue };
            let Some(gs) = table.gs(contact.gs) else { continue };
            let cla = self.cla_factory.open(gs);
            let gs_eid = gs.eid.clone();

            let (dispatch_tx, dispatch_rx) = mpsc::channel(self.contact_tx_task_queue_length);
            self.active.insert(cid, ActiveContact { dispatch_tx });
            if let Some(contact) = table.contact_mut(cid) {
                contact.active = true;
            }
            tokio::spawn(run_tx_task(cla, dispatch_rx, self.router_tx.clone()));
            let _ = self.events_tx.send(ContactEvent::Started { gs: gs_eid }).await;
        }
    }

    /// Moves every active contact's `contact_bundles` FIFO onto its TX
    /// queue, one command per bundle. If the queue is momentarily full
    /// the bundle is left at the front of the FIFO for the next tick
    /// rather than dropped, matching the "never in none and never in
    /// more than one" invariant.
    fn dispatch(&mut self, table: &mut RoutingTable) {
        for (&cid, active) in &self.active {
            let Some(contact) = table.contact_mut(cid) else { continue };
            while let Some(bundle_id) = contact.contact_bundles.pop_front() {
                if active.dispatch_tx.try_send(bundle_id).is_err() {
                    contact.contact_bundles.push_front(bundle_id);
                    break;
                }
            }
        }
    }
}

async fn run_tx_task(cla: ClaHandle, mut rx: mpsc::Receiver<u64>, router_tx: mpsc::Sender<RouterSignal>) {
    while let Some(bundle_id) = rx.recv().await {
        let signal = match cla.send_frame(bundle_id).await {
            Ok(()) => RouterSignal::TransmissionSuccess(bundle_id),
            Err(error) => {
                tracing::warn!(bundle_id, %error, "CLA transmission failed");
                RouterSignal::TransmissionFailure(bundle_id)
            },
        };
        if router_tx.send(signal).await.is_err() {
            break;
        }
    }
}

fn next_deadline(table: &RoutingTable, now: u64, active: &HashSet<ContactId>) -> Option<u64> {
    let earliest_active_to = active.iter().filter_map(|&id| table.contact(id)).map(|c| c.to).min();
    let earliest_future_from = table
        .contacts
        .iter()
        .enumerate()
        .filter(|&(id, c)| c.from > now && !active.contains(&id) && table.gs(c.gs).is_some())
        .map(|(_, c)| c.from)
        .min();
    [earliest_active_to, earliest_future_from].into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{contact::algebra::ContactSpec, eid::EidTable, runtime::cla::NullClaFactory};

    fn setup(now: u64) -> (Arc<Mutex<RoutingTable>>, crate::eid::Eid) {
        let eids = EidTable::new();
        let mut table = RoutingTable::new(0.1);
        let gs1 = eids.intern("dtn://gs1/");
        table
            .add_gs(
                gs1.clone(),
                "tcpcl".into(),
                "127.0.0.1:4556".into(),
                1.0,
                vec![],
                vec![ContactSpec {
                    from: now,
                    to: now + 5,
                    bitrate: 100,
                    endpoints: vec![],
                }],
            )
            .unwrap();
        (Arc::new(Mutex::new(table)), gs1)
    }

    #[tokio::test]
    async fn activation_opens_slot_and_emits_started_event() {
        let (routing, _gs1) = setup(1000);
        let (router_tx, mut router_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (mut manager, _handle) =
            ContactManager::new(routing.clone(), 4, 16, router_tx, events_tx, NullClaFactory);

        let deadline = manager.tick(1000).await;
        assert_eq!(manager.active.len(), 1);
        assert_eq!(deadline, Some(1005));
        assert!(matches!(events_rx.recv().await, Some(ContactEvent::Started { .. })));
        assert!(router_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn expiry_drains_fifo_and_notifies_router() {
        let (routing, gs1) = setup(1000);
        {
            let mut table = routing.lock().await;
            let gs_id = table.find_gs_by_eid(&gs1).unwrap();
            let cid = table.gs(gs_id).unwrap().contacts[0];
            table.contact_mut(cid).unwrap().contact_bundles.push_back(42);
        }
        let (router_tx, mut router_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (mut manager, _handle) =
            ContactManager::new(routing.clone(), 4, 16, router_tx, events_tx, NullClaFactory);

        manager.tick(1000).await;
        assert_eq!(manager.active.len(), 1);
        assert!(events_rx.try_recv().is_ok());

        manager.tick(1006).await;
        assert!(manager.active.is_empty());
        let signal = router_rx.recv().await.unwrap();
        match signal {
            RouterSignal::ContactOver { displaced, .. } => assert_eq!(displaced, vec![42]),
            other => panic!("unexpected signal: {other:?}"),
        }
        assert!(matches!(events_rx.recv().await, Some(ContactEvent::Ended { .. })));
    }

    #[tokio::test]
    async fn dispatch_moves_fifo_into_tx_queue_and_transmits() {
        let (routing, gs1) = setup(1000);
        let (router_tx, mut router_rx) = mpsc::channel(8);
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (mut manager, _handle) =
            ContactManager::new(routing.clone(), 4, 16, router_tx, events_tx, NullClaFactory);
        manager.tick(1000).await;

        {
            let mut table = routing.lock().await;
            let gs_id = table.find_gs_by_eid(&gs1).unwrap();
            let cid = table.gs(gs_id).unwrap().contacts[0];
            table.contact_mut(cid).unwrap().contact_bundles.push_back(7);
        }
        manager.tick(1001).await;

        let signal = router_rx.recv().await.unwrap();
        assert!(matches!(signal, RouterSignal::TransmissionSuccess(7)));
    }
}
