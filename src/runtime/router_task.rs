// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The router task: the single consumer of the router signal queue.
//! Ported from `examples/original_source/components/upcn/src/
//! routerTask.c` (`process_signal`, `process_router_command`,
//! `get_reason`).

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tokio::sync::{Mutex, mpsc, oneshot};

use crate::{
    contact::ContactId,
    errors::RoutingError,
    routing::{RouterConfig, RoutedBundle, RoutingTable, commit_fragment, find_route, uncommit_fragment},
    runtime::{
        cla::ClaFactory,
        contact_manager::ContactManagerHandle,
        now_secs,
        signal::{BundleProcessorEvent, ContactManagerSignal, RouterCommand, RouterSignal},
        store::BundleStore,
    },
};

/// A cloneable front end other tasks and the demonstration binary use to
/// submit work to the router task.
#[derive(Clone)]
pub struct RouterTaskHandle {
    signal_tx: mpsc::Sender<RouterSignal>,
}

impl RouterTaskHandle {
    pub async fn send(&self, signal: RouterSignal) {
        let _ = self.signal_tx.send(signal).await;
    }

    pub async fn route_bundle(&self, bundle_id: u64) {
        self.send(RouterSignal::RouteBundle(bundle_id)).await;
    }

    pub async fn submit_command(&self, command: RouterCommand) {
        self.send(RouterSignal::ProcessRouterCommand(command)).await;
    }

    /// Hot-swaps the router config; rejected atomically on validation
    /// failure. Returns an error if the router task has shut down.
    pub async fn update_config(&self, config: RouterConfig) -> Result<Result<(), crate::errors::PlanError>, ()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RouterSignal::UpdateConfig(config, reply_tx)).await;
        reply_rx.await.map_err(|_| ())
    }
}

/// Every fragment of a given bundle id still awaiting transmission
/// completion, in the order `find_route` produced them. `spec.md` §4.7
/// identifies `Transmission{Success,Failure}` signals only by a `(rb)`
/// handle; since `router.rs`'s fragmentation reuses the same
/// `bundle_id` across all of one bundle's fragments (each fragment is
/// not a separately-identified store entry here), transmission outcomes
/// are attributed to the oldest not-yet-complete fragment for that id —
/// see `DESIGN.md` for the reasoning.
type Pending = HashMap<u64, VecDeque<RoutedBundle>>;

pub struct RouterTask<S: BundleStore> {
    routing: Arc<Mutex<RoutingTable>>,
    config: RouterConfig,
    store: S,
    pending: Pending,
    events: mpsc::Sender<BundleProcessorEvent>,
    contact_manager: ContactManagerHandle,
    signals: mpsc::Receiver<RouterSignal>,
}

impl<S: BundleStore> RouterTask<S> {
    pub fn new(
        routing: Arc<Mutex<RoutingTable>>,
        config: RouterConfig,
        store: S,
        events: mpsc::Sender<BundleProcessorEvent>,
        contact_manager: ContactManagerHandle,
    ) -> (Self, RouterTaskHandle) {
        let (signal_tx, signals) = mpsc::channel(256);
        let task = Self {
            routing,
            config,
            store,
            pending: HashMap::new(),
            events,
            contact_manager,
            signals,
        };
        (task, RouterTaskHandle { signal_tx })
    }

    pub async fn run(mut self) {
        while let Some(signal) = self.signals.recv().await {
            self.process_signal(signal).await;
        }
    }

    async fn process_signal(&mut self, signal: RouterSignal) {
        match signal {
            RouterSignal::ProcessRouterCommand(command) => {
                self.process_router_command(command).await;
                self.contact_manager.notify(ContactManagerSignal::ContactsUpdated).await;
            },
            RouterSignal::RouteBundle(id) => {
                self.route_bundle(id).await;
            },
            RouterSignal::ProcessBeacon(_bytes) => {
                tracing::debug!("beacon forwarding to discovery is not implemented in this crate");
            },
            RouterSignal::ContactOver { contact, displaced } => {
                self.contact_over(contact, displaced).await;
            },
            RouterSignal::TransmissionSuccess(id) => {
                self.transmission_result(id, true).await;
            },
            RouterSignal::TransmissionFailure(id) => {
                self.transmission_result(id, false).await;
            },
            RouterSignal::WithdrawStation(eid) => {
                self.withdraw_station(eid).await;
            },
            RouterSignal::OptimizationDrop(id) => {
                self.pending.remove(&id);
                let _ = self
                    .events
                    .send(BundleProcessorEvent::TransmissionOutcome {
                        bundle_id: id,
                        delivered: false,
                        reason: RoutingError::NoMemory.status_report_reason(),
                    })
                    .await;
            },
            RouterSignal::UpdateConfig(candidate, reply) => {
                let result = self.config.validate_and_apply(candidate);
                let _ = reply.send(result);
            },
        }
    }

    async fn process_router_command(&mut self, command: RouterCommand) {
        let mut table = self.routing.lock().await;
        match command {
            RouterCommand::Add {
                eid,
                cla_kind,
                address,
                trustworthiness,
                endpoints,
                contacts,
            } => match table.add_gs(eid, cla_kind, address, trustworthiness, endpoints, contacts) {
                Ok(outcome) => {
                    // A merge that cuts a contact's bitrate can leave its
                    // remaining capacity negative. Anything still queued on
                    // it is no longer guaranteed to fit, so it is handed
                    // back for rerouting rather than left to fail at
                    // transmission time.
                    let mut displaced = Vec::new();
                    for cid in outcome.modified {
                        if let Some(contact) = table.contact_mut(cid)
                            && contact.remaining_capacity[0] < 0
                        {
                            displaced.extend(contact.contact_bundles.drain(..));
                        }
                    }
                    drop(table);
                    if !displaced.is_empty() {
                        self.reschedule(displaced).await;
                    }
                },
                Err(error) => tracing::warn!(%error, "router command Add rejected"),
            },
            RouterCommand::Update {
                eid,
                cla_kind,
                address,
                trustworthiness,
                endpoints,
                contacts,
            } => match table.update_gs(&eid, cla_kind, address, trustworthiness, endpoints, contacts) {
                Ok(displaced) => {
                    drop(table);
                    self.reschedule(displaced).await;
                },
                Err(error) => tracing::warn!(%error, "router command Update rejected"),
            },
            RouterCommand::Delete { eid, endpoints, windows } => match table.delete_gs(&eid, endpoints, windows) {
                Ok(displaced) => {
                    drop(table);
                    self.reschedule(displaced).await;
                },
                Err(error) => tracing::warn!(%error, "router command Delete rejected"),
            },
            RouterCommand::Query { eid, reply } => {
                let _ = reply.send(table.query_gs(&eid));
            },
        }
    }

    async fn route_bundle(&mut self, bundle_id: u64) {
        let Some(meta) = self.store.lookup(bundle_id) else {
            tracing::warn!(bundle_id, "RouteBundle signal for unknown bundle id");
            return;
        };
        let now = now_secs();
        let mut table = self.routing.lock().await;
        let outcome = find_route(
            &table,
            &self.config,
            bundle_id,
            &meta.destination,
            meta.size,
            meta.priority,
            now,
            meta.expiration,
            !meta.must_not_fragment,
        );
        match outcome {
            Ok(route) => {
                let mut committed = Vec::with_capacity(route.fragments.len());
                for fragment in &route.fragments {
                    if let Err(error) = commit_fragment(&mut table, fragment) {
                        for done in &committed {
                            uncommit_fragment(&mut table, done);
                        }
                        drop(table);
                        tracing::warn!(bundle_id, %error, "fragment commit failed, rolling back route");
                        let _ = self
                            .events
                            .send(BundleProcessorEvent::RouteFailed {
                                bundle_id,
                                reason: error.status_report_reason(),
                            })
                            .await;
                        return;
                    }
                    committed.push(fragment.clone());
                }
                drop(table);
                let fragment_count = committed.len();
                self.pending.entry(bundle_id).or_default().extend(committed);
                self.contact_manager.notify(ContactManagerSignal::BundleScheduled).await;
                let _ = self
                    .events
                    .send(BundleProcessorEvent::Routed { bundle_id, fragments: fragment_count })
                    .await;
            },
            Err(error) => {
                tracing::warn!(bundle_id, %error, "routing failed");
                let _ = self
                    .events
                    .send(BundleProcessorEvent::RouteFailed {
                        bundle_id,
                        reason: error.status_report_reason(),
                    })
                    .await;
            },
        }
    }

    async fn contact_over(&mut self, _contact: ContactId, displaced: Vec<u64>) {
        for bundle_id in &displaced {
            self.pending.remove(bundle_id);
        }
        self.reschedule(displaced).await;
    }

    async fn transmission_result(&mut self, bundle_id: u64, success: bool) {
        let Some(queue) = self.pending.get_mut(&bundle_id) else {
            tracing::warn!(bundle_id, "transmission result for bundle with no pending fragment");
            return;
        };
        let Some(fragment) = queue.front_mut() else {
            return;
        };
        fragment.serialized += 1;
        if success {
            fragment.transmitted += 1;
        }
        if fragment.is_complete() {
            let delivered = fragment.transmitted > 0;
            let completed = queue.pop_front();
            if queue.is_empty() {
                self.pending.remove(&bundle_id);
            }
            if let Some(completed) = completed {
                let reason = if delivered {
                    crate::errors::StatusReportReason::NoInfo
                } else {
                    RoutingError::NoMemory.status_report_reason()
                };
                let _ = self
                    .events
                    .send(BundleProcessorEvent::TransmissionOutcome {
                        bundle_id: completed.bundle_id,
                        delivered,
                        reason,
                    })
                    .await;
            }
        }
    }

    async fn withdraw_station(&mut self, eid: crate::eid::Eid) {
        let mut table = self.routing.lock().await;
        match table.delete_gs(&eid, vec![], vec![]) {
            Ok(displaced) => {
                drop(table);
                self.reschedule(displaced).await;
            },
            Err(error) => tracing::warn!(%error, "withdraw station failed"),
        }
    }

    async fn reschedule(&mut self, displaced: Vec<u64>) {
        for bundle_id in displaced {
            self.pending.remove(&bundle_id);
            let _ = self.events.send(BundleProcessorEvent::RescheduleBundle(bundle_id)).await;
        }
    }
}

/// Convenience constructor used by the demonstration binary: wires a
/// fresh [`RoutingTable`] behind a shared mutex and starts both the
/// router task and a contact manager sharing it.
pub fn spawn_pipeline<S, F>(
    config: RouterConfig,
    default_gateway_reliability: f64,
    store: S,
    cla_channels: usize,
    contact_tx_task_queue_length: usize,
    cla_factory: F,
) -> (
    RouterTaskHandle,
    ContactManagerHandle,
    mpsc::Receiver<BundleProcessorEvent>,
    mpsc::Receiver<crate::runtime::ContactEvent>,
)
where
    S: BundleStore + 'static,
    F: ClaFactory,
{
    let routing = Arc::new(Mutex::new(RoutingTable::new(default_gateway_reliability)));
    let (events_tx, events_rx) = mpsc::channel(256);
    let (contact_events_tx, contact_events_rx) = mpsc::channel(256);

    let (router_signal_tx, router_signal_rx) = mpsc::channel(256);
    let router_handle = RouterTaskHandle {
        signal_tx: router_signal_tx,
    };

    let (manager, manager_handle) = crate::runtime::contact_manager::ContactManager::new(
        routing.clone(),
        cla_channels,
        contact_tx_task_queue_length,
        router_handle.signal_tx.clone(),
        contact_events_tx,
        cla_factory,
    );

    let router_task = RouterTask {
        routing,
        config,
        store,
        pending: HashMap::new(),
        events: events_tx,
        contact_manager: manager_handle.clone(),
        signals: router_signal_rx,
    };

    tokio::spawn(router_task.run());
    tokio::spawn(manager.run());

    (router_handle, manager_handle, events_rx, contact_events_rx)
}
