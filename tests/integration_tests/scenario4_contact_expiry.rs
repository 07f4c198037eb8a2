// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 4 — contact expiry before transmission: a
//! contact ends while a bundle is still queued on it, and the router
//! reschedules the bundle instead of losing it.
//!
//! The real contact manager dispatches a bundle to its CLA connection
//! within one tick of a contact activating, which makes "still queued
//! when it expires" effectively unobservable over real wall-clock time
//! through the full pipeline. This drives the router task directly and
//! feeds it the same `ContactOver` signal the contact manager sends
//! once it drains a contact's remaining FIFO, exercising exactly the
//! handoff `spec.md` §4.7 describes without racing a live clock.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use upcn_router::{
    bundle::Priority,
    contact::{Endpoint, algebra::ContactSpec},
    eid::EidTable,
    routing::{RouterConfig, RoutingTable},
    runtime::{
        BundleMeta, BundleProcessorEvent, ContactManager, InMemoryBundleStore, NullClaFactory, RouterSignal,
        RouterTask,
    },
};

use crate::integration_tests::common::recv_event;

#[tokio::test]
async fn contact_expiry_with_bundle_still_queued_reschedules_it() {
    let eids = EidTable::new();
    let gs1 = eids.intern("dtn://gs1/");
    let dst = eids.intern("dtn://dst/");

    let mut table = RoutingTable::new(0.1);
    table
        .add_gs(
            gs1,
            "tcpcl".into(),
            "addr".into(),
            1.0,
            vec![Endpoint {
                eid: dst.clone(),
                probability: 0.95,
            }],
            vec![ContactSpec {
                from: 0,
                to: 100,
                bitrate: 400,
                endpoints: vec![],
            }],
        )
        .unwrap();
    // A freshly built table's first contact is always id 0.
    let cid = 0;

    let routing = Arc::new(Mutex::new(table));
    let store = InMemoryBundleStore::new();
    store.insert(
        1,
        BundleMeta {
            destination: dst,
            size: 500,
            priority: Priority::Normal,
            expiration: 100,
            must_not_fragment: false,
        },
    );

    // A manager that is never ticked, just here to hand `RouterTask` a
    // legitimately constructed handle to notify.
    let (dummy_router_tx, _dummy_router_rx) = mpsc::channel(8);
    let (dummy_contact_events_tx, _dummy_contact_events_rx) = mpsc::channel(8);
    let (_manager, manager_handle) =
        ContactManager::new(routing.clone(), 4, 16, dummy_router_tx, dummy_contact_events_tx, NullClaFactory);

    let (events_tx, mut events) = mpsc::channel(8);
    let (task, handle) = RouterTask::new(routing.clone(), RouterConfig::default(), store, events_tx, manager_handle);
    tokio::spawn(task.run());

    handle.route_bundle(1).await;
    match recv_event(&mut events).await {
        BundleProcessorEvent::Routed { bundle_id, fragments } => {
            assert_eq!(bundle_id, 1);
            assert_eq!(fragments, 1);
        },
        other => panic!("expected Routed, got {other:?}"),
    }

    // The contact ends with the fragment still sitting in its FIFO,
    // exactly as `ContactManager::expire` would discover it.
    let displaced = routing.lock().await.contact_over(cid);
    assert_eq!(displaced, vec![1]);

    handle
        .send(RouterSignal::ContactOver {
            contact: cid,
            displaced,
        })
        .await;

    match recv_event(&mut events).await {
        BundleProcessorEvent::RescheduleBundle(bundle_id) => assert_eq!(bundle_id, 1),
        other => panic!("expected RescheduleBundle, got {other:?}"),
    }
}
