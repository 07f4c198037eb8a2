// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 6 — deleting a ground station while one of its
//! contacts is still active keeps that contact alive, de-associated
//! from any endpoint, until it deactivates; only then is the ground
//! station struct actually freed.
//!
//! "Active" is ordinarily flipped by the contact manager's real-time
//! tick loop. This drives the table directly to mark the contact active
//! before the delete, the same way scenario 4 bypasses the clock for
//! expiry — the behavior under test is `delete_gs`/`contact_over`'s
//! data-model contract, not the scheduler that calls them.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use upcn_router::{
    contact::{Endpoint, algebra::ContactSpec},
    eid::EidTable,
    routing::{RouterConfig, RoutingTable},
    runtime::{ContactManager, NullClaFactory, RouterCommand, RouterSignal, RouterTask},
};

#[tokio::test]
async fn active_contact_outlives_whole_gs_delete() {
    let eids = EidTable::new();
    let gs1 = eids.intern("dtn://gs1/");
    let dst = eids.intern("dtn://dst/");

    let mut table = RoutingTable::new(0.1);
    table
        .add_gs(
            gs1.clone(),
            "tcpcl".into(),
            "addr".into(),
            1.0,
            vec![Endpoint {
                eid: dst.clone(),
                probability: 0.9,
            }],
            vec![ContactSpec {
                from: 0,
                to: 100,
                bitrate: 400,
                endpoints: vec![],
            }],
        )
        .unwrap();
    let cid = 0;
    table.contact_mut(cid).unwrap().active = true;

    let routing = Arc::new(Mutex::new(table));
    let (dummy_router_tx, _dummy_router_rx) = mpsc::channel(8);
    let (dummy_contact_events_tx, _dummy_contact_events_rx) = mpsc::channel(8);
    let (_manager, manager_handle) =
        ContactManager::new(routing.clone(), 4, 16, dummy_router_tx, dummy_contact_events_tx, NullClaFactory);

    let (events_tx, _events) = mpsc::channel(8);
    let store = upcn_router::runtime::InMemoryBundleStore::new();
    let (task, handle) = RouterTask::new(routing.clone(), RouterConfig::default(), store, events_tx, manager_handle);
    tokio::spawn(task.run());

    handle
        .submit_command(RouterCommand::Delete {
            eid: gs1.clone(),
            endpoints: vec![],
            windows: vec![],
        })
        .await;

    let (reply, rx) = oneshot::channel();
    handle
        .send(RouterSignal::ProcessRouterCommand(RouterCommand::Query {
            eid: gs1.clone(),
            reply,
        }))
        .await;
    let snapshot = rx.await.unwrap().expect("ground station must survive while its contact is still active");
    assert!(snapshot.endpoints.is_empty(), "a de-associated ground station keeps no endpoints");
    assert_eq!(snapshot.contacts, vec![(0, 100)], "the active contact's window is still listed");

    // The contact deactivates; with no endpoints and no active contacts
    // left, the ground station struct is now actually freed.
    let displaced = routing.lock().await.contact_over(cid);
    assert!(displaced.is_empty());

    let (reply, rx) = oneshot::channel();
    handle
        .send(RouterSignal::ProcessRouterCommand(RouterCommand::Query { eid: gs1, reply }))
        .await;
    assert!(rx.await.unwrap().is_none(), "the ground station must be gone once its last active contact ends");
}
