// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 3 — plan mutation after commit: a second `Add`
//! to the same contact window cuts its bitrate enough to leave an
//! already-committed bundle's fragment overcommitted, and the router
//! reschedules it rather than leaving it to fail at transmission time.

use upcn_router::{
    bundle::Priority,
    contact::{Endpoint, algebra::ContactSpec},
    eid::EidTable,
    routing::RouterConfig,
    runtime::{BundleMeta, BundleProcessorEvent, RouterCommand, now_secs},
};

use crate::integration_tests::common::{recv_event, spawn_harness};

#[tokio::test]
async fn bitrate_cut_on_committed_contact_reschedules_bundle() {
    let eids = EidTable::new();
    let mut harness = spawn_harness(RouterConfig::default(), 0.1);

    let gs1 = eids.intern("dtn://gs1/");
    let dst = eids.intern("dtn://dst/");
    let now = now_secs();

    // A future window, well past activation, so the commit below can't
    // race the contact manager into dispatching it before the plan is
    // mutated.
    let window = (now + 5, now + 20);

    harness
        .router
        .submit_command(RouterCommand::Add {
            eid: gs1.clone(),
            cla_kind: "tcpcl".into(),
            address: "addr".into(),
            trustworthiness: 1.0,
            endpoints: vec![Endpoint {
                eid: dst.clone(),
                probability: 0.95,
            }],
            contacts: vec![ContactSpec {
                from: window.0,
                to: window.1,
                bitrate: 100,
                endpoints: vec![],
            }],
        })
        .await;

    harness.store.insert(
        1,
        BundleMeta {
            destination: dst,
            size: 1000,
            priority: Priority::Normal,
            expiration: now + 20,
            must_not_fragment: false,
        },
    );
    harness.router.route_bundle(1).await;

    match recv_event(&mut harness.events).await {
        BundleProcessorEvent::Routed { bundle_id, fragments } => {
            assert_eq!(bundle_id, 1);
            assert_eq!(fragments, 1, "1500 bytes of capacity easily holds a 1000-byte bundle whole");
        },
        other => panic!("expected Routed, got {other:?}"),
    }

    // Same window, same ground station: an exact (from, to) match is a
    // merge, not a new contact, and a bitrate this low leaves the
    // already-committed 1000 bytes overcommitted (15 bytes of capacity
    // left against 1000 reserved).
    harness
        .router
        .submit_command(RouterCommand::Add {
            eid: gs1.clone(),
            cla_kind: "tcpcl".into(),
            address: "addr".into(),
            trustworthiness: 1.0,
            endpoints: vec![],
            contacts: vec![ContactSpec {
                from: window.0,
                to: window.1,
                bitrate: 1,
                endpoints: vec![],
            }],
        })
        .await;

    match recv_event(&mut harness.events).await {
        BundleProcessorEvent::RescheduleBundle(bundle_id) => assert_eq!(bundle_id, 1),
        other => panic!("expected RescheduleBundle, got {other:?}"),
    }
}
