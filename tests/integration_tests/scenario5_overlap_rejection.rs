// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 5 — overlap rejection: adding a contact window
//! that overlaps an existing one on the same ground station is rejected
//! wholesale, and the plan is left exactly as it was.

use tokio::sync::oneshot;
use upcn_router::{
    contact::{Endpoint, algebra::ContactSpec},
    eid::{Eid, EidTable},
    routing::GsSnapshot,
    routing::RouterConfig,
    runtime::{RouterCommand, RouterSignal, now_secs},
};

use crate::integration_tests::common::spawn_harness;

async fn query(router: &upcn_router::runtime::RouterTaskHandle, eid: Eid) -> Option<GsSnapshot> {
    let (reply, rx) = oneshot::channel();
    router.send(RouterSignal::ProcessRouterCommand(RouterCommand::Query { eid, reply })).await;
    rx.await.expect("router task dropped the query reply channel")
}

#[tokio::test]
async fn overlapping_contact_window_is_rejected_and_plan_is_unchanged() {
    let eids = EidTable::new();
    let mut harness = spawn_harness(RouterConfig::default(), 0.1);

    let gs1 = eids.intern("dtn://gs1/");
    let dst = eids.intern("dtn://dst/");
    let now = now_secs();

    harness
        .router
        .submit_command(RouterCommand::Add {
            eid: gs1.clone(),
            cla_kind: "tcpcl".into(),
            address: "addr".into(),
            trustworthiness: 1.0,
            endpoints: vec![Endpoint {
                eid: dst.clone(),
                probability: 0.9,
            }],
            contacts: vec![ContactSpec {
                from: now + 10,
                to: now + 20,
                bitrate: 100,
                endpoints: vec![],
            }],
        })
        .await;

    let before = query(&harness.router, gs1.clone()).await;
    assert_eq!(before.as_ref().map(|s| s.contacts.clone()), Some(vec![(now + 10, now + 20)]));

    // Overlaps the existing [now+10, now+20) window instead of matching
    // it exactly, so this is a rejection, not a merge.
    harness
        .router
        .submit_command(RouterCommand::Add {
            eid: gs1.clone(),
            cla_kind: "tcpcl".into(),
            address: "addr".into(),
            trustworthiness: 1.0,
            endpoints: vec![],
            contacts: vec![ContactSpec {
                from: now + 15,
                to: now + 25,
                bitrate: 100,
                endpoints: vec![],
            }],
        })
        .await;

    let after = query(&harness.router, gs1).await;
    assert_eq!(before, after, "a rejected Add must leave the plan byte-for-byte unchanged");
}
