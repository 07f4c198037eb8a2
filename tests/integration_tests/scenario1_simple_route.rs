// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 1 — simple route: a single ground station with
//! one already-open contact window routes and transmits a bundle end to
//! end, reporting `no-info` (delivered) on completion.

use upcn_router::{
    bundle::Priority,
    contact::{Endpoint, algebra::ContactSpec},
    eid::EidTable,
    errors::StatusReportReason,
    routing::RouterConfig,
    runtime::{BundleMeta, RouterCommand, now_secs},
};

use crate::integration_tests::common::{recv_event, spawn_harness};

#[tokio::test]
async fn simple_route_delivers_and_reports_no_info() {
    let eids = EidTable::new();
    let mut harness = spawn_harness(RouterConfig::default(), 0.1);

    let gs1 = eids.intern("dtn://gs1/");
    let ep1 = eids.intern("dtn://gs1/ep1");
    let dst = eids.intern("dtn://dst/");
    let now = now_secs();

    harness
        .router
        .submit_command(RouterCommand::Add {
            eid: gs1.clone(),
            cla_kind: "tcpcl".into(),
            address: "127.0.0.1:4556".into(),
            trustworthiness: 1.0,
            endpoints: vec![
                Endpoint {
                    eid: ep1,
                    probability: 0.9,
                },
                Endpoint {
                    eid: dst.clone(),
                    probability: 0.95,
                },
            ],
            contacts: vec![ContactSpec {
                from: now.saturating_sub(1),
                to: now + 6,
                bitrate: 400,
                endpoints: vec![],
            }],
        })
        .await;

    harness.store.insert(
        1,
        BundleMeta {
            destination: dst,
            size: 500,
            priority: Priority::Normal,
            expiration: now + 6,
            must_not_fragment: false,
        },
    );
    harness.router.route_bundle(1).await;

    match recv_event(&mut harness.events).await {
        upcn_router::runtime::BundleProcessorEvent::Routed { bundle_id, fragments } => {
            assert_eq!(bundle_id, 1);
            assert_eq!(fragments, 1);
        },
        other => panic!("expected Routed, got {other:?}"),
    }

    let mut rx = harness.cla.take_receiver().await;
    assert_eq!(rx.recv().await, Some(1));

    match recv_event(&mut harness.events).await {
        upcn_router::runtime::BundleProcessorEvent::TransmissionOutcome {
            bundle_id,
            delivered,
            reason,
        } => {
            assert_eq!(bundle_id, 1);
            assert!(delivered);
            assert_eq!(reason, StatusReportReason::NoInfo);
        },
        other => panic!("expected TransmissionOutcome, got {other:?}"),
    }
}
