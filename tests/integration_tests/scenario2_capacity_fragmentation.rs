// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `spec.md` §8 Scenario 2 — capacity-driven fragmentation: no single
//! contact can hold the whole bundle, so the router splits it across two
//! contacts to the same ground station and both transmit in turn.

use upcn_router::{
    bundle::Priority,
    contact::{Endpoint, algebra::ContactSpec},
    eid::EidTable,
    routing::RouterConfig,
    runtime::{BundleMeta, BundleProcessorEvent, RouterCommand, now_secs},
};

use crate::integration_tests::common::{recv_event, spawn_frame_collector, spawn_harness};

#[tokio::test]
async fn oversized_bundle_fragments_across_two_contacts() {
    let eids = EidTable::new();
    let mut harness = spawn_harness(RouterConfig::default(), 0.1);

    let gs1 = eids.intern("dtn://gs1/");
    let dst = eids.intern("dtn://dst/");
    let now = now_secs();

    // Contact A: already open, small capacity (200 bytes). Contact B:
    // opens shortly after, larger capacity (600 bytes). Neither alone
    // holds a 700-byte bundle.
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
            contacts: vec![
                ContactSpec {
                    from: now.saturating_sub(3),
                    to: now + 2,
                    bitrate: 40,
                    endpoints: vec![],
                },
                ContactSpec {
                    from: now + 3,
                    to: now + 9,
                    bitrate: 100,
                    endpoints: vec![],
                },
            ],
        })
        .await;

    harness.store.insert(
        1,
        BundleMeta {
            destination: dst,
            size: 700,
            priority: Priority::Normal,
            expiration: now + 9,
            must_not_fragment: false,
        },
    );
    harness.router.route_bundle(1).await;

    let fragments = match recv_event(&mut harness.events).await {
        BundleProcessorEvent::Routed { bundle_id, fragments } => {
            assert_eq!(bundle_id, 1);
            fragments
        },
        other => panic!("expected Routed, got {other:?}"),
    };
    assert!(fragments >= 2, "a 700-byte bundle over a 200+600 byte plan must fragment");

    // Contact A is already open and offers only 200 bytes, enough for the
    // first fragment; everything after that is seated on contact B, which
    // opens its own CLA connection once its window starts a few seconds
    // later. One connection per contact, not per fragment — several
    // fragments ride the same connection once a contact is active, so the
    // frames are merged across however many connections actually open.
    let mut frames = spawn_frame_collector(harness.cla.clone());
    for _ in 0..fragments {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(10), frames.recv())
            .await
            .expect("timed out waiting for a CLA frame")
            .expect("frame collector channel closed unexpectedly");
        assert_eq!(frame, 1);
        match recv_event(&mut harness.events).await {
            BundleProcessorEvent::TransmissionOutcome { bundle_id, delivered, .. } => {
                assert_eq!(bundle_id, 1);
                assert!(delivered);
            },
            other => panic!("expected TransmissionOutcome, got {other:?}"),
        }
    }
}
