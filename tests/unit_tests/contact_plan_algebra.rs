// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use upcn_router::{contact::algebra::ContactSpec, eid::EidTable, errors::PlanError, routing::RoutingTable};

fn gs1(table: &mut RoutingTable, eids: &EidTable) {
    table
        .add_gs(
            eids.intern("dtn://gs1/"),
            "tcpcl".into(),
            "127.0.0.1:4556".into(),
            1.0,
            vec![],
            vec![ContactSpec {
                from: 1,
                to: 5,
                bitrate: 100,
                endpoints: vec![],
            }],
        )
        .unwrap();
}

#[test]
fn overlapping_contact_is_rejected_and_state_is_unchanged() {
    let eids = EidTable::new();
    let mut table = RoutingTable::new(0.1);
    gs1(&mut table, &eids);

    let before = table.contacts.len();
    let result = table.add_gs(
        eids.intern("dtn://gs1/"),
        "tcpcl".into(),
        "127.0.0.1:4556".into(),
        1.0,
        vec![],
        vec![ContactSpec {
            from: 3,
            to: 7,
            bitrate: 100,
            endpoints: vec![],
        }],
    );

    assert!(matches!(result, Err(PlanError::OverlappingContact { from: 3, to: 7 })));
    assert_eq!(table.contacts.len(), before, "no contact should have been allocated");
}

#[test]
fn union_with_same_window_reduces_remaining_capacity_on_bitrate_cut() {
    let eids = EidTable::new();
    let mut table = RoutingTable::new(0.1);
    gs1(&mut table, &eids);
    let gs_id = table.find_gs_by_eid(&eids.intern("dtn://gs1/")).unwrap();
    let cid = table.gs(gs_id).unwrap().contacts[0];
    // Consume some capacity against the original bitrate=100 window.
    let original_capacity = table.contact(cid).unwrap().total_capacity;
    assert!(original_capacity > 0);

    let outcome = table
        .add_gs(
            eids.intern("dtn://gs1/"),
            "tcpcl".into(),
            "127.0.0.1:4556".into(),
            1.0,
            vec![],
            vec![ContactSpec {
                from: 1,
                to: 5,
                bitrate: 50,
                endpoints: vec![],
            }],
        )
        .unwrap();

    assert_eq!(outcome.modified, vec![cid]);
    assert!(table.contact(cid).unwrap().total_capacity < original_capacity);
}
