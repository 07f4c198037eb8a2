// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The routing table (the ground-station/contact arena and its node-table
//! index) and the router that turns a destination into a committed
//! sequence of contacts.

pub mod router;
pub mod table;

pub use router::{
    RouteOutcome, RouterConfig, RoutedBundle, commit_fragment, find_route, max_reasonable_fragment_size,
    uncommit_fragment,
};
pub use table::{GsSnapshot, NodeTableEntry, RoutingTable, intern_endpoints};
