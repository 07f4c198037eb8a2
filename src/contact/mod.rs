// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ground stations, contacts, and the sorted-list algebra that mutates
//! them under router commands.
//!
//! Contacts and ground stations are arena entries addressed by integer
//! id rather than back-pointers — see [`crate::routing::RoutingTable`],
//! the single owner of both arenas.

pub mod algebra;
#[allow(clippy::module_inception)]
pub mod contact;
pub mod gs;

pub type GsId = usize;
pub type ContactId = usize;

pub use contact::{Contact, contacts_overlap, total_capacity};
pub use gs::{Endpoint, GroundStation, endpoint_list_difference, endpoint_list_union};
