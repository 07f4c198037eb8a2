// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed error taxonomy for the bundle pipeline.
//!
//! Mirrors the four families from the failure-semantics design: parser
//! errors are local to a single byte stream, routing errors become a
//! status-report reason, plan errors abort a single router command, and
//! resource errors degrade gracefully into a routing/activation failure.

use thiserror::Error;

/// Errors raised while decoding a single bundle from a byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("SDNV overflow decoding target width {width} bits (stage {stage})")]
    SdnvOverflow { width: u8, stage: &'static str },

    #[error("bundle quota exceeded: {used} > {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("bundle invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("unexpected end of primary block at stage {stage}")]
    UnexpectedEnd { stage: &'static str },

    #[error("unknown bundle protocol version byte 0x{0:02x}")]
    UnknownVersion(u8),
}

/// Errors raised while computing a route for a parsed bundle.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no known route to destination")]
    NoRoute,
    #[error("destination known but no contact before expiry")]
    NoTimelyContacts,
    #[error("depleted storage / queue capacity")]
    NoMemory,
    #[error("bundle failed validation before routing")]
    InvalidBundle,
}

impl RoutingError {
    /// Maps a routing failure onto the bundle-status-report reason the
    /// bundle processor (external) would attach to its administrative
    /// record.
    pub fn status_report_reason(self) -> StatusReportReason {
        match self {
            RoutingError::NoRoute => StatusReportReason::NoKnownRoute,
            RoutingError::NoTimelyContacts => StatusReportReason::NoTimelyContact,
            RoutingError::NoMemory => StatusReportReason::DepletedStorage,
            RoutingError::InvalidBundle => StatusReportReason::NoInfo,
        }
    }
}

/// Reason code attached to a bundle status report. The report itself is
/// generated by the external bundle processor; the router only ever
/// produces the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReportReason {
    NoInfo,
    NoKnownRoute,
    NoTimelyContact,
    DepletedStorage,
}

/// Errors raised while mutating the contact plan (ground stations /
/// contacts) through a router command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("new contact [{from}, {to}) overlaps an existing contact on the same ground station")]
    OverlappingContact { from: u64, to: u64 },

    #[error("unknown ground station {0:?}")]
    UnknownGs(crate::eid::Eid),

    #[error("a contact with from={0} already exists to this ground station with a different `to`")]
    DuplicateFromTime(u64),

    #[error("rejected router configuration update: {0}")]
    InvalidConfig(&'static str),
}

/// Errors raised when a bounded resource is exhausted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("per-contact TX queue is full")]
    TxQueueFull,
    #[error("no free active-contact slot (CLA_CHANNELS exhausted)")]
    ContactSlotsExhausted,
}
