// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The convergence-layer adapter boundary.
//!
//! `spec.md` §6 treats CLA socket framing as an external collaborator —
//! this module only fixes the shape of that boundary: a per-contact
//! handle that accepts bundles for transmission. The read-exact-then-
//! dispatch framing shape of the teacher's `ClientConnection` (`read_loop`
//! / `write` in `client/client.rs`) is adapted here into the much smaller
//! "hand a bundle id to the wire" contract this crate actually needs,
//! since real bundle serialization and socket I/O are Non-goals.
//!
//! [`ClaHandle`] is a closed enum rather than a `Box<dyn Cla>` so the
//! per-contact TX task (see `contact_manager.rs`) can call its `async fn`
//! directly without the trait needing to be object-safe; dispatch is
//! generated by `enum_dispatch` the same way the teacher dispatches PDU
//! types in `models::common`.

use enum_dispatch::enum_dispatch;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::contact::GroundStation;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClaError {
    #[error("convergence layer TX queue is full")]
    QueueFull,
    #[error("convergence layer connection is closed")]
    Closed,
}

/// One open convergence-layer connection to a ground station.
#[enum_dispatch]
pub trait Cla: Send + Sync {
    /// Hands one bundle id to the wire. Returns once the frame has been
    /// accepted by the transport (not necessarily acknowledged by the
    /// peer) — the distinction between "serialized" and "transmitted" in
    /// `spec.md` §3 is tracked by the router task from this call's
    /// outcome, not by this trait.
    async fn send_frame(&self, bundle_id: u64) -> Result<(), ClaError>;
}

#[enum_dispatch(Cla)]
#[derive(Clone)]
pub enum ClaHandle {
    Null(NullCla),
    Channel(ChannelCla),
}

/// A black hole: every frame is reported as successfully sent. Used for
/// demonstration and for unit tests that only care about routing and
/// contact-plan bookkeeping, not transmission outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCla;

impl Cla for NullCla {
    async fn send_frame(&self, _bundle_id: u64) -> Result<(), ClaError> {
        Ok(())
    }
}

/// An in-process loopback: frames are pushed onto a bounded channel a
/// test harness drains on the "remote" side, so integration tests can
/// observe exactly which bundle ids a contact actually transmitted.
#[derive(Clone)]
pub struct ChannelCla {
    peer: mpsc::Sender<u64>,
}

impl ChannelCla {
    /// Builds a connected pair: the handle a contact sends through, and
    /// the receiver a test plays the role of "remote peer" with.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { peer: tx }, rx)
    }
}

impl Cla for ChannelCla {
    async fn send_frame(&self, bundle_id: u64) -> Result<(), ClaError> {
        self.peer.send(bundle_id).await.map_err(|_| ClaError::Closed)
    }
}

/// Opens a [`ClaHandle`] for a ground station when its contact
/// activates. Mirrors `contactManager.c`'s `cla_begin_scheduled_contact`.
pub trait ClaFactory: Send + Sync + 'static {
    fn open(&self, gs: &GroundStation) -> ClaHandle;
}

/// Opens a [`NullCla`] for every ground station. The demonstration
/// binary's default factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClaFactory;

impl ClaFactory for NullClaFactory {
    fn open(&self, _gs: &GroundStation) -> ClaHandle {
        ClaHandle::Null(NullCla)
    }
}
