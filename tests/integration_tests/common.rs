// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared harness for the end-to-end scenarios in `spec.md` §8: wires a
//! full router task + contact manager pipeline over a loopback CLA so a
//! test can submit router commands and bundles and observe the resulting
//! events exactly as an external bundle processor would.

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc;
use upcn_router::{
    contact::GroundStation,
    routing::RouterConfig,
    runtime::{
        BundleProcessorEvent, ContactEvent, ContactManagerHandle, InMemoryBundleStore, RouterTaskHandle,
        cla::{Cla, ChannelCla, ClaFactory, ClaHandle},
        spawn_pipeline,
    },
};

/// A [`ClaFactory`] that opens a fresh loopback channel every time a
/// contact activates and queues the "remote peer" receiving half for the
/// test to claim, in activation order. Good enough for scenarios that
/// activate contacts one at a time (all six here do); a test that needs
/// to tell two simultaneously-active contacts apart should key its own
/// factory by ground station instead.
#[derive(Clone, Default)]
pub struct TestClaFactory {
    pending: Arc<Mutex<Vec<mpsc::Receiver<u64>>>>,
}

impl TestClaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest not-yet-claimed receiver, waiting for a contact
    /// to activate if none is ready yet. Scenario tests schedule future
    /// contacts only a few wall-clock seconds out, so this polls for a
    /// generous (but bounded) window rather than a few hundred ms.
    pub async fn take_receiver(&self) -> mpsc::Receiver<u64> {
        for _ in 0..400 {
            if let Some(rx) = self.pending.lock().unwrap().pop() {
                return rx;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("no CLA connection opened within the timeout");
    }
}

impl ClaFactory for TestClaFactory {
    fn open(&self, _gs: &GroundStation) -> ClaHandle {
        let (cla, rx) = ChannelCla::pair(16);
        self.pending.lock().unwrap().insert(0, rx);
        ClaHandle::Channel(cla)
    }
}

pub struct Harness {
    pub router: RouterTaskHandle,
    pub contact_manager: ContactManagerHandle,
    pub events: mpsc::Receiver<BundleProcessorEvent>,
    pub contact_events: mpsc::Receiver<ContactEvent>,
    pub store: Arc<InMemoryBundleStore>,
    pub cla: TestClaFactory,
}

/// Starts a router task + contact manager pair sharing a fresh routing
/// table and bundle store, behind a loopback CLA factory a test can
/// observe transmissions through.
pub fn spawn_harness(config: RouterConfig, default_gateway_reliability: f64) -> Harness {
    let store = Arc::new(InMemoryBundleStore::new());
    let cla = TestClaFactory::new();
    let (router, contact_manager, events, contact_events) =
        spawn_pipeline(config, default_gateway_reliability, store.clone(), 4, 16, cla.clone());
    Harness {
        router,
        contact_manager,
        events,
        contact_events,
        store,
        cla,
    }
}

/// Receives the next bundle-processor event, failing the test rather
/// than hanging forever if the pipeline stalls.
pub async fn recv_event(events: &mut mpsc::Receiver<BundleProcessorEvent>) -> BundleProcessorEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for a bundle-processor event")
        .expect("bundle-processor event channel closed unexpectedly")
}

pub async fn recv_contact_event(events: &mut mpsc::Receiver<ContactEvent>) -> ContactEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for a contact event")
        .expect("contact event channel closed unexpectedly")
}

/// Drains exactly one frame off a loopback CLA receiver, bounded so a
/// missing transmission fails fast instead of hanging the test.
pub async fn recv_frame(rx: &mut mpsc::Receiver<u64>) -> u64 {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a CLA frame")
        .expect("CLA channel closed unexpectedly")
}

/// Asserts a plain `Cla` round-trips a frame; kept here because several
/// scenario tests open ad-hoc `ChannelCla` pairs instead of one through
/// the harness's factory.
pub async fn assert_delivers(cla: &ClaHandle, bundle_id: u64, rx: &mut mpsc::Receiver<u64>) {
    cla.send_frame(bundle_id).await.expect("send_frame failed");
    assert_eq!(recv_frame(rx).await, bundle_id);
}

/// Merges every CLA connection a scenario's contacts open — one per
/// activation, however many frames each carries — into a single stream,
/// so a test that splits a bundle across several contacts doesn't have
/// to know in advance which contact carries which fragment. Keeps
/// discovering new connections in the background for as long as the
/// returned receiver is held; once the test drops it, the discovery task
/// eventually times out waiting for a connection that will never come
/// and exits.
pub fn spawn_frame_collector(cla: TestClaFactory) -> mpsc::Receiver<u64> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            let mut conn = cla.take_receiver().await;
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(frame) = conn.recv().await {
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    rx
}
