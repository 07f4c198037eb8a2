// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{cfg::enums::ClaKind, routing::RouterConfig};

/// Top-level configuration: the routing tunables that travel with the
/// contact plan, the ground stations known at startup, and the
/// implementation/runtime parameters that sit outside the protocol
/// itself (queue depths, reliability defaults, where to find the
/// logging config). Mirrors the teacher's `Config { login, runtime }`
/// split between protocol-facing and implementation-facing settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Router tunables, hot-swappable later via `RouterCommand`/
    /// `RouterSignal::UpdateConfig` — this is only the boot-time value.
    #[serde(default)]
    pub router: RouterConfig,
    /// Ground stations to seed the routing table with at startup.
    #[serde(default)]
    pub stations: Vec<GroundStationConfig>,
    /// Implementation parameters that live outside the bundle protocol.
    pub runtime: RuntimeConfig,
}

/// A ground station known at startup, before any contacts are scheduled
/// against it (contacts are added later through `RouterCommand::Add`,
/// not carried in static config).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GroundStationConfig {
    /// The station's endpoint identifier, e.g. `dtn://gs1/`.
    pub eid: String,
    /// Which convergence-layer adapter to open for this station.
    pub cla_kind: ClaKind,
    /// Adapter-specific address (host:port for tcpcl/udpcl, ignored for
    /// channel/null).
    #[serde(default)]
    pub address: String,
    /// Trustworthiness in `[0, 1]` fed into the router's confidence
    /// classification alongside contact reliability.
    #[serde(default = "default_trustworthiness")]
    pub trustworthiness: f64,
}

fn default_trustworthiness() -> f64 {
    1.0
}

/// Runtime-only settings that do not map to bundle-protocol fields.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Default reliability assigned to a newly-interned node-table entry
    /// before any contact with it has completed (`RoutingTable::new`'s
    /// `default_gateway_reliability`).
    #[serde(default = "default_gateway_reliability")]
    pub default_gateway_reliability: f64,
    /// Capacity of each per-contact dispatch channel the contact manager
    /// hands transmitted bundle ids through.
    #[serde(default = "default_contact_tx_queue_length")]
    pub contact_tx_task_queue_length: usize,
    /// Maximum number of contacts the contact manager keeps active
    /// (convergence-layer channels open) at once.
    #[serde(default = "default_cla_channels")]
    pub cla_channels: usize,
    /// Upper bound on bundles admitted into the pipeline before the
    /// bundle store backpressures the ingest path.
    #[serde(default = "default_bundle_quota")]
    pub bundle_quota: usize,
    /// Path to the YAML file `cfg::logger::init_logger` reads; kept as a
    /// separate file the way the teacher keeps logging config
    /// independent of the protocol config.
    #[serde(default = "default_log_config_path")]
    pub log_config_path: String,
}

fn default_gateway_reliability() -> f64 {
    0.5
}
fn default_contact_tx_queue_length() -> usize {
    16
}
fn default_cla_channels() -> usize {
    4
}
fn default_bundle_quota() -> usize {
    4096
}
fn default_log_config_path() -> String {
    "log.yaml".to_string()
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields, mirroring
    /// `RouterConfig::validate_and_apply`'s atomic accept-or-reject shape.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        let mut defaulted = RouterConfig::default();
        defaulted
            .validate_and_apply(self.router.clone())
            .context("router config rejected")?;

        ensure!(
            (0.0..=1.0).contains(&self.runtime.default_gateway_reliability),
            "default_gateway_reliability must be within [0, 1]"
        );
        ensure!(self.runtime.cla_channels >= 1, "cla_channels must be >= 1");
        ensure!(
            self.runtime.contact_tx_task_queue_length >= 1,
            "contact_tx_task_queue_length must be >= 1"
        );
        ensure!(self.runtime.bundle_quota >= 1, "bundle_quota must be >= 1");

        for station in &self.stations {
            ensure!(!station.eid.is_empty(), "ground station eid must not be empty");
            ensure!(
                (0.0..=1.0).contains(&station.trustworthiness),
                "ground station trustworthiness must be within [0, 1]"
            );
        }

        Ok(())
    }
}
