// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use upcn_router::routing::RouterConfig;

#[test]
fn default_config_is_self_consistent() {
    let mut cfg = RouterConfig::default();
    let candidate = RouterConfig::default();
    assert!(cfg.validate_and_apply(candidate).is_ok());
}

#[test]
fn rejects_probability_floor_of_zero() {
    let mut cfg = RouterConfig::default();
    let mut candidate = RouterConfig::default();
    candidate.min_probability = 0.0;
    assert!(cfg.validate_and_apply(candidate).is_err());
    // Rejected atomically: the prior config is retained.
    assert_eq!(cfg, RouterConfig::default());
}

#[test]
fn rejects_deterministic_confidence_below_opportunistic() {
    let mut cfg = RouterConfig::default();
    let mut candidate = RouterConfig::default();
    candidate.min_gs_confidence_deterministic = 0.1;
    candidate.min_gs_confidence_opportunistic = 0.5;
    assert!(cfg.validate_and_apply(candidate).is_err());
}

#[test]
fn rejects_weights_not_summing_to_one() {
    let mut cfg = RouterConfig::default();
    let mut candidate = RouterConfig::default();
    candidate.gs_trustworthiness_weight = 0.9;
    candidate.gs_reliability_weight = 0.9;
    assert!(cfg.validate_and_apply(candidate).is_err());
}

#[test]
fn accepts_a_valid_tuning_change() {
    let mut cfg = RouterConfig::default();
    let mut candidate = RouterConfig::default();
    candidate.router_max_contacts = 16;
    candidate.opt_max_bundles = 128;
    assert!(cfg.validate_and_apply(candidate.clone()).is_ok());
    assert_eq!(cfg, candidate);
}
