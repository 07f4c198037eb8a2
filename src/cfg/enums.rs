// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Convergence-layer adapter kind a ground station is opened with.
/// Kept as a closed enum so a typo in the config surfaces at load time
/// instead of silently falling back to a no-op adapter.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaKind {
    #[serde(rename = "tcpcl", alias = "TCPCL", alias = "tcp")]
    TcpCl,
    #[serde(rename = "udpcl", alias = "UDPCL", alias = "udp")]
    UdpCl,
    /// In-process loopback, wired to a [`crate::runtime::ChannelCla`] —
    /// used for local testing and the demonstration binary.
    #[serde(rename = "channel", alias = "loopback")]
    Channel,
    /// Discards every frame; used when a station is configured but no
    /// transmission path exists yet.
    #[serde(rename = "null", alias = "none", alias = "None")]
    Null,
}
impl fmt::Display for ClaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClaKind::TcpCl => "tcpcl",
            ClaKind::UdpCl => "udpcl",
            ClaKind::Channel => "channel",
            ClaKind::Null => "null",
        })
    }
}
