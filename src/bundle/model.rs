// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-memory bundle representation shared by both protocol versions.

use bitflags::bitflags;

use crate::{eid::Eid, errors::ParseError};

/// Bundle protocol version this instance was parsed as / will be
/// serialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleVersion {
    V6,
    V7,
}

bitflags! {
    /// Primary-block processing control flags (RFC 5050 §4.2 / the RFC 9171
    /// analog). Only the subset the routing core inspects is modeled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcFlags: u16 {
        const FRAGMENT            = 0b0000_0000_0001;
        const ADMIN_RECORD        = 0b0000_0000_0010;
        const MUST_NOT_FRAGMENT   = 0b0000_0000_0100;
        const SINGLETON_DEST      = 0b0000_0000_1000;
        const ACK_BY_APP          = 0b0000_0001_0000;
        const PRIORITY_BULK       = 0b0000_0010_0000;
        const PRIORITY_NORMAL     = 0b0000_0100_0000;
        const PRIORITY_EXPEDITED  = 0b0000_1000_0000;
        const REPORT_RECEPTION    = 0b0001_0000_0000;
        const REPORT_CUSTODY      = 0b0010_0000_0000;
        const REPORT_FORWARDING   = 0b0100_0000_0000;
        const REPORT_DELIVERY     = 0b1000_0000_0000;
    }
}

/// Transmission priority class; gates which of a contact's three
/// remaining-capacity counters admission is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Bulk = 0,
    Normal = 1,
    Expedited = 2,
}

impl Priority {
    pub fn from_flags(flags: ProcFlags) -> Self {
        if flags.contains(ProcFlags::PRIORITY_EXPEDITED) {
            Priority::Expedited
        } else if flags.contains(ProcFlags::PRIORITY_NORMAL) {
            Priority::Normal
        } else {
            Priority::Bulk
        }
    }

    /// Index into a contact's `[Bulk, Normal, Expedited]` capacity array.
    pub fn index(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Per-block processing flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        const LAST_BLOCK           = 0b0000_0001;
        const DISCARD_IF_UNPROC    = 0b0000_0010;
        const REPORT_IF_UNPROC     = 0b0000_0100;
        const DELETE_BUNDLE_IF_UNPROC = 0b0000_1000;
        const EID_REFERENCE        = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcKind {
    None,
    Crc16,
    Crc32,
}

/// Well-known block type tags (v6 extension-block registry subset; v7 uses
/// the same numeric space for the payload block).
pub mod block_type {
    pub const PAYLOAD: u8 = 1;
}

/// Single bundle block. Owned exclusively by its parent [`Bundle`].
#[derive(Debug, Clone, PartialEq)]
pub struct BundleBlock {
    pub block_type: u8,
    pub flags: BlockFlags,
    pub crc: CrcKind,
    /// v6 only: `(scheme_offset, ssp_offset)` pairs into the parent
    /// bundle's dictionary, one per referenced EID.
    pub eid_refs: Vec<(u64, u64)>,
    pub data: Vec<u8>,
}

impl BundleBlock {
    pub fn is_payload(&self) -> bool {
        self.block_type == block_type::PAYLOAD
    }

    pub fn is_last_block(&self) -> bool {
        self.flags.contains(BlockFlags::LAST_BLOCK)
    }
}

/// v6-only dictionary and offset bookkeeping. `None` for v7 bundles, which
/// carry full-text EIDs inline instead of dictionary offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct V6Dictionary {
    pub bytes: Vec<u8>,
    pub dest: (u64, u64),
    pub source: (u64, u64),
    pub report_to: (u64, u64),
    pub custodian: (u64, u64),
}

impl V6Dictionary {
    /// Splits `scheme\0ssp\0...` at the given byte offset, returning the
    /// `scheme:ssp` text for one EID slot.
    pub fn resolve(&self, offsets: (u64, u64)) -> Result<String, ParseError> {
        let (scheme_off, ssp_off) = offsets;
        if scheme_off == ssp_off {
            return Err(ParseError::InvariantViolation(
                "v6 EID scheme and ssp offsets must differ",
            ));
        }
        let scheme = read_nul_terminated(&self.bytes, scheme_off)?;
        let ssp = read_nul_terminated(&self.bytes, ssp_off)?;
        Ok(format!("{scheme}:{ssp}"))
    }
}

fn read_nul_terminated(bytes: &[u8], offset: u64) -> Result<&str, ParseError> {
    let start = usize::try_from(offset)
        .map_err(|_| ParseError::InvariantViolation("dictionary offset out of range"))?;
    if start >= bytes.len() {
        return Err(ParseError::InvariantViolation(
            "dictionary offset out of range",
        ));
    }
    let rest = &bytes[start..];
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(rest.len());
    std::str::from_utf8(&rest[..end])
        .map_err(|_| ParseError::InvariantViolation("dictionary entry is not valid UTF-8"))
}

/// A fully parsed, validated bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub version: BundleVersion,
    pub flags: ProcFlags,
    pub crc: CrcKind,
    pub source: Eid,
    pub destination: Eid,
    pub report_to: Eid,
    pub creation_timestamp: u64,
    pub sequence_number: u64,
    pub lifetime: u64,
    /// `Some((offset, total_adu_length))` iff `flags.contains(FRAGMENT)`.
    pub fragment: Option<(u64, u64)>,
    pub blocks: Vec<BundleBlock>,
    pub payload_block: usize,
    pub dictionary: Option<V6Dictionary>,
}

impl Bundle {
    pub fn priority(&self) -> Priority {
        Priority::from_flags(self.flags)
    }

    pub fn is_fragment(&self) -> bool {
        self.flags.contains(ProcFlags::FRAGMENT)
    }

    pub fn must_not_fragment(&self) -> bool {
        self.flags.contains(ProcFlags::MUST_NOT_FRAGMENT)
    }

    pub fn payload(&self) -> &BundleBlock {
        &self.blocks[self.payload_block]
    }

    /// Sum of all block data plus a fixed primary-block overhead estimate;
    /// what the router treats as the bundle's on-the-wire serialized size.
    pub fn serialized_size(&self) -> usize {
        const PRIMARY_BLOCK_OVERHEAD: usize = 32;
        PRIMARY_BLOCK_OVERHEAD + self.blocks.iter().map(|b| b.data.len()).sum::<usize>()
    }

    /// Validates the three bundle-level invariants from the data model:
    /// exactly one payload block, and — if fragmented — that the fragment
    /// stays within the declared total ADU length.
    pub fn validate(&self) -> Result<(), ParseError> {
        let payload_count = self.blocks.iter().filter(|b| b.is_payload()).count();
        if payload_count != 1 {
            return Err(ParseError::InvariantViolation(
                "bundle must carry exactly one payload block",
            ));
        }
        if !self.blocks[self.payload_block].is_payload() {
            return Err(ParseError::InvariantViolation(
                "payload_block index does not point at the payload block",
            ));
        }
        if let Some((offset, total_adu_length)) = self.fragment {
            let payload_len = self.payload().data.len() as u64;
            if offset + payload_len > total_adu_length {
                return Err(ParseError::InvariantViolation(
                    "fragment offset + payload length exceeds total ADU length",
                ));
            }
        }
        Ok(())
    }
}
