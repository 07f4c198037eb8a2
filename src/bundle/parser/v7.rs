// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bundle Protocol v7 (RFC 9171) streaming parser.
//!
//! No original-source C file for the `bundle7` parser was retained in the
//! reference tree, so this stage machine is authored directly from the
//! CBOR-indefinite-array framing the specification describes, rather than
//! ported line-for-line: a CBOR array of blocks (primary block first,
//! payload block last) terminated by the CBOR "break" byte (`0xff`),
//! mirrored stage-for-stage against the v6 state machine's shape (one
//! `Stage` per field, the same [`BulkReader`] bulk-read escape for each
//! block's byte-string data).

use std::sync::Arc;

use super::common::{BulkReader, ParseEvent, Quota};
use crate::{
    bundle::model::{
        Bundle, BundleBlock, BundleVersion, BlockFlags, CrcKind, ProcFlags,
    },
    eid::EidTable,
    errors::ParseError,
};

const BREAK: u8 = 0xff;

/// Incremental decoder for one CBOR major-type head (major + argument).
#[derive(Debug, Default)]
struct CborHead {
    major: u8,
    info: u8,
    need: usize,
    got: usize,
    buf: [u8; 8],
    started: bool,
}

enum HeadStep {
    InProgress,
    Done { major: u8, value: u64, indefinite: bool },
}

impl CborHead {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn step(&mut self, byte: u8, stage: &'static str) -> Result<HeadStep, ParseError> {
        if !self.started {
            self.started = true;
            self.major = byte >> 5;
            self.info = byte & 0x1f;
            return match self.info {
                0..=23 => Ok(HeadStep::Done {
                    major: self.major,
                    value: self.info as u64,
                    indefinite: false,
                }),
                24 => {
                    self.need = 1;
                    Ok(HeadStep::InProgress)
                },
                25 => {
                    self.need = 2;
                    Ok(HeadStep::InProgress)
                },
                26 => {
                    self.need = 4;
                    Ok(HeadStep::InProgress)
                },
                27 => {
                    self.need = 8;
                    Ok(HeadStep::InProgress)
                },
                31 => Ok(HeadStep::Done {
                    major: self.major,
                    value: 0,
                    indefinite: true,
                }),
                _ => Err(ParseError::InvariantViolation(
                    "reserved CBOR additional-info value",
                )),
            };
        }
        self.buf[self.got] = byte;
        self.got += 1;
        if self.got < self.need {
            return Ok(HeadStep::InProgress);
        }
        let mut value: u64 = 0;
        for &b in &self.buf[..self.need] {
            value = (value << 8) | b as u64;
        }
        let major = self.major;
        let _ = stage;
        self.reset();
        Ok(HeadStep::Done {
            major,
            value,
            indefinite: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    StreamStart,
    PrimaryArrayHead,
    Version,
    Flags,
    CrcType,
    DestEidHead,
    DestEidScheme,
    DestEidSsp,
    SourceEidHead,
    SourceEidScheme,
    SourceEidSsp,
    ReportToEidHead,
    ReportToEidScheme,
    ReportToEidSsp,
    CreationArrayHead,
    CreationTimestamp,
    SequenceNumber,
    Lifetime,
    FragmentOffset,
    TotalAduLength,
    PrimaryCrcHead,
    BlockOrBreak,
    BlockArrayHead,
    BlockType,
    BlockNumber,
    BlockFlags,
    BlockCrcType,
    BlockDataHead,
    BlockData,
    BlockCrcHead,
    Done,
    Error,
}

#[derive(Default, Clone)]
struct InProgressBlock {
    block_type: u64,
    flags: u64,
    crc_type: u64,
    data: Vec<u8>,
}

/// Maps a decoded `crc_type` CBOR value (RFC 9171 §4.2.1: 0 = absent, 1 =
/// CRC-16, 2 = CRC-32C) to the model's [`CrcKind`].
fn crc_kind_for(value: u64) -> Result<CrcKind, ParseError> {
    match value {
        0 => Ok(CrcKind::None),
        1 => Ok(CrcKind::Crc16),
        2 => Ok(CrcKind::Crc32),
        _ => Err(ParseError::InvariantViolation("unknown v7 crc_type value")),
    }
}

/// Byte width of the CRC value field that follows a block array whose
/// `crc_type` is not 0.
fn crc_value_len(kind: CrcKind) -> usize {
    match kind {
        CrcKind::None => 0,
        CrcKind::Crc16 => 2,
        CrcKind::Crc32 => 4,
    }
}

pub struct V7Parser {
    stage: Stage,
    head: CborHead,
    quota: Quota,
    pub(crate) bulk: BulkReader,
    eids: Arc<EidTable>,

    flags: ProcFlags,
    crc_type: u64,
    dest_scheme: u64,
    source_scheme: u64,
    report_to_scheme: u64,

    creation_timestamp: u64,
    sequence_number: u64,
    lifetime: u64,
    fragment_offset: u64,
    total_adu_length: u64,

    destination: Option<crate::eid::Eid>,
    source: Option<crate::eid::Eid>,
    report_to: Option<crate::eid::Eid>,

    blocks: Vec<BundleBlock>,
    cur_block: InProgressBlock,
}

impl V7Parser {
    pub fn new(eids: Arc<EidTable>, quota: usize) -> Self {
        Self {
            stage: Stage::StreamStart,
            head: CborHead::default(),
            quota: Quota::new(quota),
            bulk: BulkReader::default(),
            eids,
            flags: ProcFlags::empty(),
            crc_type: 0,
            dest_scheme: 0,
            source_scheme: 0,
            report_to_scheme: 0,
            creation_timestamp: 0,
            sequence_number: 0,
            lifetime: 0,
            fragment_offset: 0,
            total_adu_length: 0,
            destination: None,
            source: None,
            report_to: None,
            blocks: Vec::new(),
            cur_block: InProgressBlock::default(),
        }
    }

    pub fn reset(&mut self) {
        if self.stage == Stage::StreamStart && self.blocks.is_empty() {
            return;
        }
        *self = Self::new(Arc::clone(&self.eids), self.quota.limit());
    }

    /// EID scheme code for the `dtn` URI scheme (RFC 9171 §4.2.5.1).
    const SCHEME_DTN: u64 = 1;
    /// EID scheme code for the `ipn` URI scheme.
    const SCHEME_IPN: u64 = 2;

    /// Where to go after the primary block's fixed-length fields (creation
    /// timestamp through fragment offsets) are fully read: a CRC value field
    /// if `crc_type != 0`, otherwise straight to the block loop.
    fn after_primary_fields(&self) -> Stage {
        if self.crc_type == 0 {
            Stage::BlockOrBreak
        } else {
            Stage::PrimaryCrcHead
        }
    }

    fn eid_text(scheme: u64, ssp: &str) -> Result<String, ParseError> {
        match scheme {
            Self::SCHEME_DTN => Ok(format!("dtn:{ssp}")),
            Self::SCHEME_IPN => Ok(format!("ipn:{ssp}")),
            _ => Err(ParseError::InvariantViolation("unknown v7 EID scheme code")),
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> Result<ParseEvent, ParseError> {
        if self.bulk.is_pending() {
            return Err(ParseError::InvariantViolation(
                "byte fed while a bulk read is outstanding",
            ));
        }
        self.step(byte)
    }

    pub fn resume_bulk_read(&mut self) -> Result<ParseEvent, ParseError> {
        let filled = self.bulk.take()?;
        match self.stage {
            Stage::DestEidSsp => {
                let ssp = String::from_utf8(filled)
                    .map_err(|_| ParseError::InvariantViolation("EID ssp not UTF-8"))?;
                let text = Self::eid_text(self.dest_scheme, &ssp)?;
                self.destination = Some(self.eids.intern(&text));
                self.stage = Stage::SourceEidHead;
                Ok(ParseEvent::NeedMore)
            },
            Stage::SourceEidSsp => {
                let ssp = String::from_utf8(filled)
                    .map_err(|_| ParseError::InvariantViolation("EID ssp not UTF-8"))?;
                let text = Self::eid_text(self.source_scheme, &ssp)?;
                self.source = Some(self.eids.intern(&text));
                self.stage = Stage::ReportToEidHead;
                Ok(ParseEvent::NeedMore)
            },
            Stage::ReportToEidSsp => {
                let ssp = String::from_utf8(filled)
                    .map_err(|_| ParseError::InvariantViolation("EID ssp not UTF-8"))?;
                let text = Self::eid_text(self.report_to_scheme, &ssp)?;
                self.report_to = Some(self.eids.intern(&text));
                self.stage = Stage::CreationArrayHead;
                Ok(ParseEvent::NeedMore)
            },
            Stage::PrimaryCrcHead => {
                let kind = crc_kind_for(self.crc_type)?;
                if filled.len() != crc_value_len(kind) {
                    return Err(ParseError::InvariantViolation(
                        "primary block crc value has the wrong length for its crc_type",
                    ));
                }
                self.stage = Stage::BlockOrBreak;
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockData => {
                self.cur_block.data = filled;
                if self.cur_block.crc_type == 0 {
                    self.finish_block()
                } else {
                    let len = crc_value_len(crc_kind_for(self.cur_block.crc_type)?);
                    self.quota.charge(len)?;
                    self.stage = Stage::BlockCrcHead;
                    Ok(self.bulk.request(len))
                }
            },
            Stage::BlockCrcHead => {
                let kind = crc_kind_for(self.cur_block.crc_type)?;
                if filled.len() != crc_value_len(kind) {
                    return Err(ParseError::InvariantViolation(
                        "block crc value has the wrong length for its crc_type",
                    ));
                }
                self.finish_block()
            },
            _ => Err(ParseError::InvariantViolation(
                "resume_bulk_read called outside a bulk-read stage",
            )),
        }
    }

    fn head_step(&mut self, byte: u8, stage_name: &'static str) -> Result<Option<(u8, u64, bool)>, ParseError> {
        match self.head.step(byte, stage_name)? {
            HeadStep::InProgress => Ok(None),
            HeadStep::Done { major, value, indefinite } => Ok(Some((major, value, indefinite))),
        }
    }

    fn step(&mut self, byte: u8) -> Result<ParseEvent, ParseError> {
        match self.stage {
            Stage::StreamStart => {
                if byte != 0x9f {
                    self.stage = Stage::Error;
                    return Err(ParseError::UnknownVersion(byte));
                }
                self.stage = Stage::PrimaryArrayHead;
                Ok(ParseEvent::NeedMore)
            },
            Stage::PrimaryArrayHead => {
                if self.head_step(byte, "primary_array_head")?.is_some() {
                    self.stage = Stage::Version;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::Version => {
                if let Some((_, value, _)) = self.head_step(byte, "version")? {
                    if value != 7 {
                        self.stage = Stage::Error;
                        return Err(ParseError::UnknownVersion(value as u8));
                    }
                    self.stage = Stage::Flags;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::Flags => {
                if let Some((_, value, _)) = self.head_step(byte, "flags")? {
                    self.flags = ProcFlags::from_bits_truncate(value as u16);
                    self.stage = Stage::CrcType;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::CrcType => {
                if let Some((_, value, _)) = self.head_step(byte, "crc_type")? {
                    self.crc_type = value;
                    self.stage = Stage::DestEidHead;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DestEidHead => {
                if self.head_step(byte, "dest_eid_head")?.is_some() {
                    self.stage = Stage::DestEidScheme;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DestEidScheme => {
                if let Some((_, value, _)) = self.head_step(byte, "dest_eid_scheme")? {
                    self.dest_scheme = value;
                    self.stage = Stage::DestEidSsp;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DestEidSsp => self.bulk_string_head(byte, "dest_eid_ssp"),
            Stage::SourceEidHead => {
                if self.head_step(byte, "source_eid_head")?.is_some() {
                    self.stage = Stage::SourceEidScheme;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::SourceEidScheme => {
                if let Some((_, value, _)) = self.head_step(byte, "source_eid_scheme")? {
                    self.source_scheme = value;
                    self.stage = Stage::SourceEidSsp;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::SourceEidSsp => self.bulk_string_head(byte, "source_eid_ssp"),
            Stage::ReportToEidHead => {
                if self.head_step(byte, "report_to_eid_head")?.is_some() {
                    self.stage = Stage::ReportToEidScheme;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::ReportToEidScheme => {
                if let Some((_, value, _)) = self.head_step(byte, "report_to_eid_scheme")? {
                    self.report_to_scheme = value;
                    self.stage = Stage::ReportToEidSsp;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::ReportToEidSsp => self.bulk_string_head(byte, "report_to_eid_ssp"),
            Stage::CreationArrayHead => {
                if self.head_step(byte, "creation_array_head")?.is_some() {
                    self.stage = Stage::CreationTimestamp;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::CreationTimestamp => {
                if let Some((_, value, _)) = self.head_step(byte, "creation_timestamp")? {
                    self.creation_timestamp = value;
                    self.stage = Stage::SequenceNumber;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::SequenceNumber => {
                if let Some((_, value, _)) = self.head_step(byte, "sequence_number")? {
                    self.sequence_number = value;
                    self.stage = Stage::Lifetime;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::Lifetime => {
                if let Some((_, value, _)) = self.head_step(byte, "lifetime")? {
                    self.lifetime = value;
                    self.stage = if self.flags.contains(ProcFlags::FRAGMENT) {
                        Stage::FragmentOffset
                    } else {
                        self.after_primary_fields()
                    };
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::FragmentOffset => {
                if let Some((_, value, _)) = self.head_step(byte, "fragment_offset")? {
                    self.fragment_offset = value;
                    self.stage = Stage::TotalAduLength;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::TotalAduLength => {
                if let Some((_, value, _)) = self.head_step(byte, "total_adu_length")? {
                    self.total_adu_length = value;
                    self.stage = self.after_primary_fields();
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::PrimaryCrcHead => self.bulk_string_head(byte, "primary_crc_value"),
            Stage::BlockOrBreak => {
                if byte == BREAK {
                    self.stage = Stage::Error;
                    return Err(ParseError::InvariantViolation(
                        "bundle closed before a payload block was seen",
                    ));
                }
                self.stage = Stage::BlockArrayHead;
                self.step(byte)
            },
            Stage::BlockArrayHead => {
                if self.head_step(byte, "block_array_head")?.is_some() {
                    self.stage = Stage::BlockType;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockType => {
                if let Some((_, value, _)) = self.head_step(byte, "block_type")? {
                    self.cur_block.block_type = value;
                    self.stage = Stage::BlockNumber;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockNumber => {
                if self.head_step(byte, "block_number")?.is_some() {
                    self.stage = Stage::BlockFlags;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockFlags => {
                if let Some((_, value, _)) = self.head_step(byte, "block_flags")? {
                    self.cur_block.flags = value;
                    self.stage = Stage::BlockCrcType;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockCrcType => {
                if let Some((_, value, _)) = self.head_step(byte, "block_crc_type")? {
                    self.cur_block.crc_type = value;
                    self.stage = Stage::BlockDataHead;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockDataHead => {
                if let Some((_, value, _)) = self.head_step(byte, "block_data_head")? {
                    self.quota.charge(value as usize)?;
                    self.stage = Stage::BlockData;
                    return Ok(self.bulk.request(value as usize));
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockData | Stage::BlockCrcHead => Err(ParseError::InvariantViolation(
                "byte fed during a bulk-read stage",
            )),
            Stage::Done | Stage::Error => Err(ParseError::InvariantViolation(
                "parser must be reset before reuse",
            )),
        }
    }

    /// The EID ssp is carried as a definite-length CBOR text/byte string;
    /// once its header is decoded the raw bytes are fetched through the
    /// same bulk-read escape used for block data.
    fn bulk_string_head(&mut self, byte: u8, stage_name: &'static str) -> Result<ParseEvent, ParseError> {
        if let Some((_, value, _)) = self.head_step(byte, stage_name)? {
            self.quota.charge(value as usize)?;
            return Ok(self.bulk.request(value as usize));
        }
        Ok(ParseEvent::NeedMore)
    }

    /// Builds the just-decoded block from `cur_block`, appends it, and moves
    /// on to the next block (or finishes the bundle if it was the payload).
    fn finish_block(&mut self) -> Result<ParseEvent, ParseError> {
        let flags = BlockFlags::from_bits_truncate(self.cur_block.flags as u8);
        let block_type = self.cur_block.block_type as u8;
        let is_payload = block_type == crate::bundle::model::block_type::PAYLOAD;
        let block = BundleBlock {
            block_type,
            flags: if is_payload {
                flags | BlockFlags::LAST_BLOCK
            } else {
                flags
            },
            crc: crc_kind_for(self.cur_block.crc_type)?,
            eid_refs: Vec::new(),
            data: std::mem::take(&mut self.cur_block.data),
        };
        self.blocks.push(block);
        self.cur_block = InProgressBlock::default();
        if is_payload {
            self.finish()
        } else {
            self.stage = Stage::BlockOrBreak;
            Ok(ParseEvent::NeedMore)
        }
    }

    fn finish(&mut self) -> Result<ParseEvent, ParseError> {
        let destination = self
            .destination
            .take()
            .ok_or(ParseError::InvariantViolation("missing destination EID"))?;
        let source = self
            .source
            .take()
            .ok_or(ParseError::InvariantViolation("missing source EID"))?;
        let report_to = self
            .report_to
            .take()
            .ok_or(ParseError::InvariantViolation("missing report-to EID"))?;

        let payload_block = self
            .blocks
            .iter()
            .position(|b| b.is_payload())
            .ok_or(ParseError::InvariantViolation("no payload block present"))?;

        let fragment = if self.flags.contains(ProcFlags::FRAGMENT) {
            Some((self.fragment_offset, self.total_adu_length))
        } else {
            None
        };

        let bundle = Bundle {
            version: BundleVersion::V7,
            flags: self.flags,
            crc: crc_kind_for(self.crc_type)?,
            source,
            destination,
            report_to,
            creation_timestamp: self.creation_timestamp,
            sequence_number: self.sequence_number,
            lifetime: self.lifetime,
            fragment,
            blocks: std::mem::take(&mut self.blocks),
            payload_block,
            dictionary: None,
        };
        bundle.validate()?;

        self.stage = Stage::Done;
        Ok(ParseEvent::Done(bundle))
    }
}
