// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bundle Protocol v6 (RFC 5050) streaming parser.
//!
//! Stage order and the bulk-read escape for the dictionary and block data
//! are ported from the reference `bundle6` parser: a flat per-byte state
//! machine with an embedded SDNV sub-decoder, falling back to a two-step
//! bulk-read handshake for the dictionary and each block's payload bytes.

use std::sync::Arc;

use super::common::{BulkReader, ParseEvent, Quota};
use crate::{
    bundle::model::{
        Bundle, BundleBlock, BundleVersion, BlockFlags, CrcKind, ProcFlags, V6Dictionary,
    },
    eid::EidTable,
    errors::ParseError,
    sdnv::{self, Decoder as SdnvDecoder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Version,
    ProcFlags,
    PrimaryBlockLength,
    DestScheme,
    DestSsp,
    SourceScheme,
    SourceSsp,
    ReportToScheme,
    ReportToSsp,
    CustodianScheme,
    CustodianSsp,
    CreationTimestamp,
    SequenceNumber,
    Lifetime,
    DictionaryLength,
    DictionaryBytes,
    FragmentOffset,
    TotalAduLength,
    BlockType,
    BlockFlags,
    BlockEidRefCount,
    BlockEidRefScheme,
    BlockEidRefSsp,
    BlockDataLength,
    BlockDataBytes,
    Done,
    Error,
}

#[derive(Default, Clone)]
struct InProgressBlock {
    block_type: u8,
    flags: BlockFlags,
    eid_refs: Vec<(u64, u64)>,
    eid_ref_count: u64,
    pending_scheme_off: u64,
    data_len: u64,
}

pub struct V6Parser {
    stage: Stage,
    sdnv: SdnvDecoder,
    quota: Quota,
    pub(crate) bulk: BulkReader,
    eids: Arc<EidTable>,

    flags: ProcFlags,
    dest_off: (u64, u64),
    source_off: (u64, u64),
    report_to_off: (u64, u64),
    custodian_off: (u64, u64),
    creation_timestamp: u64,
    sequence_number: u64,
    lifetime: u64,
    dict_len: u64,
    dictionary: Vec<u8>,
    fragment_offset: u64,
    total_adu_length: u64,

    blocks: Vec<BundleBlock>,
    cur_block: InProgressBlock,
}

impl V6Parser {
    pub fn new(eids: Arc<EidTable>, quota: usize) -> Self {
        Self {
            stage: Stage::Version,
            sdnv: SdnvDecoder::new(),
            quota: Quota::new(quota),
            bulk: BulkReader::default(),
            eids,
            flags: ProcFlags::empty(),
            dest_off: (0, 0),
            source_off: (0, 0),
            report_to_off: (0, 0),
            custodian_off: (0, 0),
            creation_timestamp: 0,
            sequence_number: 0,
            lifetime: 0,
            dict_len: 0,
            dictionary: Vec::new(),
            fragment_offset: 0,
            total_adu_length: 0,
            blocks: Vec::new(),
            cur_block: InProgressBlock::default(),
        }
    }

    pub fn reset(&mut self) {
        if self.stage == Stage::Version && self.blocks.is_empty() {
            return;
        }
        *self = Self::new(Arc::clone(&self.eids), self.quota.limit());
    }

    fn stage_name(stage: Stage) -> &'static str {
        match stage {
            Stage::Version => "version",
            Stage::ProcFlags => "proc_flags",
            Stage::PrimaryBlockLength => "primary_block_length",
            Stage::DestScheme => "dest_scheme",
            Stage::DestSsp => "dest_ssp",
            Stage::SourceScheme => "source_scheme",
            Stage::SourceSsp => "source_ssp",
            Stage::ReportToScheme => "report_to_scheme",
            Stage::ReportToSsp => "report_to_ssp",
            Stage::CustodianScheme => "custodian_scheme",
            Stage::CustodianSsp => "custodian_ssp",
            Stage::CreationTimestamp => "creation_timestamp",
            Stage::SequenceNumber => "sequence_number",
            Stage::Lifetime => "lifetime",
            Stage::DictionaryLength => "dictionary_length",
            Stage::DictionaryBytes => "dictionary_bytes",
            Stage::FragmentOffset => "fragment_offset",
            Stage::TotalAduLength => "total_adu_length",
            Stage::BlockType => "block_type",
            Stage::BlockFlags => "block_flags",
            Stage::BlockEidRefCount => "block_eid_ref_count",
            Stage::BlockEidRefScheme => "block_eid_ref_scheme",
            Stage::BlockEidRefSsp => "block_eid_ref_ssp",
            Stage::BlockDataLength => "block_data_length",
            Stage::BlockDataBytes => "block_data_bytes",
            Stage::Done | Stage::Error => "done",
        }
    }

    /// Feeds a single byte into the state machine.
    pub fn push_byte(&mut self, byte: u8) -> Result<ParseEvent, ParseError> {
        if self.bulk.is_pending() {
            return Err(ParseError::InvariantViolation(
                "byte fed while a bulk read is outstanding",
            ));
        }
        self.step(byte)
    }

    /// Resumes the state machine after the caller has filled
    /// [`BulkReader::buffer`] in response to a `BulkReadRequested` event.
    pub fn resume_bulk_read(&mut self) -> Result<ParseEvent, ParseError> {
        let filled = self.bulk.take()?;
        match self.stage {
            Stage::DictionaryBytes => {
                self.dictionary = filled;
                self.stage = if self.flags.contains(ProcFlags::FRAGMENT) {
                    Stage::FragmentOffset
                } else {
                    Stage::BlockType
                };
                self.sdnv.reset();
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockDataBytes => {
                let block = BundleBlock {
                    block_type: self.cur_block.block_type,
                    flags: self.cur_block.flags,
                    crc: CrcKind::None,
                    eid_refs: std::mem::take(&mut self.cur_block.eid_refs),
                    data: filled,
                };
                let last = block.is_last_block();
                self.blocks.push(block);
                self.cur_block = InProgressBlock::default();
                if last {
                    self.finish()
                } else {
                    self.stage = Stage::BlockType;
                    Ok(ParseEvent::NeedMore)
                }
            },
            _ => Err(ParseError::InvariantViolation(
                "resume_bulk_read called outside a bulk-read stage",
            )),
        }
    }

    fn sdnv_step(&mut self, byte: u8, stage_name: &'static str) -> Result<Option<u64>, ParseError> {
        match self.sdnv.step(byte, stage_name)? {
            sdnv::Step::InProgress => Ok(None),
            sdnv::Step::Done(v) => {
                self.sdnv.reset();
                Ok(Some(v))
            },
        }
    }

    fn step(&mut self, byte: u8) -> Result<ParseEvent, ParseError> {
        let stage_name = Self::stage_name(self.stage);
        match self.stage {
            Stage::Version => {
                if byte != 0x06 {
                    self.stage = Stage::Error;
                    return Err(ParseError::UnknownVersion(byte));
                }
                self.stage = Stage::ProcFlags;
                Ok(ParseEvent::NeedMore)
            },
            Stage::ProcFlags => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.flags = ProcFlags::from_bits_truncate(v as u16);
                    self.stage = Stage::PrimaryBlockLength;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::PrimaryBlockLength => {
                if self.sdnv_step(byte, stage_name)?.is_some() {
                    self.stage = Stage::DestScheme;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DestScheme => self.offset_stage(byte, stage_name, Stage::DestSsp, |p, v| {
                p.dest_off.0 = v
            }),
            Stage::DestSsp => self.offset_stage(byte, stage_name, Stage::SourceScheme, |p, v| {
                p.dest_off.1 = v
            }),
            Stage::SourceScheme => {
                self.offset_stage(byte, stage_name, Stage::SourceSsp, |p, v| {
                    p.source_off.0 = v
                })
            },
            Stage::SourceSsp => {
                self.offset_stage(byte, stage_name, Stage::ReportToScheme, |p, v| {
                    p.source_off.1 = v
                })
            },
            Stage::ReportToScheme => {
                self.offset_stage(byte, stage_name, Stage::ReportToSsp, |p, v| {
                    p.report_to_off.0 = v
                })
            },
            Stage::ReportToSsp => {
                self.offset_stage(byte, stage_name, Stage::CustodianScheme, |p, v| {
                    p.report_to_off.1 = v
                })
            },
            Stage::CustodianScheme => {
                self.offset_stage(byte, stage_name, Stage::CustodianSsp, |p, v| {
                    p.custodian_off.0 = v
                })
            },
            Stage::CustodianSsp => {
                self.offset_stage(byte, stage_name, Stage::CreationTimestamp, |p, v| {
                    p.custodian_off.1 = v
                })
            },
            Stage::CreationTimestamp => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.creation_timestamp = v;
                    self.stage = Stage::SequenceNumber;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::SequenceNumber => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.sequence_number = v;
                    self.stage = Stage::Lifetime;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::Lifetime => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.lifetime = v;
                    self.stage = Stage::DictionaryLength;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DictionaryLength => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    if v == 0 {
                        self.stage = Stage::Error;
                        return Err(ParseError::InvariantViolation(
                            "v6 dictionary length must be nonzero",
                        ));
                    }
                    self.dict_len = v;
                    self.quota.charge(v as usize)?;
                    self.stage = Stage::DictionaryBytes;
                    return Ok(self.bulk.request(v as usize));
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::DictionaryBytes => Err(ParseError::InvariantViolation(
                "byte fed during a bulk-read stage",
            )),
            Stage::FragmentOffset => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.fragment_offset = v;
                    self.stage = Stage::TotalAduLength;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::TotalAduLength => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.total_adu_length = v;
                    self.stage = Stage::BlockType;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockType => {
                self.cur_block.block_type = byte;
                self.stage = Stage::BlockFlags;
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockFlags => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.cur_block.flags = BlockFlags::from_bits_truncate(v as u8);
                    self.stage = if self.cur_block.flags.contains(BlockFlags::EID_REFERENCE) {
                        Stage::BlockEidRefCount
                    } else {
                        Stage::BlockDataLength
                    };
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockEidRefCount => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.cur_block.eid_ref_count = v;
                    self.stage = if v == 0 {
                        Stage::BlockDataLength
                    } else {
                        Stage::BlockEidRefScheme
                    };
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockEidRefScheme => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.cur_block.pending_scheme_off = v;
                    self.stage = Stage::BlockEidRefSsp;
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockEidRefSsp => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.cur_block
                        .eid_refs
                        .push((self.cur_block.pending_scheme_off, v));
                    self.stage = if self.cur_block.eid_refs.len() as u64
                        >= self.cur_block.eid_ref_count
                    {
                        Stage::BlockDataLength
                    } else {
                        Stage::BlockEidRefScheme
                    };
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockDataLength => {
                if let Some(v) = self.sdnv_step(byte, stage_name)? {
                    self.cur_block.data_len = v;
                    self.quota.charge(v as usize)?;
                    self.stage = Stage::BlockDataBytes;
                    return Ok(self.bulk.request(v as usize));
                }
                Ok(ParseEvent::NeedMore)
            },
            Stage::BlockDataBytes => Err(ParseError::InvariantViolation(
                "byte fed during a bulk-read stage",
            )),
            Stage::Done | Stage::Error => Err(ParseError::InvariantViolation(
                "parser must be reset before reuse",
            )),
        }
    }

    fn offset_stage(
        &mut self,
        byte: u8,
        stage_name: &'static str,
        next: Stage,
        store: impl FnOnce(&mut Self, u64),
    ) -> Result<ParseEvent, ParseError> {
        if let Some(v) = self.sdnv_step(byte, stage_name)? {
            store(self, v);
            self.stage = next;
        }
        Ok(ParseEvent::NeedMore)
    }

    fn finish(&mut self) -> Result<ParseEvent, ParseError> {
        let dictionary = V6Dictionary {
            bytes: std::mem::take(&mut self.dictionary),
            dest: self.dest_off,
            source: self.source_off,
            report_to: self.report_to_off,
            custodian: self.custodian_off,
        };

        // Validation before dispatch: every EID reference must resolve
        // inside the dictionary, and the three well-known EIDs must intern.
        for block in &self.blocks {
            for &offs in &block.eid_refs {
                dictionary.resolve(offs)?;
            }
        }
        let dest_text = dictionary.resolve(dictionary.dest)?;
        let source_text = dictionary.resolve(dictionary.source)?;
        let report_to_text = dictionary.resolve(dictionary.report_to)?;

        let destination = self.eids.intern(&dest_text);
        let source = self.eids.intern(&source_text);
        let report_to = self.eids.intern(&report_to_text);

        let payload_block = self
            .blocks
            .iter()
            .position(|b| b.is_payload())
            .ok_or(ParseError::InvariantViolation(
                "no payload block present",
            ))?;

        let fragment = if self.flags.contains(ProcFlags::FRAGMENT) {
            Some((self.fragment_offset, self.total_adu_length))
        } else {
            None
        };

        let bundle = Bundle {
            version: BundleVersion::V6,
            flags: self.flags,
            crc: CrcKind::None,
            source,
            destination,
            report_to,
            creation_timestamp: self.creation_timestamp,
            sequence_number: self.sequence_number,
            lifetime: self.lifetime,
            fragment,
            blocks: std::mem::take(&mut self.blocks),
            payload_block,
            dictionary: Some(dictionary),
        };
        bundle.validate()?;

        self.stage = Stage::Done;
        Ok(ParseEvent::Done(bundle))
    }
}
