// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Streaming bundle parser, dispatched by first byte to a v6 or v7
//! sub-parser behind one `Parser` handle — the "polymorphic parser
//! output" design: a sum-type channel rather than a C-style function
//! pointer per wire version.

pub mod common;
mod v6;
mod v7;

use std::sync::Arc;

pub use common::ParseEvent;

use crate::{eid::EidTable, errors::ParseError};

const V6_VERSION_BYTE: u8 = 0x06;
const V7_ARRAY_START_BYTE: u8 = 0x9f;

enum Inner {
    Unstarted,
    V6(v6::V6Parser),
    V7(v7::V7Parser),
}

/// One logical bundle parser covering both wire versions.
pub struct Parser {
    inner: Inner,
    eids: Arc<EidTable>,
    quota: usize,
}

impl Parser {
    pub fn new(eids: Arc<EidTable>, quota: usize) -> Self {
        Self {
            inner: Inner::Unstarted,
            eids,
            quota,
        }
    }

    /// Returns the parser to its initial state. An already-at-start
    /// parser is a no-op, matching the original's short-circuit.
    pub fn reset(&mut self) {
        match &mut self.inner {
            Inner::Unstarted => {},
            Inner::V6(p) => p.reset(),
            Inner::V7(p) => p.reset(),
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> Result<ParseEvent, ParseError> {
        match &mut self.inner {
            Inner::Unstarted => {
                self.inner = match byte {
                    V6_VERSION_BYTE => {
                        Inner::V6(v6::V6Parser::new(Arc::clone(&self.eids), self.quota))
                    },
                    V7_ARRAY_START_BYTE => {
                        Inner::V7(v7::V7Parser::new(Arc::clone(&self.eids), self.quota))
                    },
                    other => return Err(ParseError::UnknownVersion(other)),
                };
                self.push_byte(byte)
            },
            Inner::V6(p) => p.push_byte(byte),
            Inner::V7(p) => p.push_byte(byte),
        }
    }

    pub fn resume_bulk_read(&mut self) -> Result<ParseEvent, ParseError> {
        match &mut self.inner {
            Inner::Unstarted => Err(ParseError::InvariantViolation(
                "resume_bulk_read called before any byte was fed",
            )),
            Inner::V6(p) => p.resume_bulk_read(),
            Inner::V7(p) => p.resume_bulk_read(),
        }
    }

    /// The buffer the caller should fill after a `BulkReadRequested`
    /// event, and the one it should read from before filling it again.
    pub fn bulk_buffer_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.inner {
            Inner::Unstarted => panic!("no bulk-read request outstanding"),
            Inner::V6(p) => &mut p.bulk.buffer,
            Inner::V7(p) => &mut p.bulk.buffer,
        }
    }
}
