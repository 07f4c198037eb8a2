// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared parser plumbing: the quota tracker and the bulk-read handshake.

use crate::errors::ParseError;

/// Running total of bytes allocated for the bundle currently being parsed
/// (dictionary, EID-reference array, block data). Exceeding the configured
/// limit aborts the parse with [`ParseError::QuotaExceeded`].
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    limit: usize,
    used: usize,
}

impl Quota {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn charge(&mut self, n: usize) -> Result<(), ParseError> {
        self.used = self.used.saturating_add(n);
        if self.used > self.limit {
            return Err(ParseError::QuotaExceeded {
                used: self.used,
                quota: self.limit,
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// What a single `push_byte` / `resume_bulk_read` call produced.
#[derive(Debug)]
pub enum ParseEvent {
    /// The parser consumed the byte and wants more.
    NeedMore,
    /// The parser wants `len` contiguous bytes copied into
    /// [`BulkReader::buffer`] rather than being fed one at a time. The
    /// caller fills the buffer, then calls `resume_bulk_read` with an
    /// empty input (no further bytes) to clear the request and advance
    /// the state machine — the two-step handshake the design notes call
    /// for instead of a flag on shared state.
    BulkReadRequested { len: usize },
    /// A complete, validated bundle is ready.
    Done(crate::bundle::Bundle),
}

/// Holds the destination for an in-progress bulk read. Only ever has one
/// request outstanding at a time.
#[derive(Debug, Default)]
pub struct BulkReader {
    pub buffer: Vec<u8>,
    pending_len: Option<usize>,
}

impl BulkReader {
    pub fn request(&mut self, len: usize) -> ParseEvent {
        self.buffer.clear();
        self.buffer.reserve(len);
        self.pending_len = Some(len);
        ParseEvent::BulkReadRequested { len }
    }

    pub fn is_pending(&self) -> bool {
        self.pending_len.is_some()
    }

    /// Called once the caller has filled `buffer` with exactly `len`
    /// bytes. Returns the filled buffer and clears the pending request.
    pub fn take(&mut self) -> Result<Vec<u8>, ParseError> {
        let len = self
            .pending_len
            .take()
            .ok_or(ParseError::InvariantViolation(
                "resume_bulk_read called with no outstanding request",
            ))?;
        if self.buffer.len() != len {
            return Err(ParseError::UnexpectedEnd {
                stage: "bulk_read",
            });
        }
        Ok(std::mem::take(&mut self.buffer))
    }
}
