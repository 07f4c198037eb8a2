// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use upcn_router::sdnv;

#[test]
fn encodes_and_decodes_values_spanning_every_byte_width() {
    for value in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
        let mut buf = vec![0u8; sdnv::size(value)];
        let written = sdnv::write(value, &mut buf);
        assert_eq!(written, buf.len());

        let (decoded, consumed) = sdnv::read_all(&buf, "test").unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }
}

#[test]
fn rejects_truncated_continuation_sequence() {
    // A lone continuation byte (high bit set) with nothing following is
    // an incomplete SDNV.
    let buf = [0x81u8];
    assert!(sdnv::read_all(&buf, "test").is_err());
}
