// SPDX-License-Identifier: MIT OR Apache-2.0
//! Record boundary snapping for byte-range chunking.
//!
//! Chunk targets almost always land mid-record; the planner snaps each one
//! forward to the nearest boundary so no record ever spans two chunks.

use std::io::{Read, Seek, SeekFrom};

use memchr::memchr;

use crate::error::{LoadError, Result};
use crate::schema::RECORD_TERMINATOR;

/// Longest terminator-free run the scanner will cross before treating the
/// input as malformed. Generous: real records are well under a kilobyte.
pub const MAX_BOUNDARY_WINDOW: u64 = 64 * 1024 * 1024;

/// Forward-scan block size.
const SCAN_BLOCK: usize = 1 << 20;

/// Snap `approx` to the nearest record boundary at or after it.
///
/// A boundary is offset 0, `file_size`, or any offset immediately after a
/// terminator; if `approx` already sits on one it is returned unchanged.
/// End of file counts as a boundary even without a trailing terminator.
/// Fails with `BoundaryNotFound` when `MAX_BOUNDARY_WINDOW` bytes pass
/// without a terminator.
pub fn find_boundary<R: Read + Seek>(reader: &mut R, approx: u64, file_size: u64) -> Result<u64> {
    find_boundary_within(reader, approx, file_size, MAX_BOUNDARY_WINDOW)
}

/// `find_boundary` with an explicit lookahead cap.
pub fn find_boundary_within<R: Read + Seek>(
    reader: &mut R,
    approx: u64,
    file_size: u64,
    window: u64,
) -> Result<u64> {
    if approx == 0 || approx >= file_size {
        return Ok(approx.min(file_size));
    }

    // One byte of lookbehind decides whether approx is already a boundary.
    reader.seek(SeekFrom::Start(approx - 1))?;
    let mut prev = [0u8; 1];
    reader.read_exact(&mut prev)?;
    if prev[0] == RECORD_TERMINATOR {
        return Ok(approx);
    }

    let mut block = vec![0u8; SCAN_BLOCK];
    let mut pos = approx;
    loop {
        if pos >= file_size {
            // Unterminated final record; EOF is a valid boundary.
            return Ok(file_size);
        }
        let budget = window.saturating_sub(pos - approx);
        if budget == 0 {
            return Err(LoadError::BoundaryNotFound {
                offset: approx,
                window,
            });
        }

        let want = (block.len() as u64).min(file_size - pos).min(budget) as usize;
        let buf = &mut block[..want];
        reader.read_exact(buf)?;

        if let Some(hit) = memchr(RECORD_TERMINATOR, buf) {
            return Ok(pos + hit as u64 + 1);
        }
        pos += want as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn snap(data: &[u8], approx: u64) -> Result<u64> {
        let mut cursor = Cursor::new(data.to_vec());
        find_boundary(&mut cursor, approx, data.len() as u64)
    }

    #[test]
    fn endpoints_are_boundaries() {
        let data = b"aaa\nbbb\n";
        assert_eq!(snap(data, 0).unwrap(), 0);
        assert_eq!(snap(data, 8).unwrap(), 8);
        assert_eq!(snap(data, 99).unwrap(), 8, "past-EOF clamps to file size");
    }

    #[test]
    fn snaps_forward_past_the_current_record() {
        let data = b"aaa\nbbb\nccc\n";
        assert_eq!(snap(data, 1).unwrap(), 4);
        assert_eq!(snap(data, 3).unwrap(), 4, "on the terminator itself");
        assert_eq!(snap(data, 5).unwrap(), 8);
        assert_eq!(snap(data, 9).unwrap(), 12);
    }

    #[test]
    fn target_already_on_a_boundary_stays_put() {
        let data = b"aaa\nbbb\nccc\n";
        assert_eq!(snap(data, 4).unwrap(), 4);
        assert_eq!(snap(data, 8).unwrap(), 8);
    }

    #[test]
    fn terminator_exactly_at_target_minus_one() {
        // The terminator sits at offset 2; offset 3 is therefore a boundary
        // and must not snap to the next record.
        let data = b"ab\ncd\nef\n";
        assert_eq!(snap(data, 3).unwrap(), 3);
    }

    #[test]
    fn unterminated_tail_ends_at_file_size() {
        let data = b"aaa\nbb";
        assert_eq!(snap(data, 5).unwrap(), 6);
    }

    #[test]
    fn terminator_as_last_byte() {
        let data = b"abc\n";
        assert_eq!(snap(data, 2).unwrap(), 4);
    }

    #[test]
    fn exhausted_window_is_an_error() {
        let data = vec![b'a'; 64];
        let mut cursor = Cursor::new(data.clone());
        let err = find_boundary_within(&mut cursor, 1, data.len() as u64, 16).unwrap_err();
        match err {
            LoadError::BoundaryNotFound { offset, window } => {
                assert_eq!(offset, 1);
                assert_eq!(window, 16);
            }
            other => panic!("expected BoundaryNotFound, got {other}"),
        }
    }

    #[test]
    fn window_reaching_eof_is_still_a_boundary() {
        // Window larger than the remaining bytes: EOF wins over the cap.
        let data = b"aaaaaa";
        let mut cursor = Cursor::new(data.to_vec());
        let snapped = find_boundary_within(&mut cursor, 2, data.len() as u64, 100).unwrap();
        assert_eq!(snapped, 6);
    }
}
