//! Downward bump arithmetic - the O(1) fast path
//!
//! Design: allocation moves a cursor *down* from the top of a chunk toward
//! its start. Rounding the cursor down is a single mask, so aligning costs
//! nothing extra on the common path. All arithmetic on sizes is checked;
//! overflow is reported, never wrapped.

use super::AllocError;

/// Round `n` up to a multiple of `divisor` (power of two), checking overflow
#[inline(always)]
pub fn round_up(n: usize, divisor: usize) -> Result<usize, AllocError> {
    debug_assert!(divisor.is_power_of_two(), "divisor must be power of 2");
    n.checked_add(divisor - 1)
        .map(|n| n & !(divisor - 1))
        .ok_or(AllocError::ArithmeticOverflow)
}

/// Round `n` down to a multiple of `divisor` (power of two)
#[inline(always)]
pub const fn round_down(n: usize, divisor: usize) -> usize {
    n & !divisor.wrapping_sub(1)
}

/// Compute the start address of a `size`-byte, `align`-aligned block placed
/// immediately below `cursor` without crossing `start`.
///
/// `cursor` must already be a multiple of `min_align`. Requests aligned no
/// stricter than `min_align` only round the size; stricter requests first
/// align the cursor down. Returns `Ok(None)` when the block does not fit.
#[inline(always)]
pub fn bump_down(
    start: usize,
    cursor: usize,
    size: usize,
    align: usize,
    min_align: usize,
) -> Result<Option<usize>, AllocError> {
    debug_assert!(cursor >= start, "cursor below chunk start");
    debug_assert!(cursor % min_align == 0, "cursor breaks min_align");

    let (end, step) = if align <= min_align {
        (cursor, min_align)
    } else {
        let end = round_down(cursor, align);
        if end < start {
            return Ok(None);
        }
        (end, align)
    };

    let aligned_size = round_up(size, step)?;
    if aligned_size > end - start {
        return Ok(None);
    }
    Ok(Some(end - aligned_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 8), Ok(0));
        assert_eq!(round_up(1, 8), Ok(8));
        assert_eq!(round_up(8, 8), Ok(8));
        assert_eq!(round_up(9, 8), Ok(16));
        assert_eq!(round_up(usize::MAX, 16), Err(AllocError::ArithmeticOverflow));
    }

    #[test]
    fn test_round_down() {
        assert_eq!(round_down(0, 8), 0);
        assert_eq!(round_down(7, 8), 0);
        assert_eq!(round_down(8, 8), 8);
        assert_eq!(round_down(4100, 4096), 4096);
    }

    #[test]
    fn bump_with_min_align_only_rounds_size() {
        // 10 bytes with min_align 1 lands exactly 10 below the cursor
        assert_eq!(bump_down(1000, 2000, 10, 1, 1), Ok(Some(1990)));
        // min_align 8 rounds the size to 16
        assert_eq!(bump_down(1000, 2000, 10, 4, 8), Ok(Some(1984)));
    }

    #[test]
    fn bump_with_stricter_align_aligns_cursor() {
        // cursor 2001 rounds down to 1984 for align 64, then 64 bytes below
        assert_eq!(bump_down(1000, 2001, 64, 64, 1), Ok(Some(1920)));
        assert_eq!(bump_down(1000, 2001, 1, 64, 1), Ok(Some(1920)));
    }

    #[test]
    fn bump_fails_when_exhausted() {
        assert_eq!(bump_down(1000, 1010, 11, 1, 1), Ok(None));
        assert_eq!(bump_down(1000, 1010, 10, 1, 1), Ok(Some(1000)));
    }

    #[test]
    fn bump_fails_when_alignment_crosses_start() {
        // aligning 1010 down to 1024 boundaries falls below start
        assert_eq!(bump_down(1000, 1010, 1, 1024, 1), Ok(None));
    }

    #[test]
    fn bump_reports_overflow() {
        assert_eq!(
            bump_down(0, 64, usize::MAX, 16, 1),
            Err(AllocError::ArithmeticOverflow)
        );
    }
}
