//! Bit set - fixed-size set of small integers over the allocator capability
//!
//! Design: bits are packed into `u64` words, bit `i` lives in word `i / 64`
//! - The size is fixed at construction
//! - Bits past `len` in the last word are always zero, so word-wise
//!   comparison and counting need no masking
//! - Set algebra writes into `self` from two same-sized operands

use core::fmt;
use core::ptr::NonNull;
use core::slice;

use crate::allocator::{AllocError, Allocator, Layout, SystemAlloc, SYSTEM};

const WORD_BITS: usize = u64::BITS as usize;

#[inline]
const fn words_for_bits(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

#[inline]
const fn word_index(bit: usize) -> usize {
    bit / WORD_BITS
}

#[inline]
const fn bit_mask(bit: usize) -> u64 {
    1 << (bit % WORD_BITS)
}

/// Fixed-size bit set whose words live in an `Allocator`
pub struct BitSet<'a, A: Allocator = SystemAlloc> {
    words: NonNull<u64>,
    num_bits: usize,
    num_words: usize,
    backing: &'a A,
}

impl BitSet<'static, SystemAlloc> {
    /// `num_bits` bits, all clear
    #[track_caller]
    pub fn new(num_bits: usize) -> Self {
        Self::new_in(&SYSTEM, num_bits)
    }

    /// `num_bits` bits, all set
    #[track_caller]
    pub fn full(num_bits: usize) -> Self {
        Self::full_in(&SYSTEM, num_bits)
    }
}

impl<'a, A: Allocator> BitSet<'a, A> {
    #[track_caller]
    pub fn new_in(backing: &'a A, num_bits: usize) -> Self {
        match Self::try_new_in(backing, num_bits) {
            Ok(set) => set,
            Err(err) => fatal!("bit set of {} bits: {}", num_bits, err),
        }
    }

    pub fn try_new_in(backing: &'a A, num_bits: usize) -> Result<Self, AllocError> {
        let num_words = words_for_bits(num_bits);
        let words = if num_words == 0 {
            NonNull::dangling()
        } else {
            backing
                .allocate_zeroed(Layout::array::<u64>(num_words)?)?
                .cast::<u64>()
        };
        Ok(Self {
            words,
            num_bits,
            num_words,
            backing,
        })
    }

    #[track_caller]
    pub fn full_in(backing: &'a A, num_bits: usize) -> Self {
        match Self::try_full_in(backing, num_bits) {
            Ok(set) => set,
            Err(err) => fatal!("bit set of {} bits: {}", num_bits, err),
        }
    }

    pub fn try_full_in(backing: &'a A, num_bits: usize) -> Result<Self, AllocError> {
        let mut set = Self::try_new_in(backing, num_bits)?;
        set.set_all();
        Ok(set)
    }

    /// Number of bits (set or clear)
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    #[track_caller]
    pub fn set(&mut self, bit: usize) {
        self.check_bounds(bit);
        self.words_mut()[word_index(bit)] |= bit_mask(bit);
    }

    #[track_caller]
    pub fn clear(&mut self, bit: usize) {
        self.check_bounds(bit);
        self.words_mut()[word_index(bit)] &= !bit_mask(bit);
    }

    #[track_caller]
    pub fn test(&self, bit: usize) -> bool {
        self.check_bounds(bit);
        self.words()[word_index(bit)] & bit_mask(bit) != 0
    }

    pub fn set_all(&mut self) {
        let tail = self.num_bits % WORD_BITS;
        let words = self.words_mut();
        words.fill(u64::MAX);
        if let (Some(last), true) = (words.last_mut(), tail > 0) {
            *last = (1 << tail) - 1;
        }
    }

    pub fn clear_all(&mut self) {
        self.words_mut().fill(0);
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words().iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Overwrite `self` with the bits of `src`
    #[track_caller]
    pub fn copy_from(&mut self, src: &BitSet<'_, impl Allocator>) {
        self.check_same_len(src.len(), "copy");
        self.words_mut().copy_from_slice(src.words());
    }

    /// `self = a & b`
    #[track_caller]
    pub fn intersect(&mut self, a: &BitSet<'_, impl Allocator>, b: &BitSet<'_, impl Allocator>) {
        self.combine(a, b, "intersect", |x, y| x & y);
    }

    /// `self = a | b`
    #[track_caller]
    pub fn union(&mut self, a: &BitSet<'_, impl Allocator>, b: &BitSet<'_, impl Allocator>) {
        self.combine(a, b, "union", |x, y| x | y);
    }

    /// `self = a & !b`
    #[track_caller]
    pub fn difference(&mut self, a: &BitSet<'_, impl Allocator>, b: &BitSet<'_, impl Allocator>) {
        self.combine(a, b, "difference", |x, y| x & !y);
    }

    /// Indices of the set bits, ascending
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words().iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            core::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }

    #[track_caller]
    fn combine<B: Allocator, C: Allocator>(
        &mut self,
        a: &BitSet<'_, B>,
        b: &BitSet<'_, C>,
        op: &str,
        f: impl Fn(u64, u64) -> u64,
    ) {
        self.check_same_len(a.len(), op);
        self.check_same_len(b.len(), op);
        for ((dst, &x), &y) in self.words_mut().iter_mut().zip(a.words()).zip(b.words()) {
            *dst = f(x, y);
        }
    }

    #[inline]
    #[track_caller]
    fn check_bounds(&self, bit: usize) {
        fatal_assert!(
            bit < self.num_bits,
            "bit {} out of bounds for a set of {}",
            bit,
            self.num_bits
        );
    }

    #[inline]
    #[track_caller]
    fn check_same_len(&self, other: usize, op: &str) {
        fatal_assert!(
            self.num_bits == other,
            "bit set {}: mismatched sizes {} and {}",
            op,
            self.num_bits,
            other
        );
    }

    #[inline]
    fn words(&self) -> &[u64] {
        // SAFETY: `words` holds `num_words` initialised words (or is
        // dangling with `num_words == 0`)
        unsafe { slice::from_raw_parts(self.words.as_ptr(), self.num_words) }
    }

    #[inline]
    fn words_mut(&mut self) -> &mut [u64] {
        // SAFETY: as above, with exclusive access
        unsafe { slice::from_raw_parts_mut(self.words.as_ptr(), self.num_words) }
    }
}

impl<'a, A: Allocator> Drop for BitSet<'a, A> {
    fn drop(&mut self) {
        if self.num_words == 0 {
            return;
        }
        if let Ok(layout) = Layout::array::<u64>(self.num_words) {
            // SAFETY: allocated by `backing` with this layout
            unsafe { self.backing.release(self.words.cast(), layout) };
        }
    }
}

/// Sets of different sizes are never equal
impl<'a, 'b, A: Allocator, B: Allocator> PartialEq<BitSet<'b, B>> for BitSet<'a, A> {
    fn eq(&self, other: &BitSet<'b, B>) -> bool {
        self.num_bits == other.num_bits && self.words() == other.words()
    }
}

impl<'a, A: Allocator> Eq for BitSet<'a, A> {}

impl<'a, A: Allocator> fmt::Debug for BitSet<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Arena;

    #[test]
    fn set_clear_test() {
        let mut bs = BitSet::new(100);
        assert_eq!(bs.len(), 100);
        assert!(!bs.test(10));
        bs.set(10);
        assert!(bs.test(10));
        bs.clear(10);
        assert!(!bs.test(10));

        bs.set(0);
        bs.set(99);
        assert!(bs.test(0));
        assert!(bs.test(99));
        assert_eq!(bs.count(), 2);
    }

    #[test]
    fn set_all_and_clear_all() {
        let mut bs = BitSet::new(100);
        bs.set_all();
        assert!(bs.test(50));
        assert_eq!(bs.count(), 100);
        bs.clear_all();
        assert!(!bs.test(50));
        assert_eq!(bs.count(), 0);
    }

    #[test]
    fn full_set_masks_tail_word() {
        let all = BitSet::full(100);
        assert!(all.test(10));
        assert!(all.test(99));
        assert_eq!(all.count(), 100);

        let exact = BitSet::full(128);
        assert_eq!(exact.count(), 128);
    }

    #[test]
    fn copy_and_equals() {
        let mut bs = BitSet::new(100);
        let all = BitSet::full(100);
        bs.copy_from(&all);
        assert_eq!(bs, all);
        bs.clear(10);
        assert_ne!(bs, all);
        assert_ne!(BitSet::new(64), BitSet::new(65));
    }

    #[test]
    fn set_algebra() {
        let mut a = BitSet::new(64);
        let mut b = BitSet::new(64);
        let mut dest = BitSet::new(64);
        a.set(1);
        a.set(2);
        b.set(2);
        b.set(3);

        dest.union(&a, &b);
        assert_eq!(dest.ones().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(!dest.test(4));

        dest.intersect(&a, &b);
        assert_eq!(dest.ones().collect::<Vec<_>>(), vec![2]);

        dest.difference(&a, &b);
        assert_eq!(dest.ones().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn zero_bits_allocate_nothing() {
        let mut bs = BitSet::new(0);
        assert!(bs.is_empty());
        bs.set_all();
        assert_eq!(bs.count(), 0);
        assert_eq!(bs, BitSet::full(0));
    }

    #[test]
    fn bit_sets_in_arena() {
        let mut arena = Arena::new();
        {
            let mut bs = BitSet::new_in(&arena, 200);
            assert!(!bs.test(10));
            bs.set(10);
            bs.set(199);
            assert!(bs.test(10) && bs.test(199));

            let all = BitSet::full_in(&arena, 200);
            assert!(all.test(150));

            // Operands may live in different allocators
            let mut mixed = BitSet::new(200);
            mixed.intersect(&bs, &all);
            assert_eq!(mixed, bs);
        }
        arena.reset();

        let mut fresh = BitSet::new_in(&arena, 100);
        fresh.set(50);
        assert!(fresh.test(50));
        assert_eq!(format!("{:?}", fresh), "{50}");
    }

    #[test]
    fn arena_reuse_starts_clear() {
        let mut arena = Arena::new();
        {
            let _dirty = BitSet::full_in(&arena, 256);
        }
        arena.reset();
        assert_eq!(BitSet::new_in(&arena, 256).count(), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_is_fatal() {
        let mut bs = BitSet::new(8);
        bs.set(8);
    }

    #[test]
    #[should_panic(expected = "mismatched sizes")]
    fn mismatched_operands_are_fatal() {
        let mut dest = BitSet::new(64);
        dest.union(&BitSet::new(64), &BitSet::new(32));
    }
}
