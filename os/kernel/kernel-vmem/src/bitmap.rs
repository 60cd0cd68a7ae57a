//! # Page Availability Bitmap
//!
//! One bit per page-sized unit, packed into `u64` words. A **set** bit means
//! the unit is **available**; a cleared bit means it is in use or reserved.
//! The same structure tracks free physical frames and free virtual pages.
//!
//! ```rust
//! # use kernel_vmem::bitmap::Bitmap;
//! let mut map = Bitmap::new(128, true);
//! map.set_range(0, 3, false).unwrap();
//! assert_eq!(map.get_next_true(0), Some(3));
//! assert_eq!(map.get_next_trues(0, 100), Some(3));
//! assert_eq!(map.get_next_trues(0, 126), None);
//! ```

use alloc::vec;
use alloc::vec::Vec;

const WORD_BITS: usize = u64::BITS as usize;

/// Raised when a mutation touches indices outside the bitmap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bit range {start}+{count} exceeds bitmap length {len}")]
pub struct BitmapError {
    pub start: usize,
    pub count: usize,
    pub len: usize,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// A bitmap of `len` bits, all set to `value`.
    #[must_use]
    pub fn new(len: usize, value: bool) -> Self {
        let fill = if value { u64::MAX } else { 0 };
        let mut map = Self {
            words: vec![fill; len.div_ceil(WORD_BITS)],
            len,
        };
        map.clear_padding();
        map
    }

    /// Bits past `len` in the last word stay zero so that word-wise counts hold.
    fn clear_padding(&mut self) {
        let tail = self.len % WORD_BITS;
        if tail != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= (1u64 << tail) - 1;
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0)
    }

    fn check(&self, start: usize, count: usize) -> Result<usize, BitmapError> {
        match start.checked_add(count) {
            Some(end) if end <= self.len => Ok(end),
            _ => Err(BitmapError {
                start,
                count,
                len: self.len,
            }),
        }
    }

    #[inline]
    fn write(&mut self, index: usize, value: bool) {
        let word = &mut self.words[index / WORD_BITS];
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// # Errors
    /// [`BitmapError`] if `index` is out of range; nothing is mutated.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<(), BitmapError> {
        self.check(index, 1)?;
        self.write(index, value);
        Ok(())
    }

    /// Set `count` bits starting at `start` to `value`.
    ///
    /// # Errors
    /// [`BitmapError`] if any index of the range is out of range; nothing is
    /// mutated in that case.
    pub fn set_range(
        &mut self,
        start: usize,
        count: usize,
        value: bool,
    ) -> Result<(), BitmapError> {
        let end = self.check(start, count)?;
        let fill = if value { u64::MAX } else { 0 };
        let mut i = start;
        while i < end {
            if i.is_multiple_of(WORD_BITS) && end - i >= WORD_BITS {
                self.words[i / WORD_BITS] = fill;
                i += WORD_BITS;
            } else {
                self.write(i, value);
                i += 1;
            }
        }
        Ok(())
    }

    /// First index in `start..end` whose bit equals `value`.
    fn find(&self, start: usize, end: usize, value: bool) -> Option<usize> {
        let end = end.min(self.len);
        if start >= end {
            return None;
        }
        let mut word = start / WORD_BITS;
        let mut mask = u64::MAX << (start % WORD_BITS);
        while word * WORD_BITS < end {
            let bits = if value { self.words[word] } else { !self.words[word] };
            let hits = bits & mask;
            if hits != 0 {
                let index = word * WORD_BITS + hits.trailing_zeros() as usize;
                return (index < end).then_some(index);
            }
            word += 1;
            mask = u64::MAX;
        }
        None
    }

    /// First index of a run of `count` bits equal to `value`, at or after `start`.
    fn find_run(&self, start: usize, count: usize, value: bool) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut candidate = self.find(start, self.len, value)?;
        loop {
            let end = candidate.checked_add(count).filter(|&e| e <= self.len)?;
            match self.find(candidate, end, !value) {
                None => return Some(candidate),
                Some(blocker) => candidate = self.find(blocker + 1, self.len, value)?,
            }
        }
    }

    /// First available index at or after `start`.
    #[must_use]
    pub fn get_next_true(&self, start: usize) -> Option<usize> {
        self.find(start, self.len, true)
    }

    /// First index of `count` contiguous available bits at or after `start`.
    ///
    /// Returns `None` for `count == 0` and when no run fits inside the bitmap.
    #[must_use]
    pub fn get_next_trues(&self, start: usize, count: usize) -> Option<usize> {
        self.find_run(start, count, true)
    }

    /// First unavailable index at or after `start`.
    #[must_use]
    pub fn get_next_false(&self, start: usize) -> Option<usize> {
        self.find(start, self.len, false)
    }

    /// First index of `count` contiguous unavailable bits at or after `start`.
    #[must_use]
    pub fn get_next_falses(&self, start: usize, count: usize) -> Option<usize> {
        self.find_run(start, count, false)
    }

    /// Number of available bits.
    #[must_use]
    pub fn count_trues(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl core::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bitmap")
            .field("len", &self.len)
            .field("available", &self.count_trues())
            .finish()
    }
}
