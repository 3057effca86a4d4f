//! Dynamic bitmap with thread-safe bit sets.
//!
//! The inspection pass sets destination-witness bits from many workers at
//! once, so `set` is an atomic OR on the containing word. Sized per column
//! span, never per global vertex count.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GridCutError;
use crate::net::wire::{PayloadReader, PayloadWriter};

pub struct AtomicBitSet {
    num_bits: u64,
    words: Vec<AtomicU64>,
}

impl AtomicBitSet {
    pub fn new(num_bits: u64) -> Self {
        let num_words = num_bits.div_ceil(64) as usize;
        Self {
            num_bits,
            words: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> u64 {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    #[inline]
    pub fn set(&self, bit: u64) {
        debug_assert!(bit < self.num_bits);
        self.words[(bit / 64) as usize].fetch_or(1 << (bit % 64), Ordering::Relaxed);
    }

    #[inline]
    pub fn test(&self, bit: u64) -> bool {
        debug_assert!(bit < self.num_bits);
        self.words[(bit / 64) as usize].load(Ordering::Relaxed) & (1 << (bit % 64)) != 0
    }

    /// OR `other` into `self`. Both bitmaps must cover the same span.
    pub fn union_with(&self, other: &AtomicBitSet) -> Result<(), GridCutError> {
        if self.num_bits != other.num_bits {
            return Err(GridCutError::Protocol(format!(
                "bitmap length mismatch: {} vs {}",
                self.num_bits, other.num_bits
            )));
        }
        for (mine, theirs) in self.words.iter().zip(&other.words) {
            let w = theirs.load(Ordering::Relaxed);
            if w != 0 {
                mine.fetch_or(w, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|w| u64::from(w.load(Ordering::Relaxed).count_ones()))
            .sum()
    }

    pub fn encode(&self, w: &mut PayloadWriter) {
        w.push_u64(self.num_bits);
        for word in &self.words {
            w.push_u64(word.load(Ordering::Relaxed));
        }
    }

    pub fn decode(r: &mut PayloadReader<'_>) -> Result<Self, GridCutError> {
        let num_bits = r.u64()?;
        let num_words = num_bits.div_ceil(64) as usize;
        let mut words = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(AtomicU64::new(r.u64()?));
        }
        Ok(Self { num_bits, words })
    }
}
