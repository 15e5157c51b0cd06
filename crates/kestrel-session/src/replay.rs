// ============================================
// File: crates/kestrel-session/src/replay.rs
// ============================================
//! # Duplicate Packet Detection
//!
//! ## Creation Reason
//! Packets may arrive reordered, so incoming packet numbers are tracked in
//! a sliding window instead of requiring strict increase.
//!
//! ## Algorithm
//! ```text
//!     ◄─────────── WINDOW_SIZE ───────────►
//!     ┌─────────────────────────────────────┐
//!     │  bitmap (2048 bits = 256 bytes)     │
//!     └─────────────────────────────────────┘
//!     ▲                                     ▲
//!  window_base                         highest_seen
//!
//! 1. pn > highest_seen          → fresh, window advances on record
//! 2. pn in window, bit clear    → fresh
//! 3. pn < window_base           → too old
//! 4. pn in window, bit set      → duplicate
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `check` never mutates; call `record` only after the packet opened
//!
//! ## Last Modified
//! v0.1.0 - Sliding window with separate check and record

use std::fmt;

/// Packets tracked behind the highest seen number.
pub const WINDOW_SIZE: u64 = 2048;

const BITMAP_WORDS: usize = (WINDOW_SIZE / 64) as usize;

/// Verdict on an incoming packet number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    /// Not seen before.
    Fresh,
    /// Already recorded.
    Duplicate,
    /// Fell behind the window.
    TooOld,
}

impl WindowCheck {
    /// `true` for `Fresh`.
    #[must_use]
    pub const fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Sliding window over received packet numbers.
pub struct PacketNumberWindow {
    highest_seen: Option<u64>,
    bitmap: [u64; BITMAP_WORDS],
}

impl PacketNumberWindow {
    /// Creates an empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            highest_seen: None,
            bitmap: [0u64; BITMAP_WORDS],
        }
    }

    /// Classifies `pn` without recording it.
    #[must_use]
    pub fn check(&self, pn: u64) -> WindowCheck {
        let Some(highest) = self.highest_seen else {
            return WindowCheck::Fresh;
        };
        if pn > highest {
            return WindowCheck::Fresh;
        }
        if pn < Self::base_for(highest) {
            return WindowCheck::TooOld;
        }
        if self.get_bit(pn) {
            WindowCheck::Duplicate
        } else {
            WindowCheck::Fresh
        }
    }

    /// Records `pn` as received.
    ///
    /// Returns the verdict `check` would have given; only `Fresh` numbers
    /// change the window.
    pub fn record(&mut self, pn: u64) -> WindowCheck {
        let verdict = self.check(pn);
        if !verdict.is_fresh() {
            return verdict;
        }

        match self.highest_seen {
            Some(highest) if pn > highest => {
                let advance = pn - highest;
                if advance >= WINDOW_SIZE {
                    self.bitmap = [0u64; BITMAP_WORDS];
                } else {
                    for stale in highest + 1..=pn {
                        self.clear_bit(stale);
                    }
                }
                self.highest_seen = Some(pn);
            }
            Some(_) => {}
            None => self.highest_seen = Some(pn),
        }
        self.set_bit(pn);
        verdict
    }

    /// Highest number recorded so far.
    #[must_use]
    pub const fn highest_seen(&self) -> Option<u64> {
        self.highest_seen
    }

    /// Oldest number still tracked.
    #[must_use]
    pub fn window_base(&self) -> u64 {
        self.highest_seen.map_or(0, Self::base_for)
    }

    const fn base_for(highest: u64) -> u64 {
        highest.saturating_sub(WINDOW_SIZE - 1)
    }

    #[inline]
    fn slot(pn: u64) -> (usize, u64) {
        #[allow(clippy::cast_possible_truncation)]
        let bit_index = (pn % WINDOW_SIZE) as usize;
        (bit_index / 64, 1u64 << (bit_index % 64))
    }

    #[inline]
    fn get_bit(&self, pn: u64) -> bool {
        let (word, mask) = Self::slot(pn);
        self.bitmap[word] & mask != 0
    }

    #[inline]
    fn set_bit(&mut self, pn: u64) {
        let (word, mask) = Self::slot(pn);
        self.bitmap[word] |= mask;
    }

    #[inline]
    fn clear_bit(&mut self, pn: u64) {
        let (word, mask) = Self::slot(pn);
        self.bitmap[word] &= !mask;
    }
}

impl Default for PacketNumberWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PacketNumberWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketNumberWindow")
            .field("highest_seen", &self.highest_seen)
            .field("window_base", &self.window_base())
            .finish()
    }
}
