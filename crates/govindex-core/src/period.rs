//! Period arithmetic for a governance contract.
//!
//! Periods are contiguous, non-overlapping windows of `period_length` levels
//! starting at `started_at_level`; index `i` covers
//! `[started + i * len, started + (i + 1) * len - 1]`.

use crate::model::ContractConfig;

impl ContractConfig {
    /// Index of the period containing `level`, or `None` before the contract started.
    pub fn period_index(&self, level: u64) -> Option<u64> {
        if level < self.started_at_level || self.period_length == 0 {
            return None;
        }
        Some((level - self.started_at_level) / self.period_length)
    }

    /// First level of period `index`.
    pub fn period_start(&self, index: u64) -> u64 {
        self.started_at_level + index * self.period_length
    }

    /// Last level (inclusive) of period `index`.
    pub fn period_end(&self, index: u64) -> u64 {
        self.period_start(index) + self.period_length - 1
    }

    /// Returns `true` if `level` is the first level of some period.
    pub fn is_period_boundary(&self, level: u64) -> bool {
        self.period_length > 0
            && level >= self.started_at_level
            && (level - self.started_at_level) % self.period_length == 0
    }

    /// Indices of every period touching `[from_level, to_level]`.
    ///
    /// `from_level` is clamped to `started_at_level`; an empty range yields
    /// an empty iterator.
    pub fn period_indices(&self, from_level: u64, to_level: u64) -> std::ops::RangeInclusive<u64> {
        let from = from_level.max(self.started_at_level);
        match (self.period_index(from), self.period_index(to_level)) {
            (Some(first), Some(last)) if first <= last && from <= to_level => first..=last,
            _ => std::ops::RangeInclusive::new(1, 0),
        }
    }
}
