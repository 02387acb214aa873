//! Global heap geometry
//!
//! The selector count and allocation granule are explicit configuration
//! validated once at construction instead of magic numbers scattered through
//! the heap code. The page size is fixed at 64 KiB by 16-bit offsets.

use super::constants::{GLOBAL_GRANULE, PAGE_SIZE, RESERVED_SELECTORS, SELECTOR_COUNT};
use super::errors::HeapError;

/// Geometry of a [`GlobalHeap`](super::global::GlobalHeap)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Number of selector slots (at most 8192, the 13-bit index space)
    pub selector_count: usize,
    /// Slots reserved at the bottom of the selector space
    pub reserved_selectors: usize,
    /// Allocation rounding granule in bytes
    pub granule: usize,
}

impl HeapConfig {
    /// Check the geometry is representable with 16-bit selectors
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.selector_count == 0 || self.selector_count > SELECTOR_COUNT {
            return Err(HeapError::config(format!(
                "selector count {} must be in 1..={}",
                self.selector_count, SELECTOR_COUNT
            )));
        }
        if self.reserved_selectors >= self.selector_count {
            return Err(HeapError::config(format!(
                "{} reserved selectors leave none of {} usable",
                self.reserved_selectors, self.selector_count
            )));
        }
        if !self.granule.is_power_of_two() || self.granule > PAGE_SIZE {
            return Err(HeapError::config(format!(
                "granule {} must be a power of two no larger than the page size",
                self.granule
            )));
        }
        Ok(())
    }

    /// Largest allocation the selector space can ever hold, in bytes
    pub fn max_allocation_size(&self) -> usize {
        (self.selector_count - self.reserved_selectors) * PAGE_SIZE
    }

    /// Round a byte count up to the granule (0 becomes one granule)
    ///
    /// `None` when the rounded size is not representable.
    pub fn round_size(&self, bytes: usize) -> Option<usize> {
        let bytes = bytes.max(1).checked_add(self.granule - 1)?;
        Some(bytes & !(self.granule - 1))
    }

    /// Number of pages needed to hold `bytes`
    pub fn pages_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(PAGE_SIZE).max(1)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            selector_count: SELECTOR_COUNT,
            reserved_selectors: RESERVED_SELECTORS,
            granule: GLOBAL_GRANULE,
        }
    }
}
