//! Heap load testing
//!
//! - [`heap`]: [`TestHeap`], a range allocator over a byte buffer whose
//!   allocations carry a checkable fill pattern
//! - [`driver`]: [`StressRun`], a seeded random mix of alloc, realloc, free,
//!   lock, unlock and defrag against a `TestHeap`

pub mod driver;
pub mod heap;

pub use driver::{Operation, RunStats, StressConfig, StressRun};
pub use heap::{pattern_byte, CorruptionError, TestAllocation, TestHeap};
