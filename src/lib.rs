//! # Introduction
//!
//! segheap models the segmented, relocatable memory of 16-bit Windows: a
//! global heap that hands out selectors for 64 KiB pages, and local heaps that
//! subdivide one global block into small movable or fixed blocks addressed
//! through stable handles.
//!
//! ## Layers
//!
//! ```text
//! RangeAllocator ── GlobalHeap (selectors) ── LocalHeap (handles)
//!        └───────── TestHeap (stress harness)
//! ```
//!
//! 1. [`memory::range`]: free-space accounting with movable/fixed entries,
//!    lock counts and compaction. Byte owners follow relocations through
//!    [`memory::range::MoveListener`].
//! 2. [`memory::global`]: the selector heap and the [`memory::MemoryBus`]
//!    used by a CPU emulator.
//! 3. [`memory::local`]: local heaps living inside a global block.
//! 4. [`stress`]: a byte-fidelity test heap and a seeded random driver.
//! 5. [`ui`]: ratatui heap map for watching a stress run; not part of the
//!    stable library API.
//!
//! ## Example
//!
//! ```
//! use segheap::memory::constants::{GMEM_MOVEABLE, LMEM_MOVEABLE};
//! use segheap::memory::GlobalHeap;
//!
//! let mut heap = GlobalHeap::new();
//! let selector = heap.alloc("data", GMEM_MOVEABLE, 4096).unwrap();
//! assert_eq!(selector, 0x0103);
//!
//! let mut local = heap.local_heap_or_create(selector).unwrap();
//! let handle = local.alloc(LMEM_MOVEABLE, 10).unwrap();
//! assert_eq!(local.size(handle), Some(12));
//! ```

pub mod memory;
pub mod stress;
pub mod ui;
