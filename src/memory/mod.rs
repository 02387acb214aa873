//! Segmented memory model
//!
//! Two heap layers share one allocator:
//! - [`range`]: free-space accounting over a growable linear space, with
//!   movable/fixed entries, lock counts and compaction
//! - [`global`]: the selector heap; one range unit per 64 KiB page
//! - [`local`]: sub-allocation inside one global block, with handle
//!   indirection for movable blocks
//!
//! # Layering
//!
//! ```text
//! GlobalHeap ── RangeAllocator<u32>         (selector slots)
//!     └─ Allocation.buffer
//!          └─ LocalHeap ── RangeAllocator<LocalOwner>  (bytes)
//! ```
//!
//! Neither allocator owns bytes. Whoever owns them implements
//! [`range::MoveListener`] and passes it into each call that may relocate.

pub mod config;
pub mod constants;
pub mod errors;
pub mod global;
pub mod local;
pub mod range;

pub use config::HeapConfig;
pub use errors::{Fault, HeapError};
pub use global::{Allocation, GlobalHeap, MemoryBus, Selector};
pub use local::{LocalHeap, LocalKey, LocalOwner, LocalSegment};
pub use range::{MoveListener, Range, RangeAllocator, RangeId, Span};
