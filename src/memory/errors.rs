//! Error types for the segmented heap
//!
//! Two families live here:
//!
//! - [`HeapError`]: failures of an allocator call (out of space, stale handle,
//!   protocol violations). The heap is left exactly as it was.
//! - [`Fault`]: access faults raised through the memory bus. These are fatal to
//!   the emulated instruction, not to the process, and are kept as distinct
//!   kinds so the CPU layer can raise the matching exception.

use thiserror::Error;

/// Failure of a heap operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// No contiguous space could be found or made
    #[error("out of memory: requested {requested} units, {available} free")]
    OutOfMemory { requested: usize, available: usize },

    /// Unknown or already-freed handle
    #[error("invalid handle 0x{handle:04x}")]
    InvalidHandle { handle: u16 },

    /// Unlock of an allocation whose lock count is zero
    #[error("handle 0x{handle:04x} is not locked")]
    NotLocked { handle: u16 },

    /// The global allocation already carries a local heap
    #[error("selector 0x{selector:04x} already has a local heap")]
    LocalHeapExists { selector: u16 },

    /// The global allocation has no local heap
    #[error("selector 0x{selector:04x} has no local heap")]
    NoLocalHeap { selector: u16 },

    /// Address spaces only ever grow
    #[error("cannot shrink address space from {current} to {requested}")]
    ShrinkNotSupported { current: usize, requested: usize },

    /// Every selector slot is in use
    #[error("no run of {pages} free selector(s)")]
    SelectorsExhausted { pages: usize },

    /// Heap geometry rejected at construction
    #[error("invalid heap configuration: {0}")]
    InvalidConfig(String),
}

impl HeapError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        HeapError::InvalidConfig(msg.into())
    }
}

/// Access fault raised by the memory bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// Selector does not map to any allocation
    #[error("segment not present: selector 0x{selector:04x}")]
    SegmentNotPresent { selector: u16 },

    /// Offset outside the segment, or a write to a code/read-only segment
    #[error("general protection fault at {selector:04x}:{offset:04x} (write: {write})")]
    GeneralProtection {
        selector: u16,
        offset: u16,
        write: bool,
    },
}

impl Fault {
    /// The selector that faulted
    pub fn selector(&self) -> u16 {
        match self {
            Fault::SegmentNotPresent { selector } => *selector,
            Fault::GeneralProtection { selector, .. } => *selector,
        }
    }
}
