// Constants for the segmented heap

/// Bytes addressable through one selector
pub const PAGE_SIZE: usize = 0x1_0000;

/// Global allocations are rounded up to this many bytes
pub const GLOBAL_GRANULE: usize = 32;

/// Total number of selectors (13 bits of selector index)
pub const SELECTOR_COUNT: usize = 8192;

/// Selector slots reserved at startup, so the first real selector is 0x100
pub const RESERVED_SELECTORS: usize = 32;

/// Low selector bits: table indicator and privilege level
pub const SELECTOR_TAG_BITS: u32 = 3;
pub const SELECTOR_TAG_CODE: u16 = 0x02;
pub const SELECTOR_TAG_DATA: u16 = 0x03;

/// Local heaps never allocate below this offset (0 is the null handle)
pub const LOCAL_DEFAULT_BASE: u16 = 16;

/// Handle slots carved per handle-table block
pub const HANDLES_PER_BLOCK: usize = 32;

/// Size of one handle slot in bytes
pub const HANDLE_SLOT_SIZE: usize = 2;

/// Smallest local allocation
pub const LOCAL_MIN_ALLOC: usize = 8;

/// Local allocation granularity
pub const LOCAL_GRANULE: usize = 4;

/// Extra bytes requested when growing a local heap for a new handle block
pub const LOCAL_HANDLE_GROW_SLACK: usize = 1024;

// GlobalAlloc flags
pub const GMEM_MOVEABLE: u16 = 0x0002;
pub const GMEM_ZEROINIT: u16 = 0x0040;

// LocalAlloc flags
pub const LMEM_FIXED: u16 = 0x0000;
pub const LMEM_MOVEABLE: u16 = 0x0002;
pub const LMEM_NOCOMPACT: u16 = 0x0010;
pub const LMEM_ZEROINIT: u16 = 0x0040;
