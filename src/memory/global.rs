//! Global (selector) heap
//!
//! The global heap hands out selectors. Its range allocator counts in selector
//! slots, one slot per 64 KiB page, and each allocated run of slots denotes one
//! [`Allocation`]: a byte buffer with flags, provenance and an optional
//! embedded [`LocalHeap`].
//!
//! # Selector Map
//!
//! ```text
//! 0x0000          null selector
//! 0x0008 - 0x00F8 reserved
//! 0x0100 - 0xFFF8 allocations (index << 3 | tag)
//! ```
//!
//! The low three bits of a selector carry the descriptor tag (`0x02` code,
//! `0x03` data); `selector >> 3` indexes the page map. Allocations larger than
//! one page take consecutive slots, all of which map back to the same record.
//!
//! Selectors themselves are allocated fixed and are never compacted.

use super::config::HeapConfig;
use super::constants::{PAGE_SIZE, SELECTOR_TAG_BITS, SELECTOR_TAG_CODE, SELECTOR_TAG_DATA};
use super::errors::{Fault, HeapError};
use super::local::{LocalHeap, LocalSegment};
use super::range::{MoveListener, Range, RangeAllocator, RangeId};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Owner tag of the reserved bottom slots
const RESERVED_KEY: u32 = u32::MAX;

/// The bytes behind a selector
#[derive(Debug, Clone)]
pub struct Allocation {
    pub flags: u16,
    buffer: Vec<u8>,
    local_heap: Option<LocalHeap>,
    filename: Option<String>,
    file_offset: u32,
}

impl Allocation {
    fn zeroed(bytes: usize, flags: u16) -> Self {
        Allocation::from_data(vec![0; bytes], flags)
    }

    fn from_data(buffer: Vec<u8>, flags: u16) -> Self {
        Allocation {
            flags,
            buffer,
            local_heap: None,
            filename: None,
            file_offset: 0,
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn local_heap(&self) -> Option<&LocalHeap> {
        self.local_heap.as_ref()
    }

    /// File and offset the bytes were loaded from, for diagnostics
    pub fn file_source(&self) -> Option<(&str, u32)> {
        self.filename
            .as_deref()
            .map(|name| (name, self.file_offset))
    }
}

/// One selector record, owned at the first page of its run
#[derive(Debug, Clone)]
pub struct Selector {
    pub name: String,
    selector_index: u16,
    pages: usize,
    range: RangeId,
    allocation: Option<Allocation>,
    is_code: bool,
    read_only: bool,
}

impl Selector {
    /// The selector value: index in the high 13 bits, descriptor tag below
    pub fn selector(&self) -> u16 {
        let tag = if self.is_code {
            SELECTOR_TAG_CODE
        } else {
            SELECTOR_TAG_DATA
        };
        (self.selector_index << SELECTOR_TAG_BITS) | tag
    }

    pub fn selector_index(&self) -> u16 {
        self.selector_index
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_code(&self) -> bool {
        self.is_code
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    /// Byte offset of `selector:offset` relative to the start of this record
    fn linear_offset(&self, selector: u16, offset: u16) -> usize {
        let page = (selector >> SELECTOR_TAG_BITS) - self.selector_index;
        ((page as usize) << 16) | offset as usize
    }
}

/// Page map plus selector records; follows selector relocations
#[derive(Debug, Clone, Default)]
struct SelectorTable {
    page_map: Vec<Option<u32>>,
    records: FxHashMap<u32, Selector>,
    next_key: u32,
}

impl SelectorTable {
    fn key_of(&self, selector: u16) -> Option<u32> {
        self.page_map
            .get((selector >> SELECTOR_TAG_BITS) as usize)
            .copied()
            .flatten()
    }

    fn get(&self, selector: u16) -> Option<&Selector> {
        let key = self.key_of(selector)?;
        self.records.get(&key)
    }

    fn get_mut(&mut self, selector: u16) -> Option<&mut Selector> {
        let key = self.key_of(selector)?;
        self.records.get_mut(&key)
    }

    fn map_pages(&mut self, start: usize, pages: usize, key: Option<u32>) {
        for slot in &mut self.page_map[start..start + pages] {
            *slot = key;
        }
    }
}

impl MoveListener<u32> for SelectorTable {
    type Snapshot = Option<Selector>;

    fn save(&mut self, range: &Range<u32>) -> Option<Selector> {
        self.map_pages(range.position(), range.size(), None);
        self.records.remove(range.owner())
    }

    fn load(&mut self, range: &Range<u32>, snapshot: Option<Selector>) {
        if let Some(mut record) = snapshot {
            record.selector_index = range.position() as u16;
            record.pages = range.size();
            self.records.insert(*range.owner(), record);
            self.map_pages(range.position(), range.size(), Some(*range.owner()));
        }
    }

    fn move_to(&mut self, range: &Range<u32>, new_position: usize) {
        let key = *range.owner();
        self.map_pages(range.position(), range.size(), None);
        self.map_pages(new_position, range.size(), Some(key));
        if let Some(record) = self.records.get_mut(&key) {
            record.selector_index = new_position as u16;
        }
    }
}

/// Byte-level access used by the CPU emulator
///
/// Faults are returned, never swallowed: a missing selector is
/// [`Fault::SegmentNotPresent`], an offset outside the segment or a write to a
/// code/read-only segment is [`Fault::GeneralProtection`].
pub trait MemoryBus {
    fn read_byte(&self, selector: u16, offset: u16) -> Result<u8, Fault>;

    fn write_byte(&mut self, selector: u16, offset: u16, value: u8) -> Result<(), Fault>;

    fn is_executable_selector(&self, selector: u16) -> bool;

    /// Little-endian word read
    fn read_word(&self, selector: u16, offset: u16) -> Result<u16, Fault> {
        let lo = self.read_byte(selector, offset)?;
        let hi = self.read_byte(selector, offset.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Little-endian word write
    fn write_word(&mut self, selector: u16, offset: u16, value: u16) -> Result<(), Fault> {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(selector, offset, lo)?;
        self.write_byte(selector, offset.wrapping_add(1), hi)
    }
}

/// The global heap
#[derive(Debug, Clone)]
pub struct GlobalHeap {
    config: HeapConfig,
    allocator: RangeAllocator<u32>,
    table: SelectorTable,
}

impl GlobalHeap {
    /// Create a heap with the standard 8192-selector geometry
    pub fn new() -> Self {
        Self::build(HeapConfig::default())
    }

    /// Create a heap with custom geometry
    pub fn with_config(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: HeapConfig) -> Self {
        let mut heap = GlobalHeap {
            allocator: RangeAllocator::new(config.selector_count),
            table: SelectorTable {
                page_map: vec![None; config.selector_count],
                ..SelectorTable::default()
            },
            config,
        };

        // Keep the low selectors out of circulation
        if heap.config.reserved_selectors > 0 {
            let reserved = heap.config.reserved_selectors;
            let _ = heap
                .allocator
                .alloc(reserved, false, false, RESERVED_KEY, &mut heap.table);
        }
        heap
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Reserve `pages` consecutive selectors with no bytes attached
    pub fn alloc_selector(&mut self, name: &str, pages: usize) -> Result<u16, HeapError> {
        let key = self.table.next_key;
        let range = self
            .allocator
            .alloc(pages, false, false, key, &mut self.table)
            .ok_or(HeapError::SelectorsExhausted { pages })?;
        self.table.next_key = self.table.next_key.wrapping_add(1);

        let selector_index = match self.allocator.get(range) {
            Some(r) => r.position(),
            None => unreachable!("fresh selector range vanished"),
        };
        self.table.map_pages(selector_index, pages.max(1), Some(key));

        let record = Selector {
            name: name.to_string(),
            selector_index: selector_index as u16,
            pages: pages.max(1),
            range,
            allocation: None,
            is_code: false,
            read_only: false,
        };
        let selector = record.selector();
        self.table.records.insert(key, record);

        debug!(
            selector = format_args!("0x{:04X}", selector),
            pages, name, "allocated selector"
        );
        Ok(selector)
    }

    /// Release a selector and every page slot of its run
    pub fn free_selector(&mut self, selector: u16) -> Result<(), HeapError> {
        let key = self
            .table
            .key_of(selector)
            .ok_or(HeapError::InvalidHandle { handle: selector })?;
        let Some(record) = self.table.records.remove(&key) else {
            return Err(HeapError::InvalidHandle { handle: selector });
        };

        self.allocator.free(record.range);
        self.table
            .map_pages(record.selector_index as usize, record.pages, None);

        debug!(
            selector = format_args!("0x{:04X}", record.selector()),
            pages = record.pages,
            "freed selector"
        );
        Ok(())
    }

    /// Allocate a zeroed block of `bytes` (rounded up to the granule)
    pub fn alloc(&mut self, name: &str, flags: u16, bytes: usize) -> Result<u16, HeapError> {
        let bytes = self.rounded(bytes)?;
        self.attach(name, Allocation::zeroed(bytes, flags))
    }

    /// Allocate a block holding pre-loaded data, e.g. a resource
    pub fn alloc_data(&mut self, name: &str, flags: u16, data: Vec<u8>) -> Result<u16, HeapError> {
        self.attach(name, Allocation::from_data(data, flags))
    }

    /// Granule-rounded size, or out of memory when it overflows
    fn rounded(&self, bytes: usize) -> Result<usize, HeapError> {
        self.config
            .round_size(bytes)
            .ok_or_else(|| HeapError::OutOfMemory {
                requested: bytes,
                available: self.free_space(),
            })
    }

    fn attach(&mut self, name: &str, allocation: Allocation) -> Result<u16, HeapError> {
        let bytes = self.rounded(allocation.len())?;
        if bytes > self.config.max_allocation_size() {
            return Err(HeapError::OutOfMemory {
                requested: bytes,
                available: self.free_space(),
            });
        }

        let pages = self.config.pages_for(bytes);
        let selector = self.alloc_selector(name, pages)?;
        if let Some(record) = self.table.get_mut(selector) {
            record.allocation = Some(allocation);
        }
        Ok(selector)
    }

    /// Resize a block
    ///
    /// When the old and new sizes both fit one page the bytes are resized in
    /// place and `handle` itself is returned. Otherwise a new block is made,
    /// the common prefix copied, the old block freed and the new handle
    /// returned.
    pub fn realloc(&mut self, handle: u16, new_size: usize, flags: u16) -> Result<u16, HeapError> {
        let new_size = self.rounded(new_size)?;

        let record = self
            .table
            .get_mut(handle)
            .ok_or(HeapError::InvalidHandle { handle })?;
        let allocation = record
            .allocation
            .as_mut()
            .ok_or(HeapError::InvalidHandle { handle })?;

        if new_size <= PAGE_SIZE && allocation.len() <= PAGE_SIZE {
            let floor = local_floor(&self.config, allocation);
            allocation.buffer.resize(new_size.max(floor), 0);
            allocation.flags = flags;
            return Ok(handle);
        }

        let name = record.name.clone();
        let (is_code, read_only) = (record.is_code, record.read_only);
        let new_handle = match self.alloc(&name, flags, new_size) {
            Ok(new_handle) => new_handle,
            Err(e) => {
                warn!(
                    handle = format_args!("0x{:04X}", handle),
                    new_size, "global realloc failed: {}", e
                );
                return Err(e);
            }
        };

        let mut old = match self.table.get_mut(handle).and_then(|r| r.allocation.take()) {
            Some(old) => old,
            None => unreachable!("source allocation vanished during realloc"),
        };
        if let Some(record) = self.table.get_mut(new_handle) {
            if let Some(fresh) = record.allocation.as_mut() {
                let floor = local_floor(&self.config, &old);
                if fresh.buffer.len() < floor {
                    fresh.buffer.resize(floor, 0);
                }
                let common = old.buffer.len().min(fresh.buffer.len());
                fresh.buffer[..common].copy_from_slice(&old.buffer[..common]);
                fresh.local_heap = old.local_heap.take();
                fresh.filename = old.filename.take();
                fresh.file_offset = old.file_offset;
            }
            record.is_code = is_code;
            record.read_only = read_only;
        }
        self.free_selector(handle)?;

        Ok(self
            .table
            .get(new_handle)
            .map(Selector::selector)
            .unwrap_or(new_handle))
    }

    /// Free a block
    pub fn free(&mut self, handle: u16) -> Result<(), HeapError> {
        if self.allocation(handle).is_none() {
            return Err(HeapError::InvalidHandle { handle });
        }
        self.free_selector(handle)
    }

    /// Current size of a block in bytes
    pub fn size(&self, handle: u16) -> Option<usize> {
        self.allocation(handle).map(Allocation::len)
    }

    /// The record a selector (or any page of a multi-page run) belongs to
    pub fn selector(&self, handle: u16) -> Option<&Selector> {
        self.table.get(handle)
    }

    pub fn allocation(&self, handle: u16) -> Option<&Allocation> {
        self.table.get(handle).and_then(|r| r.allocation.as_ref())
    }

    /// Mark a selector as code and/or read-only; returns the retagged selector
    pub fn set_selector_attributes(
        &mut self,
        handle: u16,
        code: bool,
        read_only: bool,
    ) -> Result<u16, HeapError> {
        let record = self
            .table
            .get_mut(handle)
            .ok_or(HeapError::InvalidHandle { handle })?;
        record.is_code = code;
        record.read_only = read_only;
        Ok(record.selector())
    }

    /// Record where a block was loaded from
    pub fn set_file_source(&mut self, handle: u16, filename: &str, offset: u32) -> Result<(), HeapError> {
        let allocation = self
            .table
            .get_mut(handle)
            .and_then(|r| r.allocation.as_mut())
            .ok_or(HeapError::InvalidHandle { handle })?;
        allocation.filename = Some(filename.to_string());
        allocation.file_offset = offset;
        Ok(())
    }

    /// Free bytes across all unused selectors
    pub fn free_space(&self) -> usize {
        self.allocator.free_space() * PAGE_SIZE
    }

    /// Largest run of unused selectors, in bytes
    pub fn largest_free_space(&self) -> usize {
        self.allocator.largest_free_space() * PAGE_SIZE
    }

    /// Every live selector once, in index order
    pub fn selectors(&self) -> impl Iterator<Item = &Selector> + '_ {
        self.allocator
            .allocations()
            .filter_map(move |(_, range)| self.table.records.get(range.owner()))
    }

    pub fn buffer(&self, handle: u16) -> Option<&[u8]> {
        self.allocation(handle).map(Allocation::buffer)
    }

    pub fn buffer_mut(&mut self, handle: u16) -> Option<&mut [u8]> {
        self.table
            .get_mut(handle)
            .and_then(|r| r.allocation.as_mut())
            .map(|a| a.buffer.as_mut_slice())
    }

    /// Split a `selector:offset` far pointer into its record and byte offset
    pub fn resolve(&self, far_ptr: u32) -> Result<(&Selector, usize), Fault> {
        let selector = (far_ptr >> 16) as u16;
        let offset = far_ptr as u16;
        let record = self
            .table
            .get(selector)
            .filter(|r| r.allocation.is_some())
            .ok_or(Fault::SegmentNotPresent { selector })?;
        Ok((record, record.linear_offset(selector, offset)))
    }

    /// The buffer a far pointer lands in, and the offset within it
    pub fn buffer_at(&self, far_ptr: u32) -> Result<(&[u8], usize), Fault> {
        let (record, offset) = self.resolve(far_ptr)?;
        match record.allocation.as_ref() {
            Some(allocation) => Ok((&allocation.buffer, offset)),
            None => Err(Fault::SegmentNotPresent {
                selector: (far_ptr >> 16) as u16,
            }),
        }
    }

    /// Attach a local heap to an existing block
    pub fn create_local_heap(
        &mut self,
        handle: u16,
        base_offset: u16,
        max_size: u16,
    ) -> Result<LocalSegment<'_>, HeapError> {
        let allocation = self
            .table
            .get_mut(handle)
            .and_then(|r| r.allocation.as_mut())
            .ok_or(HeapError::InvalidHandle { handle })?;
        if allocation.local_heap.is_some() {
            return Err(HeapError::LocalHeapExists { selector: handle });
        }

        let Allocation {
            buffer, local_heap, ..
        } = allocation;
        let heap = local_heap.insert(LocalHeap::new(buffer, base_offset, max_size)?);
        Ok(LocalSegment::new(heap, buffer))
    }

    /// Allocate a fresh block and give it a local heap; returns the block
    pub fn create_local_heap_named(&mut self, name: &str, max_size: u16) -> Result<u16, HeapError> {
        let bytes = if max_size == 0 {
            PAGE_SIZE
        } else {
            max_size as usize
        };
        let handle = self.alloc(name, 0, bytes)?;
        let created = self.create_local_heap(handle, 0, max_size).map(|_| ());
        if let Err(e) = created {
            let _ = self.free(handle);
            return Err(e);
        }
        Ok(handle)
    }

    pub fn has_local_heap(&self, handle: u16) -> bool {
        self.allocation(handle)
            .is_some_and(|a| a.local_heap.is_some())
    }

    /// The local heap of a block
    pub fn local_heap(&mut self, handle: u16) -> Result<LocalSegment<'_>, HeapError> {
        let allocation = self
            .table
            .get_mut(handle)
            .and_then(|r| r.allocation.as_mut())
            .ok_or(HeapError::InvalidHandle { handle })?;
        let Allocation {
            buffer, local_heap, ..
        } = allocation;
        let heap = local_heap
            .as_mut()
            .ok_or(HeapError::NoLocalHeap { selector: handle })?;
        Ok(LocalSegment::new(heap, buffer))
    }

    /// The local heap of a block, created on first use
    pub fn local_heap_or_create(&mut self, handle: u16) -> Result<LocalSegment<'_>, HeapError> {
        if !self.has_local_heap(handle) {
            return self.create_local_heap(handle, 0, 0);
        }
        self.local_heap(handle)
    }
}

impl Default for GlobalHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for GlobalHeap {
    fn read_byte(&self, selector: u16, offset: u16) -> Result<u8, Fault> {
        let record = self
            .table
            .get(selector)
            .ok_or(Fault::SegmentNotPresent { selector })?;
        let allocation = record
            .allocation
            .as_ref()
            .ok_or(Fault::SegmentNotPresent { selector })?;

        allocation
            .buffer
            .get(record.linear_offset(selector, offset))
            .copied()
            .ok_or(Fault::GeneralProtection {
                selector,
                offset,
                write: false,
            })
    }

    fn write_byte(&mut self, selector: u16, offset: u16, value: u8) -> Result<(), Fault> {
        let record = self
            .table
            .get_mut(selector)
            .ok_or(Fault::SegmentNotPresent { selector })?;
        let gp = Fault::GeneralProtection {
            selector,
            offset,
            write: true,
        };
        if record.read_only || record.is_code {
            return Err(gp);
        }

        let index = record.linear_offset(selector, offset);
        let allocation = record
            .allocation
            .as_mut()
            .ok_or(Fault::SegmentNotPresent { selector })?;
        let byte = allocation.buffer.get_mut(index).ok_or(gp)?;
        *byte = value;
        Ok(())
    }

    fn is_executable_selector(&self, selector: u16) -> bool {
        self.table.get(selector).is_some_and(|r| r.is_code)
    }
}

/// Bytes a block must keep so its local heap stays addressable
fn local_floor(config: &HeapConfig, allocation: &Allocation) -> usize {
    let extent = allocation
        .local_heap
        .as_ref()
        .map_or(0, LocalHeap::address_space_size);
    // A local heap never exceeds one page, so rounding cannot overflow
    config.round_size(extent).unwrap_or(extent)
}
