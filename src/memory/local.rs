//! Local (sub-segment) heap
//!
//! A local heap subdivides the byte buffer of one global allocation. It runs a
//! [`RangeAllocator`] over byte offsets of that buffer and hands out 16-bit
//! values that are either a raw offset (fixed blocks) or a handle (movable
//! blocks).
//!
//! # Handles
//!
//! Handles live in handle-table blocks: fixed 64-byte ranges carved from the
//! same allocator, holding 32 two-byte slots. A handle is the offset of its
//! slot; the slot holds the little-endian offset of the block it names, and is
//! rewritten whenever that block moves.
//!
//! ```text
//! 0      16              80        88        96
//! [rsvd ][ handle table ][ block A ][ block B ]...
//!         |slot 16| -> 80
//!         |slot 18| -> 88
//! ```
//!
//! The heap does not own its bytes. Every operation that may move or grow
//! something takes the buffer explicitly; [`LocalSegment`] bundles the two for
//! callers that hold both.

use super::constants::{
    GLOBAL_GRANULE, HANDLES_PER_BLOCK, HANDLE_SLOT_SIZE, LMEM_MOVEABLE, LMEM_NOCOMPACT,
    LMEM_ZEROINIT, LOCAL_DEFAULT_BASE, LOCAL_GRANULE, LOCAL_HANDLE_GROW_SLACK, LOCAL_MIN_ALLOC,
    PAGE_SIZE,
};
use super::errors::HeapError;
use super::range::{MoveListener, Range, RangeAllocator, RangeId, Span};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// How a caller refers to a local block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKey {
    /// Movable block, named by the offset of its handle slot
    Handle(u16),
    /// Fixed block, named by its own offset
    Offset(u16),
}

impl LocalKey {
    /// The 16-bit value handed back to callers
    pub fn value(self) -> u16 {
        match self {
            LocalKey::Handle(value) | LocalKey::Offset(value) => value,
        }
    }
}

/// Owner tag of each range in a local heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOwner {
    /// The bytes below the base offset
    Reserved,
    /// A block of handle slots
    HandleTable,
    Fixed,
    Movable { handle: u16 },
}

/// Round a requested length to the local allocation grid
fn round_local(len: usize) -> Option<usize> {
    if len < LOCAL_MIN_ALLOC {
        Some(LOCAL_MIN_ALLOC)
    } else {
        Some(len.checked_add(LOCAL_GRANULE - 1)? & !(LOCAL_GRANULE - 1))
    }
}

fn write_slot(buffer: &mut [u8], handle: u16, position: usize) {
    let at = handle as usize;
    buffer[at..at + HANDLE_SLOT_SIZE].copy_from_slice(&(position as u16).to_le_bytes());
}

fn read_slot(buffer: &[u8], handle: u16) -> Option<u16> {
    let at = handle as usize;
    let bytes = buffer.get(at..at + HANDLE_SLOT_SIZE)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Moves block bytes inside the segment buffer and keeps handle slots current
struct SegmentMover<'a> {
    buffer: &'a mut [u8],
}

impl<'a> SegmentMover<'a> {
    fn new(buffer: &'a mut [u8]) -> Self {
        SegmentMover { buffer }
    }
}

impl MoveListener<LocalOwner> for SegmentMover<'_> {
    type Snapshot = Vec<u8>;

    fn save(&mut self, range: &Range<LocalOwner>) -> Vec<u8> {
        self.buffer[range.position()..range.end()].to_vec()
    }

    fn load(&mut self, range: &Range<LocalOwner>, snapshot: Vec<u8>) {
        let len = snapshot.len().min(range.size());
        self.buffer[range.position()..range.position() + len].copy_from_slice(&snapshot[..len]);
        if let LocalOwner::Movable { handle } = *range.owner() {
            write_slot(self.buffer, handle, range.position());
        }
    }

    fn move_to(&mut self, range: &Range<LocalOwner>, new_position: usize) {
        self.buffer
            .copy_within(range.position()..range.end(), new_position);
        if let LocalOwner::Movable { handle } = *range.owner() {
            write_slot(self.buffer, handle, new_position);
        }
    }
}

/// Allocator state of one local heap
#[derive(Debug, Clone)]
pub struct LocalHeap {
    allocator: RangeAllocator<LocalOwner>,
    base_offset: u16,
    max_limit: usize,
    free_handles: VecDeque<u16>,
    blocks: FxHashMap<LocalKey, RangeId>,
}

impl LocalHeap {
    /// Create a heap over `buffer`
    ///
    /// A base offset of 0 means 16, a max size of 0 means 64 KiB. The heap
    /// starts out covering `min(base + max_size, buffer.len())` bytes and may
    /// later grow the buffer up to `base + max_size`, never past 64 KiB.
    pub fn new(buffer: &mut Vec<u8>, base_offset: u16, max_size: u16) -> Result<Self, HeapError> {
        let base_offset = if base_offset == 0 {
            LOCAL_DEFAULT_BASE
        } else {
            base_offset
        };
        let base = base_offset as usize;
        let max = if max_size == 0 {
            PAGE_SIZE
        } else {
            max_size as usize
        };

        let max_limit = (base + max).min(PAGE_SIZE).max(base);
        let limit = (base + max).min(buffer.len()).min(max_limit).max(base);
        if buffer.len() < limit {
            buffer.resize(limit, 0);
        }

        let mut heap = LocalHeap {
            allocator: RangeAllocator::new(limit),
            base_offset,
            max_limit,
            free_handles: VecDeque::new(),
            blocks: FxHashMap::default(),
        };
        heap.allocator
            .alloc(
                base,
                false,
                false,
                LocalOwner::Reserved,
                &mut SegmentMover::new(buffer),
            )
            .ok_or(HeapError::OutOfMemory {
                requested: base,
                available: limit,
            })?;

        debug!(base, limit, max_limit, "created local heap");
        Ok(heap)
    }

    pub fn base_offset(&self) -> u16 {
        self.base_offset
    }

    /// Bytes currently managed, reserved base included
    pub fn address_space_size(&self) -> usize {
        self.allocator.address_space_size()
    }

    /// Managed bytes above the base offset
    pub fn heap_size(&self) -> usize {
        self.allocator.address_space_size() - self.base_offset as usize
    }

    pub fn free_space(&self) -> usize {
        self.allocator.free_space()
    }

    pub fn largest_free_space(&self) -> usize {
        self.allocator.largest_free_space()
    }

    /// Number of caller-visible blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Handle slots waiting to be reused
    pub fn free_handle_count(&self) -> usize {
        self.free_handles.len()
    }

    /// Full layout, including handle tables and the reserved base
    pub fn spans(&self) -> Vec<Span<'_, LocalOwner>> {
        self.allocator.spans()
    }

    fn lookup(&self, handle: u16) -> Option<(LocalKey, RangeId)> {
        [LocalKey::Handle(handle), LocalKey::Offset(handle)]
            .into_iter()
            .find_map(|key| self.blocks.get(&key).map(|&id| (key, id)))
    }

    fn range(&self, handle: u16) -> Result<(LocalKey, RangeId, &Range<LocalOwner>), HeapError> {
        self.lookup(handle)
            .and_then(|(key, id)| self.allocator.get(id).map(|range| (key, id, range)))
            .ok_or(HeapError::InvalidHandle { handle })
    }

    fn out_of_memory(&self, requested: usize) -> HeapError {
        HeapError::OutOfMemory {
            requested,
            available: self.allocator.free_space(),
        }
    }

    /// Whether `needed` more bytes could ever be found, growing to the cap
    fn within_reach(&self, needed: usize) -> bool {
        let headroom = self.max_limit - self.allocator.address_space_size();
        needed <= self.allocator.free_space() + headroom
    }

    /// Extend the heap by up to `additional` bytes, growing the buffer to match
    fn grow(&mut self, buffer: &mut Vec<u8>, additional: usize) -> bool {
        let current = self.allocator.address_space_size();
        let target = current.saturating_add(additional).min(self.max_limit);
        if target <= current {
            return false;
        }

        let bytes = (target + GLOBAL_GRANULE - 1) & !(GLOBAL_GRANULE - 1);
        if buffer.len() < bytes {
            buffer.resize(bytes, 0);
        }
        if self.allocator.grow(target).is_err() {
            return false;
        }
        debug!(from = current, to = target, "grew local heap");
        true
    }

    /// Take a handle slot, carving a new handle table if the pool is empty
    fn alloc_handle(&mut self, buffer: &mut Vec<u8>, grow_hint: usize) -> Result<u16, HeapError> {
        if self.free_handles.is_empty() {
            let table_size = HANDLES_PER_BLOCK * HANDLE_SLOT_SIZE;
            let mut id = self.allocator.alloc(
                table_size,
                false,
                true,
                LocalOwner::HandleTable,
                &mut SegmentMover::new(buffer),
            );
            let hint = grow_hint.saturating_add(table_size + LOCAL_HANDLE_GROW_SLACK);
            if id.is_none() && self.within_reach(table_size) && self.grow(buffer, hint) {
                id = self.allocator.alloc(
                    table_size,
                    false,
                    true,
                    LocalOwner::HandleTable,
                    &mut SegmentMover::new(buffer),
                );
            }
            let position = id
                .and_then(|id| self.allocator.get(id))
                .map(Range::position)
                .ok_or_else(|| self.out_of_memory(table_size))?;

            self.free_handles.extend(
                (0..HANDLES_PER_BLOCK).map(|i| (position + i * HANDLE_SLOT_SIZE) as u16),
            );
            trace!(position, "carved handle table");
        }

        self.free_handles
            .pop_front()
            .ok_or_else(|| self.out_of_memory(HANDLE_SLOT_SIZE))
    }

    fn place(
        &mut self,
        buffer: &mut Vec<u8>,
        size: usize,
        movable: bool,
        allow_defrag: bool,
        owner: LocalOwner,
    ) -> Option<RangeId> {
        let id = self.allocator.alloc(
            size,
            movable,
            allow_defrag,
            owner,
            &mut SegmentMover::new(buffer),
        );
        if id.is_some() || !self.within_reach(size) || !self.grow(buffer, size) {
            return id;
        }
        self.allocator.alloc(
            size,
            movable,
            allow_defrag,
            owner,
            &mut SegmentMover::new(buffer),
        )
    }

    fn resize(
        &mut self,
        buffer: &mut Vec<u8>,
        id: RangeId,
        size: usize,
        movable: bool,
        allow_defrag: bool,
    ) -> bool {
        if self.allocator.realloc(
            id,
            size,
            movable,
            allow_defrag,
            &mut SegmentMover::new(buffer),
        ) {
            return true;
        }
        let old_size = self.allocator.get(id).map_or(0, Range::size);
        self.within_reach(size.saturating_sub(old_size))
            && self.grow(buffer, size)
            && self.allocator.realloc(
                id,
                size,
                movable,
                allow_defrag,
                &mut SegmentMover::new(buffer),
            )
    }

    /// Allocate a block; returns a handle for movable blocks, else the offset
    ///
    /// Lengths below 8 become 8, others round up to 4. On exhaustion the heap
    /// grows once before giving up.
    pub fn alloc(&mut self, buffer: &mut Vec<u8>, flags: u16, len: usize) -> Result<u16, HeapError> {
        let size = round_local(len).ok_or_else(|| self.out_of_memory(len))?;
        let movable = flags & LMEM_MOVEABLE != 0;
        let allow_defrag = flags & LMEM_NOCOMPACT == 0;

        let handle = if movable {
            Some(self.alloc_handle(buffer, size)?)
        } else {
            None
        };
        let owner = match handle {
            Some(handle) => LocalOwner::Movable { handle },
            None => LocalOwner::Fixed,
        };

        let Some(id) = self.place(buffer, size, movable, allow_defrag, owner) else {
            if let Some(handle) = handle {
                self.free_handles.push_back(handle);
            }
            return Err(self.out_of_memory(size));
        };

        let position = self.allocator.get(id).map_or(0, Range::position);
        let key = match handle {
            Some(handle) => {
                write_slot(buffer, handle, position);
                LocalKey::Handle(handle)
            }
            None => LocalKey::Offset(position as u16),
        };
        self.blocks.insert(key, id);

        if flags & LMEM_ZEROINIT != 0 {
            buffer[position..position + size].fill(0);
        }
        Ok(key.value())
    }

    /// Resize a block, possibly switching it between movable and fixed
    ///
    /// Returns the value that now names the block: the old handle, a fresh
    /// handle when it became movable, or its offset when it became fixed.
    pub fn realloc(
        &mut self,
        buffer: &mut Vec<u8>,
        handle: u16,
        new_size: usize,
        flags: u16,
    ) -> Result<u16, HeapError> {
        let (key, id, range) = self.range(handle)?;
        let old_size = range.size();
        let new_size = round_local(new_size).ok_or_else(|| self.out_of_memory(new_size))?;
        let movable = flags & LMEM_MOVEABLE != 0;
        let allow_defrag = flags & LMEM_NOCOMPACT == 0;

        let fresh_handle = match key {
            LocalKey::Offset(_) if movable => Some(self.alloc_handle(buffer, new_size)?),
            _ => None,
        };

        if !self.resize(buffer, id, new_size, movable, allow_defrag) {
            if let Some(fresh) = fresh_handle {
                self.free_handles.push_back(fresh);
            }
            return Err(self.out_of_memory(new_size));
        }

        let position = self.allocator.get(id).map_or(0, Range::position);
        let new_key = match (key, fresh_handle) {
            (_, Some(fresh)) => {
                self.allocator
                    .set_owner(id, LocalOwner::Movable { handle: fresh });
                write_slot(buffer, fresh, position);
                LocalKey::Handle(fresh)
            }
            (LocalKey::Handle(old), None) if !movable => {
                self.allocator.set_owner(id, LocalOwner::Fixed);
                self.free_handles.push_back(old);
                LocalKey::Offset(position as u16)
            }
            (key, None) => key,
        };
        if new_key != key {
            self.blocks.remove(&key);
            self.blocks.insert(new_key, id);
        }

        if flags & LMEM_ZEROINIT != 0 && new_size > old_size {
            buffer[position + old_size..position + new_size].fill(0);
        }
        Ok(new_key.value())
    }

    /// Release a block and its handle
    pub fn free(&mut self, handle: u16) -> Result<(), HeapError> {
        let (key, id) = self
            .lookup(handle)
            .ok_or(HeapError::InvalidHandle { handle })?;
        self.blocks.remove(&key);
        if let LocalKey::Handle(slot) = key {
            self.free_handles.push_back(slot);
        }
        self.allocator.free(id);
        Ok(())
    }

    /// Pin a block; returns its current offset
    pub fn lock(&mut self, handle: u16) -> Result<u16, HeapError> {
        let (_, id, range) = self.range(handle)?;
        let position = range.position() as u16;
        self.allocator.lock(id);
        Ok(position)
    }

    pub fn unlock(&mut self, handle: u16) -> Result<(), HeapError> {
        let (_, id, _) = self.range(handle)?;
        if !self.allocator.unlock(id) {
            return Err(HeapError::NotLocked { handle });
        }
        Ok(())
    }

    pub fn lock_count(&self, handle: u16) -> Option<u32> {
        self.range(handle).ok().map(|(_, _, range)| range.lock_count())
    }

    /// Size of a block in bytes
    pub fn size(&self, handle: u16) -> Option<usize> {
        self.range(handle).ok().map(|(_, _, range)| range.size())
    }

    pub fn is_movable(&self, handle: u16) -> bool {
        matches!(self.lookup(handle), Some((LocalKey::Handle(_), _)))
    }

    /// Current offset of a block; movable blocks are read through their slot
    pub fn position(&self, buffer: &[u8], handle: u16) -> Option<u16> {
        match self.lookup(handle)? {
            (LocalKey::Handle(slot), _) => read_slot(buffer, slot),
            (LocalKey::Offset(offset), _) => Some(offset),
        }
    }

    /// Compact movable, unlocked blocks; returns whether anything moved
    pub fn defrag(&mut self, buffer: &mut [u8]) -> bool {
        self.allocator.defrag(&mut SegmentMover::new(buffer))
    }

    /// Verify the allocator layout and that every handle slot is current
    pub fn check(&self, buffer: &[u8]) -> Result<(), String> {
        self.allocator.check()?;
        for (&key, &id) in &self.blocks {
            let position = self
                .allocator
                .get(id)
                .map(Range::position)
                .ok_or_else(|| format!("{:?} refers to a freed range", key))?;
            let recorded = match key {
                LocalKey::Handle(slot) => read_slot(buffer, slot)
                    .ok_or_else(|| format!("handle slot 0x{:04x} outside buffer", slot))?,
                LocalKey::Offset(offset) => offset,
            };
            if recorded as usize != position {
                return Err(format!(
                    "{:?} records offset {} but block is at {}",
                    key, recorded, position
                ));
            }
        }
        Ok(())
    }
}

/// A local heap together with the buffer it lives in
pub struct LocalSegment<'a> {
    heap: &'a mut LocalHeap,
    buffer: &'a mut Vec<u8>,
}

impl<'a> LocalSegment<'a> {
    pub fn new(heap: &'a mut LocalHeap, buffer: &'a mut Vec<u8>) -> Self {
        LocalSegment { heap, buffer }
    }

    pub fn heap(&self) -> &LocalHeap {
        &self.heap
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn alloc(&mut self, flags: u16, len: usize) -> Result<u16, HeapError> {
        self.heap.alloc(self.buffer, flags, len)
    }

    pub fn realloc(&mut self, handle: u16, new_size: usize, flags: u16) -> Result<u16, HeapError> {
        self.heap.realloc(self.buffer, handle, new_size, flags)
    }

    pub fn free(&mut self, handle: u16) -> Result<(), HeapError> {
        self.heap.free(handle)
    }

    pub fn lock(&mut self, handle: u16) -> Result<u16, HeapError> {
        self.heap.lock(handle)
    }

    pub fn unlock(&mut self, handle: u16) -> Result<(), HeapError> {
        self.heap.unlock(handle)
    }

    pub fn size(&self, handle: u16) -> Option<usize> {
        self.heap.size(handle)
    }

    pub fn heap_size(&self) -> usize {
        self.heap.heap_size()
    }

    pub fn free_space(&self) -> usize {
        self.heap.free_space()
    }

    pub fn is_movable(&self, handle: u16) -> bool {
        self.heap.is_movable(handle)
    }

    pub fn position(&self, handle: u16) -> Option<u16> {
        self.heap.position(self.buffer.as_slice(), handle)
    }

    pub fn defrag(&mut self) -> bool {
        self.heap.defrag(self.buffer.as_mut_slice())
    }

    /// The bytes of a block at its current location
    pub fn bytes(&self, handle: u16) -> Option<&[u8]> {
        let (_, _, range) = self.heap.range(handle).ok()?;
        self.buffer.get(range.position()..range.end())
    }

    pub fn bytes_mut(&mut self, handle: u16) -> Option<&mut [u8]> {
        let (_, _, range) = self.heap.range(handle).ok()?;
        let span = range.position()..range.end();
        self.buffer.get_mut(span)
    }

    pub fn check(&self) -> Result<(), String> {
        self.heap.check(self.buffer.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::constants::LMEM_FIXED;

    fn heap_over(len: usize) -> (LocalHeap, Vec<u8>) {
        let mut buffer = vec![0; len];
        let heap = LocalHeap::new(&mut buffer, 0, 0).unwrap();
        (heap, buffer)
    }

    #[test]
    fn test_fixed_alloc_starts_at_base() {
        let (mut heap, mut buffer) = heap_over(256);
        let p = heap.alloc(&mut buffer, LMEM_FIXED, 10).unwrap();
        assert_eq!(p, 16);
        assert_eq!(heap.size(p), Some(12));
        assert!(!heap.is_movable(p));
        assert_eq!(heap.heap_size(), 240);
    }

    #[test]
    fn test_small_sizes_round_to_minimum() {
        let (mut heap, mut buffer) = heap_over(256);
        let a = heap.alloc(&mut buffer, LMEM_FIXED, 0).unwrap();
        let b = heap.alloc(&mut buffer, LMEM_FIXED, 9).unwrap();
        assert_eq!(heap.size(a), Some(8));
        assert_eq!(heap.size(b), Some(12));
    }

    #[test]
    fn test_movable_alloc_goes_through_handle_slot() {
        let (mut heap, mut buffer) = heap_over(256);
        let h = heap.alloc(&mut buffer, LMEM_MOVEABLE, 8).unwrap();
        // First handle table occupies 16..80
        assert_eq!(h, 16);
        assert_eq!(heap.position(&buffer, h), Some(80));
        assert_eq!(&buffer[16..18], &80u16.to_le_bytes());
        assert_eq!(heap.free_handle_count(), 31);
    }

    #[test]
    fn test_defrag_rewrites_handle_slot() {
        let (mut heap, mut buffer) = heap_over(256);
        let first = heap.alloc(&mut buffer, LMEM_MOVEABLE, 8).unwrap();
        let second = heap.alloc(&mut buffer, LMEM_MOVEABLE, 8).unwrap();
        let at = heap.position(&buffer, second).unwrap() as usize;
        buffer[at..at + 8].copy_from_slice(b"segments");

        heap.free(first).unwrap();
        assert!(heap.defrag(&mut buffer));

        let moved = heap.position(&buffer, second).unwrap() as usize;
        assert_eq!(moved, 80);
        assert_eq!(&buffer[moved..moved + 8], b"segments");
        heap.check(&buffer).unwrap();
    }

    #[test]
    fn test_locked_block_does_not_move() {
        let (mut heap, mut buffer) = heap_over(256);
        let first = heap.alloc(&mut buffer, LMEM_MOVEABLE, 8).unwrap();
        let second = heap.alloc(&mut buffer, LMEM_MOVEABLE, 8).unwrap();
        heap.free(first).unwrap();

        let pinned = heap.lock(second).unwrap();
        assert!(!heap.defrag(&mut buffer));
        assert_eq!(heap.position(&buffer, second), Some(pinned));

        heap.unlock(second).unwrap();
        assert!(matches!(
            heap.unlock(second),
            Err(HeapError::NotLocked { .. })
        ));
    }

    #[test]
    fn test_growth_extends_buffer() {
        let (mut heap, mut buffer) = heap_over(64);
        let p = heap.alloc(&mut buffer, LMEM_FIXED, 100).unwrap();
        assert_eq!(p, 16);
        assert_eq!(heap.address_space_size(), 164);
        assert_eq!(buffer.len(), 192);
    }

    #[test]
    fn test_growth_respects_max_size() {
        let mut buffer = vec![0; 64];
        let mut heap = LocalHeap::new(&mut buffer, 0, 64).unwrap();
        assert!(heap.alloc(&mut buffer, LMEM_FIXED, 48).is_ok());

        // 32 bytes can never fit under the 80-byte cap, so nothing grows
        assert!(matches!(
            heap.alloc(&mut buffer, LMEM_FIXED, 32),
            Err(HeapError::OutOfMemory { .. })
        ));
        assert_eq!(heap.address_space_size(), 64);
        assert_eq!(buffer.len(), 64);

        assert_eq!(heap.alloc(&mut buffer, LMEM_FIXED, 16).unwrap(), 64);
        assert_eq!(heap.address_space_size(), 80);
    }

    #[test]
    fn test_unrepresentable_length_rejected() {
        let (mut heap, mut buffer) = heap_over(256);
        assert!(matches!(
            heap.alloc(&mut buffer, LMEM_FIXED, usize::MAX),
            Err(HeapError::OutOfMemory { .. })
        ));
        let p = heap.alloc(&mut buffer, LMEM_FIXED, 8).unwrap();
        assert!(heap.realloc(&mut buffer, p, usize::MAX - 1, LMEM_FIXED).is_err());
        assert_eq!(heap.size(p), Some(8));
        assert_eq!(buffer.len(), 256);
    }

    #[test]
    fn test_fixed_to_movable_and_back() {
        let (mut heap, mut buffer) = heap_over(256);
        let p = heap.alloc(&mut buffer, LMEM_FIXED, 8).unwrap();
        assert_eq!(p, 16);

        let h = heap.realloc(&mut buffer, p, 8, LMEM_MOVEABLE).unwrap();
        assert_eq!(h, 24);
        assert!(heap.is_movable(h));
        assert_eq!(heap.position(&buffer, h), Some(16));
        assert!(heap.size(p).is_none());

        let back = heap.realloc(&mut buffer, h, 8, LMEM_FIXED).unwrap();
        assert_eq!(back, 16);
        assert!(!heap.is_movable(back));
        assert_eq!(heap.free_handle_count(), 32);
        heap.check(&buffer).unwrap();
    }

    #[test]
    fn test_zeroinit_clears_grown_tail() {
        let (mut heap, mut buffer) = heap_over(256);
        let p = heap.alloc(&mut buffer, LMEM_FIXED, 8).unwrap();
        buffer[16..64].fill(0xAA);

        heap.realloc(&mut buffer, p, 16, LMEM_ZEROINIT).unwrap();
        assert_eq!(&buffer[16..24], &[0xAA; 8]);
        assert_eq!(&buffer[24..32], &[0; 8]);
    }

    #[test]
    fn test_unknown_handle_rejected() {
        let (mut heap, mut buffer) = heap_over(256);
        assert!(matches!(
            heap.free(0x40),
            Err(HeapError::InvalidHandle { handle: 0x40 })
        ));
        assert!(heap.realloc(&mut buffer, 0, 8, LMEM_FIXED).is_err());
        assert!(heap.lock(0x22).is_err());
        assert_eq!(heap.size(0x22), None);
    }
}
