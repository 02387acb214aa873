//! Byte-fidelity checking heap
//!
//! [`TestHeap`] drives a bare [`RangeAllocator`] over a plain byte buffer and
//! fills every allocation with a pattern derived from its id. Any relocation
//! that loses, overlaps or misplaces bytes shows up as a pattern mismatch.

use crate::memory::constants::PAGE_SIZE;
use crate::memory::range::{MoveListener, Range, RangeAllocator, RangeId};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

/// A broken invariant found while verifying a [`TestHeap`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptionError {
    #[error("allocation #{id} byte {index} at {position}: expected 0x{expected:02x}, found 0x{found:02x}")]
    ByteMismatch {
        id: u32,
        index: usize,
        position: usize,
        expected: u8,
        found: u8,
    },

    #[error("allocation #{id} recorded at {recorded} but the allocator has it at {actual}")]
    PositionMismatch {
        id: u32,
        recorded: usize,
        actual: usize,
    },

    #[error("allocation #{id} has size {actual}, expected {expected}")]
    SizeMismatch {
        id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("allocation #{id} is missing from the allocator")]
    Lost { id: u32 },

    #[error("layout check failed: {0}")]
    Layout(String),
}

/// The fill byte of allocation `id` at offset `index`
pub fn pattern_byte(id: u32, index: usize) -> u8 {
    (id as usize).wrapping_add(index) as u8
}

/// What the harness believes about one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestAllocation {
    pub id: u32,
    pub position: usize,
    pub size: usize,
    pub movable: bool,
    pub locked: bool,
    range: RangeId,
}

/// Listener over the test buffer; keeps recorded positions in step with moves
struct Backing<'a> {
    buffer: &'a mut [u8],
    allocations: &'a mut FxHashMap<u32, TestAllocation>,
}

impl Backing<'_> {
    fn relocated(&mut self, range: &Range<u32>, new_position: usize) {
        if let Some(allocation) = self.allocations.get_mut(range.owner()) {
            allocation.position = new_position;
        }
    }
}

impl MoveListener<u32> for Backing<'_> {
    type Snapshot = Vec<u8>;

    fn save(&mut self, range: &Range<u32>) -> Vec<u8> {
        self.buffer[range.position()..range.end()].to_vec()
    }

    fn load(&mut self, range: &Range<u32>, snapshot: Vec<u8>) {
        let len = snapshot.len().min(range.size());
        self.buffer[range.position()..range.position() + len].copy_from_slice(&snapshot[..len]);
        self.relocated(range, range.position());
    }

    fn move_to(&mut self, range: &Range<u32>, new_position: usize) {
        debug_assert_eq!(
            self.allocations.get(range.owner()).map(|a| a.position),
            Some(range.position()),
            "moved allocation was not where the harness left it"
        );
        self.buffer
            .copy_within(range.position()..range.end(), new_position);
        self.relocated(range, new_position);
    }
}

/// Range allocator plus a patterned byte buffer
#[derive(Debug, Clone)]
pub struct TestHeap {
    allocator: RangeAllocator<u32>,
    buffer: Vec<u8>,
    allocations: FxHashMap<u32, TestAllocation>,
    next_id: u32,
    max_size: usize,
}

impl TestHeap {
    /// A heap of `size` bytes that may grow up to 64 KiB
    pub fn new(size: usize) -> Self {
        Self::with_limit(size, PAGE_SIZE.max(size))
    }

    pub fn with_limit(size: usize, max_size: usize) -> Self {
        TestHeap {
            allocator: RangeAllocator::new(size),
            buffer: vec![0; size],
            allocations: FxHashMap::default(),
            next_id: 0,
            max_size: max_size.max(size),
        }
    }

    pub fn allocator(&self) -> &RangeAllocator<u32> {
        &self.allocator
    }

    pub fn address_space_size(&self) -> usize {
        self.allocator.address_space_size()
    }

    pub fn free_space(&self) -> usize {
        self.allocator.free_space()
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    pub fn free_region_count(&self) -> usize {
        self.allocator.free_region_count()
    }

    pub fn allocation(&self, id: u32) -> Option<&TestAllocation> {
        self.allocations.get(&id)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn split(&mut self) -> (&mut RangeAllocator<u32>, Backing<'_>) {
        (
            &mut self.allocator,
            Backing {
                buffer: &mut self.buffer,
                allocations: &mut self.allocations,
            },
        )
    }

    fn grow(&mut self, additional: usize) -> bool {
        let current = self.allocator.address_space_size();
        let target = current.saturating_add(additional).min(self.max_size);
        if target <= current || self.allocator.grow(target).is_err() {
            return false;
        }
        self.buffer.resize(target, 0);
        trace!(from = current, to = target, "grew test heap");
        true
    }

    fn fill(&mut self, id: u32, from: usize, to: usize) {
        let Some(position) = self.allocations.get(&id).map(|a| a.position) else {
            return;
        };
        for index in from..to {
            self.buffer[position + index] = pattern_byte(id, index);
        }
    }

    /// Allocate and fill; grows the heap once when full
    pub fn alloc(&mut self, size: usize, movable: bool, allow_defrag: bool) -> Option<u32> {
        let size = size.max(1);
        let id = self.next_id;

        let (allocator, mut backing) = self.split();
        let mut range = allocator.alloc(size, movable, allow_defrag, id, &mut backing);
        if range.is_none() && self.grow(size) {
            let (allocator, mut backing) = self.split();
            range = allocator.alloc(size, movable, allow_defrag, id, &mut backing);
        }
        let range = range?;
        let position = self.allocator.get(range).map(Range::position)?;

        self.next_id = self.next_id.wrapping_add(1);
        self.allocations.insert(
            id,
            TestAllocation {
                id,
                position,
                size,
                movable,
                locked: false,
                range,
            },
        );
        self.fill(id, 0, size);
        Some(id)
    }

    /// Resize; newly exposed bytes get the pattern
    pub fn realloc(&mut self, id: u32, new_size: usize, movable: bool, allow_defrag: bool) -> bool {
        let new_size = new_size.max(1);
        let Some((range, old_size)) = self.allocations.get(&id).map(|a| (a.range, a.size)) else {
            return false;
        };

        let (allocator, mut backing) = self.split();
        if !allocator.realloc(range, new_size, movable, allow_defrag, &mut backing) {
            return false;
        }

        let position = self.allocator.get(range).map_or(0, Range::position);
        if let Some(allocation) = self.allocations.get_mut(&id) {
            allocation.position = position;
            allocation.size = new_size;
            allocation.movable = movable;
        }
        if new_size > old_size {
            self.fill(id, old_size, new_size);
        }
        true
    }

    pub fn free(&mut self, id: u32) -> bool {
        match self.allocations.remove(&id) {
            Some(allocation) => self.allocator.free(allocation.range),
            None => false,
        }
    }

    pub fn lock(&mut self, id: u32) -> bool {
        match self.allocations.get_mut(&id) {
            Some(allocation) if self.allocator.lock(allocation.range) => {
                allocation.locked = true;
                true
            }
            _ => false,
        }
    }

    pub fn unlock(&mut self, id: u32) -> bool {
        match self.allocations.get_mut(&id) {
            Some(allocation) if self.allocator.unlock(allocation.range) => {
                allocation.locked = self
                    .allocator
                    .get(allocation.range)
                    .is_some_and(Range::is_locked);
                true
            }
            _ => false,
        }
    }

    pub fn defrag(&mut self) -> bool {
        let (allocator, mut backing) = self.split();
        allocator.defrag(&mut backing)
    }

    /// Check one allocation's placement and every byte of its pattern
    pub fn verify(&self, id: u32) -> Result<(), CorruptionError> {
        let allocation = self.allocations.get(&id).ok_or(CorruptionError::Lost { id })?;
        let range = self
            .allocator
            .get(allocation.range)
            .ok_or(CorruptionError::Lost { id })?;

        if range.position() != allocation.position {
            return Err(CorruptionError::PositionMismatch {
                id,
                recorded: allocation.position,
                actual: range.position(),
            });
        }
        if range.size() != allocation.size {
            return Err(CorruptionError::SizeMismatch {
                id,
                expected: allocation.size,
                actual: range.size(),
            });
        }

        let bytes = &self.buffer[range.position()..range.end()];
        match bytes
            .iter()
            .enumerate()
            .find(|&(index, &byte)| byte != pattern_byte(id, index))
        {
            Some((index, &found)) => Err(CorruptionError::ByteMismatch {
                id,
                index,
                position: range.position() + index,
                expected: pattern_byte(id, index),
                found,
            }),
            None => Ok(()),
        }
    }

    /// Check the allocator layout and every allocation
    pub fn verify_all(&self) -> Result<(), CorruptionError> {
        self.allocator.check().map_err(CorruptionError::Layout)?;
        if self.allocator.allocation_count() != self.allocations.len() {
            return Err(CorruptionError::Layout(format!(
                "allocator holds {} entries, harness tracks {}",
                self.allocator.allocation_count(),
                self.allocations.len()
            )));
        }
        let mut ids: Vec<u32> = self.allocations.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().try_for_each(|id| self.verify(id))
    }
}
