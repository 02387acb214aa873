//! Range allocator
//!
//! [`RangeAllocator`] does the free-space accounting for both heap layers. It
//! manages a linear space of `N` units (bytes for a local heap, selector slots
//! for the global heap) but owns none of the bytes. Each allocation carries an
//! offset, a length, movability flags, a lock count and an opaque owner tag.
//!
//! # Layout
//!
//! Allocated entries are kept sorted by position; free space is the
//! complement, so adjacent free regions are always coalesced.
//!
//! ```text
//! 0        10                260 261                 N
//! [ used  ][       free      ][u][        free       ]
//! ```
//!
//! # Relocation
//!
//! Movable, unlocked, defrag-eligible entries may be relocated by
//! [`RangeAllocator::defrag`], or by [`RangeAllocator::alloc`] and
//! [`RangeAllocator::realloc`] when they compact to make room. The owner of the
//! bytes takes part through a [`MoveListener`] passed into each call that may
//! move something. An entry's position is updated in the same step as the
//! listener copies its bytes.
//!
//! A failed `alloc` or `realloc` leaves every entry where it was: compaction is
//! planned first and only applied once it is known to produce a big enough gap.

use super::errors::HeapError;
use tracing::trace;

/// Stable identifier of an allocation
///
/// Ids are slot indices paired with a generation, so an id that outlives its
/// allocation is rejected instead of aliasing a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeId {
    index: u32,
    generation: u32,
}

/// Public view of one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range<T> {
    position: usize,
    size: usize,
    movable: bool,
    allow_defrag: bool,
    lock_count: u32,
    owner: T,
}

impl<T> Range<T> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last unit
    pub fn end(&self) -> usize {
        self.position + self.size
    }

    pub fn movable(&self) -> bool {
        self.movable
    }

    pub fn allow_defrag(&self) -> bool {
        self.allow_defrag
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    /// Owner tag attached at allocation time
    pub fn owner(&self) -> &T {
        &self.owner
    }

    /// Whether compaction may relocate this entry
    pub fn can_move(&self) -> bool {
        self.movable && self.allow_defrag && self.lock_count == 0
    }
}

/// Callbacks through which the owner of the bytes follows relocations
///
/// Implementations must be total over any live entry. The allocator never
/// calls these for fixed or locked entries, and uses either `move_to` or the
/// `save`/`load` pair for a given relocation, never both.
pub trait MoveListener<T> {
    /// Whatever the owner needs to restore an entry after relocation
    type Snapshot;

    /// Capture the entry's contents before its space is given up.
    fn save(&mut self, range: &Range<T>) -> Self::Snapshot;

    /// Restore a snapshot; `range` already describes the new location.
    fn load(&mut self, range: &Range<T>, snapshot: Self::Snapshot);

    /// Copy the entry's bytes to `new_position` and fix up back-references.
    /// `range` still describes the old location. Regions may overlap.
    fn move_to(&mut self, range: &Range<T>, new_position: usize);
}

/// One region of the layout, free or allocated
#[derive(Debug, Clone, Copy)]
pub enum Span<'a, T> {
    Free { position: usize, size: usize },
    Used { id: RangeId, range: &'a Range<T> },
}

impl<T> Span<'_, T> {
    pub fn position(&self) -> usize {
        match self {
            Span::Free { position, .. } => *position,
            Span::Used { range, .. } => range.position,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Span::Free { size, .. } => *size,
            Span::Used { range, .. } => range.size,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    range: Option<Range<T>>,
}

/// Moves a compaction would perform, in ascending address order
#[derive(Debug)]
struct CompactionPlan {
    moves: Vec<(RangeId, usize)>,
    largest_gap: usize,
}

/// Byte-range allocator over a growable linear space
#[derive(Debug, Clone)]
pub struct RangeAllocator<T> {
    address_space_size: usize,
    free_space: usize,
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    order: Vec<RangeId>, // allocated entries, sorted by position
}

impl<T> RangeAllocator<T> {
    /// Create an allocator with one free region covering the whole space
    pub fn new(address_space_size: usize) -> Self {
        RangeAllocator {
            address_space_size,
            free_space: address_space_size,
            slots: Vec::new(),
            vacant: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn address_space_size(&self) -> usize {
        self.address_space_size
    }

    /// Total free units (not necessarily contiguous)
    pub fn free_space(&self) -> usize {
        self.free_space
    }

    /// Largest contiguous free region
    pub fn largest_free_space(&self) -> usize {
        (0..=self.order.len())
            .map(|i| self.gap_before(i).1)
            .max()
            .unwrap_or(0)
    }

    /// Number of regions in play, free and allocated
    pub fn entry_count(&self) -> usize {
        self.order.len() + self.free_region_count()
    }

    /// Number of non-empty free regions
    pub fn free_region_count(&self) -> usize {
        (0..=self.order.len())
            .filter(|&i| self.gap_before(i).1 > 0)
            .count()
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.order.len()
    }

    /// Look up a live allocation
    pub fn get(&self, id: RangeId) -> Option<&Range<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.range.as_ref())
    }

    fn get_mut(&mut self, id: RangeId) -> Option<&mut Range<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.range.as_mut())
    }

    /// Allocations in address order
    pub fn allocations(&self) -> impl Iterator<Item = (RangeId, &Range<T>)> + '_ {
        self.order.iter().map(move |&id| (id, self.live(id)))
    }

    /// The allocation starting exactly at `position`
    pub fn allocation_at(&self, position: usize) -> Option<RangeId> {
        self.order
            .binary_search_by_key(&position, |&id| self.live(id).position)
            .ok()
            .map(|index| self.order[index])
    }

    /// Full layout, free regions included, in address order
    pub fn spans(&self) -> Vec<Span<'_, T>> {
        let mut spans = Vec::with_capacity(self.order.len() * 2 + 1);
        for (i, &id) in self.order.iter().enumerate() {
            let (position, size) = self.gap_before(i);
            if size > 0 {
                spans.push(Span::Free { position, size });
            }
            spans.push(Span::Used {
                id,
                range: self.live(id),
            });
        }
        let (position, size) = self.gap_before(self.order.len());
        if size > 0 {
            spans.push(Span::Free { position, size });
        }
        spans
    }

    /// Replace the owner tag of a live allocation
    pub fn set_owner(&mut self, id: RangeId, owner: T) -> bool {
        match self.get_mut(id) {
            Some(range) => {
                range.owner = owner;
                true
            }
            None => false,
        }
    }

    /// Pin an allocation in place
    pub fn lock(&mut self, id: RangeId) -> bool {
        match self.get_mut(id) {
            Some(range) => {
                range.lock_count += 1;
                true
            }
            None => false,
        }
    }

    /// Release one lock; fails if the allocation is not locked
    pub fn unlock(&mut self, id: RangeId) -> bool {
        match self.get_mut(id) {
            Some(range) if range.lock_count > 0 => {
                range.lock_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Extend the space at the top. Existing positions are untouched.
    pub fn grow(&mut self, new_size: usize) -> Result<(), HeapError> {
        if new_size < self.address_space_size {
            return Err(HeapError::ShrinkNotSupported {
                current: self.address_space_size,
                requested: new_size,
            });
        }
        self.free_space += new_size - self.address_space_size;
        self.address_space_size = new_size;
        self.debug_check();
        Ok(())
    }

    /// Allocate `size` units (0 counts as 1)
    ///
    /// Takes the lowest free region that fits. When nothing fits and
    /// `allow_defrag` is set, compacts first if that is known to open a large
    /// enough region. Returns `None` with the layout unchanged otherwise.
    pub fn alloc<L: MoveListener<T>>(
        &mut self,
        size: usize,
        movable: bool,
        allow_defrag: bool,
        owner: T,
        listener: &mut L,
    ) -> Option<RangeId> {
        let size = size.max(1);
        if size > self.free_space {
            return None;
        }

        let position = match self.first_fit(size, None) {
            Some(position) => position,
            None if allow_defrag => {
                let plan = self.plan_compaction(None);
                if plan.largest_gap < size {
                    return None;
                }
                self.apply_moves(&plan.moves, listener);
                match self.first_fit(size, None) {
                    Some(position) => position,
                    None => unreachable!("compaction promised a gap of {} units", size),
                }
            }
            None => return None,
        };

        let id = self.insert(Range {
            position,
            size,
            movable,
            allow_defrag,
            lock_count: 0,
            owner,
        });
        self.debug_check();
        Some(id)
    }

    /// Release an allocation. Locked allocations may be freed.
    pub fn free(&mut self, id: RangeId) -> bool {
        let Some(index) = self.order_index(id) else {
            return false;
        };
        self.order.remove(index);

        let slot = &mut self.slots[id.index as usize];
        if let Some(range) = slot.range.take() {
            self.free_space += range.size;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);

        self.debug_check();
        true
    }

    /// Resize an allocation
    ///
    /// Tried in order: resize in place; if growing, a movable request and an
    /// unlocked entry, move to the first region that fits; if `allow_defrag`,
    /// compact the rest of the space around it. On success the entry's size
    /// and flags equal the request. On failure nothing changes.
    pub fn realloc<L: MoveListener<T>>(
        &mut self,
        id: RangeId,
        new_size: usize,
        movable: bool,
        allow_defrag: bool,
        listener: &mut L,
    ) -> bool {
        let new_size = new_size.max(1);
        let Some(index) = self.order_index(id) else {
            return false;
        };
        let (position, size, lock_count) = {
            let range = self.live(id);
            (range.position, range.size, range.lock_count)
        };

        // In place: shrink, or grow into the free space that follows
        if new_size <= self.next_boundary(index) - position {
            self.free_space = self.free_space + size - new_size;
            self.update(id, position, new_size, movable, allow_defrag);
            self.debug_check();
            return true;
        }

        // Only growth gets here
        if !movable || lock_count > 0 || new_size - size > self.free_space {
            return false;
        }

        // Move to a region that fits, counting our own span as free
        if let Some(new_position) = self.first_fit(new_size, Some(id)) {
            listener.move_to(self.live(id), new_position);
            trace!(from = position, to = new_position, size, "relocated for realloc");

            self.order.remove(index);
            self.free_space = self.free_space + size - new_size;
            self.update(id, new_position, new_size, movable, allow_defrag);
            self.reinsert(id, new_position);
            self.debug_check();
            return true;
        }

        if !allow_defrag {
            return false;
        }

        // Compact everything else, then place the entry into the opened gap
        let plan = self.plan_compaction(Some(id));
        if plan.largest_gap < new_size {
            return false;
        }

        let snapshot = listener.save(self.live(id));
        self.order.remove(index);
        self.free_space += size;
        self.apply_moves(&plan.moves, listener);

        let new_position = match self.first_fit(new_size, None) {
            Some(position) => position,
            None => unreachable!("compaction promised a gap of {} units", new_size),
        };
        self.free_space -= new_size;
        self.update(id, new_position, new_size, movable, allow_defrag);
        self.reinsert(id, new_position);
        listener.load(self.live(id), snapshot);
        trace!(from = position, to = new_position, size = new_size, "restored after compaction");

        self.debug_check();
        true
    }

    /// Slide every relocatable entry down to close the gaps before it
    ///
    /// Fixed, locked and defrag-disabled entries stay put and split the space
    /// into zones that are compacted independently. Relative order never
    /// changes. Returns whether anything moved.
    pub fn defrag<L: MoveListener<T>>(&mut self, listener: &mut L) -> bool {
        let plan = self.plan_compaction(None);
        self.apply_moves(&plan.moves, listener);
        self.debug_check();
        !plan.moves.is_empty()
    }

    /// Verify the layout: sorted, disjoint, in bounds, free space accounted
    pub fn check(&self) -> Result<(), String> {
        let mut cursor = 0;
        let mut used = 0;
        for &id in &self.order {
            let range = self
                .get(id)
                .ok_or_else(|| format!("stale id {:?} in layout", id))?;
            if range.size == 0 {
                return Err(format!("zero-sized entry at {}", range.position));
            }
            if range.position < cursor {
                return Err(format!(
                    "entry at {} overlaps previous entry ending at {}",
                    range.position, cursor
                ));
            }
            cursor = range.end();
            used += range.size;
        }
        if cursor > self.address_space_size {
            return Err(format!(
                "entry ends at {} beyond address space of {}",
                cursor, self.address_space_size
            ));
        }
        if used + self.free_space != self.address_space_size {
            return Err(format!(
                "free space {} + used {} != address space {}",
                self.free_space, used, self.address_space_size
            ));
        }
        Ok(())
    }

    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(e) = self.check() {
                panic!("range allocator corrupted: {}", e);
            }
        }
    }

    /// Entry known to be live (ids in `order` always are)
    fn live(&self, id: RangeId) -> &Range<T> {
        match self.slots[id.index as usize].range.as_ref() {
            Some(range) => range,
            None => unreachable!("layout refers to vacant slot {}", id.index),
        }
    }

    fn order_index(&self, id: RangeId) -> Option<usize> {
        let position = self.get(id)?.position;
        let index = self
            .order
            .binary_search_by_key(&position, |&other| self.live(other).position)
            .ok()?;
        (self.order[index] == id).then_some(index)
    }

    /// Free region in front of `order[i]` (or after the last entry)
    fn gap_before(&self, i: usize) -> (usize, usize) {
        let start = if i == 0 {
            0
        } else {
            self.live(self.order[i - 1]).end()
        };
        (start, self.next_start(i) - start)
    }

    fn next_start(&self, i: usize) -> usize {
        match self.order.get(i) {
            Some(&id) => self.live(id).position,
            None => self.address_space_size,
        }
    }

    /// Where the entry at `order[index]` may grow to in place
    fn next_boundary(&self, index: usize) -> usize {
        self.next_start(index + 1)
    }

    /// Lowest position with `size` free units, treating `exclude` as free
    ///
    /// Movable and fixed requests both place bottom-up; compaction then only
    /// ever slides entries down toward the fixed ones.
    fn first_fit(&self, size: usize, exclude: Option<RangeId>) -> Option<usize> {
        let mut cursor = 0;
        for &id in self.order.iter().filter(|&&id| Some(id) != exclude) {
            let range = self.live(id);
            if range.position - cursor >= size {
                return Some(cursor);
            }
            cursor = range.end();
        }
        (self.address_space_size - cursor >= size).then_some(cursor)
    }

    fn plan_compaction(&self, exclude: Option<RangeId>) -> CompactionPlan {
        let mut moves = Vec::new();
        let mut cursor = 0;
        let mut largest_gap = 0;
        for &id in self.order.iter().filter(|&&id| Some(id) != exclude) {
            let range = self.live(id);
            if range.can_move() {
                if range.position != cursor {
                    moves.push((id, cursor));
                }
                cursor += range.size;
            } else {
                largest_gap = largest_gap.max(range.position - cursor);
                cursor = range.end();
            }
        }
        largest_gap = largest_gap.max(self.address_space_size - cursor);
        CompactionPlan { moves, largest_gap }
    }

    /// Moves run lowest first and only ever go down, so each destination is
    /// free or overlaps only the entry's own old span.
    fn apply_moves<L: MoveListener<T>>(&mut self, moves: &[(RangeId, usize)], listener: &mut L) {
        for &(id, new_position) in moves {
            let range = self.live(id);
            trace!(from = range.position, to = new_position, size = range.size, "compacting");
            listener.move_to(range, new_position);
            if let Some(range) = self.get_mut(id) {
                range.position = new_position;
            }
        }
    }

    fn insert(&mut self, range: Range<T>) -> RangeId {
        let position = range.position;
        self.free_space -= range.size;
        let id = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.range = Some(range);
                RangeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    range: Some(range),
                });
                RangeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.reinsert(id, position);
        id
    }

    fn reinsert(&mut self, id: RangeId, position: usize) {
        let at = self
            .order
            .partition_point(|&other| self.live(other).position < position);
        self.order.insert(at, id);
    }

    fn update(&mut self, id: RangeId, position: usize, size: usize, movable: bool, allow_defrag: bool) {
        if let Some(range) = self.get_mut(id) {
            range.position = position;
            range.size = size;
            range.movable = movable;
            range.allow_defrag = allow_defrag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Listener over a plain byte buffer
    struct Bytes(Vec<u8>);

    impl MoveListener<u32> for Bytes {
        type Snapshot = Vec<u8>;

        fn save(&mut self, range: &Range<u32>) -> Vec<u8> {
            self.0[range.position()..range.end()].to_vec()
        }

        fn load(&mut self, range: &Range<u32>, snapshot: Vec<u8>) {
            let len = snapshot.len().min(range.size());
            self.0[range.position()..range.position() + len].copy_from_slice(&snapshot[..len]);
        }

        fn move_to(&mut self, range: &Range<u32>, new_position: usize) {
            self.0
                .copy_within(range.position()..range.end(), new_position);
        }
    }

    #[test]
    fn test_first_fit_from_bottom() {
        let mut bytes = Bytes(vec![0; 100]);
        let mut ra = RangeAllocator::new(100);
        let a = ra.alloc(10, true, true, 1, &mut bytes).unwrap();
        let b = ra.alloc(20, true, true, 2, &mut bytes).unwrap();
        assert_eq!(ra.get(a).unwrap().position(), 0);
        assert_eq!(ra.get(b).unwrap().position(), 10);
        assert_eq!(ra.free_space(), 70);
        assert_eq!(ra.entry_count(), 3);
    }

    #[test]
    fn test_zero_size_is_one_unit() {
        let mut bytes = Bytes(vec![0; 8]);
        let mut ra = RangeAllocator::new(8);
        let a = ra.alloc(0, false, false, 0, &mut bytes).unwrap();
        assert_eq!(ra.get(a).unwrap().size(), 1);
    }

    #[test]
    fn test_free_coalesces() {
        let mut bytes = Bytes(vec![0; 30]);
        let mut ra = RangeAllocator::new(30);
        let a = ra.alloc(10, false, false, 1, &mut bytes).unwrap();
        let b = ra.alloc(10, false, false, 2, &mut bytes).unwrap();
        let c = ra.alloc(10, false, false, 3, &mut bytes).unwrap();
        assert!(ra.free(a));
        assert!(ra.free(c));
        assert!(ra.free(b));
        assert_eq!(ra.entry_count(), 1);
        assert_eq!(ra.largest_free_space(), 30);
    }

    #[test]
    fn test_stale_id_rejected() {
        let mut bytes = Bytes(vec![0; 30]);
        let mut ra = RangeAllocator::new(30);
        let a = ra.alloc(10, false, false, 1, &mut bytes).unwrap();
        assert!(ra.free(a));
        let b = ra.alloc(10, false, false, 2, &mut bytes).unwrap();
        assert!(ra.get(a).is_none());
        assert!(!ra.free(a));
        assert_eq!(*ra.get(b).unwrap().owner(), 2);
    }

    #[test]
    fn test_unlock_below_zero_fails() {
        let mut bytes = Bytes(vec![0; 10]);
        let mut ra = RangeAllocator::new(10);
        let a = ra.alloc(4, true, true, 1, &mut bytes).unwrap();
        assert!(!ra.unlock(a));
        assert!(ra.lock(a));
        assert!(ra.unlock(a));
        assert_eq!(ra.get(a).unwrap().lock_count(), 0);
    }

    #[test]
    fn test_grow_appends_free_space() {
        let mut bytes = Bytes(vec![0; 10]);
        let mut ra = RangeAllocator::new(10);
        let a = ra.alloc(10, false, false, 1, &mut bytes).unwrap();
        assert!(ra.alloc(1, false, true, 2, &mut bytes).is_none());
        ra.grow(20).unwrap();
        assert_eq!(ra.get(a).unwrap().position(), 0);
        assert_eq!(ra.free_space(), 10);
        assert!(matches!(
            ra.grow(5),
            Err(HeapError::ShrinkNotSupported { .. })
        ));
    }

    #[test]
    fn test_compaction_keeps_anchors() {
        let mut bytes = Bytes(vec![0; 40]);
        let mut ra = RangeAllocator::new(40);
        let a = ra.alloc(5, true, true, 1, &mut bytes).unwrap();
        let fixed = ra.alloc(5, false, false, 2, &mut bytes).unwrap();
        let b = ra.alloc(5, true, true, 3, &mut bytes).unwrap();
        let c = ra.alloc(5, true, true, 4, &mut bytes).unwrap();
        ra.free(a);
        ra.free(b);
        bytes.0[15..20].copy_from_slice(b"hello");

        assert!(ra.defrag(&mut bytes));
        assert_eq!(ra.get(fixed).unwrap().position(), 5);
        assert_eq!(ra.get(c).unwrap().position(), 10);
        assert_eq!(&bytes.0[10..15], b"hello");
        assert!(!ra.defrag(&mut bytes));
    }

    #[test]
    fn test_failed_alloc_leaves_layout_untouched() {
        let mut bytes = Bytes(vec![0; 30]);
        let mut ra = RangeAllocator::new(30);
        let _a = ra.alloc(10, false, false, 1, &mut bytes).unwrap();
        let b = ra.alloc(10, true, true, 2, &mut bytes).unwrap();
        let c = ra.alloc(5, false, false, 3, &mut bytes).unwrap();
        // Only 25..30 is free, so no amount of compaction helps
        assert!(ra.alloc(10, true, true, 4, &mut bytes).is_none());
        assert_eq!(ra.get(b).unwrap().position(), 10);
        assert_eq!(ra.get(c).unwrap().position(), 20);
    }

    #[test]
    fn test_realloc_with_compaction_restores_bytes() {
        let mut bytes = Bytes(vec![0; 40]);
        let mut ra = RangeAllocator::new(40);
        let b = ra.alloc(5, true, true, 1, &mut bytes).unwrap();
        let t1 = ra.alloc(5, true, true, 2, &mut bytes).unwrap();
        let x = ra.alloc(10, true, true, 3, &mut bytes).unwrap();
        let t2 = ra.alloc(5, true, true, 4, &mut bytes).unwrap();
        let fixed = ra.alloc(5, false, false, 5, &mut bytes).unwrap();
        let t3 = ra.alloc(10, true, true, 6, &mut bytes).unwrap();
        ra.free(t1);
        ra.free(t2);
        ra.free(t3);
        bytes.0[0..5].copy_from_slice(b"abcde");
        bytes.0[10..20].copy_from_slice(b"0123456789");

        // No single gap holds 15 units until x slides down against b's space
        assert!(ra.realloc(b, 15, true, true, &mut bytes));

        assert_eq!(ra.get(x).unwrap().position(), 0);
        assert_eq!(&bytes.0[0..10], b"0123456789");
        let range = ra.get(b).unwrap();
        assert_eq!((range.position(), range.size()), (10, 15));
        assert_eq!(&bytes.0[10..15], b"abcde");
        assert_eq!(ra.get(fixed).unwrap().position(), 25);
    }

    #[test]
    fn test_oversized_realloc_fails() {
        let mut bytes = Bytes(vec![0; 20]);
        let mut ra = RangeAllocator::new(20);
        let a = ra.alloc(5, true, true, 1, &mut bytes).unwrap();
        assert!(!ra.realloc(a, usize::MAX, true, true, &mut bytes));
        assert!(ra.alloc(usize::MAX, true, true, 2, &mut bytes).is_none());
        assert_eq!(ra.get(a).unwrap().size(), 5);
        assert_eq!(ra.free_space(), 15);
    }

    #[test]
    fn test_realloc_without_defrag_fails_cleanly() {
        let mut bytes = Bytes(vec![0; 20]);
        let mut ra = RangeAllocator::new(20);
        let a = ra.alloc(5, true, true, 1, &mut bytes).unwrap();
        let gap = ra.alloc(5, true, true, 2, &mut bytes).unwrap();
        let b = ra.alloc(5, true, true, 3, &mut bytes).unwrap();
        ra.free(gap);
        assert!(!ra.realloc(a, 15, true, false, &mut bytes));
        let range = ra.get(a).unwrap();
        assert_eq!((range.position(), range.size()), (0, 5));
        assert_eq!(ra.get(b).unwrap().position(), 10);
    }
}
