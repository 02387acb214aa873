//! Global heap: selectors, realloc contract, memory bus, local heap hosting

use segheap::memory::constants::{GMEM_MOVEABLE, GMEM_ZEROINIT, LMEM_FIXED, LMEM_MOVEABLE};
use segheap::memory::{Fault, GlobalHeap, HeapConfig, HeapError, MemoryBus};

fn far(selector: u16, offset: u16) -> u32 {
    ((selector as u32) << 16) | offset as u32
}

#[test]
fn test_first_selector_after_reserved() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("a", GMEM_MOVEABLE, 16).unwrap();
    let b = heap.alloc("b", GMEM_MOVEABLE, 16).unwrap();
    assert_eq!(a, 0x0103);
    assert_eq!(b, 0x010B);
    assert_eq!(heap.size(a), Some(32));
    assert_eq!(heap.selectors().count(), 2);
}

#[test]
fn test_zero_size_rounds_to_granule() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("a", 0, 0).unwrap();
    assert_eq!(heap.size(a), Some(32));
    assert!(heap.buffer(a).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_realloc_within_page_keeps_handle() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("a", GMEM_MOVEABLE, 64).unwrap();
    heap.buffer_mut(a).unwrap()[..4].copy_from_slice(b"abcd");

    let same = heap.realloc(a, 0x8000, GMEM_MOVEABLE).unwrap();
    assert_eq!(same, a);
    assert_eq!(heap.size(a), Some(0x8000));
    assert_eq!(&heap.buffer(a).unwrap()[..4], b"abcd");

    let shrunk = heap.realloc(a, 2, GMEM_MOVEABLE).unwrap();
    assert_eq!(shrunk, a);
    assert_eq!(heap.size(a), Some(32));
    assert_eq!(&heap.buffer(a).unwrap()[..4], b"abcd");
}

#[test]
fn test_realloc_across_page_boundary_moves_bytes() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("a", GMEM_MOVEABLE, 100).unwrap();
    for (i, byte) in heap.buffer_mut(a).unwrap().iter_mut().enumerate() {
        *byte = i as u8;
    }

    let b = heap.realloc(a, 0x20000, GMEM_MOVEABLE).unwrap();
    assert_ne!(b, a);
    assert_eq!(heap.size(b), Some(0x20000));
    assert_eq!(heap.selector(b).unwrap().pages(), 2);
    let buffer = heap.buffer(b).unwrap();
    assert!((0..128).all(|i| buffer[i] == i as u8));
    assert!(buffer[128..].iter().all(|&b| b == 0));

    assert_eq!(heap.size(a), None);
    assert!(matches!(
        heap.free(a),
        Err(HeapError::InvalidHandle { .. })
    ));
}

#[test]
fn test_realloc_down_to_one_page_returns_new_handle() {
    let mut heap = GlobalHeap::new();
    let big = heap.alloc("big", 0, 0x18000).unwrap();
    heap.buffer_mut(big).unwrap()[0] = 0x5A;

    let small = heap.realloc(big, 64, 0).unwrap();
    assert_ne!(small, big);
    assert_eq!(heap.size(small), Some(64));
    assert_eq!(heap.buffer(small).unwrap()[0], 0x5A);
}

#[test]
fn test_realloc_carries_attributes_and_provenance() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("seg", 0, 64).unwrap();
    let a = heap.set_selector_attributes(a, true, true).unwrap();
    heap.set_file_source(a, "PROGRAM.EXE", 0x400).unwrap();

    let b = heap.realloc(a, 0x10001, 0).unwrap();
    let record = heap.selector(b).unwrap();
    assert!(record.is_code());
    assert!(record.is_read_only());
    assert_eq!(b & 0x7, 0x02);
    assert_eq!(record.name, "seg");
    assert_eq!(
        heap.allocation(b).unwrap().file_source(),
        Some(("PROGRAM.EXE", 0x400))
    );
}

#[test]
fn test_multi_page_addressing() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("big", 0, 0x18000).unwrap();
    let second = sel + 8;

    heap.write_byte(second, 5, 0xAB).unwrap();
    assert_eq!(heap.buffer(sel).unwrap()[0x10005], 0xAB);
    assert_eq!(heap.read_byte(second, 5), Ok(0xAB));

    let (record, offset) = heap.resolve(far(second, 5)).unwrap();
    assert_eq!(record.selector(), sel);
    assert_eq!(offset, 0x10005);

    // The second page only has 0x8000 bytes behind it
    assert!(matches!(
        heap.read_byte(second, 0x8000),
        Err(Fault::GeneralProtection { write: false, .. })
    ));
}

#[test]
fn test_buffer_at_far_pointer() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("a", 0, 64).unwrap();
    heap.buffer_mut(sel).unwrap()[10] = 7;
    let (buffer, offset) = heap.buffer_at(far(sel, 10)).unwrap();
    assert_eq!(buffer[offset], 7);
    assert_eq!(
        heap.buffer_at(far(0x7F03, 0)).unwrap_err(),
        Fault::SegmentNotPresent { selector: 0x7F03 }
    );
}

#[test]
fn test_memory_bus_faults() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("a", 0, 32).unwrap();

    assert_eq!(
        heap.read_byte(0x4003, 0),
        Err(Fault::SegmentNotPresent { selector: 0x4003 })
    );
    assert_eq!(
        heap.read_byte(sel, 32),
        Err(Fault::GeneralProtection {
            selector: sel,
            offset: 32,
            write: false
        })
    );

    heap.write_word(sel, 0, 0x1234).unwrap();
    assert_eq!(heap.read_word(sel, 0), Ok(0x1234));
    assert_eq!(heap.buffer(sel).unwrap()[..2], [0x34, 0x12]);

    let code = heap.set_selector_attributes(sel, true, false).unwrap();
    assert!(heap.is_executable_selector(code));
    let fault = heap.write_byte(code, 0, 1).unwrap_err();
    assert_eq!(
        fault,
        Fault::GeneralProtection {
            selector: code,
            offset: 0,
            write: true
        }
    );
    assert_eq!(fault.selector(), code);
}

#[test]
fn test_free_releases_selector() {
    let mut heap = GlobalHeap::new();
    let a = heap.alloc("a", 0, 32).unwrap();
    let before = heap.free_space();
    heap.free(a).unwrap();
    assert_eq!(heap.free_space(), before + 0x10000);
    assert!(matches!(
        heap.free(a),
        Err(HeapError::InvalidHandle { .. })
    ));
    assert_eq!(heap.alloc("b", 0, 32).unwrap(), a);
}

#[test]
fn test_bare_selector_has_no_buffer() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc_selector("thunks", 2).unwrap();
    assert!(heap.selector(sel).is_some());
    assert!(heap.buffer(sel).is_none());
    assert_eq!(
        heap.read_byte(sel, 0),
        Err(Fault::SegmentNotPresent { selector: sel })
    );
    assert!(heap.free(sel).is_err());
    heap.free_selector(sel).unwrap();
    assert!(heap.selector(sel).is_none());
}

#[test]
fn test_alloc_data_keeps_contents() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc_data("res", 0, b"resource".to_vec()).unwrap();
    assert_eq!(heap.buffer(sel).unwrap(), b"resource");
}

#[test]
fn test_small_selector_table_exhausts() {
    let mut heap = GlobalHeap::with_config(HeapConfig {
        selector_count: 40,
        ..HeapConfig::default()
    })
    .unwrap();

    assert!(matches!(
        heap.alloc("huge", 0, 9 * 0x10000),
        Err(HeapError::OutOfMemory { .. })
    ));
    for i in 0..8 {
        heap.alloc(&format!("s{}", i), GMEM_ZEROINIT, 16).unwrap();
    }
    assert_eq!(heap.free_space(), 0);
    assert!(matches!(
        heap.alloc("one more", 0, 16),
        Err(HeapError::SelectorsExhausted { pages: 1 })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let result = GlobalHeap::with_config(HeapConfig {
        selector_count: 16,
        reserved_selectors: 16,
        ..HeapConfig::default()
    });
    assert!(matches!(result, Err(HeapError::InvalidConfig(_))));
}

#[test]
fn test_local_heap_lifecycle() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("dgroup", 0, 1024).unwrap();

    assert!(matches!(
        heap.local_heap(sel),
        Err(HeapError::NoLocalHeap { .. })
    ));
    heap.create_local_heap(sel, 0, 0).unwrap();
    assert!(heap.has_local_heap(sel));
    assert!(matches!(
        heap.create_local_heap(sel, 0, 0),
        Err(HeapError::LocalHeapExists { .. })
    ));
    assert!(matches!(
        heap.local_heap(0x7003),
        Err(HeapError::InvalidHandle { .. })
    ));
}

#[test]
fn test_named_local_heap() {
    let mut heap = GlobalHeap::new();
    let sel = heap.create_local_heap_named("USER", 0x1000).unwrap();
    assert_eq!(heap.size(sel), Some(0x1000));
    let local = heap.local_heap(sel).unwrap();
    assert_eq!(local.heap().base_offset(), 16);
    assert_eq!(local.heap_size(), 0x1000 - 16);
}

#[test]
fn test_local_growth_extends_global_block() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("dgroup", 0, 64).unwrap();

    let mut local = heap.local_heap_or_create(sel).unwrap();
    let p = local.alloc(LMEM_FIXED, 200).unwrap();
    assert_eq!(p, 16);
    let extent = local.heap().address_space_size();
    assert!(extent >= 216);

    assert!(heap.size(sel).unwrap() >= extent);

    // Shrinking the block never cuts into the local heap
    heap.realloc(sel, 32, 0).unwrap();
    assert!(heap.size(sel).unwrap() >= extent);
}

#[test]
fn test_local_heap_survives_global_move() {
    let mut heap = GlobalHeap::new();
    let sel = heap.alloc("dgroup", 0, 1024).unwrap();
    let h = {
        let mut local = heap.local_heap_or_create(sel).unwrap();
        let h = local.alloc(LMEM_MOVEABLE, 6).unwrap();
        local.bytes_mut(h).unwrap()[..6].copy_from_slice(b"moving");
        h
    };

    let moved = heap.realloc(sel, 0x20000, 0).unwrap();
    assert_ne!(moved, sel);

    let local = heap.local_heap(moved).unwrap();
    assert_eq!(&local.bytes(h).unwrap()[..6], b"moving");
    local.check().unwrap();
}

#[test]
fn test_unrepresentable_size_is_out_of_memory() {
    let mut heap = GlobalHeap::new();
    assert!(matches!(
        heap.alloc("huge", 0, usize::MAX),
        Err(HeapError::OutOfMemory { .. })
    ));

    let a = heap.alloc("a", 0, 64).unwrap();
    assert!(matches!(
        heap.realloc(a, usize::MAX - 3, 0),
        Err(HeapError::OutOfMemory { .. })
    ));
    assert_eq!(heap.size(a), Some(64));
    assert_eq!(heap.selectors().count(), 1);
}
