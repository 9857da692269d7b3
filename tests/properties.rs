//! Property tests: tables against a reference map, arenas against address
//! arithmetic

use std::collections::HashMap;

use proptest::prelude::*;

use kx::table::{HashKeys, U64Keys};
use kx::{Allocator, Arena, HashTable, Layout, Vector};

#[derive(Debug, Clone)]
enum Op {
    Put(u16, u32),
    Delete(u16),
    Get(u16),
}

fn op() -> impl Strategy<Value = Op> {
    // Small key space so updates and deletes hit existing keys
    prop_oneof![
        3 => (0u16..200, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => (0u16..200).prop_map(Op::Delete),
        1 => (0u16..200).prop_map(Op::Get),
    ]
}

fn layout_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0usize..2048, 0u32..8).prop_map(|(size, shift)| (size, 1usize << shift))
}

proptest! {
    #[test]
    fn table_matches_reference_map(ops in prop::collection::vec(op(), 1..600)) {
        let mut table: HashTable<u64, u32, U64Keys> = HashTable::new();
        let mut reference: HashMap<u64, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let key = u64::from(k);
                    prop_assert_eq!(table.put(key, v), reference.insert(key, v));
                }
                Op::Delete(k) => {
                    let key = u64::from(k);
                    prop_assert_eq!(table.delete(&key), reference.remove(&key).is_some());
                }
                Op::Get(k) => {
                    let key = u64::from(k);
                    prop_assert_eq!(table.get(&key), reference.get(&key).copied());
                }
            }
            prop_assert_eq!(table.len(), reference.len());
            prop_assert!(table.len() * 4 <= table.capacity() * 3);
        }

        prop_assert_eq!(table.iter().count(), reference.len());
        for (key, value) in &table {
            prop_assert_eq!(reference.get(key), Some(value));
        }
    }

    #[test]
    fn table_with_string_keys_matches_reference(
        words in prop::collection::vec("[a-z]{0,6}", 1..300)
    ) {
        let mut table: HashTable<String, usize, HashKeys<String>> = HashTable::new();
        let mut reference: HashMap<String, usize> = HashMap::new();

        for (i, word) in words.into_iter().enumerate() {
            prop_assert_eq!(table.put(word.clone(), i), reference.insert(word, i));
        }
        for (word, index) in &reference {
            prop_assert_eq!(table.get(word), Some(*index));
        }
        prop_assert_eq!(table.len(), reference.len());
    }

    #[test]
    fn arena_blocks_are_aligned_and_disjoint(
        layouts in prop::collection::vec(layout_strategy(), 1..200),
        min_shift in 0u32..5,
    ) {
        let backing = kx::SystemAlloc;
        let arena = Arena::with_min_align(&backing, 1 << min_shift);
        let mut blocks = Vec::new();

        for (size, align) in layouts {
            let layout = Layout::from_size_align(size, align).unwrap();
            let ptr = arena.allocate(layout).unwrap();
            let addr = ptr.as_ptr() as usize;

            prop_assert_eq!(addr % align, 0);
            if size > 0 {
                prop_assert_eq!(addr % arena.min_align(), 0);
                unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xA5, size) };
                blocks.push((addr, size));
            }
        }

        blocks.sort_unstable();
        for pair in blocks.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn arena_reset_reuses_retained_chunk(sizes in prop::collection::vec(1usize..4096, 1..100)) {
        let mut arena = Arena::new();
        for &size in &sizes {
            arena.alloc_layout(Layout::from_size_align(size, 8).unwrap());
        }
        arena.reset();

        let retained = arena.allocated_bytes();
        prop_assert_eq!(arena.chunk_count(), 1);
        let fits = sizes.iter().copied().filter(|&s| s <= retained).max().unwrap_or(1);
        arena.alloc_layout(Layout::from_size_align(fits, 8).unwrap());
        prop_assert_eq!(arena.chunk_count(), 1);
        prop_assert_eq!(arena.allocated_bytes(), retained);
    }

    #[test]
    fn vector_matches_std_vec(values in prop::collection::vec(any::<i64>(), 0..500), pops in 0usize..50) {
        let mut vector = Vector::new();
        let mut reference = Vec::new();
        for value in values {
            vector.push(value);
            reference.push(value);
        }
        for _ in 0..pops {
            prop_assert_eq!(vector.pop(), reference.pop());
        }
        prop_assert_eq!(vector.as_slice(), reference.as_slice());
    }
}
