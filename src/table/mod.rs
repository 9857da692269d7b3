//! Hash table - open addressing for fast key deduplication
//!
//! Design: a flat slot array with linear probing
//! - Tombstones keep probe chains intact across deletes
//! - Inserts reuse the first tombstone on their probe path
//! - Geometric growth (factor of 2), 75% load factor before resize
//! - Growth re-inserts live entries only, so tombstones never survive it
//!
//! Hashing and equality come from a zero-sized `KeyOps` strategy, and the
//! slot array from an `Allocator`; both are resolved at compile time.

mod keys;


pub use keys::{hash_bytes, BytesKeys, HashKeys, KeyOps, StrKeys, U64Keys};

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};

use crate::allocator::{AllocError, Allocator, Layout, SystemAlloc, SYSTEM};
use crate::logging::{log_probe_exhausted, log_table_resized, perf};

/// Capacity of a freshly created table
pub const INITIAL_CAPACITY: usize = 64;

const EMPTY: u8 = 0;
const OCCUPIED: u8 = 1;
const DELETED: u8 = 2;

/// One table position. `key` and `value` are initialised exactly while
/// `state == OCCUPIED`.
struct Slot<K, V> {
    state: u8,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

/// Outcome of probing for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Occupied by an equal key
    Found(usize),
    /// Where the key would be inserted: first tombstone on the path, else
    /// the terminating empty slot
    Vacant(usize),
    /// Every slot visited without meeting an empty one
    Exhausted { tombstone: Option<usize> },
}

/// Open-addressing hash table
///
/// References returned by lookups stay valid until the next mutation; the
/// borrow checker enforces this.
pub struct HashTable<'a, K, V, S: KeyOps<K>, A: Allocator = SystemAlloc> {
    entries: NonNull<Slot<K, V>>,
    capacity: usize,
    count: usize,
    tombstones: usize,
    backing: &'a A,
    _marker: PhantomData<(K, V, S)>,
}

impl<K, V, S: KeyOps<K>> HashTable<'static, K, V, S, SystemAlloc> {
    /// Empty table over the system allocator; terminates on allocation
    /// failure
    #[track_caller]
    pub fn new() -> Self {
        Self::new_in(&SYSTEM)
    }
}

impl<K, V, S: KeyOps<K>> Default for HashTable<'static, K, V, S, SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K, V, S: KeyOps<K>, A: Allocator> HashTable<'a, K, V, S, A> {
    /// Empty table whose slot array lives in `backing`; terminates on
    /// allocation failure
    #[track_caller]
    pub fn new_in(backing: &'a A) -> Self {
        match Self::try_new_in(backing) {
            Ok(table) => table,
            Err(err) => fatal!("hash table create failed: {}", err),
        }
    }

    pub fn try_new_in(backing: &'a A) -> Result<Self, AllocError> {
        Self::try_with_capacity_in(backing, INITIAL_CAPACITY)
    }

    /// Empty table with `capacity` slots. A capacity of 0 allocates nothing
    /// until the first insert.
    pub fn try_with_capacity_in(backing: &'a A, capacity: usize) -> Result<Self, AllocError> {
        let entries = Self::allocate_slots(backing, capacity)?;
        Ok(Self {
            entries,
            capacity,
            count: 0,
            tombstones: 0,
            backing,
            _marker: PhantomData,
        })
    }

    /// Number of live entries
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deleted slots not yet reclaimed by an insert or a resize
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Insert or update. Returns the previous value when `key` was present
    /// (the stored key is kept). Terminates on allocation failure.
    #[track_caller]
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.try_put(key, value) {
            Ok(previous) => previous,
            Err(err) => fatal!("hash table insert failed at capacity {}: {}", self.capacity, err),
        }
    }

    pub fn try_put(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        let index = match self.find_slot(&key) {
            Probe::Found(index) => {
                // SAFETY: found slots are occupied
                let slot = unsafe { &mut *self.slot_ptr(index) };
                let previous = mem::replace(unsafe { slot.value.assume_init_mut() }, value);
                return Ok(Some(previous));
            }
            Probe::Vacant(index) if !self.over_load() => index,
            probe => {
                if let Probe::Exhausted { tombstone } = probe {
                    log_probe_exhausted(self.capacity, self.count, tombstone);
                }
                self.grow()?;
                match self.find_slot(&key) {
                    Probe::Vacant(index) => index,
                    probe => fatal!(
                        "probe after growth to {} yielded {:?}",
                        self.capacity,
                        probe
                    ),
                }
            }
        };

        // SAFETY: `index` came from a probe of the current array
        unsafe { self.write_new(index, key, value) };
        Ok(None)
    }

    /// Clone of the value stored under `key`
    #[inline]
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_ref(key).cloned()
    }

    pub fn get_ref(&self, key: &K) -> Option<&V> {
        match self.find_slot(key) {
            // SAFETY: found slots are occupied
            Probe::Found(index) => Some(unsafe { (*self.slot_ptr(index)).value.assume_init_ref() }),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.find_slot(key) {
            // SAFETY: found slots are occupied
            Probe::Found(index) => Some(unsafe { (*self.slot_ptr(index)).value.assume_init_mut() }),
            _ => None,
        }
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        matches!(self.find_slot(key), Probe::Found(_))
    }

    /// Remove `key`, returning its value. The slot becomes a tombstone.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let Probe::Found(index) = self.find_slot(key) else {
            return None;
        };

        // SAFETY: found slots are occupied; marking the slot first means a
        // panicking key destructor cannot cause a second drop
        unsafe {
            let slot = &mut *self.slot_ptr(index);
            slot.state = DELETED;
            self.count -= 1;
            self.tombstones += 1;
            let value = slot.value.assume_init_read();
            drop(slot.key.assume_init_read());
            Some(value)
        }
    }

    /// Remove `key`; true if it was present
    #[inline]
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Drop every entry and mark every slot empty. Capacity is kept.
    pub fn clear(&mut self) {
        // SAFETY: exclusive access; every slot index is in bounds
        unsafe { self.drop_entries() };
        self.count = 0;
        self.tombstones = 0;
    }

    /// Live entries in slot order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            entries: self.entries,
            index: 0,
            capacity: self.capacity,
            remaining: self.count,
            _marker: PhantomData,
        }
    }

    /// Linear probe for `key`, remembering the first tombstone on the path
    fn find_slot(&self, key: &K) -> Probe {
        if self.capacity == 0 {
            return Probe::Exhausted { tombstone: None };
        }

        let mut index = (S::hash(key) % self.capacity as u64) as usize;
        let mut tombstone = None;

        for _ in 0..self.capacity {
            // SAFETY: `index < capacity`
            let slot = unsafe { &*self.slot_ptr(index) };
            match slot.state {
                EMPTY => return Probe::Vacant(tombstone.unwrap_or(index)),
                // SAFETY: occupied slots hold an initialised key
                OCCUPIED if S::equals(unsafe { slot.key.assume_init_ref() }, key) => {
                    return Probe::Found(index);
                }
                OCCUPIED => {}
                _ => {
                    tombstone.get_or_insert(index);
                }
            }

            index += 1;
            if index == self.capacity {
                index = 0;
            }
        }

        Probe::Exhausted { tombstone }
    }

    /// Would one more entry push the load past 3/4?
    #[inline]
    fn over_load(&self) -> bool {
        (self.count as u128 + 1) * 4 > self.capacity as u128 * 3
    }

    /// Double the slot array (64 from empty) and re-insert live entries
    #[cold]
    fn grow(&mut self) -> Result<(), AllocError> {
        let _perf = perf::track("table_grow");
        let old_capacity = self.capacity;
        let new_capacity = if old_capacity == 0 {
            INITIAL_CAPACITY
        } else {
            old_capacity
                .checked_mul(2)
                .ok_or(AllocError::ArithmeticOverflow)?
        };

        let new_entries = Self::allocate_slots(self.backing, new_capacity)?;
        let old_entries = mem::replace(&mut self.entries, new_entries);
        self.capacity = new_capacity;
        self.tombstones = 0;

        for i in 0..old_capacity {
            // SAFETY: `i < old_capacity`; each occupied entry is moved out
            // exactly once and the old array is released without dropping
            unsafe {
                let slot = &mut *old_entries.as_ptr().add(i);
                if slot.state != OCCUPIED {
                    continue;
                }
                let key = slot.key.assume_init_read();
                let value = slot.value.assume_init_read();
                match self.find_slot(&key) {
                    Probe::Vacant(index) => self.place(index, key, value),
                    probe => fatal!("re-inserting into fresh array yielded {:?}", probe),
                }
            }
        }

        // SAFETY: allocated by `allocate_slots` with `old_capacity`
        unsafe { Self::release_slots(self.backing, old_entries, old_capacity) };

        log_table_resized(old_capacity, new_capacity, self.count);
        Ok(())
    }

    /// Store a new entry and count it
    ///
    /// # Safety
    /// `index` must be in bounds
    unsafe fn write_new(&mut self, index: usize, key: K, value: V) {
        let state = (*self.slot_ptr(index)).state;
        fatal_assert!(state != OCCUPIED, "insert into occupied slot {}", index);
        if state == DELETED {
            self.tombstones -= 1;
        }
        self.place(index, key, value);
        self.count += 1;
    }

    /// # Safety
    /// `index` must be in bounds and not occupied
    #[inline]
    unsafe fn place(&mut self, index: usize, key: K, value: V) {
        let slot = &mut *self.slot_ptr(index);
        slot.key.write(key);
        slot.value.write(value);
        slot.state = OCCUPIED;
    }

    /// # Safety
    /// `index` must be less than `capacity`
    #[inline(always)]
    unsafe fn slot_ptr(&self, index: usize) -> *mut Slot<K, V> {
        debug_assert!(index < self.capacity);
        self.entries.as_ptr().add(index)
    }

    /// Drop live entries and mark every slot empty
    unsafe fn drop_entries(&mut self) {
        for i in 0..self.capacity {
            let slot = &mut *self.slot_ptr(i);
            let state = mem::replace(&mut slot.state, EMPTY);
            if state == OCCUPIED && (mem::needs_drop::<K>() || mem::needs_drop::<V>()) {
                slot.key.assume_init_drop();
                slot.value.assume_init_drop();
            }
        }
    }

    fn slots_layout(capacity: usize) -> Result<Layout, AllocError> {
        Layout::array::<Slot<K, V>>(capacity)
    }

    /// All-empty slot array of `capacity` slots
    fn allocate_slots(backing: &A, capacity: usize) -> Result<NonNull<Slot<K, V>>, AllocError> {
        if capacity == 0 {
            return Ok(NonNull::dangling());
        }

        let entries = backing.allocate(Self::slots_layout(capacity)?)?.cast::<Slot<K, V>>();
        for i in 0..capacity {
            // SAFETY: the block holds `capacity` slots
            unsafe { ptr::addr_of_mut!((*entries.as_ptr().add(i)).state).write(EMPTY) };
        }
        Ok(entries)
    }

    /// # Safety
    /// `entries` must come from `allocate_slots(backing, capacity)`
    unsafe fn release_slots(backing: &A, entries: NonNull<Slot<K, V>>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if let Ok(layout) = Self::slots_layout(capacity) {
            backing.release(entries.cast(), layout);
        }
    }
}

#[cfg(test)]
impl<'a, K, V, S: KeyOps<K>, A: Allocator> HashTable<'a, K, V, S, A> {
    /// Slots in `state`, counted by scanning the whole array
    fn slots_in_state(&self, state: u8) -> usize {
        (0..self.capacity)
            // SAFETY: every index below capacity is in bounds
            .filter(|&i| unsafe { (*self.slot_ptr(i)).state } == state)
            .count()
    }

    fn occupied_slots(&self) -> usize {
        self.slots_in_state(OCCUPIED)
    }

    fn deleted_slots(&self) -> usize {
        self.slots_in_state(DELETED)
    }
}

impl<'a, K, V, S: KeyOps<K>, A: Allocator> Drop for HashTable<'a, K, V, S, A> {
    fn drop(&mut self) {
        // SAFETY: the table is never used again
        unsafe {
            self.drop_entries();
            Self::release_slots(self.backing, self.entries, self.capacity);
        }
    }
}

impl<'a, K, V, S, A> fmt::Debug for HashTable<'a, K, V, S, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    S: KeyOps<K>,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'t, 'a, K, V, S: KeyOps<K>, A: Allocator> IntoIterator for &'t HashTable<'a, K, V, S, A> {
    type Item = (&'t K, &'t V);
    type IntoIter = Iter<'t, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a table's live entries
pub struct Iter<'t, K, V> {
    entries: NonNull<Slot<K, V>>,
    index: usize,
    capacity: usize,
    remaining: usize,
    _marker: PhantomData<&'t (K, V)>,
}

impl<'t, K, V> Iterator for Iter<'t, K, V> {
    type Item = (&'t K, &'t V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 && self.index < self.capacity {
            // SAFETY: `index < capacity` and the table is borrowed for `'t`
            let slot = unsafe { &*self.entries.as_ptr().add(self.index) };
            self.index += 1;
            if slot.state == OCCUPIED {
                self.remaining -= 1;
                // SAFETY: occupied slots are initialised
                return Some(unsafe { (slot.key.assume_init_ref(), slot.value.assume_init_ref()) });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'t, K, V> ExactSizeIterator for Iter<'t, K, V> {}
