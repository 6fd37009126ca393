//! Bounded min-heap with a shrinkable active region.

use std::cmp::Ordering;

/// Ordering used by a [`BoundedHeap`].
///
/// Implemented for every `Fn(&T, &T) -> Ordering`, so plain closures and `T::cmp` work directly.
pub trait Compare<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> Compare<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

fn parent(pos: usize) -> usize {
    ((pos + 1) / 2) - 1
}

fn left_child(pos: usize) -> usize {
    ((pos + 1) * 2) - 1
}

fn right_child(pos: usize) -> usize {
    (pos + 1) * 2
}

/// Fixed-capacity array-backed min-heap.
///
/// Only the first [`active_len`](BoundedHeap::active_len) entries are kept in heap order. Entries
/// past the active region stay in storage ("frozen") until the region is restored with
/// [`reactivate`](BoundedHeap::reactivate). That lets the heap logically shrink without moving
/// anything out of memory, which is what both run generation and k-way merging rely on.
pub struct BoundedHeap<T, C> {
    items: Vec<T>,
    capacity: usize,
    active: usize,
    compare: C,
}

impl<T, C> BoundedHeap<T, C>
where
    C: Compare<T>,
{
    /// Creates an empty heap holding at most `capacity` entries.
    pub fn new(capacity: usize, compare: C) -> Self {
        BoundedHeap {
            items: Vec::with_capacity(capacity),
            capacity,
            active: 0,
            compare,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored entries, frozen ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Size of the region currently kept in heap order.
    pub fn active_len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Returns the smallest active entry.
    pub fn peek(&self) -> Option<&T> {
        if self.active == 0 {
            None
        } else {
            self.items.first()
        }
    }

    /// Returns the smallest active entry for in-place modification.
    /// The caller must call [`downheap(0)`](BoundedHeap::downheap) after changing its order.
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        if self.active == 0 {
            None
        } else {
            self.items.first_mut()
        }
    }

    /// Iterates over all stored entries in storage order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Appends an entry and sifts it up. Returns the entry back if the heap is full.
    ///
    /// Meant for filling the heap while nothing is frozen; the active region is extended to cover
    /// every stored entry.
    pub fn insert(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        debug_assert_eq!(self.active, self.items.len(), "insert with frozen entries");

        self.items.push(item);
        self.active = self.items.len();

        let mut pos = self.items.len() - 1;
        while pos != 0 && self.less(pos, parent(pos)) {
            self.items.swap(pos, parent(pos));
            pos = parent(pos);
        }

        Ok(())
    }

    /// Moves the entry at `pos` down until both of its active children are not smaller.
    pub fn downheap(&mut self, mut pos: usize) {
        loop {
            let left = left_child(pos);
            if left >= self.active {
                break;
            }

            let right = right_child(pos);
            let smaller = if right < self.active && self.less(right, left) {
                right
            } else {
                left
            };

            if !self.less(smaller, pos) {
                break;
            }
            self.items.swap(smaller, pos);
            pos = smaller;
        }
    }

    /// Rebuilds heap order over the whole active region, bottom-up.
    pub fn reheap(&mut self) {
        for pos in (0..self.active / 2).rev() {
            self.downheap(pos);
        }
    }

    /// Makes every stored entry active again and restores heap order.
    pub fn reactivate(&mut self) {
        self.active = self.items.len();
        self.reheap();
    }

    /// Moves the root just past the end of the active region and shrinks the region by one.
    pub fn shrink(&mut self) {
        if self.active == 0 {
            return;
        }
        self.active -= 1;
        self.items.swap(0, self.active);
        self.downheap(0);
    }

    /// Replaces the root with `item` and returns the previous root.
    ///
    /// # Panics
    /// Panics if the active region is empty.
    pub fn replace_root(&mut self, item: T) -> T {
        assert!(self.active > 0, "replace_root on an empty active region");

        let root = std::mem::replace(&mut self.items[0], item);
        self.downheap(0);

        root
    }

    /// Removes the root from the heap altogether. Frozen entries are kept past the active region.
    pub fn pop(&mut self) -> Option<T> {
        if self.active == 0 {
            return None;
        }

        // root -> last active slot -> last storage slot, so the frozen tail stays contiguous
        self.active -= 1;
        self.items.swap(0, self.active);
        let tail = self.items.len() - 1;
        self.items.swap(self.active, tail);
        let root = self.items.pop();
        self.downheap(0);

        root
    }

    /// Moves every active entry matching `excluded` out of the active region, then reheaps.
    pub fn exclude<P>(&mut self, mut excluded: P)
    where
        P: FnMut(&T) -> bool,
    {
        let mut pos = 0;
        while pos < self.active {
            if excluded(&self.items[pos]) {
                self.active -= 1;
                self.items.swap(pos, self.active);
            } else {
                pos += 1;
            }
        }
        self.reheap();
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.compare.compare(&self.items[a], &self.items[b]) == Ordering::Less
    }
}
