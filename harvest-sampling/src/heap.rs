//! A binary min-heap with array access.
//!
//! Unlike [`std::collections::BinaryHeap`], this heap exposes its backing array. Elements can be
//! read and overwritten by index, after which [`PriorityHeap::fix`] restores the heap order. This
//! makes "replace the current minimum" a single write plus one sift instead of a pop and a push.

use std::ops::{Index, IndexMut};

/// Defines the order of elements in a [`PriorityHeap`].
pub trait HeapOrder<T> {
    /// Returns `true` if `a` must be closer to the root than `b`.
    fn less(&self, a: &T, b: &T) -> bool;
}

/// Orders elements by their own [`PartialOrd`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Natural;

impl<T: PartialOrd> HeapOrder<T> for Natural {
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}

/// Orders elements by a key extracted with a function.
#[derive(Clone, Copy, Debug)]
pub struct ByKey<F>(pub F);

impl<T, K, F> HeapOrder<T> for ByKey<F>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    fn less(&self, a: &T, b: &T) -> bool {
        (self.0)(a) < (self.0)(b)
    }
}

/// A binary min-heap stored in an implicit complete binary tree.
///
/// The element at index `0` is always the minimum according to the heap's [`HeapOrder`]. Equal
/// keys are returned in no particular order.
#[derive(Clone, Debug)]
pub struct PriorityHeap<T, O = Natural> {
    items: Vec<T>,
    order: O,
}

impl<T, O: Default> Default for PriorityHeap<T, O> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            order: O::default(),
        }
    }
}

impl<T: PartialOrd> PriorityHeap<T> {
    /// Creates an empty heap ordered by the elements themselves.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            order: Natural,
        }
    }

    /// Builds a heap from an initial collection, ordered by the elements themselves.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::with_order(items, Natural)
    }
}

impl<T, K, F> PriorityHeap<T, ByKey<F>>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    /// Builds a heap from an initial collection, ordered by the key returned from `key`.
    pub fn with_key(items: Vec<T>, key: F) -> Self {
        Self::with_order(items, ByKey(key))
    }
}

impl<T, O: HeapOrder<T>> PriorityHeap<T, O> {
    /// Builds a heap from an initial collection with an explicit order.
    pub fn with_order(items: Vec<T>, order: O) -> Self {
        let mut heap = Self { items, order };
        for index in (0..heap.items.len() / 2).rev() {
            heap.sift_down(index);
        }
        heap
    }

    /// Returns the number of elements in the heap.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the heap contains no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the minimum element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Adds an element and restores the heap order.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Removes and returns the minimum element.
    ///
    /// Returns `None` if the heap is empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }

        let min = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(min)
    }

    /// Returns the element at `index` of the backing array.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Overwrites the element at `index` and returns the previous element.
    ///
    /// This does not restore the heap order. Call [`fix`](Self::fix) with the same index
    /// afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, item: T) -> T {
        std::mem::replace(&mut self.items[index], item)
    }

    /// Restores the heap order after the element at `index` was modified externally.
    ///
    /// A single modification can only violate the order towards the parent or towards the
    /// children, so the element either moves up or down, never both. Out of bounds indexes are
    /// ignored.
    pub fn fix(&mut self, index: usize) {
        if index >= self.items.len() {
            return;
        }

        if index > 0 && self.less(index, parent(index)) {
            self.sift_up(index);
        } else {
            self.sift_down(index);
        }
    }

    /// Removes all elements and returns them in array order.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Returns an iterator over the elements in array order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Consumes the heap and returns the backing array.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.order.less(&self.items[a], &self.items[b])
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = parent(index);
            if !self.less(index, parent) {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;

            let mut smallest = index;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }

            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}

fn parent(index: usize) -> usize {
    (index - 1) / 2
}

impl<T, O> Index<usize> for PriorityHeap<T, O> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

/// Writing through the index does not restore the heap order, see [`PriorityHeap::fix`].
impl<T, O> IndexMut<usize> for PriorityHeap<T, O> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}
