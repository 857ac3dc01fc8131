//! Indexed binary min-heap with stable tie-breaking.
//!
//! Entries are ordered by a caller-supplied comparison and then by insertion
//! order, so entries that compare equal come out first-in, first-out. Every
//! entry gets an [`EntryId`] on insertion which can later be used to remove it
//! from anywhere in the heap in O(log n).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Handle to a queued entry. Ids increase with insertion order and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    /// Raw insertion counter, starting at 1.
    pub fn get(self) -> u64 {
        self.0
    }
}

struct Slot<T> {
    id: EntryId,
    item: T,
}

type Compare<T> = Box<dyn Fn(&T, &T) -> Ordering>;

/// Min-heap keyed by a comparison closure, FIFO among equal keys.
pub struct PriorityQueue<T> {
    heap: Vec<Slot<T>>,
    // position of each live entry inside `heap`
    index: HashMap<EntryId, usize>,
    last_id: u64,
    compare: Compare<T>,
}

impl<T> PriorityQueue<T> {
    /// Empty queue ordered by `compare`.
    pub fn new(compare: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self { heap: Vec::new(), index: HashMap::new(), last_id: 0, compare: Box::new(compare) }
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether `id` is still queued.
    pub fn contains(&self, id: EntryId) -> bool {
        self.index.contains_key(&id)
    }

    /// Inserts `item` and returns its handle.
    pub fn enqueue(&mut self, item: T) -> EntryId {
        self.last_id += 1;
        let id = EntryId(self.last_id);
        let pos = self.heap.len();
        self.heap.push(Slot { id, item });
        self.index.insert(id, pos);
        self.sift_up(pos);
        id
    }

    /// Smallest entry without removing it.
    pub fn peek(&self) -> Option<(EntryId, &T)> {
        self.heap.first().map(|slot| (slot.id, &slot.item))
    }

    /// Removes and returns the smallest entry.
    pub fn dequeue(&mut self) -> Option<(EntryId, T)> {
        if self.heap.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    /// Removes `id` wherever it sits in the heap. `None` if it is not queued.
    pub fn remove(&mut self, id: EntryId) -> Option<T> {
        let pos = *self.index.get(&id)?;
        self.remove_at(pos).map(|(_, item)| item)
    }

    fn remove_at(&mut self, pos: usize) -> Option<(EntryId, T)> {
        let last = self.heap.len().checked_sub(1)?;
        self.swap(pos, last);
        let slot = self.heap.pop()?;
        self.index.remove(&slot.id);
        if pos < self.heap.len() && !self.sift_up(pos) {
            self.sift_down(pos);
        }
        Some((slot.id, slot.item))
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (x, y) = (&self.heap[a], &self.heap[b]);
        (self.compare)(&x.item, &y.item).then(x.id.cmp(&y.id)) == Ordering::Less
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].id, a);
        self.index.insert(self.heap[b].id, b);
    }

    // returns whether the entry moved
    fn sift_up(&mut self, mut pos: usize) -> bool {
        let start = pos;
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos != start
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}

impl<T> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .field("last_id", &self.last_id)
            .finish()
    }
}
