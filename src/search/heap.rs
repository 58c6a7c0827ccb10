use ordered_float::OrderedFloat;

const ABSENT: usize = ::std::usize::MAX;

/// Addressable binary min-heap over node indices keyed by score. Nodes
/// are addressed through a slot map so decrease-key is O(log n) and no
/// heap internals leak into the graph entities.
pub struct ScoreHeap {
    heap: Vec<usize>,
    pos: Vec<usize>,
    key: Vec<OrderedFloat<f64>>,
}

impl ScoreHeap {
    pub fn with_capacity(n: usize) -> ScoreHeap {
        ScoreHeap {
            heap: Vec::with_capacity(n),
            pos: vec![ABSENT; n],
            key: vec![OrderedFloat(::std::f64::INFINITY); n],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.pos[node] != ABSENT
    }

    pub fn insert(&mut self, node: usize, key: f64) {
        debug_assert!(!self.contains(node));
        self.key[node] = OrderedFloat(key);
        self.pos[node] = self.heap.len();
        self.heap.push(node);
        self.sift_up(self.heap.len() - 1);
    }

    /// Lower a node's key in place. The new key must not be larger than
    /// the current one.
    pub fn decrease(&mut self, node: usize, key: f64) {
        debug_assert!(OrderedFloat(key) <= self.key[node]);
        self.key[node] = OrderedFloat(key);
        let slot = self.pos[node];
        self.sift_up(slot);
    }

    pub fn pop_min(&mut self) -> Option<(usize, f64)> {
        if self.heap.is_empty() {
            return None;
        }
        let min = self.heap[0];
        let last = self.heap.pop().unwrap();
        self.pos[min] = ABSENT;
        if !self.heap.is_empty() {
            self.heap[0] = last;
            self.pos[last] = 0;
            self.sift_down(0);
        }
        Some((min, self.key[min].into_inner()))
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.key[self.heap[parent]] <= self.key[self.heap[slot]] {
                break;
            }
            self.swap(parent, slot);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let mut smallest = slot;
            for child in &[2 * slot + 1, 2 * slot + 2] {
                if *child < self.heap.len()
                    && self.key[self.heap[*child]] < self.key[self.heap[smallest]]
                {
                    smallest = *child;
                }
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.pos[self.heap[a]] = a;
        self.pos[self.heap[b]] = b;
    }
}

#[test]
fn test_heap_ordering() {
    let mut h = ScoreHeap::with_capacity(5);
    h.insert(0, 123.0);
    h.insert(1, 0.5);
    h.insert(2, 122.0);
    assert_eq!(h.pop_min(), Some((1, 0.5)));
    assert_eq!(h.pop_min(), Some((2, 122.0)));
    assert_eq!(h.pop_min(), Some((0, 123.0)));
    assert_eq!(h.pop_min(), None);
}

#[test]
fn test_heap_decrease() {
    let mut h = ScoreHeap::with_capacity(4);
    for i in 0..4 {
        h.insert(i, ::std::f64::INFINITY);
    }
    h.decrease(3, 10.0);
    h.decrease(1, 2.0);
    h.decrease(3, 1.0);
    assert_eq!(h.pop_min(), Some((3, 1.0)));
    assert_eq!(h.pop_min(), Some((1, 2.0)));
    let (_, key) = h.pop_min().unwrap();
    assert!(key.is_infinite());
}
