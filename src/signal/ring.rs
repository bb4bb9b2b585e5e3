//! Fixed-capacity FIFO used by every stage of the pulse pipeline

use std::collections::VecDeque;

/// Bounded FIFO; pushing beyond capacity evicts the oldest element.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    /// Capacity is clamped to at least one element
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, returning the evicted element if the ring was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Copy> Ring<T> {
    /// The newest `N` values, oldest first
    pub fn last<const N: usize>(&self) -> Option<[T; N]> {
        if self.items.len() < N {
            return None;
        }
        let start = self.items.len() - N;
        let mut out = [self.items[start]; N];
        for (slot, value) in out.iter_mut().zip(self.items.range(start..)) {
            *slot = *value;
        }
        Some(out)
    }
}

impl Ring<f64> {
    pub fn mean(&self) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.iter().sum::<f64>() / self.items.len() as f64)
    }
}

impl Ring<u32> {
    /// Integer mean, truncated toward zero; 0 when empty
    pub fn truncated_mean(&self) -> u32 {
        if self.items.is_empty() {
            return 0;
        }
        let sum: u64 = self.items.iter().map(|&v| u64::from(v)).sum();
        (sum / self.items.len() as u64) as u32
    }
}
