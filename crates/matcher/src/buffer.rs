//! Per-region pending queue with oldest-first overflow eviction.

use std::collections::VecDeque;
use std::fmt;

/// Bounded FIFO of pending items for one region and side
pub struct RegionBuffer<T> {
    items: VecDeque<T>,
    max_size: usize,
    dropped_count: u64,
}

impl<T> fmt::Debug for RegionBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionBuffer")
            .field("len", &self.items.len())
            .field("max_size", &self.max_size)
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl<T> RegionBuffer<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size: max_size.max(1),
            dropped_count: 0,
        }
    }

    /// Append `item`, returning the evicted head when the buffer was full
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.max_size {
            self.dropped_count += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = RegionBuffer::new(2);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), Some(1));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_count(), 1);
        assert_eq!(buffer.drain().collect::<Vec<_>>(), vec![2, 3]);
        assert!(buffer.is_empty());
    }
}
