use std::collections::VecDeque;

/// Bounded FIFO between a capture callback and its consumer.
///
/// Not synchronized on its own; the dispatcher wraps it in a
/// `parking_lot::Mutex` together with its shutdown flag.
///
/// Overflow behavior: the newest item is refused and counted. Items already
/// queued keep their order.
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> FrameQueue<T> {
    /// A queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `item`, or hand it back if the queue is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Remove the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove and return everything still queued, oldest first.
    pub fn take_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items refused because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest() {
        let mut queue = FrameQueue::new(3);
        for i in 1..=3 {
            assert!(queue.push(i).is_ok());
        }
        assert_eq!(queue.push(4), Err(4));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn drop_count_equals_overflow() {
        let mut queue = FrameQueue::new(4);
        for i in 0..10 {
            let _ = queue.push(i);
        }
        assert_eq!(queue.dropped(), 6);
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn space_frees_after_pop() {
        let mut queue = FrameQueue::new(1);
        assert!(queue.push('a').is_ok());
        assert!(queue.is_full());
        assert_eq!(queue.pop(), Some('a'));
        assert!(queue.push('b').is_ok());
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue: FrameQueue<u8> = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn take_all_empties_in_order() {
        let mut queue = FrameQueue::new(3);
        let _ = queue.push(1);
        let _ = queue.push(2);
        assert_eq!(queue.take_all(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
