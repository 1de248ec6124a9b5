// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Per-sink bounded input queue with sticky-last retention and
//! pending-sync-item accounting.
//!
//! One of these backs every consumer slot of a [`crate::method::DataMethod`].
//! Each async edge has exactly one writer thread (the producer's process)
//! and one reader thread (the consumer's process), so a single
//! [`std::sync::Mutex`] around the buffer is sufficient —
//! this crate does not reach for `glommio::channels::spsc_queue`'s
//! lock-free ring buffer here because that design has no room for sticky
//! peek-without-pop or sync-tagged eviction protection. The cacheline
//! padding discipline of that ring buffer is kept: `pending_sync` lives on
//! its own cache line so a hot `is_empty`/`pending_sync` read never
//! false-shares with the mutex-guarded push/pop path.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam_utils::CachePadded;

use crate::record::RecordBox;

#[derive(Debug, Clone)]
struct QueueItem {
    value: RecordBox,
    sync: bool,
}

/// A single consumer slot's buffered input.
pub struct InputQueue {
    capacity: NonZeroUsize,
    sticky: bool,
    pending_sync: CachePadded<AtomicUsize>,
    buffer: Mutex<VecDeque<QueueItem>>,
}

impl InputQueue {
    pub fn new(capacity: NonZeroUsize, sticky: bool) -> Self {
        InputQueue {
            capacity,
            sticky,
            pending_sync: CachePadded::new(AtomicUsize::new(0)),
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn sticky(&self) -> bool {
        self.sticky
    }

    pub fn pending_sync(&self) -> usize {
        self.pending_sync.load(Ordering::Acquire)
    }

    /// Push `item` onto the queue. If `sync`, the item is protected from
    /// the overflow-drop policy until it is popped. After the push, if
    /// `size > capacity + pending_sync`, the oldest *non-sync* item is
    /// dropped to restore the invariant.
    pub fn append(&self, item: RecordBox, sync: bool) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push_back(QueueItem { value: item, sync });
        if sync {
            self.pending_sync.fetch_add(1, Ordering::AcqRel);
        }

        let budget = self.capacity.get() + self.pending_sync.load(Ordering::Acquire);
        while buffer.len() > budget {
            let Some(drop_at) = buffer.iter().position(|entry| !entry.sync) else {
                // Every buffered item is sync-protected; nothing can be
                // dropped without violating "sync items are never dropped".
                tracing::debug!(
                    queue.capacity = self.capacity.get(),
                    queue.pending_sync = self.pending_sync.load(Ordering::Acquire),
                    "queue overflow but all buffered items are sync-protected"
                );
                break;
            };
            buffer.remove(drop_at);
            tracing::debug!(queue.capacity = self.capacity.get(), "dropped oldest non-sync item on overflow");
        }
    }

    /// Pop the head item. Fails if the queue is empty.
    ///
    /// If `sticky` and the queue holds exactly one item, the head is
    /// cloned and returned without being removed, so a later `pop` sees
    /// the same value again until a new item is appended.
    pub fn pop(&self) -> Option<RecordBox> {
        let mut buffer = self.buffer.lock().unwrap();
        let value = if self.sticky && buffer.len() == 1 {
            buffer.front().map(|item| item.value.clone())
        } else {
            buffer.pop_front().map(|item| item.value)
        };

        if value.is_some() {
            let _ = self
                .pending_sync
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current > 0).then_some(current - 1)
                });
        }

        value
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}

impl std::fmt::Debug for InputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputQueue")
            .field("capacity", &self.capacity)
            .field("sticky", &self.sticky)
            .field("pending_sync", &self.pending_sync.load(Ordering::Relaxed))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }

    #[test]
    fn sticky_size_one_round_trip_law() {
        let queue = InputQueue::new(one(), true);
        queue.append(RecordBox::new(7i32), false);
        for _ in 0..5 {
            let value = queue.pop().expect("sticky queue retains its last item");
            assert_eq!(value.downcast_ref::<i32>(), Some(&7));
        }
        assert!(!queue.is_empty());
    }

    #[test]
    fn sticky_queue_advances_once_a_new_item_arrives() {
        let queue = InputQueue::new(one(), true);
        queue.append(RecordBox::new(1i32), false);
        queue.append(RecordBox::new(2i32), false);
        // capacity 1, non-sync overflow drops the oldest.
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&2));
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&2));
    }

    #[test]
    fn non_sticky_pop_removes_the_item() {
        let queue = InputQueue::new(one(), false);
        queue.append(RecordBox::new(1i32), false);
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&1));
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn non_sync_overflow_drops_oldest() {
        let queue = InputQueue::new(NonZeroUsize::new(2).unwrap(), false);
        queue.append(RecordBox::new(1i32), false);
        queue.append(RecordBox::new(2i32), false);
        queue.append(RecordBox::new(3i32), false);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&2));
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&3));
    }

    #[test]
    fn sync_items_survive_overflow_pressure() {
        let queue = InputQueue::new(one(), false);
        queue.append(RecordBox::new(1i32), true);
        // Non-sync arrivals must not evict the sync item while pending_sync > 0.
        queue.append(RecordBox::new(2i32), false);
        queue.append(RecordBox::new(3i32), false);
        assert_eq!(queue.pop().unwrap().downcast_ref::<i32>(), Some(&1));
        assert_eq!(queue.pending_sync(), 0);
    }

    #[test]
    fn pending_sync_tracks_appends_and_pops() {
        let queue = InputQueue::new(NonZeroUsize::new(4).unwrap(), false);
        queue.append(RecordBox::new(1i32), true);
        queue.append(RecordBox::new(2i32), true);
        assert_eq!(queue.pending_sync(), 2);
        queue.pop();
        assert_eq!(queue.pending_sync(), 1);
        queue.pop();
        assert_eq!(queue.pending_sync(), 0);
    }
}
