//! Single-producer/single-consumer bounded ring buffer.
//!
//! The buffer is only reachable through one [`Producer`] and one [`Consumer`].
//! Neither half is `Clone` and both operate through `&mut self`, so the
//! one-writer-per-cursor precondition the algorithm depends on is held by the
//! type system rather than by convention. Cursor publication is a plain
//! release store, not a CAS; use [`MpmcQueue`](crate::MpmcQueue) when more than
//! one thread needs to push or pop.
//!
//! ```
//! let (mut tx, mut rx) = spin_pool::ring_buffer::<u32>(4);
//! tx.enqueue(1).unwrap();
//! tx.enqueue(2).unwrap();
//! assert_eq!(rx.dequeue(), Some(1));
//! assert_eq!(rx.dequeue(), Some(2));
//! assert_eq!(rx.dequeue(), None);
//! ```

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::padded_type::Padded;

/// Create a ring buffer holding up to `capacity` items, rounded up to the
/// next power of two.
///
/// # Panics
///
/// If `capacity` is above the largest power of two a `usize` can hold.
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let buffer = Arc::new(BoundedRingBuffer::new(capacity));
    (
        Producer {
            buffer: Arc::clone(&buffer),
        },
        Consumer { buffer },
    )
}

pub(crate) struct BoundedRingBuffer<T> {
    // written by the consumer only
    head: Padded<AtomicU64>,
    // written by the producer only
    tail: Padded<AtomicU64>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
}

// a slot is touched by at most one side at a time, handed over through the
// release/acquire pair on head and tail
unsafe impl<T: Send> Sync for BoundedRingBuffer<T> {}
unsafe impl<T: Send> Send for BoundedRingBuffer<T> {}

impl<T> BoundedRingBuffer<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or_else(|| panic!("ring buffer capacity {capacity} is too large"));

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        BoundedRingBuffer {
            head: Padded::new(AtomicU64::new(0)),
            tail: Padded::new(AtomicU64::new(0)),
            slots,
            mask: capacity as u64 - 1,
        }
    }

    #[inline]
    fn slot(&self, pos: u64) -> *mut MaybeUninit<T> {
        self.slots[(pos & self.mask) as usize].get()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity() as u64) as usize
    }
}

impl<T> Drop for BoundedRingBuffer<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        for pos in head..tail {
            // SAFETY: positions in head..tail hold published, unconsumed items
            unsafe { (*self.slot(pos)).assume_init_drop() };
        }
    }
}

/// The writing half of a [`ring_buffer`].
pub struct Producer<T> {
    buffer: Arc<BoundedRingBuffer<T>>,
}

impl<T> Producer<T> {
    /// Append `value`, or hand it back if the buffer is full.
    pub fn enqueue(&mut self, value: T) -> Result<(), T> {
        let buffer = &*self.buffer;
        // sole writer of tail
        let tail = buffer.tail.load(Ordering::Relaxed);
        let head = buffer.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == buffer.capacity() as u64 {
            return Err(value);
        }

        // SAFETY: the slot at tail is outside head..tail, so the consumer
        // does not touch it until the store below publishes it
        unsafe { (*buffer.slot(tail)).write(value) };
        buffer.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

/// The reading half of a [`ring_buffer`].
pub struct Consumer<T> {
    buffer: Arc<BoundedRingBuffer<T>>,
}

impl<T> Consumer<T> {
    /// Take the oldest item, or `None` if the buffer is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        let buffer = &*self.buffer;
        // sole writer of head
        let head = buffer.head.load(Ordering::Relaxed);
        let tail = buffer.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: the acquire load of tail made the producer's write visible,
        // and the producer won't reuse the slot until head moves past it
        let value = unsafe { (*buffer.slot(head)).assume_init_read() };
        buffer.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}
