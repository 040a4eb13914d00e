use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::padded_type::Padded;

// each slot gets its own cache line so neighbouring producers and consumers
// don't bounce each other's sequence counters
#[repr(align(64))]
struct Slot<T> {
    // == pos      free for the producer claiming pos
    // == pos + 1  holds the item written at pos
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded lock-free queue for any number of producers and consumers.
///
/// Every slot carries a sequence number that says which cursor position it is
/// currently valid for, so "is this slot free / full" is a single acquire
/// load compared against the claimed position. Producers race on `tail` and
/// consumers on `head` with compare-and-swap; nothing here ever blocks.
///
/// Capacity is rounded up to a power of two (at least 2) and fixed for the
/// life of the queue. A full queue rejects new items immediately; retrying is
/// up to the caller.
pub struct MpmcQueue<T> {
    head: Padded<AtomicU64>,
    tail: Padded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    mask: u64,
}

unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

impl<T> MpmcQueue<T> {
    /// # Panics
    ///
    /// If `capacity` is above the largest power of two a `usize` can hold.
    /// [`try_new`](Self::try_new) reports that as an error instead.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`new`](Self::new), but an unrepresentable capacity comes back as
    /// [`Error::InvalidCapacity`].
    pub fn try_new(requested: usize) -> Result<Self> {
        let capacity = requested
            .max(2)
            .checked_next_power_of_two()
            .ok_or(Error::InvalidCapacity { requested })?;

        let slots = (0..capacity as u64)
            .map(|index| Slot {
                sequence: AtomicU64::new(index),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Ok(MpmcQueue {
            head: Padded::new(AtomicU64::new(0)),
            tail: Padded::new(AtomicU64::new(0)),
            slots,
            mask: capacity as u64 - 1,
        })
    }

    /// Push `value`, or hand it back if the queue is full.
    pub fn enqueue(&self, value: T) -> std::result::Result<(), T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        let slot = loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(pos) as i64;

            if diff == 0 {
                // slot was vacated for this lap; try to own position pos
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break slot,
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // still holds the item from the previous lap
                return Err(value);
            } else {
                // another producer already took pos
                pos = self.tail.load(Ordering::Relaxed);
            }
        };

        // SAFETY: winning the CAS at pos gives this thread sole access to the
        // slot until the sequence store below
        unsafe { (*slot.value.get()).write(value) };
        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pop the next item, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        let slot = loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(pos.wrapping_add(1)) as i64;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break slot,
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // nothing published at pos yet
                return None;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        };

        // SAFETY: the acquire load saw pos + 1, so the producer's write is
        // visible, and the CAS made this thread the only reader of pos
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        // jump a whole lap ahead: free for the producer that claims pos + capacity
        slot.sequence
            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
        Some(value)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate number of queued items; exact only when no other thread is
    /// touching the queue.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.saturating_sub(head).min(self.capacity() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<T>() {
            while self.dequeue().is_some() {}
        }
    }
}
