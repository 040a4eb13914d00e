use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};

/// A fixed number of `T`-sized blocks carved out of one allocation.
///
/// Blocks are handed out with [`allocate`](Self::allocate) and returned with
/// [`deallocate`](Self::deallocate). The free list is a stack, so the block
/// freed last is the next one handed out. The pool never grows: once every
/// block is live, `allocate` fails with [`Error::PoolExhausted`].
///
/// The pool has no internal synchronization. It is `Send` but not `Sync`;
/// keep it on the thread that builds job payloads.
pub struct FixedBlockPool<T> {
    blocks: NonNull<T>,
    layout: Layout,
    capacity: usize,
    free: Vec<usize>,
    // !Sync, owns T
    _marker: PhantomData<(T, *mut ())>,
}

unsafe impl<T: Send> Send for FixedBlockPool<T> {}

impl<T> FixedBlockPool<T> {
    /// Reserve storage for `capacity` objects up front.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero or `capacity` blocks of `T` overflow `isize`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "block pool needs at least one block");

        let Ok(layout) = Layout::array::<T>(capacity) else {
            panic!("block pool of {capacity} blocks overflows isize");
        };
        let blocks = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: layout has a non-zero size
            let raw = unsafe { alloc::alloc(layout) } as *mut T;
            match NonNull::new(raw) {
                Some(blocks) => blocks,
                None => alloc::handle_alloc_error(layout),
            }
        };

        // lowest index ends up on top of the stack
        let free = (0..capacity).rev().collect();

        FixedBlockPool {
            blocks,
            layout,
            capacity,
            free,
            _marker: PhantomData,
        }
    }

    /// Move `value` into a free block and return a pointer to it.
    ///
    /// The pointer stays valid until it is passed to `deallocate` or the pool
    /// is dropped.
    pub fn allocate(&mut self, value: T) -> Result<NonNull<T>> {
        let Some(index) = self.free.pop() else {
            return Err(Error::PoolExhausted {
                capacity: self.capacity,
            });
        };

        // SAFETY: index < capacity and the block is vacant
        unsafe {
            let block = self.blocks.as_ptr().add(index);
            block.write(value);
            Ok(NonNull::new_unchecked(block))
        }
    }

    /// Drop the object at `ptr` in place and return its block to the pool.
    ///
    /// A null pointer is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by `allocate` on this pool
    /// that has not been deallocated since, and no reference derived from it
    /// may be used afterwards.
    pub unsafe fn deallocate(&mut self, ptr: *mut T) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(self.owns(ptr), "pointer was not allocated from this pool");

        let index = self.index_of(ptr);
        debug_assert!(!self.free.contains(&index), "block deallocated twice");

        // SAFETY: caller guarantees ptr holds a live object from this pool
        unsafe { ptr::drop_in_place(ptr) };
        self.free.push(index);
    }

    /// Whether `ptr` points at a block boundary inside this pool's storage.
    pub fn owns(&self, ptr: *const T) -> bool {
        let size = std::mem::size_of::<T>();
        let base = self.blocks.as_ptr() as usize;
        let addr = ptr as usize;
        if size == 0 {
            return addr == base;
        }
        addr >= base && addr < base + size * self.capacity && (addr - base) % size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks currently free.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Objects currently allocated.
    pub fn live(&self) -> usize {
        self.capacity - self.free.len()
    }

    fn index_of(&self, ptr: *const T) -> usize {
        let size = std::mem::size_of::<T>();
        if size == 0 {
            // zero-sized blocks are indistinguishable; hand back any used index
            return (0..self.capacity)
                .find(|index| !self.free.contains(index))
                .unwrap_or(0);
        }
        (ptr as usize - self.blocks.as_ptr() as usize) / size
    }
}

impl<T> Drop for FixedBlockPool<T> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<T>() && self.live() > 0 {
            let mut vacant = vec![false; self.capacity];
            for &index in &self.free {
                vacant[index] = true;
            }
            for (index, _) in vacant.iter().enumerate().filter(|(_, vacant)| !**vacant) {
                // SAFETY: every index missing from the free list holds a live object
                unsafe { ptr::drop_in_place(self.blocks.as_ptr().add(index)) };
            }
        }

        if self.layout.size() != 0 {
            // SAFETY: allocated in `new` with this exact layout
            unsafe { alloc::dealloc(self.blocks.as_ptr() as *mut u8, self.layout) };
        }
    }
}
