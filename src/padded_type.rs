use std::fmt;
use std::ops::Deref;

pub const CACHE_LINE: usize = 64;

// keeps a hot atomic alone on its line; cursors, flags and counters written by
// different threads each get one
#[repr(align(64))]
pub struct Padded<T>(T);

impl<T> Padded<T> {
    pub const fn new(value: T) -> Self {
        Padded(value)
    }
}

impl<T> Deref for Padded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Padded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const _: () = assert!(std::mem::align_of::<Padded<u8>>() == CACHE_LINE);
const _: () = assert!(std::mem::size_of::<Padded<u64>>() == CACHE_LINE);
