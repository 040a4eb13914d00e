/// Entry point of a job; receives the job's payload pointer.
pub type JobFn = fn(*mut ());

/// Releases a job-owned payload once the job is finished with it.
pub type CleanupFn = fn(*mut ());

/// Who is responsible for a job's payload memory.
#[derive(Copy, Clone, Debug)]
pub enum Payload {
    /// Owned by whoever built the job; the pool never frees it.
    Borrowed(*mut ()),
    /// Owned by the job; `cleanup` runs exactly once after the entry point,
    /// or instead of it if the job is discarded.
    Owned { ptr: *mut (), cleanup: CleanupFn },
}

impl Payload {
    #[inline]
    pub fn as_ptr(&self) -> *mut () {
        match *self {
            Payload::Borrowed(ptr) => ptr,
            Payload::Owned { ptr, .. } => ptr,
        }
    }
}

/// A unit of work: an entry function and the payload it is called with.
///
/// Jobs are plain `Copy` values that get copied into queue slots. The queue
/// never frees the payload; see [`Payload`] for ownership.
#[derive(Copy, Clone, Debug)]
pub struct Job {
    // None marks the wake sentinel pushed at shutdown
    entry: Option<JobFn>,
    payload: Payload,
}

// payload pointers cross to worker threads; the unsafe constructors make the
// caller vouch for that
unsafe impl Send for Job {}
unsafe impl Sync for Job {}

impl Job {
    /// A job whose payload outlives it and is freed by the caller.
    ///
    /// # Safety
    ///
    /// `payload` must stay valid until `entry` has returned and must be safe
    /// to access from a worker thread.
    #[inline]
    pub unsafe fn borrowed(entry: JobFn, payload: *mut ()) -> Self {
        Job {
            entry: Some(entry),
            payload: Payload::Borrowed(payload),
        }
    }

    /// A job that owns `payload` and releases it with `cleanup`.
    ///
    /// # Safety
    ///
    /// `payload` must be valid until `cleanup` runs, safe to access from a
    /// worker thread, and not freed by anyone else.
    #[inline]
    pub unsafe fn owned(entry: JobFn, payload: *mut (), cleanup: CleanupFn) -> Self {
        Job {
            entry: Some(entry),
            payload: Payload::Owned {
                ptr: payload,
                cleanup,
            },
        }
    }

    /// # Safety
    ///
    /// Same contract as [`Job::borrowed`] or [`Job::owned`], chosen by
    /// whether `cleanup` is given.
    #[inline]
    pub unsafe fn from_raw(entry: JobFn, payload: *mut (), cleanup: Option<CleanupFn>) -> Self {
        match cleanup {
            Some(cleanup) => unsafe { Job::owned(entry, payload, cleanup) },
            None => unsafe { Job::borrowed(entry, payload) },
        }
    }

    /// The no-op job used to nudge workers during shutdown.
    pub const fn wake() -> Self {
        Job {
            entry: None,
            payload: Payload::Borrowed(std::ptr::null_mut()),
        }
    }

    pub fn is_wake(&self) -> bool {
        self.entry.is_none()
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    /// Call the entry point, then release an owned payload. The payload is
    /// released even if the entry point unwinds.
    #[inline]
    pub fn run(self) {
        let _cleanup = CleanupGuard(self.payload);
        if let Some(entry) = self.entry {
            entry(self.payload.as_ptr());
        }
    }

    /// Release an owned payload without running the job.
    pub fn discard(self) {
        drop(CleanupGuard(self.payload));
    }
}

struct CleanupGuard(Payload);

impl Drop for CleanupGuard {
    #[inline]
    fn drop(&mut self) {
        if let Payload::Owned { ptr, cleanup } = self.0 {
            cleanup(ptr);
        }
    }
}
