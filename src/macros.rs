/// Declare a job payload struct with a positional `new` constructor.
///
/// Attributes and a visibility in front of the name are passed through to the
/// struct; every field is public so the job function can write results back.
///
/// # Examples
/// ```rust
/// use spin_pool::job_payload;
///
/// job_payload! {
///     #[derive(Debug, Clone, Copy)]
///     pub Quote {
///         bid: u64,
///         ask: u64,
///     }
/// }
///
/// let quote = Quote::new(100, 101);
/// assert_eq!(quote.ask - quote.bid, 1);
/// ```
#[macro_export]
macro_rules! job_payload {
    (
        $(#[$attr:meta])*
        $vis:vis $name:ident { $($field:ident: $ty:ty),* $(,)? }
    ) => {
        $(#[$attr])*
        $vis struct $name {
            $(pub $field: $ty,)*
        }

        impl $name {
            #[inline]
            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $ty),*) -> Self {
                $name { $($field),* }
            }
        }
    };
}

/// Define a [`JobFn`](crate::JobFn) that sees its payload as `&mut $payload_type`.
///
/// The generated function is only sound when every job that uses it carries a
/// pointer to a live `$payload_type` that nothing else touches while the job
/// runs; the unsafe constructors on [`Job`](crate::Job) are where that is
/// promised.
///
/// # Examples
/// ```rust
/// use spin_pool::{define_job_fn, job_payload, Job, JobFn};
///
/// job_payload! {
///     Counter { hits: u64 }
/// }
///
/// define_job_fn!(bump, Counter, |counter| {
///     counter.hits += 1;
/// });
///
/// let mut counter = Counter::new(0);
/// let job = unsafe { Job::borrowed(bump as JobFn, &mut counter as *mut Counter as *mut ()) };
/// job.run();
/// assert_eq!(counter.hits, 1);
/// ```
#[macro_export]
macro_rules! define_job_fn {
    ($fn_name:ident, $payload_type:ty, |$payload:ident| $body:block) => {
        fn $fn_name(raw_payload: *mut ()) {
            let $payload = unsafe { &mut *(raw_payload as *mut $payload_type) };
            $body
        }
    };
}
