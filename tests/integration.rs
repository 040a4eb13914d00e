use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use spin_pool::{
    self, CleanupFn, Error, FixedBlockPool, Job, JobFn, PoolConfig, TaskError, WorkerPool,
    define_job_fn, job_payload,
};

job_payload! {
    SumTask {
        iterations: u64,
        result: u64,
        done: *const AtomicUsize,
    }
}

job_payload! {
    CountTask {
        counter: *const AtomicUsize,
    }
}

define_job_fn!(sum_task, SumTask, |task| {
    let mut sum = 0u64;
    for i in 0..task.iterations {
        sum = sum.wrapping_add(i * 17 + 23);
    }
    task.result = sum;
    let done = unsafe { &*task.done };
    done.fetch_add(1, Ordering::Release);
});

define_job_fn!(count_task, CountTask, |task| {
    let counter = unsafe { &*task.counter };
    counter.fetch_add(1, Ordering::Release);
});

fn free_count_task(payload: *mut ()) {
    drop(unsafe { Box::from_raw(payload as *mut CountTask) });
}

fn small_pool(workers: usize, queue_capacity: usize) -> WorkerPool {
    WorkerPool::new(
        PoolConfig::default()
            .with_workers(workers)
            .with_queue_capacity(queue_capacity)
            .with_spin_loops(64),
    )
    .unwrap()
}

fn wait_for(counter: &AtomicUsize, expected: usize) {
    let start = Instant::now();
    while counter.load(Ordering::Acquire) < expected {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for {expected} jobs, saw {}",
            counter.load(Ordering::Acquire)
        );
        thread::yield_now();
    }
}

#[test]
fn test_basic_submit() {
    let pool = spin_pool::with_workers(2).unwrap();
    let handle = pool.submit(|| 3 + 4).unwrap();
    assert_eq!(handle.wait(), Ok(7));
}

#[test]
fn test_default_pool_uses_available_parallelism() {
    let pool = spin_pool::new().unwrap();
    let expected = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    assert_eq!(pool.worker_count(), expected);
    assert_eq!(pool.queue_capacity(), 1024);
    assert_eq!(pool.spin_loops(), 256);
}

#[test]
fn test_queue_capacity_rounds_to_power_of_two() {
    let pool = small_pool(1, 1000);
    assert_eq!(pool.queue_capacity(), 1024);
}

#[test]
fn test_raw_borrowed_jobs() {
    let pool = small_pool(4, 256);
    let done = AtomicUsize::new(0);
    let mut tasks: Vec<SumTask> = (0..100).map(|i| SumTask::new(1000 + i, 0, &done)).collect();

    for task in tasks.iter_mut() {
        let payload = task as *mut SumTask as *mut ();
        while !unsafe { pool.enqueue_raw(sum_task as JobFn, payload, None) } {
            thread::yield_now();
        }
    }

    wait_for(&done, tasks.len());
    for task in &tasks {
        assert_ne!(task.result, 0, "task with {} iterations did not run", task.iterations);
    }
}

#[test]
fn test_raw_owned_jobs_are_cleaned_up() {
    let pool = small_pool(2, 64);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let payload = Box::into_raw(Box::new(CountTask::new(Arc::as_ptr(&counter)))) as *mut ();
        while !unsafe {
            pool.enqueue_raw(
                count_task as JobFn,
                payload,
                Some(free_count_task as CleanupFn),
            )
        } {
            thread::yield_now();
        }
    }

    wait_for(&counter, 50);
    pool.shutdown();
    assert_eq!(counter.load(Ordering::Relaxed), 50);
}

#[test]
fn test_payloads_from_block_pool() {
    let pool = small_pool(2, 64);
    let mut blocks: FixedBlockPool<CountTask> = FixedBlockPool::new(8);
    let counter = AtomicUsize::new(0);

    let mut payloads = Vec::new();
    for _ in 0..8 {
        let payload = blocks.allocate(CountTask::new(&counter)).unwrap();
        let job = unsafe { Job::borrowed(count_task as JobFn, payload.as_ptr() as *mut ()) };
        assert!(pool.enqueue(job));
        payloads.push(payload);
    }
    assert!(blocks.allocate(CountTask::new(&counter)).is_err());

    wait_for(&counter, 8);
    for payload in payloads {
        unsafe { blocks.deallocate(payload.as_ptr()) };
    }
    assert_eq!(blocks.available(), 8);
}

#[test]
fn test_full_queue_rejects_raw_jobs() {
    // one worker kept busy so nothing drains the queue
    let pool = small_pool(1, 4);
    let release = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let gate = {
        let release = release.clone();
        let started = started.clone();
        pool.submit(move || {
            started.store(1, Ordering::Release);
            while release.load(Ordering::Acquire) == 0 {
                thread::yield_now();
            }
        })
        .unwrap()
    };
    wait_for(&started, 1);

    let counter = AtomicUsize::new(0);
    let mut task = CountTask::new(&counter);
    let job = unsafe { Job::borrowed(count_task as JobFn, &mut task as *mut CountTask as *mut ()) };

    let accepted = (0..8).filter(|_| pool.enqueue(job)).count();
    assert_eq!(accepted, pool.queue_capacity());

    release.store(1, Ordering::Release);
    gate.wait().unwrap();
    wait_for(&counter, accepted);
}

#[test]
fn test_submit_returns_values_from_many_tasks() {
    let pool = small_pool(4, 64);
    let handles: Vec<_> = (0..1000u64)
        .map(|i| pool.submit(move || i * i).unwrap())
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let i = i as u64;
        assert_eq!(handle.wait().unwrap(), i * i);
    }
}

#[test]
fn test_submit_panic_is_reported_and_worker_survives() {
    let pool = small_pool(1, 16);

    let handle = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
    match handle.wait() {
        Err(TaskError::Panicked(message)) => assert!(message.contains("boom")),
        other => panic!("expected a panic report, got {other:?}"),
    }

    // same single worker still serves jobs
    let handle = pool.submit(|| "still alive".to_string()).unwrap();
    assert_eq!(handle.wait().unwrap(), "still alive");
}

#[test]
fn test_raw_job_panic_does_not_kill_worker() {
    fn explode(_: *mut ()) {
        panic!("raw job failure");
    }

    let pool = small_pool(1, 16);
    assert!(unsafe { pool.enqueue_raw(explode as JobFn, std::ptr::null_mut(), None) });

    let handle = pool.submit(|| 42).unwrap();
    assert_eq!(handle.wait().unwrap(), 42);
}

#[test]
fn test_wait_timeout() {
    let pool = small_pool(1, 16);
    let handle = pool
        .submit(|| {
            thread::sleep(Duration::from_millis(200));
            1
        })
        .unwrap();

    assert!(!handle.wait_timeout(Duration::from_millis(1)));
    assert!(handle.wait_timeout(Duration::from_secs(10)));
    assert!(handle.is_complete());
    assert_eq!(handle.wait().unwrap(), 1);
}

#[test]
fn test_try_execute() {
    let pool = small_pool(2, 32);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let counter = counter.clone();
        assert!(pool.try_execute(move || {
            counter.fetch_add(1, Ordering::Release);
        }));
    }

    wait_for(&counter, 20);
}

#[test]
fn test_set_spin_loops() {
    let pool = small_pool(2, 32);
    pool.set_spin_loops(0);
    assert_eq!(pool.spin_loops(), 0);

    // workers yield immediately but still pick up work
    let handle = pool.submit(|| 5).unwrap();
    assert_eq!(handle.wait().unwrap(), 5);
}

#[test]
fn test_shutdown_twice_then_drop() {
    let pool = small_pool(4, 1024);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..500 {
        let counter = counter.clone();
        assert!(pool.try_execute(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }

    pool.shutdown();
    pool.shutdown();
    assert!(pool.is_shut_down());
    assert_eq!(counter.load(Ordering::Relaxed), 500);

    drop(pool);
    assert_eq!(counter.load(Ordering::Relaxed), 500);
}

#[test]
fn test_drain_burst_before_shutdown() {
    // yielding workers so most of the burst is still queued at shutdown
    let pool = small_pool(2, 4096);
    pool.set_spin_loops(0);
    let counter = Arc::new(AtomicUsize::new(0));

    let burst = 4000;
    for _ in 0..burst {
        let counter = counter.clone();
        assert!(pool.try_execute(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }
    pool.shutdown();

    assert_eq!(counter.load(Ordering::Relaxed), burst);
    assert_eq!(pool.pending(), 0);
}

#[test]
fn test_drop_runs_queued_jobs() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = small_pool(1, 256);
        for _ in 0..200 {
            let counter = counter.clone();
            assert!(pool.try_execute(move || {
                thread::sleep(Duration::from_micros(10));
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }
    }
    assert_eq!(counter.load(Ordering::Relaxed), 200);
}

#[test]
fn test_submissions_after_shutdown_are_rejected() {
    let pool = small_pool(2, 32);
    pool.shutdown();

    assert!(matches!(pool.submit(|| 1), Err(Error::ShutDown)));
    assert!(!pool.try_execute(|| {}));

    let counter = AtomicUsize::new(0);
    let mut task = CountTask::new(&counter);
    let payload = &mut task as *mut CountTask as *mut ();
    assert!(!unsafe { pool.enqueue_raw(count_task as JobFn, payload, None) });
    assert_eq!(counter.load(Ordering::Relaxed), 0);
}

#[test]
fn test_concurrent_submitters_and_shutdown() {
    for round in 0..200 {
        let pool = Arc::new(small_pool(2, 64));
        let executed = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let executed = executed.clone();
                let accepted = accepted.clone();
                thread::spawn(move || {
                    loop {
                        let executed = executed.clone();
                        if pool.try_execute(move || {
                            executed.fetch_add(1, Ordering::Relaxed);
                        }) {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        } else if pool.is_shut_down() {
                            break;
                        } else {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        wait_for(&accepted, 1);
        pool.shutdown();
        for submitter in submitters {
            submitter.join().unwrap();
        }

        // the pool is still alive: everything accepted ran inside shutdown
        assert_eq!(
            executed.load(Ordering::Relaxed),
            accepted.load(Ordering::Relaxed),
            "round {round}: accepted jobs left unrun after shutdown"
        );
        assert_eq!(pool.pending(), 0);
    }
}

#[test]
fn test_submit_handles_complete_when_racing_shutdown() {
    for round in 0..100 {
        let pool = Arc::new(small_pool(2, 16));

        let submitters: Vec<_> = (0..4)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut handles = Vec::new();
                    loop {
                        match pool.submit(move || i) {
                            Ok(handle) => handles.push(handle),
                            Err(Error::ShutDown) => break,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    handles
                })
            })
            .collect();

        thread::sleep(Duration::from_micros(200));
        pool.shutdown();

        for (i, submitter) in submitters.into_iter().enumerate() {
            for handle in submitter.join().unwrap() {
                assert!(
                    handle.wait_timeout(Duration::from_secs(5)),
                    "round {round}: accepted task never ran"
                );
                assert_eq!(handle.wait(), Ok(i));
            }
        }
        assert_eq!(Arc::strong_count(&pool), 1);
    }
}

#[test]
fn test_unrepresentable_queue_capacity_is_an_error() {
    let result = WorkerPool::new(
        PoolConfig::default()
            .with_workers(1)
            .with_queue_capacity(usize::MAX),
    );
    match result {
        Err(Error::InvalidCapacity { requested }) => assert_eq!(requested, usize::MAX),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("pool should not start"),
    }
}

#[test]
fn test_shutdown_from_inside_a_job() {
    let pool = Arc::new(small_pool(2, 32));
    let inner = pool.clone();

    let handle = pool.submit(move || inner.shutdown()).unwrap();
    assert_eq!(handle.wait(), Ok(()));

    pool.shutdown();
    assert!(pool.is_shut_down());
}

#[test]
fn test_worker_threads_are_named() {
    let pool = WorkerPool::new(
        PoolConfig::balanced()
            .with_workers(1)
            .with_thread_name_prefix("matcher-"),
    )
    .unwrap();

    let name = pool
        .submit(|| thread::current().name().map(str::to_owned))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(name.as_deref(), Some("matcher-0"));
}
