//! Fixed-size worker pool that dispatches contiguous chunks of a task range
//! to idle threads, cooperating with a wall-clock deadline.
//!
//! Grounded in the pull-based dispatch `rayon::prelude` enables in
//! `model/train.rs`-style parallel training loops, but built directly on
//! `rayon::ThreadPoolBuilder` rather than `par_iter` so each worker gets its
//! own `init_thread`/`finalize` lifecycle hooks instead of a fresh closure per
//! item.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::error::InvalidArgument;

/// The unit of work a [`TaskScheduler`] dispatches: `num_tasks` indivisible
/// tasks, run in contiguous chunks, on up to `num_threads` worker threads.
pub trait TaskGenerator: Sync {
    /// Total number of tasks, `[0, num_tasks())`.
    fn num_tasks(&self) -> usize;
    /// Called once before dispatch begins, given the final thread/chunk sizing.
    fn prepare(&self, num_threads: usize, chunk_size: usize);
    /// Called once per worker thread, before it pulls its first chunk.
    fn init_thread(&self, thread_id: usize);
    /// Run tasks `[begin, end)` on worker `thread_id`.
    fn run_tasks(&self, begin: usize, end: usize, thread_id: usize);
    /// Called once after every worker has finished (or the deadline hit).
    fn finalize(&self);
}

/// Hook for pinning worker `thread_id` to a NUMA node. The default is a
/// no-op; a platform-specific collaborator can be substituted without
/// touching the scheduler.
pub trait NumaPinner: Sync {
    /// Pin the calling thread, which has been assigned logical id `thread_id`.
    fn pin(&self, thread_id: usize);
}

/// The default, no-op pinning policy.
pub struct NoPinning;

impl NumaPinner for NoPinning {
    fn pin(&self, _thread_id: usize) {}
}

/// Outcome of a [`TaskScheduler::run`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerResult {
    /// Whether every task in `[0, num_tasks)` was dispatched before the deadline.
    pub finished: bool,
    /// The smallest task id not yet dispatched; equals `num_tasks` when `finished`.
    pub next_task: usize,
}

/// Hyperparameters for [`TaskScheduler::run`].
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// Number of worker threads; `None` auto-detects available parallelism.
    pub num_threads: Option<usize>,
    /// Number of tasks dispatched to a worker per pull; `0` means auto-size
    /// to roughly `num_tasks / (num_threads * 8)`, floored at 1.
    pub chunk_size: usize,
    /// Absolute wall-clock deadline for the whole run, if any.
    pub deadline: Option<Instant>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { num_threads: None, chunk_size: 0, deadline: None }
    }
}

fn resolve_num_threads(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(num_cpus::get)
}

fn resolve_chunk_size(requested: usize, num_tasks: usize, num_threads: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    (num_tasks / (num_threads.max(1) * 8)).max(1)
}

/// Partitions `[0, generator.num_tasks())` into chunks and runs them across a
/// fixed-size thread pool, respecting `opts.deadline`.
pub struct TaskScheduler {
    options: SchedulerOptions,
}

impl TaskScheduler {
    /// Construct with the given options.
    pub fn new(options: SchedulerOptions) -> Self {
        Self { options }
    }

    /// Run `generator` to completion or until the deadline passes, using the
    /// default (no-op) NUMA pinning policy.
    pub fn run(&self, generator: &(impl TaskGenerator + ?Sized)) -> Result<SchedulerResult, InvalidArgument> {
        self.run_with_pinning(generator, &NoPinning)
    }

    /// Run `generator`, pinning each worker thread via `pinner`.
    pub fn run_with_pinning(
        &self,
        generator: &(impl TaskGenerator + ?Sized),
        pinner: &(impl NumaPinner + ?Sized),
    ) -> Result<SchedulerResult, InvalidArgument> {
        let num_tasks = generator.num_tasks();
        if num_tasks == 0 {
            generator.prepare(0, 0);
            generator.finalize();
            return Ok(SchedulerResult { finished: true, next_task: 0 });
        }

        let num_threads = resolve_num_threads(self.options.num_threads);
        let chunk_size = resolve_chunk_size(self.options.chunk_size, num_tasks, num_threads);
        generator.prepare(num_threads, chunk_size);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| InvalidArgument::Other(format!("failed to build worker pool: {e}")))?;

        let cursor = AtomicUsize::new(0);
        let deadline_hit = std::sync::atomic::AtomicBool::new(false);
        let deadline = self.options.deadline;

        pool.scope(|scope| {
            for thread_id in 0..num_threads {
                let cursor = &cursor;
                let deadline_hit = &deadline_hit;
                scope.spawn(move |_| {
                    pinner.pin(thread_id);
                    generator.init_thread(thread_id);
                    loop {
                        if let Some(dl) = deadline {
                            if Instant::now() >= dl {
                                deadline_hit.store(true, Ordering::Relaxed);
                                break;
                            }
                        }
                        let begin = cursor.fetch_add(chunk_size, Ordering::SeqCst);
                        if begin >= num_tasks {
                            break;
                        }
                        let end = (begin + chunk_size).min(num_tasks);
                        tracing::debug!(thread_id, begin, end, "running task chunk");
                        generator.run_tasks(begin, end, thread_id);
                    }
                });
            }
        });

        generator.finalize();

        let next_task = cursor.load(Ordering::SeqCst).min(num_tasks);
        let finished = !deadline_hit.load(Ordering::Relaxed) && next_task >= num_tasks;
        Ok(SchedulerResult { finished, next_task: if finished { num_tasks } else { next_task } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingGenerator {
        total: usize,
        seen: Mutex<Vec<(usize, usize)>>,
        prepared: std::sync::atomic::AtomicBool,
        finalized: std::sync::atomic::AtomicBool,
    }

    impl TaskGenerator for CountingGenerator {
        fn num_tasks(&self) -> usize {
            self.total
        }
        fn prepare(&self, _num_threads: usize, _chunk_size: usize) {
            self.prepared.store(true, Ordering::SeqCst);
        }
        fn init_thread(&self, _thread_id: usize) {}
        fn run_tasks(&self, begin: usize, end: usize, _thread_id: usize) {
            self.seen.lock().unwrap().push((begin, end));
        }
        fn finalize(&self) {
            self.finalized.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn every_task_runs_exactly_once() {
        let gen = CountingGenerator {
            total: 37,
            seen: Mutex::new(Vec::new()),
            prepared: std::sync::atomic::AtomicBool::new(false),
            finalized: std::sync::atomic::AtomicBool::new(false),
        };
        let scheduler = TaskScheduler::new(SchedulerOptions { num_threads: Some(4), chunk_size: 5, ..Default::default() });
        let result = scheduler.run(&gen).unwrap();

        assert!(result.finished);
        assert_eq!(result.next_task, 37);
        assert!(gen.prepared.load(Ordering::SeqCst));
        assert!(gen.finalized.load(Ordering::SeqCst));

        let mut covered = vec![false; 37];
        for (begin, end) in gen.seen.lock().unwrap().iter() {
            for i in *begin..*end {
                assert!(!covered[i], "task {i} ran twice");
                covered[i] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn deadline_stops_dispatch_early() {
        struct SlowGenerator {
            total: usize,
        }
        impl TaskGenerator for SlowGenerator {
            fn num_tasks(&self) -> usize {
                self.total
            }
            fn prepare(&self, _num_threads: usize, _chunk_size: usize) {}
            fn init_thread(&self, _thread_id: usize) {}
            fn run_tasks(&self, _begin: usize, _end: usize, _thread_id: usize) {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            fn finalize(&self) {}
        }
        let gen = SlowGenerator { total: 1000 };
        let deadline = Instant::now() + std::time::Duration::from_millis(50);
        let scheduler = TaskScheduler::new(SchedulerOptions { num_threads: Some(2), chunk_size: 1, deadline: Some(deadline) });
        let result = scheduler.run(&gen).unwrap();

        assert!(!result.finished);
        assert!(result.next_task < 1000);
    }

    #[test]
    fn empty_task_set_finishes_immediately() {
        let gen = CountingGenerator {
            total: 0,
            seen: Mutex::new(Vec::new()),
            prepared: std::sync::atomic::AtomicBool::new(false),
            finalized: std::sync::atomic::AtomicBool::new(false),
        };
        let scheduler = TaskScheduler::new(SchedulerOptions::default());
        let result = scheduler.run(&gen).unwrap();
        assert!(result.finished);
        assert_eq!(result.next_task, 0);
    }
}
