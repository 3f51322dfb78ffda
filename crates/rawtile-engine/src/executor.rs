//! Fixed-size worker pool with a shared FIFO task queue.
//!
//! Tile tasks are short, CPU-bound and independent; the pool is sized to
//! the machine's reported parallelism and never grows. Dropping the pool
//! stops intake, drains already-queued work and joins the workers.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct State {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
}

/// Completion handle for a spawned task.
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task completes and returns its result, or `None`
    /// if the task panicked.
    pub fn join(self) -> Option<T> {
        self.rx.recv().ok()
    }
}

/// Bounded worker pool. FIFO dispatch from a single shared queue; any
/// worker may run any task.
pub struct Executor {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for Executor {
    /// Pool sized to the machine's reported parallelism (at least 1).
    fn default() -> Self {
        let n = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(n)
    }
}

impl Executor {
    /// Creates a pool with `threads` workers (clamped to at least 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(State { jobs: VecDeque::new(), shutdown: false }),
            available: Condvar::new(),
        });
        let workers = (0..threads)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("rawtile-worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        debug!(threads, "worker pool started");
        Self { shared, workers }
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a task and returns its completion handle.
    pub fn spawn<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(f());
        });
        {
            let mut state = self.shared.state.lock().expect("worker pool mutex poisoned");
            state.jobs.push_back(job);
        }
        self.shared.available.notify_one();
        TaskHandle { rx }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("worker pool mutex poisoned");
            state.shutdown = true;
        }
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock().expect("worker pool mutex poisoned");
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                // Queued work drains before shutdown completes.
                if state.shutdown {
                    return;
                }
                state = shared
                    .available
                    .wait(state)
                    .expect("worker pool mutex poisoned");
            }
        };
        // A panicking task drops its result channel and takes nothing else
        // down with it; the submitter observes the failure on join().
        let _ = catch_unwind(AssertUnwindSafe(job));
    }
}
