//! Self-feeding work queue for graph closures.
//!
//! Workers pull tasks from a shared channel and may push follow-up tasks
//! while they run. The queue drains when every pushed task has been handled,
//! at which point the last finishing worker broadcasts a stop message.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         WorkQueue                           │
//! │                                                             │
//! │  seed items ──>┌──────────────────────────────────────┐     │
//! │                │     Unbounded Channel<Message<T>>    │<─┐  │
//! │                └──────────────────────────────────────┘  │  │
//! │                           │                              │  │
//! │          ┌────────────────┼────────────────┐             │  │
//! │          ▼                ▼                ▼             │  │
//! │    ┌──────────┐    ┌──────────┐    ┌──────────┐          │  │
//! │    │ Worker 1 │    │ Worker 2 │    │ Worker N │──push────┘  │
//! │    └──────────┘    └──────────┘    └──────────┘             │
//! │                 pending: AtomicUsize                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers are scoped threads, so handlers may borrow from the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

static DEFAULT_THREADS: LazyLock<usize> = LazyLock::new(num_cpus::get);

/// Number of worker threads to use when the configuration asks for "auto" (0).
pub fn default_num_threads() -> usize {
    *DEFAULT_THREADS
}

/// Resolve a configured job count; 0 means one thread per CPU.
pub fn resolve_num_threads(jobs: usize) -> usize {
    if jobs == 0 {
        default_num_threads()
    } else {
        jobs
    }
}

enum Message<T> {
    Task(T),
    Stop,
}

/// Handle given to a task handler for pushing follow-up work.
pub struct WorkerState<'q, T> {
    sender: &'q Sender<Message<T>>,
    pending: &'q AtomicUsize,
    worker_id: usize,
}

impl<T> WorkerState<'_, T> {
    /// Queue another task.
    pub fn push_task(&self, task: T) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        // The sender outlives every worker, so the channel cannot be closed here.
        let _ = self.sender.send(Message::Task(task));
    }

    /// Index of the worker running the current task.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }
}

/// Run `handler` over `seeds` and everything they transitively push.
///
/// Returns the number of tasks handled. With `num_threads <= 1` the tasks run
/// on the calling thread.
pub fn workqueue_run<T, I, F>(seeds: I, num_threads: usize, handler: F) -> std::io::Result<usize>
where
    T: Send,
    I: IntoIterator<Item = T>,
    F: Fn(&WorkerState<'_, T>, T) + Sync,
{
    let (sender, receiver) = unbounded::<Message<T>>();
    let pending = AtomicUsize::new(0);
    let handled = AtomicUsize::new(0);

    for seed in seeds {
        pending.fetch_add(1, Ordering::AcqRel);
        let _ = sender.send(Message::Task(seed));
    }
    if pending.load(Ordering::Acquire) == 0 {
        return Ok(0);
    }

    let num_threads = num_threads.max(1);
    if num_threads == 1 {
        worker_loop(0, 1, &receiver, &sender, &pending, &handled, &handler);
        return Ok(handled.load(Ordering::Acquire));
    }

    thread::scope(|scope| -> std::io::Result<()> {
        let mut spawned = 0;
        for id in 0..num_threads {
            let receiver = receiver.clone();
            let sender = &sender;
            let pending = &pending;
            let handled = &handled;
            let handler = &handler;
            let spawn = thread::Builder::new()
                .name(format!("workqueue-{}", id))
                .spawn_scoped(scope, move || {
                    worker_loop(id, num_threads, &receiver, sender, pending, handled, handler)
                });
            match spawn {
                Ok(_) => spawned += 1,
                Err(e) if spawned > 0 => {
                    tracing::warn!(
                        target: "dexopt::concurrent::work_queue",
                        error = %e,
                        spawned,
                        "failed to spawn all workers; continuing with fewer"
                    );
                    // Wake-up messages are sized for `num_threads`; surplus Stops are harmless.
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })?;

    Ok(handled.load(Ordering::Acquire))
}

fn worker_loop<T, F>(
    worker_id: usize,
    num_threads: usize,
    receiver: &Receiver<Message<T>>,
    sender: &Sender<Message<T>>,
    pending: &AtomicUsize,
    handled: &AtomicUsize,
    handler: &F,
) where
    F: Fn(&WorkerState<'_, T>, T),
{
    let state = WorkerState {
        sender,
        pending,
        worker_id,
    };
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Task(task) => {
                handler(&state, task);
                handled.fetch_add(1, Ordering::AcqRel);
                if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    for _ in 0..num_threads {
                        let _ = sender.send(Message::Stop);
                    }
                }
            }
            Message::Stop => break,
        }
    }
}
