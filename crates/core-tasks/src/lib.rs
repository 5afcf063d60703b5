//! Deferred analysis work on a fixed pool of OS worker threads.
//!
//! The [`TaskManager`] owns a FIFO queue and N workers (hardware
//! parallelism by default). Producers — the engine facade, and analysis
//! tasks themselves through a cloned [`TaskScheduler`] — enqueue
//! [`Task`]s; workers pop, execute, and report through the completion
//! callback. The scheduler handle is how the disassembly pass decomposes:
//! a function task enqueues one fresh task per discovered callee instead
//! of recursing, keeping every worker busy and the queue the only
//! coordination point.
//!
//! Guarantees:
//! - FIFO among tasks submitted from one thread; no ordering between
//!   concurrent submitters.
//! - [`TaskManager::wait`] returns only when the queue is empty and no
//!   worker is executing. A running task that enqueues a follow-up keeps
//!   the pool non-idle, so waiters observe the whole cascade.
//! - [`TaskManager::stop`] cancels pending tasks without executing them,
//!   lets running tasks finish, and joins the workers.
//! - A panic inside a task is caught and logged with the task name; the
//!   worker and the pool survive.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task manager is not running")]
    NotRunning,
}

/// Lifecycle of a task, observable through [`TaskStatusHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Cancelled,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Running,
            2 => TaskStatus::Done,
            _ => TaskStatus::Cancelled,
        }
    }
}

/// Cheap cloneable view of a task's status, valid after the task itself
/// has been consumed by a worker.
#[derive(Debug, Clone)]
pub struct TaskStatusHandle(Arc<AtomicU8>);

impl TaskStatusHandle {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// A named unit of deferred work.
pub struct Task {
    name: String,
    work: Option<Box<dyn FnOnce() + Send + 'static>>,
    status: Arc<AtomicU8>,
}

impl Task {
    pub fn new(name: impl Into<String>, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            work: Some(Box::new(work)),
            status: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn status_handle(&self) -> TaskStatusHandle {
        TaskStatusHandle(Arc::clone(&self.status))
    }

    fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

enum Message {
    Work(Task),
    Terminate,
}

#[derive(Default)]
struct QueueState {
    queued: usize,
    running: usize,
    accepting: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify_if_idle(&self, state: &QueueState) {
        if state.queued == 0 && state.running == 0 {
            self.idle.notify_all();
        }
    }
}

type CompletionCallback = Arc<dyn Fn(&Task) + Send + Sync>;

/// Cloneable submission handle. Tasks capture one to enqueue follow-up
/// work; submissions after `stop` fail with `NotRunning`.
#[derive(Clone)]
pub struct TaskScheduler {
    sender: Sender<Message>,
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// Append a task to the queue, returning its status handle.
    pub fn add_task(&self, task: Task) -> Result<TaskStatusHandle, TaskError> {
        let handle = task.status_handle();
        // The lock is held across the send so `stop` cannot slip between
        // the accepting check and the enqueue.
        let mut state = self.shared.lock();
        if !state.accepting {
            return Err(TaskError::NotRunning);
        }
        debug!(target: "core.tasks", task = task.name(), "enqueue");
        self.sender
            .send(Message::Work(task))
            .map_err(|_| TaskError::NotRunning)?;
        state.queued += 1;
        Ok(handle)
    }
}

/// The worker pool.
pub struct TaskManager {
    scheduler: TaskScheduler,
    receiver: Receiver<Message>,
    workers: Vec<JoinHandle<()>>,
    callback: CompletionCallback,
    worker_count: usize,
    started: bool,
}

impl TaskManager {
    /// Build a stopped manager. `callback` is invoked once per task after
    /// it finishes or is cancelled, on the worker (or stopping) thread.
    pub fn new(worker_count: usize, callback: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
        });
        Self {
            scheduler: TaskScheduler { sender, shared },
            receiver,
            workers: Vec::new(),
            callback: Arc::new(callback),
            worker_count: worker_count.max(1),
            started: false,
        }
    }

    /// A manager sized to the machine's hardware parallelism.
    pub fn with_default_workers(callback: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers, callback)
    }

    /// Transition Stopped -> Running: spawn the workers. A second call is
    /// a no-op; a manager cannot be restarted after `stop`.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.scheduler.shared.lock().accepting = true;
        info!(target: "core.tasks", workers = self.worker_count, "starting worker pool");
        for index in 0..self.worker_count {
            let receiver = self.receiver.clone();
            let shared = Arc::clone(&self.scheduler.shared);
            let callback = Arc::clone(&self.callback);
            let handle = std::thread::Builder::new()
                .name(format!("gorgon-worker-{index}"))
                .spawn(move || worker_loop(&receiver, &shared, &callback))
                .expect("spawning a worker thread");
            self.workers.push(handle);
        }
    }

    /// A submission handle that can outlive `&self` borrows and travel
    /// into tasks.
    pub fn scheduler(&self) -> TaskScheduler {
        self.scheduler.clone()
    }

    pub fn add_task(&self, task: Task) -> Result<TaskStatusHandle, TaskError> {
        self.scheduler.add_task(task)
    }

    /// Block until the queue is empty and every worker is idle.
    pub fn wait(&self) {
        let shared = &self.scheduler.shared;
        let mut state = shared.lock();
        while state.queued > 0 || state.running > 0 {
            state = shared
                .idle
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Drain the queue (cancelling pending tasks), let running tasks
    /// complete, and join the workers.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.scheduler.shared.lock().accepting = false;
        // Cancel whatever is still queued. Workers racing on the same
        // channel apply the identical treatment after popping.
        while let Ok(message) = self.receiver.try_recv() {
            if let Message::Work(task) = message {
                task.set_status(TaskStatus::Cancelled);
                info!(target: "core.tasks", task = task.name(), "cancelled");
                (self.callback)(&task);
                let mut state = self.scheduler.shared.lock();
                state.queued -= 1;
                self.scheduler.shared.notify_if_idle(&state);
            }
        }
        for _ in &self.workers {
            let _ = self.scheduler.sender.send(Message::Terminate);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!(target: "core.tasks", "worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.workers.is_empty()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: &Receiver<Message>, shared: &Shared, callback: &CompletionCallback) {
    while let Ok(message) = receiver.recv() {
        let mut task = match message {
            Message::Work(task) => task,
            Message::Terminate => break,
        };
        {
            let mut state = shared.lock();
            state.queued -= 1;
            if !state.accepting {
                // Stop ran while this task sat in the queue.
                drop(state);
                task.set_status(TaskStatus::Cancelled);
                info!(target: "core.tasks", task = task.name(), "cancelled");
                callback(&task);
                let state = shared.lock();
                shared.notify_if_idle(&state);
                continue;
            }
            state.running += 1;
        }

        task.set_status(TaskStatus::Running);
        debug!(target: "core.tasks", task = task.name(), "running");
        if let Some(work) = task.work.take()
            && let Err(panic) = catch_unwind(AssertUnwindSafe(work))
        {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(target: "core.tasks", task = task.name(), detail, "task panicked");
        }
        task.set_status(TaskStatus::Done);
        callback(&task);

        let mut state = shared.lock();
        state.running -= 1;
        shared.notify_if_idle(&state);
    }
}
