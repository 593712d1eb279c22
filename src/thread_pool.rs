//! The abstract thread-pool interface the core consumes, plus a minimal
//! dedicated-worker-thread implementation.
//!
//! The batch engine needs exactly one background worker (see §5:
//! "a dedicated worker thread executes multi-frame batch tasks"), so the
//! pool here is deliberately not a general-purpose work-stealing executor —
//! it is plain message passing to a single thread, per the design note that
//! the multi-frame path needs no coroutines or suspension, just one-shot
//! tasks and a rendezvous at `wait()`.

use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Unstarted,
    Started,
    Ended,
    Finished,
}

/// Shared state machine a [`Task`] implementation embeds to answer
/// `is_started`/`is_finished`/`wait` from any thread while `process` runs on
/// the worker.
#[derive(Debug)]
pub struct TaskState {
    stage: Mutex<Stage>,
    condvar: Condvar,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            stage: Mutex::new(Stage::Unstarted),
            condvar: Condvar::new(),
        }
    }

    fn set(&self, stage: Stage) {
        *self.stage.lock().expect("task state poisoned") = stage;
        self.condvar.notify_all();
    }

    pub fn mark_started(&self) {
        self.set(Stage::Started);
    }

    /// Marks the task's work as done. `Ended` and `Finished` are reached
    /// together here since this pool has no separate reap step.
    pub fn mark_finished(&self) {
        self.set(Stage::Ended);
        self.set(Stage::Finished);
    }

    pub fn is_started(&self) -> bool {
        !matches!(*self.stage.lock().expect("task state poisoned"), Stage::Unstarted)
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.stage.lock().expect("task state poisoned"), Stage::Finished)
    }

    pub fn wait(&self) {
        let mut stage = self.stage.lock().expect("task state poisoned");
        while !matches!(*stage, Stage::Finished) {
            stage = self.condvar.wait(stage).expect("task state poisoned");
        }
    }
}

/// A unit of work the pool can run. `process` does the actual work and is
/// expected to call [`TaskState::mark_started`]/[`TaskState::mark_finished`]
/// on its own state (typically by embedding a [`TaskState`] and delegating
/// `is_started`/`is_finished`/`wait` to it).
pub trait Task: Send + Sync {
    fn process(&self);
    fn is_started(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn wait(&self);

    /// Not supported: cancellation of an in-flight task is a deliberate
    /// no-op (see the batch engine's open question on task cancellation).
    fn cancel(&self) {}
}

/// A single dedicated worker thread that runs pushed tasks in order.
pub struct ThreadPool {
    sender: Option<std::sync::mpsc::Sender<Arc<dyn Task>>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new() -> Self {
        let (sender, receiver) = std::sync::mpsc::channel::<Arc<dyn Task>>();
        let worker = std::thread::Builder::new()
            .name("batch-worker".into())
            .spawn(move || {
                for task in receiver {
                    task.process();
                }
            })
            .expect("failed to spawn batch worker thread");

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn push_back(&self, task: Arc<dyn Task>) {
        if let Some(sender) = &self.sender {
            // The worker thread only ever disconnects when the pool itself
            // is being dropped, at which point there is nothing left to
            // enqueue onto.
            let _ = sender.send(task);
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingTask {
        state: TaskState,
        ran: AtomicBool,
    }

    impl Task for RecordingTask {
        fn process(&self) {
            self.state.mark_started();
            self.ran.store(true, Ordering::SeqCst);
            self.state.mark_finished();
        }
        fn is_started(&self) -> bool {
            self.state.is_started()
        }
        fn is_finished(&self) -> bool {
            self.state.is_finished()
        }
        fn wait(&self) {
            self.state.wait();
        }
    }

    #[test]
    fn pushed_task_runs_and_can_be_waited_on() {
        let pool = ThreadPool::new();
        let task = Arc::new(RecordingTask {
            state: TaskState::new(),
            ran: AtomicBool::new(false),
        });
        pool.push_back(task.clone());
        task.wait();
        assert!(task.is_finished());
        assert!(task.ran.load(Ordering::SeqCst));
    }
}
