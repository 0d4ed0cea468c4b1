//! Job Scheduler (C5) — bounded worker pool with dedup and cancellation.
//! Three guarded sets share one lock order (cancelled -> existing ->
//! waiting) to keep `schedule`/`cancel`/`execute_next` race-free.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::SchedulerError;
use crate::router::{parse_trash_key, RepoUsage, Router};

/// Dispatch kind a [`Job`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Add,
    Unlink,
    Shred,
    Restore,
    Cleanup,
}

impl Action {
    /// Runs the action, returning the trash key the completed action
    /// concerns (for propagation to peers), or `None` when there isn't a
    /// single item to report (`Cleanup`).
    fn run(&self, router: &Router, target: &str) -> Result<Option<String>, crate::error::RouterError> {
        match self {
            Action::Add => {
                let (name, usage) = router.add(target)?;
                Ok(Some(match usage {
                    RepoUsage::Home => name,
                    RepoUsage::Top(base) => format!("{name}:{}", base.display()),
                }))
            }
            Action::Unlink => {
                router.unlink(&parse_trash_key(target))?;
                Ok(Some(target.to_string()))
            }
            Action::Shred => {
                router.shred(&parse_trash_key(target))?;
                Ok(Some(target.to_string()))
            }
            Action::Restore => {
                router.restore(&parse_trash_key(target))?;
                Ok(Some(target.to_string()))
            }
            Action::Cleanup => {
                router.cleanup_all();
                Ok(None)
            }
        }
    }
}

/// `{action, target}`; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub action: Action,
    pub target: String,
}

impl Job {
    pub fn new(action: Action, target: impl Into<String>) -> Self {
        Job {
            action,
            target: target.into(),
        }
    }
}

/// Callbacks a UI (out of scope) subscribes to in order to track a job's
/// row state. Contract: `onEnterWait -> onDoneWait -> onStartAction ->
/// (onEndAction | onCancel)`.
pub trait JobListener: Send + Sync {
    fn on_enter_wait(&self, _job: &Job) {}
    fn on_done_wait(&self, _job: &Job) {}
    fn on_start_action(&self, _job: &Job) {}
    fn on_end_action(&self, _job: &Job, _result_key: Option<&str>) {}
    fn on_cancel(&self, _job: &Job) {}
}

/// No-op default listener.
pub struct NullListener;
impl JobListener for NullListener {}

struct Semaphore {
    count: Mutex<isize>,
    cv: Condvar,
}

impl Semaphore {
    fn new(initial: isize) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cv.notify_one();
    }

    fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count <= 0 {
            count = self.cv.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// Bounded worker pool executing [`Job`]s against a [`Router`].
pub struct Scheduler {
    router: Arc<Router>,
    listener: Arc<dyn JobListener>,
    existing: Mutex<HashSet<Job>>,   // X1
    waiting: Mutex<VecDeque<Job>>,   // X2
    cancelled: Mutex<HashSet<Job>>,  // X3
    availability: Semaphore,
    pub max_threads: usize,
}

impl Scheduler {
    pub fn new(router: Arc<Router>, listener: Arc<dyn JobListener>, max_threads: usize) -> Self {
        Scheduler {
            router,
            listener,
            existing: Mutex::new(HashSet::new()),
            waiting: Mutex::new(VecDeque::new()),
            cancelled: Mutex::new(HashSet::new()),
            availability: Semaphore::new(0),
            max_threads,
        }
    }

    /// Enqueues `job`, rejecting it if an equal job is already waiting or
    /// running; un-cancels it if it was previously cancelled.
    pub fn schedule(&self, job: Job) -> Result<(), SchedulerError> {
        {
            let mut cancelled = self.cancelled.lock().unwrap();
            if cancelled.remove(&job) {
                drop(cancelled);
                self.listener.on_enter_wait(&job);
                return Ok(());
            }
        }

        {
            // X1 held while appending to X2 (lock order X1 -> X2).
            let mut existing = self.existing.lock().unwrap();
            if existing.contains(&job) {
                return Err(SchedulerError::JobAlreadyScheduled(job));
            }
            existing.insert(job.clone());
            self.waiting.lock().unwrap().push_back(job.clone());
        }

        self.availability.post();
        self.listener.on_enter_wait(&job);
        Ok(())
    }

    /// Idempotent insert into the cancellation set.
    pub fn cancel(&self, job: &Job) {
        self.cancelled.lock().unwrap().insert(job.clone());
    }

    /// Called by each worker in a loop. Returns `Err(JobsQueueClosed)` once
    /// the waiting queue is empty after a `close()` post, which is the
    /// worker's signal to exit.
    pub fn execute_next(&self) -> Result<(), SchedulerError> {
        self.availability.wait();

        let job = {
            let mut waiting = self.waiting.lock().unwrap();
            waiting.pop_front().ok_or(SchedulerError::JobsQueueClosed)?
        };

        self.listener.on_done_wait(&job);
        self.listener.on_start_action(&job);

        {
            let mut cancelled = self.cancelled.lock().unwrap();
            if cancelled.remove(&job) {
                drop(cancelled);
                self.existing.lock().unwrap().remove(&job);
                self.listener.on_cancel(&job);
                return Ok(());
            }
        }

        let result = job.action.run(&self.router, &job.target);
        self.existing.lock().unwrap().remove(&job);

        match result {
            Ok(result_key) => {
                self.listener.on_end_action(&job, result_key.as_deref());
            }
            Err(e) => {
                log::error!("job {job:?} failed: {e}");
                self.listener.on_cancel(&job);
            }
        }

        Ok(())
    }

    /// Wakes every blocked worker with `JobsQueueClosed`.
    pub fn close(&self) {
        let _waiting = self.waiting.lock().unwrap();
        for _ in 0..self.max_threads {
            self.availability.post();
        }
    }

    /// Spawns `max_threads` OS workers, each looping `execute_next` until
    /// `JobsQueueClosed`. Returns their join handles.
    pub fn run_workers(self: &Arc<Self>) -> Vec<std::thread::JoinHandle<()>> {
        (0..self.max_threads)
            .map(|_| {
                let scheduler = Arc::clone(self);
                std::thread::spawn(move || loop {
                    match scheduler.execute_next() {
                        Ok(()) => {}
                        Err(SchedulerError::JobsQueueClosed) => break,
                        Err(_) => {}
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{CustomMapping, DirectoryList};
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, SystemTime};

    struct RecordingListener {
        events: StdMutex<Vec<(&'static str, Job)>>,
    }

    impl RecordingListener {
        fn new() -> Self {
            RecordingListener {
                events: StdMutex::new(Vec::new()),
            }
        }

        fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|(n, _)| *n).collect()
        }
    }

    impl JobListener for RecordingListener {
        fn on_enter_wait(&self, job: &Job) {
            self.events.lock().unwrap().push(("enter_wait", job.clone()));
        }
        fn on_done_wait(&self, job: &Job) {
            self.events.lock().unwrap().push(("done_wait", job.clone()));
        }
        fn on_start_action(&self, job: &Job) {
            self.events.lock().unwrap().push(("start_action", job.clone()));
        }
        fn on_end_action(&self, job: &Job, _result_key: Option<&str>) {
            self.events.lock().unwrap().push(("end_action", job.clone()));
        }
        fn on_cancel(&self, job: &Job) {
            self.events.lock().unwrap().push(("cancel", job.clone()));
        }
    }

    fn test_router() -> Arc<Router> {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let home = std::env::temp_dir().join(format!("trash-rs-sched-home-{nanos}"));
        std::fs::create_dir_all(&home).unwrap();
        std::env::set_var("XDG_DATA_HOME", &home);

        Arc::new(Router::new(CustomMapping::empty(), DirectoryList::empty()).unwrap())
    }

    #[test]
    fn dedup_rejects_while_waiting_then_allows_after_end_action() {
        let router = test_router();
        let listener = Arc::new(RecordingListener::new());
        let scheduler = Scheduler::new(router, listener.clone(), 1);

        let job = Job::new(Action::Cleanup, "home");
        scheduler.schedule(job.clone()).unwrap();

        let err = scheduler.schedule(job.clone());
        assert!(matches!(err, Err(SchedulerError::JobAlreadyScheduled(_))));

        scheduler.execute_next().unwrap();
        assert_eq!(
            listener.names(),
            vec!["enter_wait", "done_wait", "start_action", "end_action"]
        );

        scheduler.schedule(job).unwrap();
        assert_eq!(listener.names().len(), 5);
    }

    #[test]
    fn cancel_before_schedule_skips_action() {
        let router = test_router();
        let listener = Arc::new(RecordingListener::new());
        let scheduler = Scheduler::new(router, listener.clone(), 1);

        let job = Job::new(Action::Cleanup, "home");
        scheduler.cancel(&job);
        scheduler.schedule(job.clone()).unwrap();

        assert_eq!(listener.names(), vec!["enter_wait"]);
        assert!(scheduler.existing.lock().unwrap().is_empty());
        assert!(scheduler.cancelled.lock().unwrap().is_empty());
    }

    #[test]
    fn close_wakes_all_blocked_workers() {
        let router = test_router();
        let listener = Arc::new(RecordingListener::new());
        let scheduler = Arc::new(Scheduler::new(router, listener, 3));

        let handles = scheduler.run_workers();
        std::thread::sleep(Duration::from_millis(50));
        scheduler.close();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
