//! Worker pool
//!
//! A fixed set of named threads pulling boxed jobs off a shared queue. Each
//! submitted job gets a [`JobHandle`] through which it can be cancelled as long as
//! no worker has picked it up yet.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::Error;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Where a job is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in the queue.
    Queued,
    /// A worker is executing it.
    Running,
    /// Executed to the end, or panicked.
    Done,
    /// Cancelled before a worker picked it up.
    Cancelled,
}

impl JobState {
    fn from_u8(v: u8) -> JobState {
        match v {
            QUEUED => JobState::Queued,
            RUNNING => JobState::Running,
            DONE => JobState::Done,
            _ => JobState::Cancelled,
        }
    }
}

struct Job {
    state: Arc<AtomicU8>,
    work: Box<dyn FnOnce() + Send + 'static>,
}

/// A fixed size pool of worker threads.
///
/// Dropping the pool lets queued jobs finish, then joins the workers.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers. Zero is treated as one.
    pub fn new(threads: usize) -> Result<Self, Error> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("because-worker-{}", id))
                .spawn(move || run_worker(id, receiver))
                .map_err(|e| Error::Spawn(e.to_string()))?;
            workers.push(handle);
        }

        debug!("Worker pool started with {} threads", threads);

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job for execution on some worker.
    pub fn submit<F>(&self, work: F) -> Result<JobHandle, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(Error::PoolShutdown)?;

        let state = Arc::new(AtomicU8::new(QUEUED));
        let job = Job {
            state: state.clone(),
            work: Box::new(work),
        };

        sender.send(job).map_err(|_| Error::PoolShutdown)?;

        Ok(JobHandle { state })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends the worker loops once the queue is drained.
        self.sender = None;

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Worker thread panicked outside a job");
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

fn run_worker(id: usize, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let claimed = job
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if !claimed {
            trace!("Worker {} skips cancelled job", id);
            continue;
        }

        if panic::catch_unwind(AssertUnwindSafe(job.work)).is_err() {
            warn!("Job panicked on worker {}", id);
        }

        job.state.store(DONE, Ordering::Release);
    }

    trace!("Worker {} exits", id);
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    state: Arc<AtomicU8>,
}

impl JobHandle {
    /// Prevent the job from running.
    ///
    /// Returns `true` if the job was still queued and will now never run. Once a
    /// worker has begun the job this returns `false` and the job runs to its end.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current state of the job.
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Tell if the job was cancelled before running.
    pub fn is_cancelled(&self) -> bool {
        self.state() == JobState::Cancelled
    }
}
