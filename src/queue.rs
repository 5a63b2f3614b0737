//! The deferred-callback queue promises hand their reactions to.
//!
use crate::{Error, Promise};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt, mem,
    rc::Rc,
};
use tracing::{debug, trace};

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Defers a job until the current unit of work has finished.
///
/// Implementations must run jobs in the order `schedule` was called. Promises
/// never call `schedule` while holding a borrow of their own state, so a
/// synchronous implementation that runs the job inline is allowed too (useful
/// for recording the order of reactions in tests).
pub trait Schedule {
    fn schedule(&self, job: Job);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Upper bound on the jobs one drain may run. `None` drains until the
    /// queue is empty.
    pub drain_budget: Option<usize>,
}

/// A FIFO microtask queue.
///
/// Cloning the queue hands out another handle to the same jobs.
///
/// Every promise keeps a handle to the queue it schedules on, and queued jobs
/// keep promises and resolvers alive. Dropping the last outside handle while
/// jobs are still queued therefore leaks them through that cycle: drain the
/// queue or [`clear`](JobQueue::clear) it first.
///
/// # Examples
///
/// ```
/// use promise_chain::{JobQueue, Schedule};
/// use std::{cell::RefCell, rc::Rc};
///
/// let queue = JobQueue::new();
/// let seen = Rc::new(RefCell::new(vec![]));
/// for n in 0..3 {
///     let seen = seen.clone();
///     queue.schedule(Box::new(move || seen.borrow_mut().push(n)));
/// }
/// assert_eq!(queue.run_until_stalled(), Ok(3));
/// assert_eq!(*seen.borrow(), vec![0, 1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct JobQueue {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: RefCell<VecDeque<Job>>,
    config: QueueConfig,
    executed: Cell<usize>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                ..Inner::default()
            }),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    /// Number of jobs waiting to run.
    pub fn len(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.borrow().is_empty()
    }

    /// Total number of jobs this queue has run so far.
    pub fn jobs_run(&self) -> usize {
        self.inner.executed.get()
    }

    /// Drops every queued job without running it.
    ///
    /// Promises whose only resolvers lived in those jobs are abandoned.
    /// Returns how many jobs were dropped.
    pub fn clear(&self) -> usize {
        let jobs = mem::take(&mut *self.inner.jobs.borrow_mut());
        debug!(dropped = jobs.len(), "job queue cleared");
        jobs.len()
    }

    /// Runs the oldest job, if any. Returns whether a job ran.
    pub fn run_next(&self) -> bool {
        // The borrow must end before the job runs: jobs schedule more jobs.
        let job = self.inner.jobs.borrow_mut().pop_front();
        match job {
            Some(job) => {
                job();
                self.inner.executed.set(self.inner.executed.get() + 1);
                true
            }
            None => false,
        }
    }

    /// Runs jobs, including the ones scheduled along the way, until the queue
    /// is empty. Returns how many ran.
    pub fn run_until_stalled(&self) -> Result<usize, Error> {
        self.drain(|| true)
    }

    /// Runs jobs until `promise` settles or the queue empties, whichever
    /// comes first.
    pub fn run_until_settled<T, E>(&self, promise: &Promise<T, E>) -> Result<usize, Error> {
        self.drain(|| promise.is_pending())
    }

    fn drain(&self, mut keep_going: impl FnMut() -> bool) -> Result<usize, Error> {
        let mut ran = 0;
        while keep_going() {
            if let Some(budget) = self.inner.config.drain_budget {
                if ran == budget && !self.is_empty() {
                    debug!(budget, pending = self.len(), "job queue drain budget exhausted");
                    return Err(Error::BudgetExhausted { budget });
                }
            }
            if !self.run_next() {
                break;
            }
            ran += 1;
        }
        debug!(ran, pending = self.len(), "job queue drained");
        Ok(ran)
    }
}

impl Schedule for JobQueue {
    fn schedule(&self, job: Job) {
        let mut jobs = self.inner.jobs.borrow_mut();
        jobs.push_back(job);
        trace!(pending = jobs.len(), "job scheduled");
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.len())
            .field("jobs_run", &self.jobs_run())
            .field("config", &self.inner.config)
            .finish()
    }
}
