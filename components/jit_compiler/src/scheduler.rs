//! Background dispatch of optimizing jobs.
//!
//! ```text
//!  owner thread                    workers (opt-worker-N)
//!  ------------                    ----------------------
//!  prepare()
//!  queue(ticket) ---- input ----->  execute()
//!                                       |
//!  install / flush <--- output ---------+
//!  finalize()
//! ```
//!
//! A ticket owns its job outright. It moves to a worker at enqueue and back
//! to the owner thread at completion; nothing is shared in between.
//! The capacity gate counts every ticket from enqueue until the owner
//! thread has taken it back for finalization.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use core_types::FunctionId;
use crossbeam::channel::{self, Receiver, Sender};

use crate::handles::OwnerThread;
use crate::job::CompilationJob;

/// Errors starting the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn optimizing worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A prepared optimizing job on its way through the worker pool.
#[derive(Debug)]
pub struct OptimizationTicket {
    job: CompilationJob,
    function: FunctionId,
}

impl OptimizationTicket {
    /// Wrap a prepared job for `function`.
    pub fn new(job: CompilationJob, function: FunctionId) -> Self {
        Self { job, function }
    }

    /// Function being optimized.
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Take the job back.
    pub fn into_job(self) -> CompilationJob {
        self.job
    }
}

/// Worker pool for background-eligible execute phases.
#[derive(Debug)]
pub struct OptimizingScheduler {
    input: Option<Sender<OptimizationTicket>>,
    output: Receiver<OptimizationTicket>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
    capacity: usize,
    owner: std::thread::ThreadId,
}

impl OptimizingScheduler {
    /// Start `worker_count` workers accepting up to `capacity` tickets.
    pub fn new(owner: &OwnerThread, worker_count: usize, capacity: usize) -> Result<Self, SchedulerError> {
        let (input, jobs) = channel::unbounded::<OptimizationTicket>();
        let (done, output) = channel::unbounded::<OptimizationTicket>();

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let jobs = jobs.clone();
            let done = done.clone();
            let handle = thread::Builder::new()
                .name(format!("opt-worker-{}", index))
                .spawn(move || worker_loop(jobs, done))?;
            workers.push(handle);
        }
        tracing::debug!(workers = worker_count, capacity, "Started optimizing workers");

        Ok(Self {
            input: Some(input),
            output,
            workers,
            in_flight: 0,
            capacity,
            owner: owner.id(),
        })
    }

    /// Whether another ticket fits under the capacity limit.
    pub fn is_queue_available(&self) -> bool {
        self.in_flight < self.capacity
    }

    /// Tickets queued or finished but not yet taken back.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hand a prepared ticket to the workers.
    ///
    /// Gives the ticket back if the pool has shut down.
    pub fn queue(&mut self, owner: &OwnerThread, ticket: OptimizationTicket) -> Result<(), OptimizationTicket> {
        owner.check(self.owner);
        let Some(input) = self.input.as_ref() else {
            return Err(ticket);
        };
        match input.send(ticket) {
            Ok(()) => {
                self.in_flight += 1;
                Ok(())
            }
            Err(channel::SendError(ticket)) => Err(ticket),
        }
    }

    /// Take back every finished ticket without blocking.
    pub fn take_completed(&mut self, owner: &OwnerThread) -> Vec<OptimizationTicket> {
        owner.check(self.owner);
        let completed: Vec<_> = self.output.try_iter().collect();
        self.in_flight -= completed.len();
        completed
    }

    /// Block until the next in-flight ticket finishes.
    ///
    /// Returns `None` when nothing is in flight or every worker is gone.
    pub fn wait_completed(&mut self, owner: &OwnerThread) -> Option<OptimizationTicket> {
        owner.check(self.owner);
        if self.in_flight == 0 {
            return None;
        }
        let ticket = self.output.recv().ok()?;
        self.in_flight -= 1;
        Some(ticket)
    }

    /// Close the queue and join the workers.
    ///
    /// Tickets still queued are executed; their results are dropped with
    /// the scheduler.
    pub fn stop(&mut self) {
        drop(self.input.take());
        for handle in self.workers.drain(..) {
            if let Err(payload) = handle.join() {
                tracing::warn!(panic = panic_message(&*payload), "Optimizing worker panicked");
            }
        }
    }
}

impl Drop for OptimizingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// Every ticket goes back to the owner thread, even when its execute
/// phase panics, so the capacity slot is always released.
fn worker_loop(jobs: Receiver<OptimizationTicket>, done: Sender<OptimizationTicket>) {
    while let Ok(mut ticket) = jobs.recv() {
        let job = &mut ticket.job;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
            tracing::warn!(
                function = %ticket.function,
                panic = panic_message(&*payload),
                "Optimizing job panicked during execute"
            );
        }
        if done.send(ticket).is_err() {
            break;
        }
    }
}
