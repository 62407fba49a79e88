//! Simple thread pool for processing batches of independent combinations.
//!
//! Every combination runs sequentially on a single worker; parallelism only
//! comes from distributing whole sums across threads.

use std::thread;
use crossbeam::channel;
use itertools::Itertools;
use thiserror::Error;
use crate::{
    ComplexScalar,
    mps::MPSError,
    mpssum::MPSSum,
    simplify::{ Combined, InitialGuess, combine },
    strategy::Strategy,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to enqueue combinations: dead thread")]
    DeadThread,

    #[error("failed to enqueue combinations: closed sender channel")]
    ClosedSenderChannel,

    #[error("failed to receive combination result: receiver error: {0}")]
    ClosedReceiverChannel(channel::RecvError),

    #[error("encountered receiver error from within a thread: receiver error: {0}")]
    WorkerReceiverError(channel::RecvError),

    #[error("combination error: {0}")]
    MPS(#[from] MPSError),
}
use PoolError::*;
pub type PoolResult<T> = Result<T, PoolError>;

#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug)]
enum ToWorker<A> {
    Stop,
    Work(usize, MPSSum<A>, Option<Strategy>),
}

#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug)]
enum FromWorker<A> {
    RecvError(channel::RecvError),
    Output(usize, Result<Combined<A>, MPSError>),
}

fn run<A>(sum: &MPSSum<A>, strategy: Option<Strategy>)
    -> Result<Combined<A>, MPSError>
where A: ComplexScalar
{
    match strategy {
        Some(strategy)
            => combine(sum.weights(), sum.states(), InitialGuess::DirectSum, &strategy),
        None => sum.collapse(),
    }
}

/// A simple thread pool to compress many sums in parallel.
///
/// Workload between threads is automatically balanced by means of a
/// single-producer, multiple-consumer channel. Results are returned in the
/// order in which the sums were submitted. The pool as a whole is meant to be
/// reused between batches, and is **not** thread-safe.
#[derive(Debug)]
pub struct CombinePool<A> {
    threads: Vec<thread::JoinHandle<()>>,
    workers_in: channel::Sender<ToWorker<A>>,
    workers_out: channel::Receiver<FromWorker<A>>,
}

impl<A> CombinePool<A>
where A: ComplexScalar + Send + Sync + 'static
{
    /// Create a new thread pool of `nthreads` threads (at least one).
    pub fn new(nthreads: usize) -> Self {
        let nthreads = nthreads.max(1);
        let (tx_in, rx_in) = channel::unbounded();
        let (tx_out, rx_out) = channel::unbounded();
        let mut threads = Vec::with_capacity(nthreads);
        for _ in 0..nthreads {
            let worker_receiver = rx_in.clone();
            let worker_sender = tx_out.clone();
            let th = thread::spawn(move || loop {
                match worker_receiver.recv() {
                    Ok(ToWorker::Stop) => { break; },
                    Ok(ToWorker::Work(k, sum, strategy)) => {
                        let output = run(&sum, strategy);
                        if worker_sender.send(FromWorker::Output(k, output)).is_err() {
                            break;
                        }
                    },
                    Err(err) => {
                        worker_sender.send(FromWorker::RecvError(err)).ok();
                        break;
                    },
                }
            });
            threads.push(th);
        }
        Self { threads, workers_in: tx_in, workers_out: rx_out }
    }

    /// Create a new thread pool with the number of threads equal to the number
    /// of logical CPU cores available in the current system.
    pub fn new_cpus() -> Self { Self::new(num_cpus::get()) }

    /// Create a new thread pool with the number of threads equal to the number
    /// of physical CPU cores available in the current system.
    pub fn new_physical() -> Self { Self::new(num_cpus::get_physical()) }

    /// Return the number of worker threads.
    pub fn nthreads(&self) -> usize { self.threads.len() }

    /// Enqueue a batch of sums to be distributed across all threads.
    ///
    /// Each sum is compressed under `strategy`, or under its own strategy if
    /// `None`. This method will block until all enqueued combinations have been
    /// completed. If any combination fails, the remaining results are still
    /// collected and the error of the earliest submitted failure is returned.
    pub fn do_combinations<I>(&self, sums: I, strategy: Option<Strategy>)
        -> PoolResult<Vec<Combined<A>>>
    where I: IntoIterator<Item = MPSSum<A>>
    {
        if self.threads.iter().any(|th| th.is_finished()) {
            return Err(DeadThread);
        }
        let mut count: usize = 0;
        for sum in sums.into_iter() {
            match self.workers_in.send(ToWorker::Work(count, sum, strategy)) {
                Ok(()) => { count += 1; },
                Err(_) => { return Err(ClosedSenderChannel); },
            }
        }
        let mut output = Vec::with_capacity(count);
        for _ in 0..count {
            match self.workers_out.recv() {
                Ok(FromWorker::Output(k, res)) => { output.push((k, res)); },
                Ok(FromWorker::RecvError(err)) => {
                    return Err(WorkerReceiverError(err));
                },
                Err(err) => { return Err(ClosedReceiverChannel(err)); },
            }
        }
        output.into_iter()
            .sorted_by_key(|(k, _)| *k)
            .map(|(_, res)| res.map_err(PoolError::from))
            .collect()
    }
}

impl<A> Drop for CombinePool<A> {
    fn drop(&mut self) {
        (0..self.threads.len())
            .for_each(|_| { self.workers_in.send(ToWorker::Stop).ok(); });
        self.threads.drain(..)
            .for_each(|th| { th.join().ok(); });
    }
}
