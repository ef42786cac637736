use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Sender};
use log::*;
use parking_lot::Mutex;
use rayon::prelude::*;

use super::types::{Bin, RegionProcessor, CHANNEL_SLOTS_PER_WORKER};
use crate::core::error::{ReadPropError, Result};

/// Counters describing a finished [`ParGranges::process`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub bins_total: usize,
    pub bins_merged: usize,
    pub workers: usize,
}

/// Parallel bin executor driven by [`RegionProcessor`] implementations.
///
/// Bins are fanned out across a dedicated Rayon pool on a producer thread and
/// each finished batch is sent through a bounded crossbeam channel to a single
/// consumer running on the caller's thread. A full channel blocks the workers,
/// so at most `channel_capacity` unmerged batches exist at any time.
#[derive(Debug)]
pub struct ParGranges<R: 'static + RegionProcessor + Send + Sync> {
    bins: Vec<Bin>,
    threads: usize,
    channel_capacity: usize,
    processor: R,
}

impl<R: 'static + RegionProcessor + Send + Sync> ParGranges<R> {
    /// Create a new executor over `bins`.
    ///
    /// `threads` must already be validated (> 0). The channel capacity
    /// defaults to [`CHANNEL_SLOTS_PER_WORKER`] batches per worker.
    pub fn new(
        bins: Vec<Bin>,
        threads: usize,
        channel_capacity: Option<usize>,
        processor: R,
    ) -> Self {
        let threads = threads.max(1);
        let channel_capacity = channel_capacity
            .unwrap_or_else(|| threads.saturating_mul(CHANNEL_SLOTS_PER_WORKER))
            .max(1);
        Self {
            bins,
            threads,
            channel_capacity,
            processor,
        }
    }

    /// Run every bin and feed each batch to `consume`, one at a time, in
    /// completion order.
    ///
    /// Returns an error if any bin fails, if a worker panics, or if `consume`
    /// itself fails. After the first failure no new bins are started; bins
    /// already running are allowed to finish and their batches are discarded.
    pub fn process<F>(self, mut consume: F) -> Result<RunSummary>
    where
        F: FnMut(&Bin, R::P) -> Result<()>,
    {
        let ParGranges {
            bins,
            threads,
            channel_capacity,
            processor,
        } = self;
        let bins_total = bins.len();

        info!("Using {} worker threads.", threads);
        info!(
            "Creating channel of length {} (one batch per slot)",
            channel_capacity
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("readprop-worker-{}", i))
            .build()
            .map_err(|e| ReadPropError::Config(format!("Failed to build worker pool: {}", e)))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = bounded::<(Bin, R::P)>(channel_capacity);

        let producer = {
            let cancelled = Arc::clone(&cancelled);
            thread::Builder::new()
                .name("readprop-dispatch".to_string())
                .spawn(move || {
                    pool.install(move || dispatch(bins, &processor, sender, &cancelled))
                })
                .map_err(|e| ReadPropError::Config(format!("Failed to spawn dispatcher: {}", e)))?
        };

        let mut bins_merged = 0usize;
        let mut consumer_error = None;
        for (bin, batch) in receiver.iter() {
            if cancelled.load(Ordering::Acquire) {
                // A worker already failed; drain without merging so blocked
                // senders can finish.
                continue;
            }
            if let Err(err) = consume(&bin, batch) {
                cancelled.store(true, Ordering::Release);
                consumer_error = Some(err);
                break;
            }
            bins_merged += 1;
        }
        drop(receiver);

        let produced = producer.join().map_err(|payload| ReadPropError::WorkerFailure {
            bin: "<dispatcher>".to_string(),
            source: anyhow::anyhow!("dispatcher panicked: {}", panic_message(&payload)),
        })?;

        if let Some(err) = consumer_error {
            return Err(err);
        }
        produced?;

        if bins_merged != bins_total {
            return Err(ReadPropError::Interrupted(format!(
                "merged {} of {} bins",
                bins_merged, bins_total
            )));
        }

        Ok(RunSummary {
            bins_total,
            bins_merged,
            workers: threads,
        })
    }
}

/// Marker returned from the per-bin closure to stop Rayon from scheduling
/// further bins.
struct Halt;

fn dispatch<R: RegionProcessor + Sync>(
    bins: Vec<Bin>,
    processor: &R,
    sender: Sender<(Bin, R::P)>,
    cancelled: &AtomicBool,
) -> Result<()> {
    let total = bins.len();
    let completed = AtomicUsize::new(0);
    let log_step = std::cmp::max(1, total / 10);
    let first_failure: Mutex<Option<ReadPropError>> = Mutex::new(None);

    let outcome = {
        let sender_clone = sender.clone();
        bins.into_par_iter().try_for_each_init(
            || sender_clone.clone(),
            |tx, bin| -> std::result::Result<(), Halt> {
                if cancelled.load(Ordering::Acquire) {
                    return Err(Halt);
                }

                trace!("Processing {} on TID {}", bin, bin.tid);
                let batch = match run_bin(processor, &bin) {
                    Ok(batch) => batch,
                    Err(err) => {
                        error!("{}", err);
                        cancelled.store(true, Ordering::Release);
                        first_failure.lock().get_or_insert(err);
                        return Err(Halt);
                    }
                };

                if tx.send((bin, batch)).is_err() {
                    debug!("Result channel closed; stopping dispatch");
                    cancelled.store(true, Ordering::Release);
                    return Err(Halt);
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done == total || done % log_step == 0 {
                    info!(
                        "Processed {:.1}% ({} / {} bins)",
                        (done as f64 / total.max(1) as f64) * 100.0,
                        done,
                        total
                    );
                }
                Ok(())
            },
        )
        // sender_clone drops here, before the final sender below
    };
    drop(sender);

    if let Some(err) = first_failure.into_inner() {
        return Err(err);
    }
    match outcome {
        Ok(()) => Ok(()),
        Err(Halt) => Err(ReadPropError::Interrupted(
            "result consumer stopped before all bins were dispatched".to_string(),
        )),
    }
}

/// Run one bin, converting both errors and panics into a [`ReadPropError::WorkerFailure`].
fn run_bin<R: RegionProcessor>(processor: &R, bin: &Bin) -> Result<R::P> {
    match panic::catch_unwind(AssertUnwindSafe(|| processor.process_region(bin))) {
        Ok(Ok(batch)) => Ok(batch),
        Ok(Err(source)) => Err(ReadPropError::WorkerFailure {
            bin: bin.to_string(),
            source,
        }),
        Err(payload) => Err(ReadPropError::WorkerFailure {
            bin: bin.to_string(),
            source: anyhow::anyhow!("worker panicked: {}", panic_message(&payload)),
        }),
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
