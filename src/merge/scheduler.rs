//! Background merge scheduling.
//!
//! A single worker thread receives merge requests over a
//! `crossbeam-channel` and runs the merge policy against the index manager.
//! Requests that pile up while a merge is running are coalesced into one
//! policy run. The worker shuts down when the scheduler is dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use crate::error::{LexisError, Result};
use crate::index::manager::IndexManager;
use crate::merge::merger::SegmentMerger;
use crate::merge::policy::MergePolicy;

enum MergeRequest {
    Merge {
        reply: Option<Sender<Result<usize>>>,
    },
    Shutdown,
}

/// Counters of the background worker.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub runs: AtomicU64,
    pub merges_completed: AtomicU64,
    pub failures: AtomicU64,
}

/// Runs merges on a background thread.
#[derive(Debug)]
pub struct MergeScheduler {
    sender: Sender<MergeRequest>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<SchedulerStats>,
}

impl fmt::Debug for MergeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeRequest::Merge { reply } => f
                .debug_struct("Merge")
                .field("wait", &reply.is_some())
                .finish(),
            MergeRequest::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl MergeScheduler {
    /// Spawn the worker thread.
    pub fn start(
        manager: Arc<IndexManager>,
        merger: Arc<SegmentMerger>,
        policy: Arc<dyn MergePolicy>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let stats = Arc::new(SchedulerStats::default());
        let worker_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("lexis-merge".to_string())
            .spawn(move || worker(receiver, manager, merger, policy, worker_stats))?;
        debug!("merge scheduler started");

        Ok(MergeScheduler {
            sender,
            handle: Some(handle),
            stats,
        })
    }

    /// Ask the worker to run the merge policy; returns immediately.
    pub fn request_merge(&self) {
        if self.sender.send(MergeRequest::Merge { reply: None }).is_err() {
            warn!("merge worker is gone, dropping merge request");
        }
    }

    /// Ask the worker to run the merge policy and wait for the outcome.
    ///
    /// Returns the number of merges performed.
    pub fn merge_and_wait(&self) -> Result<usize> {
        let (reply, outcome) = crossbeam_channel::bounded(1);
        self.sender
            .send(MergeRequest::Merge { reply: Some(reply) })
            .map_err(|_| LexisError::index("merge worker is not running"))?;
        outcome
            .recv()
            .map_err(|_| LexisError::index("merge worker exited before replying"))?
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Stop the worker after the request it is working on.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(MergeRequest::Shutdown);
            if handle.join().is_err() {
                warn!("merge worker panicked");
            }
            debug!("merge scheduler stopped");
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    receiver: Receiver<MergeRequest>,
    manager: Arc<IndexManager>,
    merger: Arc<SegmentMerger>,
    policy: Arc<dyn MergePolicy>,
    stats: Arc<SchedulerStats>,
) {
    while let Ok(request) = receiver.recv() {
        let MergeRequest::Merge { reply } = request else {
            break;
        };

        let mut replies = vec![reply];
        let mut stop = false;
        while let Ok(next) = receiver.try_recv() {
            match next {
                MergeRequest::Merge { reply } => replies.push(reply),
                MergeRequest::Shutdown => {
                    stop = true;
                    break;
                }
            }
        }

        stats.runs.fetch_add(1, Ordering::Relaxed);
        let outcome = manager.run_merges(&merger, policy.as_ref());
        match &outcome {
            Ok(count) => {
                stats.merges_completed.fetch_add(*count as u64, Ordering::Relaxed);
                if *count > 0 {
                    debug!(merges = count, policy = policy.name(), "background merges done");
                }
            }
            Err(err) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "background merge failed");
            }
        }

        for reply in replies.into_iter().flatten() {
            let result = match &outcome {
                Ok(count) => Ok(*count),
                Err(err) => Err(LexisError::index(format!("background merge failed: {err}"))),
            };
            let _ = reply.send(result);
        }

        if stop {
            break;
        }
    }
}
