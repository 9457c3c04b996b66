use crate::error::{AmReduceError, Result};
use crate::types::{Rank, Stamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// A handle to a non-blocking reduction.
///
/// The reduction progresses on the participant task whether or not anyone
/// waits on it. Dropping the handle discards the result but never cancels
/// the reduction, since peers depend on this rank's messages.
pub struct ReductionHandle<T> {
    stamp: Stamp,
    rank: Rank,
    timeout: Duration,
    launched: oneshot::Receiver<Result<()>>,
    result: oneshot::Receiver<Vec<T>>,
    finished: Arc<AtomicBool>,
}

impl<T> ReductionHandle<T> {
    pub(crate) fn new(
        stamp: Stamp,
        rank: Rank,
        timeout: Duration,
        launched: oneshot::Receiver<Result<()>>,
        result: oneshot::Receiver<Vec<T>>,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stamp,
            rank,
            timeout,
            launched,
            result,
            finished,
        }
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Wait for the reduced vector.
    ///
    /// Fails with `Timeout` if the completion callback has not fired within
    /// the configured `completion_timeout`, and with `ParticipantAborted` if
    /// the participant stopped first.
    pub async fn wait(self) -> Result<Vec<T>> {
        let rank = self.rank;
        let aborted = move |_: oneshot::error::RecvError| AmReduceError::ParticipantAborted {
            rank,
            reason: "participant stopped before the reduction completed".into(),
        };
        let work = async {
            self.launched.await.map_err(aborted)??;
            self.result.await.map_err(aborted)
        };
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| AmReduceError::Timeout {
                stamp: self.stamp,
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }

    /// Check if the reduction has completed on this rank (non-blocking).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// A group of non-blocking reductions that can be waited on together.
pub struct ReductionGroup<T> {
    handles: Vec<ReductionHandle<T>>,
}

impl<T> ReductionGroup<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, h: ReductionHandle<T>) {
        self.handles.push(h);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every reduction in push order.
    ///
    /// Returns the first error encountered, if any. All handles are awaited
    /// regardless of errors.
    pub async fn wait_all(self) -> Result<Vec<Vec<T>>> {
        let mut results = Vec::with_capacity(self.handles.len());
        let mut first_err = None;
        for h in self.handles {
            match h.wait().await {
                Ok(v) => results.push(v),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl<T> Default for ReductionGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}
