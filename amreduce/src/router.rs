//! Per-participant dispatch table from stamp to live reduction.

use crate::collective::ReductionHandler;
use crate::error::{AmReduceError, Result};
use crate::protocol::StepMessage;
use crate::transport::ActiveMessageTransport;
use crate::types::{Progress, Rank, Stamp};
use std::collections::{HashMap, HashSet, VecDeque};

/// Routes incoming step messages to the reduction their stamp names.
///
/// Any number of reductions may be live at once. A peer can legitimately
/// start a reduction before this participant has initialized it, so
/// messages for unseen stamps are parked (up to a limit) and replayed when
/// the handler is registered. Completed stamps are retired; anything that
/// still arrives for them is a protocol error.
///
/// Only the most recent `max_retired` stamps are remembered. Once a stamp
/// falls out of that window, late traffic for it is parked like traffic
/// for any other unseen stamp.
pub struct ReductionRouter {
    rank: Rank,
    live: HashMap<Stamp, Box<dyn ReductionHandler>>,
    parked: HashMap<Stamp, Vec<(Rank, StepMessage)>>,
    parked_count: usize,
    max_parked: usize,
    retired: HashSet<Stamp>,
    /// Retirement order, oldest first.
    retired_order: VecDeque<Stamp>,
    max_retired: usize,
}

impl ReductionRouter {
    pub fn new(rank: Rank, max_parked: usize, max_retired: usize) -> Self {
        Self {
            rank,
            live: HashMap::new(),
            parked: HashMap::new(),
            parked_count: 0,
            max_parked,
            retired: HashSet::new(),
            retired_order: VecDeque::new(),
            max_retired,
        }
    }

    /// Register `handler` and feed it whatever arrived for its stamp early.
    pub fn initialize(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        mut handler: Box<dyn ReductionHandler>,
    ) -> Result<()> {
        let stamp = handler.stamp();
        if self.live.contains_key(&stamp) || self.retired.contains(&stamp) {
            return Err(AmReduceError::DuplicateStamp {
                stamp,
                rank: self.rank,
            });
        }

        if let Some(early) = self.parked.remove(&stamp) {
            self.parked_count -= early.len();
            tracing::trace!(
                rank = self.rank,
                stamp,
                count = early.len(),
                "replaying parked messages"
            );
            for (src, msg) in early {
                handler.on_message(transport, src, msg)?;
            }
        }

        if handler.is_complete() {
            self.remember_retired(stamp);
        } else {
            self.live.insert(stamp, handler);
        }
        Ok(())
    }

    /// Start a registered reduction.
    pub fn start(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        stamp: Stamp,
    ) -> Result<Progress> {
        let Some(handler) = self.live.get_mut(&stamp) else {
            if self.retired.contains(&stamp) {
                return Ok(Progress::Complete);
            }
            return Err(AmReduceError::UnknownStamp {
                stamp,
                rank: self.rank,
            });
        };
        let progress = handler.start(transport)?;
        if progress.is_complete() {
            self.retire(stamp);
        }
        Ok(progress)
    }

    /// `initialize` followed by `start`.
    pub fn launch(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        handler: Box<dyn ReductionHandler>,
    ) -> Result<Progress> {
        let stamp = handler.stamp();
        self.initialize(transport, handler)?;
        self.start(transport, stamp)
    }

    /// Deliver one message from `src`.
    pub fn dispatch(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        src: Rank,
        msg: StepMessage,
    ) -> Result<Progress> {
        let stamp = msg.stamp;
        if let Some(handler) = self.live.get_mut(&stamp) {
            let progress = handler.on_message(transport, src, msg)?;
            if progress.is_complete() {
                self.retire(stamp);
            }
            return Ok(progress);
        }

        if self.retired.contains(&stamp) {
            return Err(AmReduceError::RetiredStamp {
                stamp,
                rank: self.rank,
                src,
            });
        }
        if self.parked_count >= self.max_parked {
            return Err(AmReduceError::ParkedOverflow {
                rank: self.rank,
                limit: self.max_parked,
            });
        }
        tracing::trace!(
            rank = self.rank,
            stamp,
            src,
            phase = %msg.phase,
            step = msg.step,
            "parking message for uninitialized reduction"
        );
        self.parked.entry(stamp).or_default().push((src, msg));
        self.parked_count += 1;
        Ok(Progress::Pending)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, stamp: Stamp) -> bool {
        self.live.contains_key(&stamp)
    }

    /// Messages held for stamps that have not been initialized.
    pub fn parked_count(&self) -> usize {
        self.parked_count
    }

    /// Completed stamps still remembered.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    fn retire(&mut self, stamp: Stamp) {
        self.live.remove(&stamp);
        self.remember_retired(stamp);
    }

    fn remember_retired(&mut self, stamp: Stamp) {
        if self.max_retired == 0 || !self.retired.insert(stamp) {
            return;
        }
        self.retired_order.push_back(stamp);
        while self.retired_order.len() > self.max_retired {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
                tracing::trace!(rank = self.rank, stamp = oldest, "forgetting retired stamp");
            }
        }
    }
}
