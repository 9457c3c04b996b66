use crate::error::{AmReduceError, Result};
use crate::protocol::{Phase, StepMessage};
use crate::reduce::{Combiner, Element};
use crate::topology::{RankRole, Topology, VirtualRank};
use crate::transport::ActiveMessageTransport;
use crate::types::{Progress, Rank, Stamp, Step};
use std::ops::Range;

/// Invoked once with the fully reduced vector.
pub type CompletionCallback<T> = Box<dyn FnOnce(Vec<T>) + Send>;

/// State common to both engines: who we are, what we hold, how to combine,
/// and whom to tell when we're done.
pub(crate) struct ReductionCore<T: Element> {
    pub stamp: Stamp,
    pub topology: Topology,
    pub role: RankRole,
    pub acc: Vec<T>,
    pub combiner: Combiner<T>,
    on_complete: Option<CompletionCallback<T>>,
}

impl<T: Element> ReductionCore<T> {
    pub fn new(
        rank: Rank,
        world_size: u32,
        stamp: Stamp,
        data: Vec<T>,
        combiner: Combiner<T>,
        on_complete: CompletionCallback<T>,
    ) -> Result<Self> {
        let topology = Topology::new(world_size)?;
        let role = topology.role(rank)?;
        Ok(Self {
            stamp,
            topology,
            role,
            acc: data,
            combiner,
            on_complete: Some(on_complete),
        })
    }

    pub fn rank(&self) -> Rank {
        self.role.rank
    }

    pub fn len(&self) -> usize {
        self.acc.len()
    }

    pub fn is_done(&self) -> bool {
        self.on_complete.is_none()
    }

    /// Virtual rank, for phases only participating ranks reach.
    pub fn vrank(&self) -> u32 {
        match self.role.vrank {
            VirtualRank::Participating(v) => v,
            VirtualRank::Excluded => panic!(
                "reduction {}: excluded rank {} entered the main phase",
                self.stamp, self.role.rank
            ),
        }
    }

    pub fn violation(
        &self,
        phase: Phase,
        step: Step,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> AmReduceError {
        AmReduceError::violation(self.stamp, phase, step, expected, actual)
    }

    /// Checks every engine applies before buffering a message.
    pub fn admit(&self, src: Rank, msg: &StepMessage, expected_src: Rank) -> Result<()> {
        if msg.stamp != self.stamp {
            return Err(self.violation(msg.phase, msg.step, self.stamp, msg.stamp));
        }
        if self.is_done() {
            return Err(self.violation(
                msg.phase,
                msg.step,
                "no messages after completion",
                format!("message from rank {src}"),
            ));
        }
        if src != expected_src {
            return Err(self.violation(
                msg.phase,
                msg.step,
                format!("sender {expected_src}"),
                format!("sender {src}"),
            ));
        }
        Ok(())
    }

    /// Sender of the final vector to an excluded rank.
    pub fn distribute_sender(&self, step: Step) -> Result<Rank> {
        match (self.role.vrank, step) {
            (VirtualRank::Excluded, 0) => self.adjustment_partner(Phase::Distribute, step),
            _ => Err(self.violation(
                Phase::Distribute,
                step,
                "distribute only to an excluded rank at step 0",
                format!("rank {} ({:?})", self.role.rank, self.role.vrank),
            )),
        }
    }

    /// The other member of this rank's adjustment pair.
    pub fn adjustment_partner(&self, phase: Phase, step: Step) -> Result<Rank> {
        self.role.adjustment_partner().ok_or_else(|| {
            self.violation(
                phase,
                step,
                "a member of the adjustment group",
                format!("rank {}", self.role.rank),
            )
        })
    }

    /// Main-phase partner for a stepped message.
    pub fn main_phase_sender(&self, phase: Phase, step: Step) -> Result<Rank> {
        match self.role.vrank {
            VirtualRank::Participating(v) if step < self.topology.steps() => {
                Ok(self.topology.partner(v, step))
            }
            VirtualRank::Participating(_) => Err(self.violation(
                phase,
                step,
                format!("step < {}", self.topology.steps()),
                step,
            )),
            VirtualRank::Excluded => Err(self.violation(
                phase,
                step,
                "no main-phase traffic to an excluded rank",
                format!("rank {}", self.role.rank),
            )),
        }
    }

    /// Send `acc[range]` tagged with `range.start`.
    pub fn send_range(
        &self,
        transport: &dyn ActiveMessageTransport,
        dest: Rank,
        phase: Phase,
        step: Step,
        range: Range<usize>,
    ) -> Result<()> {
        let msg = StepMessage::new(self.stamp, phase, step, range.start, &self.acc[range]);
        transport.send(dest, msg)
    }

    /// Decode a payload that must cover exactly `range`.
    pub fn expect_slice(&self, msg: &StepMessage, range: Range<usize>) -> Result<Vec<T>> {
        let count = msg.element_count::<T>()?;
        if msg.offset != range.start as u64 || count != range.len() {
            return Err(self.violation(
                msg.phase,
                msg.step,
                format!("slice {}..{}", range.start, range.end),
                format!("slice {}..{}", msg.offset, msg.offset.saturating_add(count as u64)),
            ));
        }
        msg.elements()
    }

    /// Hand the accumulator to the completion callback.
    pub fn finish(&mut self) -> Progress {
        if let Some(on_complete) = self.on_complete.take() {
            tracing::debug!(
                stamp = self.stamp,
                rank = self.role.rank,
                len = self.acc.len(),
                "reduction complete"
            );
            on_complete(std::mem::take(&mut self.acc));
        }
        Progress::Complete
    }
}
