//! Distance-doubling allreduce: every step exchanges the whole accumulator.
//!
//! At step `k` virtual rank `v` swaps its accumulator with `v ^ (1 << k)`
//! and combines. There is no slicing, so the only ordering rule is the one
//! that keeps data correct: the step-`k` message may only be sent once
//! every earlier step's peer vector has been combined in (`is_ready`).
//! Incoming step messages are buffered by step tag the moment they arrive,
//! whatever their order, and combined lazily when the engine reaches them.
//!
//! For non-power-of-two worlds the odd adjustment member folds its whole
//! vector into its even neighbour up front and receives the final vector
//! from it at the end.

use crate::collective::ReductionHandler;
use crate::collective::core::{CompletionCallback, ReductionCore};
use crate::error::Result;
use crate::protocol::{Phase, StepMessage};
use crate::reduce::{Combiner, Element, combine_into};
use crate::topology::VirtualRank;
use crate::transport::ActiveMessageTransport;
use crate::types::{Algorithm, Progress, Rank, Stamp, Step};

/// Bitset over step indices. `steps` never exceeds 32 for `u32` ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StepSet(u64);

impl StepSet {
    fn insert(&mut self, step: Step) {
        self.0 |= 1 << step;
    }

    fn contains(self, step: Step) -> bool {
        self.0 & (1 << step) != 0
    }

    /// True if every step in `[0, step)` is present.
    fn contains_all_below(self, step: Step) -> bool {
        let mask = (1u64 << step) - 1;
        self.0 & mask == mask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Created,
    /// Even adjustment member waiting for the odd member's vector.
    AdjustEven,
    Doubling,
    AwaitResult,
    Done,
}

/// Latency-oriented, reorder-tolerant allreduce engine for one reduction
/// on one rank.
pub struct DistanceDoubling<T: Element> {
    core: ReductionCore<T>,
    stage: Stage,
    /// Next step whose peer vector has not been combined yet.
    step: Step,
    sent_at: StepSet,
    recv_at: StepSet,
    message_buffer: Vec<Option<Vec<T>>>,
    adjust_buffer: Option<Vec<T>>,
    result_buffer: Option<Vec<T>>,
    adjust_seen: bool,
    result_seen: bool,
}

impl<T: Element> DistanceDoubling<T> {
    pub fn initialize(
        rank: Rank,
        world_size: u32,
        stamp: Stamp,
        data: Vec<T>,
        combiner: Combiner<T>,
        on_complete: CompletionCallback<T>,
    ) -> Result<Self> {
        let core = ReductionCore::new(rank, world_size, stamp, data, combiner, on_complete)?;
        let steps = core.topology.steps() as usize;
        Ok(Self {
            core,
            stage: Stage::Created,
            step: 0,
            sent_at: StepSet::default(),
            recv_at: StepSet::default(),
            message_buffer: vec![None; steps],
            adjust_buffer: None,
            result_buffer: None,
            adjust_seen: false,
            result_seen: false,
        })
    }

    /// Whether the step-`step` message may be sent: all earlier steps have a
    /// buffered receipt that has been combined into the accumulator.
    pub fn is_ready(&self, step: Step) -> bool {
        step <= self.step && self.recv_at.contains_all_below(step)
    }

    /// Current step multiplier, `1 << step`.
    pub fn mask(&self) -> u32 {
        1 << self.step
    }

    /// Steps whose peer vector is buffered but not yet combined.
    pub fn buffered_steps(&self) -> Vec<Step> {
        (0..self.core.topology.steps())
            .filter(|&s| self.message_buffer[s as usize].is_some())
            .collect()
    }

    fn expected_sender(&self, phase: Phase, step: Step) -> Result<Rank> {
        let role = self.core.role;
        if !phase.is_stepped() && step != 0 {
            return Err(self.core.violation(phase, step, "step 0", step));
        }
        match phase {
            Phase::AdjustFull if role.adjustment_member && role.is_even => {
                self.core.adjustment_partner(phase, step)
            }
            Phase::DistanceDouble => self.core.main_phase_sender(phase, step),
            Phase::Distribute => self.core.distribute_sender(step),
            _ => Err(self.core.violation(
                phase,
                step,
                "a distance-doubling phase for this rank",
                format!("{phase} at rank {}", role.rank),
            )),
        }
    }

    /// Decode and file an admitted message.
    fn buffer(&mut self, msg: &StepMessage) -> Result<()> {
        let len = self.core.len();
        let vector = self.core.expect_slice(msg, 0..len)?;
        let duplicate = match msg.phase {
            Phase::DistanceDouble => {
                let dup = self.recv_at.contains(msg.step);
                if !dup {
                    self.recv_at.insert(msg.step);
                    self.message_buffer[msg.step as usize] = Some(vector);
                }
                dup
            }
            Phase::AdjustFull => {
                let dup = std::mem::replace(&mut self.adjust_seen, true);
                self.adjust_buffer.get_or_insert(vector);
                dup
            }
            Phase::Distribute => {
                let dup = std::mem::replace(&mut self.result_seen, true);
                self.result_buffer.get_or_insert(vector);
                dup
            }
            _ => unreachable!("expected_sender admits no other phase"),
        };
        if duplicate {
            return Err(self.core.violation(
                msg.phase,
                msg.step,
                "one message per phase and step",
                "a duplicate",
            ));
        }
        Ok(())
    }

    fn advance(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress> {
        loop {
            match self.stage {
                Stage::Created => return Ok(Progress::Pending),

                Stage::AdjustEven => {
                    let Some(theirs) = self.adjust_buffer.take() else {
                        return Ok(Progress::Pending);
                    };
                    combine_into(&mut self.core.acc, &theirs, &self.core.combiner);
                    tracing::debug!(
                        stamp = self.core.stamp,
                        rank = self.core.rank(),
                        "adjustment exchange complete"
                    );
                    self.stage = Stage::Doubling;
                }

                Stage::Doubling => {
                    let step = self.step;
                    let steps = self.core.topology.steps();
                    if step == steps {
                        return self.complete_main_phase(transport);
                    }
                    assert!(
                        self.mask() < self.core.topology.pof2(),
                        "mask out of range"
                    );
                    let partner = self.core.topology.partner(self.core.vrank(), step);
                    if !self.sent_at.contains(step) {
                        assert!(self.is_ready(step), "step {step} sent before it was ready");
                        let len = self.core.len();
                        self.core
                            .send_range(transport, partner, Phase::DistanceDouble, step, 0..len)?;
                        self.sent_at.insert(step);
                    }
                    let Some(theirs) = self.message_buffer[step as usize].take() else {
                        return Ok(Progress::Pending);
                    };
                    combine_into(&mut self.core.acc, &theirs, &self.core.combiner);
                    self.step += 1;
                }

                Stage::AwaitResult => {
                    let Some(result) = self.result_buffer.take() else {
                        return Ok(Progress::Pending);
                    };
                    self.core.acc = result;
                    return Ok(self.done());
                }

                Stage::Done => return Ok(Progress::Complete),
            }
        }
    }

    fn complete_main_phase(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress> {
        let role = self.core.role;
        if role.adjustment_member && role.is_even {
            let len = self.core.len();
            let partner = self.core.adjustment_partner(Phase::Distribute, 0)?;
            self.core
                .send_range(transport, partner, Phase::Distribute, 0, 0..len)?;
        }
        Ok(self.done())
    }

    fn done(&mut self) -> Progress {
        self.stage = Stage::Done;
        self.core.finish()
    }
}

impl<T: Element> ReductionHandler for DistanceDoubling<T> {
    fn stamp(&self) -> Stamp {
        self.core.stamp
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::DistanceDoubling
    }

    fn start(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress> {
        if self.stage != Stage::Created {
            return Ok(if self.is_complete() {
                Progress::Complete
            } else {
                Progress::Pending
            });
        }
        debug_assert_eq!(transport.rank(), self.core.rank());

        let role = self.core.role;
        tracing::debug!(
            stamp = self.core.stamp,
            rank = role.rank,
            vrank = ?role.vrank,
            steps = self.core.topology.steps(),
            len = self.core.len(),
            "starting distance doubling"
        );

        if self.core.topology.world_size() == 1 {
            return Ok(self.done());
        }

        self.stage = match (role.adjustment_member, role.vrank) {
            (true, VirtualRank::Participating(_)) => Stage::AdjustEven,
            (true, VirtualRank::Excluded) => {
                let len = self.core.len();
                let partner = self.core.adjustment_partner(Phase::AdjustFull, 0)?;
                self.core
                    .send_range(transport, partner, Phase::AdjustFull, 0, 0..len)?;
                Stage::AwaitResult
            }
            (false, _) => Stage::Doubling,
        };
        self.advance(transport)
    }

    fn on_message(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        src: Rank,
        msg: StepMessage,
    ) -> Result<Progress> {
        let expected = self.expected_sender(msg.phase, msg.step)?;
        self.core.admit(src, &msg, expected)?;
        self.buffer(&msg)?;
        self.advance(transport)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }
}
