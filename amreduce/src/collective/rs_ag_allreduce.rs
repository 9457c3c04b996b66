//! Reduce-scatter + allgather allreduce (recursive halving, then recursive
//! doubling), driven entirely by message arrival.
//!
//! Each virtual rank halves its active window every reduce-scatter step,
//! combining the half it keeps with the matching half from its partner.
//! After `steps` rounds it owns one fully reduced slice; allgather replays
//! the schedule backwards, copying partners' slices in until every rank
//! holds the whole vector. Total data moved per rank is about `2 * len`.
//!
//! Non-power-of-two worlds fold the lowest `2 * rem` ranks pairwise before
//! the main phase and hand the result back to the odd members afterwards.
//!
//! Messages may arrive in any order. Anything that is not immediately
//! usable waits in a [`StepMailbox`] keyed by `(phase, step)`, so the
//! engine does not depend on per-pair or cross-step FIFO delivery.

use crate::collective::ReductionHandler;
use crate::collective::core::{CompletionCallback, ReductionCore};
use crate::collective::mailbox::StepMailbox;
use crate::collective::schedule::{SliceSchedule, lower_half_len};
use crate::error::Result;
use crate::protocol::{Phase, StepMessage};
use crate::reduce::{Combiner, Element, combine_into};
use crate::topology::VirtualRank;
use crate::transport::ActiveMessageTransport;
use crate::types::{Algorithm, Progress, Rank, Stamp, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Initialized; messages are buffered until `start`.
    Created,
    /// Even adjustment member waiting for the odd member's two halves.
    AdjustEven {
        have_lower: bool,
        have_combined: bool,
    },
    /// Odd adjustment member waiting for the even member's upper half.
    AdjustOdd,
    ReduceScatter {
        step: Step,
        sent: bool,
    },
    /// `remaining` counts down; the active step is `remaining - 1`.
    Allgather {
        remaining: Step,
        sent: bool,
    },
    /// Excluded rank waiting for the final vector.
    AwaitResult,
    Done,
}

/// Bandwidth-oriented allreduce engine for one reduction on one rank.
pub struct ReduceScatterAllgather<T: Element> {
    core: ReductionCore<T>,
    /// Empty for excluded ranks, which never enter the main phase.
    schedule: Option<SliceSchedule>,
    mailbox: StepMailbox,
    stage: Stage,
}

impl<T: Element> ReduceScatterAllgather<T> {
    pub fn initialize(
        rank: Rank,
        world_size: u32,
        stamp: Stamp,
        data: Vec<T>,
        combiner: Combiner<T>,
        on_complete: CompletionCallback<T>,
    ) -> Result<Self> {
        let core = ReductionCore::new(rank, world_size, stamp, data, combiner, on_complete)?;
        let schedule = core
            .role
            .vrank
            .get()
            .map(|v| SliceSchedule::new(&core.topology, v, core.len()));
        Ok(Self {
            core,
            schedule,
            mailbox: StepMailbox::new(),
            stage: Stage::Created,
        })
    }

    /// The slice table this rank follows in the main phase.
    pub fn schedule(&self) -> Option<&SliceSchedule> {
        self.schedule.as_ref()
    }

    fn expected_sender(&self, phase: Phase, step: Step) -> Result<Rank> {
        let role = self.core.role;
        if !phase.is_stepped() && step != 0 {
            return Err(self.core.violation(phase, step, "step 0", step));
        }
        match phase {
            Phase::AdjustLower | Phase::AdjustCombined
                if role.adjustment_member && role.is_even =>
            {
                self.core.adjustment_partner(phase, step)
            }
            Phase::AdjustUpper if role.adjustment_member && !role.is_even => {
                self.core.adjustment_partner(phase, step)
            }
            Phase::ReduceScatter | Phase::Allgather => self.core.main_phase_sender(phase, step),
            Phase::Distribute => self.core.distribute_sender(step),
            _ => Err(self.core.violation(
                phase,
                step,
                "a reduce-scatter/allgather phase for this rank",
                format!("{phase} at rank {}", role.rank),
            )),
        }
    }

    fn schedule_ref(&self) -> &SliceSchedule {
        self.schedule
            .as_ref()
            .expect("participating rank always has a schedule")
    }

    fn advance(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress> {
        let len = self.core.len();
        let split = lower_half_len(len);

        loop {
            match self.stage {
                Stage::Created => return Ok(Progress::Pending),

                Stage::AdjustEven {
                    mut have_lower,
                    mut have_combined,
                } => {
                    if !have_lower && let Some(msg) = self.mailbox.take(Phase::AdjustLower, 0) {
                        let lower = self.core.expect_slice(&msg, 0..split)?;
                        combine_into(&mut self.core.acc[..split], &lower, &self.core.combiner);
                        have_lower = true;
                    }
                    if !have_combined
                        && let Some(msg) = self.mailbox.take(Phase::AdjustCombined, 0)
                    {
                        let upper = self.core.expect_slice(&msg, split..len)?;
                        self.core.acc[split..].copy_from_slice(&upper);
                        have_combined = true;
                    }
                    if have_lower && have_combined {
                        tracing::debug!(
                            stamp = self.core.stamp,
                            rank = self.core.rank(),
                            "adjustment exchange complete"
                        );
                        self.stage = Stage::ReduceScatter {
                            step: 0,
                            sent: false,
                        };
                        continue;
                    }
                    self.stage = Stage::AdjustEven {
                        have_lower,
                        have_combined,
                    };
                    return Ok(Progress::Pending);
                }

                Stage::AdjustOdd => {
                    let Some(msg) = self.mailbox.take(Phase::AdjustUpper, 0) else {
                        return Ok(Progress::Pending);
                    };
                    let upper = self.core.expect_slice(&msg, split..len)?;
                    combine_into(&mut self.core.acc[split..], &upper, &self.core.combiner);
                    let partner = self.core.adjustment_partner(Phase::AdjustCombined, 0)?;
                    self.core
                        .send_range(transport, partner, Phase::AdjustCombined, 0, split..len)?;
                    self.stage = Stage::AwaitResult;
                }

                Stage::ReduceScatter { step, sent } => {
                    if step == self.core.topology.steps() {
                        tracing::debug!(
                            stamp = self.core.stamp,
                            rank = self.core.rank(),
                            owned = ?self.schedule_ref().owned_range(),
                            "reduce-scatter complete"
                        );
                        self.stage = Stage::Allgather {
                            remaining: step,
                            sent: false,
                        };
                        continue;
                    }
                    let partner = self.core.topology.partner(self.core.vrank(), step);
                    if !sent {
                        let range = self.schedule_ref().send_range(step);
                        self.core
                            .send_range(transport, partner, Phase::ReduceScatter, step, range)?;
                        self.stage = Stage::ReduceScatter { step, sent: true };
                    }
                    let Some(msg) = self.mailbox.take(Phase::ReduceScatter, step) else {
                        return Ok(Progress::Pending);
                    };
                    let range = self.schedule_ref().recv_range(step);
                    let theirs = self.core.expect_slice(&msg, range.clone())?;
                    combine_into(&mut self.core.acc[range], &theirs, &self.core.combiner);
                    self.stage = Stage::ReduceScatter {
                        step: step + 1,
                        sent: false,
                    };
                }

                Stage::Allgather { remaining, sent } => {
                    if remaining == 0 {
                        return self.complete_main_phase(transport);
                    }
                    let step = remaining - 1;
                    let partner = self.core.topology.partner(self.core.vrank(), step);
                    if !sent {
                        let range = self.schedule_ref().recv_range(step);
                        self.core
                            .send_range(transport, partner, Phase::Allgather, step, range)?;
                        self.stage = Stage::Allgather {
                            remaining,
                            sent: true,
                        };
                    }
                    let Some(msg) = self.mailbox.take(Phase::Allgather, step) else {
                        return Ok(Progress::Pending);
                    };
                    let range = self.schedule_ref().send_range(step);
                    let theirs = self.core.expect_slice(&msg, range.clone())?;
                    self.core.acc[range].copy_from_slice(&theirs);
                    self.stage = Stage::Allgather {
                        remaining: step,
                        sent: false,
                    };
                }

                Stage::AwaitResult => {
                    let Some(msg) = self.mailbox.take(Phase::Distribute, 0) else {
                        return Ok(Progress::Pending);
                    };
                    self.core.acc = self.core.expect_slice(&msg, 0..len)?;
                    return Ok(self.done());
                }

                Stage::Done => return Ok(Progress::Complete),
            }
        }
    }

    fn complete_main_phase(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress> {
        let role = self.core.role;
        if role.adjustment_member && role.is_even {
            let partner = self.core.adjustment_partner(Phase::Distribute, 0)?;
            self.core
                .send_range(transport, partner, Phase::Distribute, 0, 0..self.core.len())?;
        }
        Ok(self.done())
    }

    fn done(&mut self) -> Progress {
        debug_assert_eq!(self.mailbox.len(), 0, "messages left over at completion");
        self.stage = Stage::Done;
        self.core.finish()
    }
}

impl<T: Element> ReductionHandler for ReduceScatterAllgather<T> {
    fn stamp(&self) -> Stamp {
        self.core.stamp
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ReduceScatterAllgather
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
            "starting reduce-scatter/allgather"
        );

        if self.core.topology.world_size() == 1 {
            return Ok(self.done());
        }

        let len = self.core.len();
        let split = lower_half_len(len);
        self.stage = match (role.adjustment_member, role.vrank) {
            (true, VirtualRank::Participating(_)) => {
                let partner = self.core.adjustment_partner(Phase::AdjustUpper, 0)?;
                self.core
                    .send_range(transport, partner, Phase::AdjustUpper, 0, split..len)?;
                Stage::AdjustEven {
                    have_lower: false,
                    have_combined: false,
                }
            }
            (true, VirtualRank::Excluded) => {
                let partner = self.core.adjustment_partner(Phase::AdjustLower, 0)?;
                self.core
                    .send_range(transport, partner, Phase::AdjustLower, 0, 0..split)?;
                Stage::AdjustOdd
            }
            (false, _) => Stage::ReduceScatter {
                step: 0,
                sent: false,
            },
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
        self.mailbox.deposit(self.core.stamp, msg)?;
        self.advance(transport)
    }

    fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }
}
