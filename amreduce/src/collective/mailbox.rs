use crate::error::{AmReduceError, Result};
use crate::protocol::{Phase, StepMessage};
use crate::types::{Stamp, Step};
use std::collections::{HashMap, HashSet};

/// Messages that arrived before their engine was ready for them.
///
/// Keyed by `(phase, step)`; each key is filled at most once per
/// reduction, since each partner pair exchanges one message per step.
/// Keys stay reserved after `take`, so a late repeat is still caught.
#[derive(Debug, Default)]
pub(crate) struct StepMailbox {
    slots: HashMap<(Phase, Step), StepMessage>,
    seen: HashSet<(Phase, Step)>,
}

impl StepMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, stamp: Stamp, msg: StepMessage) -> Result<()> {
        let key = (msg.phase, msg.step);
        if !self.seen.insert(key) {
            return Err(AmReduceError::violation(
                stamp,
                msg.phase,
                msg.step,
                "one message per phase and step",
                "a duplicate",
            ));
        }
        self.slots.insert(key, msg);
        Ok(())
    }

    pub fn take(&mut self, phase: Phase, step: Step) -> Option<StepMessage> {
        self.slots.remove(&(phase, step))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
