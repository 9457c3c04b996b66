//! Per-step slice bookkeeping for reduce-scatter/allgather.
//!
//! At reduce-scatter step `k` a virtual rank holds a window of the
//! accumulator; it keeps one half (`recv`) and sends the other (`send`) to
//! its partner `vrank ^ (1 << k)`. The retained half becomes the next
//! window. Allgather walks the same table backwards with the roles of the
//! two slices swapped.

use crate::topology::Topology;
use crate::types::Step;
use std::ops::Range;

/// Elements in the lower half of a window of `len`. The lower half takes the
/// odd element.
pub(crate) fn lower_half_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Send/receive slices for every reduce-scatter step of one virtual rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSchedule {
    pub send_index: Vec<usize>,
    pub send_count: Vec<usize>,
    pub recv_index: Vec<usize>,
    pub recv_count: Vec<usize>,
    len: usize,
}

impl SliceSchedule {
    /// Build the table for `vrank` over a vector of `len` elements.
    pub fn new(topology: &Topology, vrank: u32, len: usize) -> Self {
        let steps = topology.steps() as usize;
        let real = topology.virtual_to_real(vrank);
        let mut sched = Self {
            send_index: Vec::with_capacity(steps),
            send_count: Vec::with_capacity(steps),
            recv_index: Vec::with_capacity(steps),
            recv_count: Vec::with_capacity(steps),
            len,
        };

        let mut start = 0usize;
        let mut size = len;
        for step in 0..topology.steps() {
            let dest = topology.partner(vrank, step);
            let lower = lower_half_len(size);
            let upper = size - lower;
            let (send, recv) = if real < dest {
                ((start + lower, upper), (start, lower))
            } else {
                ((start, lower), (start + lower, upper))
            };

            assert_eq!(send.1 + recv.1, size, "step {step}: slices do not fill window");
            assert!(
                send.0 + send.1 == recv.0 || recv.0 + recv.1 == send.0,
                "step {step}: slices are not adjacent"
            );

            sched.send_index.push(send.0);
            sched.send_count.push(send.1);
            sched.recv_index.push(recv.0);
            sched.recv_count.push(recv.1);

            start = recv.0;
            size = recv.1;
        }
        sched
    }

    pub fn steps(&self) -> usize {
        self.send_index.len()
    }

    /// Slice sent at reduce-scatter `step`, received at allgather `step`.
    pub fn send_range(&self, step: Step) -> Range<usize> {
        let s = step as usize;
        self.send_index[s]..self.send_index[s] + self.send_count[s]
    }

    /// Slice reduced at reduce-scatter `step`, sent at allgather `step`.
    pub fn recv_range(&self, step: Step) -> Range<usize> {
        let s = step as usize;
        self.recv_index[s]..self.recv_index[s] + self.recv_count[s]
    }

    /// Window active at `step`: the union of its send and recv slices.
    pub fn window(&self, step: Step) -> Range<usize> {
        let send = self.send_range(step);
        let recv = self.recv_range(step);
        send.start.min(recv.start)..send.end.max(recv.end)
    }

    /// Slice this rank owns, fully reduced, at the end of reduce-scatter.
    pub fn owned_range(&self) -> Range<usize> {
        match self.steps() {
            0 => 0..self.len,
            n => self.recv_range((n - 1) as Step),
        }
    }
}
