//! Deterministic, single-threaded cluster for driving the engines without a
//! runtime.
//!
//! Every participant gets its own [`ReductionRouter`]; sends are encoded
//! into frames and queued, and [`SimCluster::step`] delivers one frame at a
//! time in either FIFO or seeded-random order.

use crate::collective;
use crate::config::AmReduceConfig;
use crate::error::{AmReduceError, Result};
use crate::protocol::{StepMessage, decode_frame, encode_frame};
use crate::reduce::{Combiner, Element};
use crate::router::ReductionRouter;
use crate::transport::ActiveMessageTransport;
use crate::types::{Algorithm, Rank, Stamp};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Order in which queued messages are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOrder {
    /// Global send order.
    Fifo,
    /// A uniformly random in-flight message each step. Reorders freely
    /// across steps, phases and sender pairs.
    Shuffled { seed: u64 },
}

struct Envelope {
    src: Rank,
    dest: Rank,
    frame: Vec<u8>,
}

struct SimTransport<'a> {
    rank: Rank,
    world_size: u32,
    queue: &'a RefCell<VecDeque<Envelope>>,
}

impl ActiveMessageTransport for SimTransport<'_> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.world_size
    }

    fn send(&self, dest: Rank, msg: StepMessage) -> Result<()> {
        if dest >= self.world_size {
            return Err(AmReduceError::InvalidRank {
                rank: dest,
                world_size: self.world_size,
            });
        }
        let frame = encode_frame(&msg)?;
        self.queue.borrow_mut().push_back(Envelope {
            src: self.rank,
            dest,
            frame,
        });
        Ok(())
    }
}

/// Per-rank results of one launched reduction, filled in by the completion
/// callbacks as ranks finish.
pub struct SimResults<T> {
    stamp: Stamp,
    world_size: u32,
    slots: Arc<Mutex<Vec<Option<Vec<T>>>>>,
}

impl<T: Element> SimResults<T> {
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Number of ranks whose callback has fired.
    pub fn completed(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.world_size as usize
    }

    /// Result delivered to `rank`, if it has completed.
    pub fn get(&self, rank: Rank) -> Option<Vec<T>> {
        self.lock().get(rank as usize).cloned().flatten()
    }

    /// Every rank's result, or `Incomplete` if any rank is still pending.
    pub fn into_results(self) -> Result<Vec<Vec<T>>> {
        let slots = std::mem::take(&mut *self.lock());
        let completed = slots.iter().filter(|s| s.is_some()).count();
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(AmReduceError::Incomplete {
                stamp: self.stamp,
                completed,
                world_size: self.world_size,
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Option<Vec<T>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A whole reduction group in one thread.
pub struct SimCluster {
    world_size: u32,
    routers: Vec<ReductionRouter>,
    queue: RefCell<VecDeque<Envelope>>,
    rng: Option<SmallRng>,
    delivered: usize,
}

impl SimCluster {
    pub fn new(world_size: u32, order: DeliveryOrder) -> Result<Self> {
        if world_size == 0 {
            return Err(AmReduceError::InvalidParticipantCount { world_size });
        }
        let defaults = AmReduceConfig::default();
        Ok(Self {
            world_size,
            routers: (0..world_size)
                .map(|rank| {
                    ReductionRouter::new(
                        rank,
                        defaults.max_parked_messages,
                        defaults.max_retired_stamps,
                    )
                })
                .collect(),
            queue: RefCell::new(VecDeque::new()),
            rng: match order {
                DeliveryOrder::Fifo => None,
                DeliveryOrder::Shuffled { seed } => Some(SmallRng::seed_from_u64(seed)),
            },
            delivered: 0,
        })
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Initialize `stamp` on every rank, then start it on every rank.
    ///
    /// `inputs[r]` is rank `r`'s contribution. Nothing is delivered here;
    /// call [`step`](Self::step) or [`run`](Self::run).
    pub fn launch<T: Element>(
        &mut self,
        stamp: Stamp,
        inputs: Vec<Vec<T>>,
        combiner: Combiner<T>,
        algorithm: Algorithm,
    ) -> Result<SimResults<T>> {
        assert_eq!(
            inputs.len(),
            self.world_size as usize,
            "one input vector per rank"
        );
        let slots = Arc::new(Mutex::new(vec![None; inputs.len()]));

        for (rank, data) in inputs.into_iter().enumerate() {
            let sink = Arc::clone(&slots);
            let handler = collective::initialize(
                algorithm,
                rank as Rank,
                self.world_size,
                stamp,
                data,
                Arc::clone(&combiner),
                move |result| {
                    sink.lock().unwrap_or_else(PoisonError::into_inner)[rank] = Some(result);
                },
            )?;
            let transport = SimTransport {
                rank: rank as Rank,
                world_size: self.world_size,
                queue: &self.queue,
            };
            self.routers[rank].initialize(&transport, handler)?;
        }

        for rank in 0..self.world_size {
            let transport = SimTransport {
                rank,
                world_size: self.world_size,
                queue: &self.queue,
            };
            self.routers[rank as usize].start(&transport, stamp)?;
        }

        tracing::debug!(
            stamp,
            world_size = self.world_size,
            in_flight = self.in_flight(),
            "sim reduction launched"
        );
        Ok(SimResults {
            stamp,
            world_size: self.world_size,
            slots,
        })
    }

    /// Queue a hand-built message as if `src` had sent it.
    pub fn inject(&mut self, src: Rank, dest: Rank, msg: StepMessage) -> Result<()> {
        let transport = SimTransport {
            rank: src,
            world_size: self.world_size,
            queue: &self.queue,
        };
        transport.send(dest, msg)
    }

    /// Deliver one message. Returns `false` if nothing was in flight.
    pub fn step(&mut self) -> Result<bool> {
        let next = {
            let mut queue = self.queue.borrow_mut();
            match &mut self.rng {
                None => queue.pop_front(),
                Some(_) if queue.is_empty() => None,
                Some(rng) => {
                    let pick = rng.gen_range(0..queue.len());
                    queue.swap_remove_back(pick)
                }
            }
        };
        let Some(envelope) = next else {
            return Ok(false);
        };

        let msg = decode_frame(&envelope.frame)?;
        let transport = SimTransport {
            rank: envelope.dest,
            world_size: self.world_size,
            queue: &self.queue,
        };
        self.routers[envelope.dest as usize].dispatch(&transport, envelope.src, msg)?;
        self.delivered += 1;
        Ok(true)
    }

    /// Deliver until nothing is in flight. Returns the number delivered.
    pub fn run(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.step()? {
            count += 1;
        }
        Ok(count)
    }

    pub fn in_flight(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Total messages delivered since construction.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn router(&self, rank: Rank) -> &ReductionRouter {
        &self.routers[rank as usize]
    }
}

/// Run one reduction over `inputs.len()` simulated ranks to quiescence.
pub fn simulate_allreduce<T: Element>(
    inputs: Vec<Vec<T>>,
    combiner: Combiner<T>,
    algorithm: Algorithm,
    order: DeliveryOrder,
) -> Result<Vec<Vec<T>>> {
    let mut cluster = SimCluster::new(inputs.len() as u32, order)?;
    let results = cluster.launch(0, inputs, combiner, algorithm)?;
    cluster.run()?;
    results.into_results()
}
