use crate::collective;
use crate::config::AmReduceConfig;
use crate::error::{AmReduceError, Result};
use crate::reduce::{Combiner, Element};
use crate::runtime::handle::ReductionHandle;
use crate::runtime::participant::{Inbound, Launch, Participant};
use crate::transport::ChannelTransport;
use crate::types::{Algorithm, Rank, ReduceOp, Stamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One rank's entry point to the in-process runtime.
///
/// Each client owns a participant task that runs this rank's reductions.
/// Reductions are matched across ranks by stamp, so every rank must issue
/// the same sequence of stamped calls.
///
/// # Example
///
/// ```no_run
/// use amreduce::{AmClient, AmReduceConfig};
///
/// # async fn example() -> amreduce::Result<()> {
/// let clients = AmClient::bootstrap_local(4, AmReduceConfig::default()).await?;
/// assert_eq!(clients[2].rank(), 2);
/// assert_eq!(clients[2].world_size(), 4);
/// # Ok(())
/// # }
/// ```
pub struct AmClient {
    rank: Rank,
    world_size: u32,
    config: AmReduceConfig,
    inbox: mpsc::UnboundedSender<Inbound>,
    /// Counter for stamps issued by `next_stamp`. All ranks advance it in
    /// lockstep as long as they issue the same calls.
    stamp: AtomicU64,
    participant: JoinHandle<Result<()>>,
}

impl AmClient {
    /// Spawn `world_size` participants wired together by in-memory channels
    /// and return one client per rank, in rank order.
    pub async fn bootstrap_local(world_size: u32, config: AmReduceConfig) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(AmReduceError::InvalidParticipantCount { world_size });
        }

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| mpsc::unbounded_channel::<Inbound>()).unzip();
        let peers = Arc::new(senders);

        let clients = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let rank = rank as Rank;
                let transport = ChannelTransport::new(rank, Arc::clone(&peers));
                let participant = Participant::new(
                    transport,
                    inbox,
                    config.max_parked_messages,
                    config.max_retired_stamps,
                )
                .spawn();
                Self {
                    rank,
                    world_size,
                    config: config.clone(),
                    inbox: peers[rank as usize].clone(),
                    stamp: AtomicU64::new(1),
                    participant,
                }
            })
            .collect();

        tracing::info!(world_size, "local reduction group ready");
        Ok(clients)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn config(&self) -> &AmReduceConfig {
        &self.config
    }

    /// Next stamp in this client's sequence. Starts at 1.
    pub fn next_stamp(&self) -> Stamp {
        self.stamp.fetch_add(1, Ordering::Relaxed)
    }

    /// Allreduce `data` with a built-in operator, using the next stamp and
    /// the configured algorithm.
    pub async fn all_reduce<T: Element>(&self, data: Vec<T>, op: ReduceOp) -> Result<Vec<T>> {
        let stamp = self.next_stamp();
        self.all_reduce_with(stamp, data, op.combiner(), self.config.algorithm)
            .await
    }

    /// Allreduce with an explicit stamp, combiner and algorithm.
    pub async fn all_reduce_with<T: Element>(
        &self,
        stamp: Stamp,
        data: Vec<T>,
        combiner: Combiner<T>,
        algorithm: Algorithm,
    ) -> Result<Vec<T>> {
        self.all_reduce_nb(stamp, data, combiner, algorithm)?
            .wait()
            .await
    }

    /// Non-blocking allreduce. Returns a handle that can be awaited later.
    ///
    /// Errors here are local (bad arguments, participant gone); anything
    /// the participant reports surfaces from [`ReductionHandle::wait`].
    pub fn all_reduce_nb<T: Element>(
        &self,
        stamp: Stamp,
        data: Vec<T>,
        combiner: Combiner<T>,
        algorithm: Algorithm,
    ) -> Result<ReductionHandle<T>> {
        let algorithm = algorithm.resolve(data.len() * T::SIZE, self.config.large_msg_bytes);
        let (result_tx, result_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);

        let handler = collective::initialize(
            algorithm,
            self.rank,
            self.world_size,
            stamp,
            data,
            combiner,
            move |result| {
                let _ = result_tx.send(result);
                done.store(true, Ordering::Release);
            },
        )?;

        let (ack, launched) = oneshot::channel();
        self.inbox
            .send(Inbound::Launch(Launch { handler, ack }))
            .map_err(|_| AmReduceError::ParticipantAborted {
                rank: self.rank,
                reason: "participant is not running".into(),
            })?;
        tracing::debug!(rank = self.rank, stamp, %algorithm, "reduction submitted");

        Ok(ReductionHandle::new(
            stamp,
            self.rank,
            self.config.completion_timeout,
            launched,
            result_rx,
            finished,
        ))
    }

    /// Whether this rank's participant task is still dispatching.
    pub fn is_running(&self) -> bool {
        !self.participant.is_finished()
    }
}

impl Drop for AmClient {
    fn drop(&mut self) {
        self.participant.abort();
    }
}
