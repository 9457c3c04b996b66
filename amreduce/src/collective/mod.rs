mod core;
mod distance_doubling;
mod mailbox;
mod rs_ag_allreduce;
mod schedule;

pub use self::core::CompletionCallback;
pub use distance_doubling::DistanceDoubling;
pub use rs_ag_allreduce::ReduceScatterAllgather;
pub use schedule::SliceSchedule;

use crate::config::DEFAULT_LARGE_MSG_BYTES;
use crate::error::Result;
use crate::protocol::StepMessage;
use crate::reduce::{Combiner, Element};
use crate::transport::ActiveMessageTransport;
use crate::types::{Algorithm, Progress, Rank, Stamp};

/// One in-flight reduction on one participant, as seen by the router.
///
/// Everything is synchronous: `start` and `on_message` run to completion,
/// possibly sending further messages through the transport, and report
/// whether the completion callback has fired.
pub trait ReductionHandler: Send {
    fn stamp(&self) -> Stamp;

    /// The concrete engine (never `Auto`).
    fn algorithm(&self) -> Algorithm;

    /// Begin the protocol. Calling it again is a no-op.
    fn start(&mut self, transport: &dyn ActiveMessageTransport) -> Result<Progress>;

    /// Feed one message from `src`. Messages may arrive before `start`;
    /// they are held until the engine can use them.
    fn on_message(
        &mut self,
        transport: &dyn ActiveMessageTransport,
        src: Rank,
        msg: StepMessage,
    ) -> Result<Progress>;

    fn is_complete(&self) -> bool;
}

/// Create the engine for one reduction on `rank`.
///
/// `Algorithm::Auto` picks by the vector's byte size against the default
/// threshold; callers with a config resolve it themselves first.
pub fn initialize<T: Element>(
    algorithm: Algorithm,
    rank: Rank,
    world_size: u32,
    stamp: Stamp,
    data: Vec<T>,
    combiner: Combiner<T>,
    on_complete: impl FnOnce(Vec<T>) + Send + 'static,
) -> Result<Box<dyn ReductionHandler>> {
    let on_complete: CompletionCallback<T> = Box::new(on_complete);
    let handler: Box<dyn ReductionHandler> =
        match algorithm.resolve(data.len() * T::SIZE, DEFAULT_LARGE_MSG_BYTES) {
            Algorithm::DistanceDoubling => Box::new(DistanceDoubling::initialize(
                rank,
                world_size,
                stamp,
                data,
                combiner,
                on_complete,
            )?),
            _ => Box::new(ReduceScatterAllgather::initialize(
                rank,
                world_size,
                stamp,
                data,
                combiner,
                on_complete,
            )?),
        };
    Ok(handler)
}
