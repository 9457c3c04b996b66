//! Active-message allreduce.
//!
//! Every participant contributes a vector; every participant receives the
//! element-wise combination of all of them. Reductions are driven purely by
//! message arrival: each engine is a state machine that reacts to one
//! incoming [`StepMessage`] at a time and sends whatever becomes sendable.
//!
//! Two engines are provided, both over the power-of-two "virtual" group
//! described in [`topology`]:
//!
//! - [`ReduceScatterAllgather`]: bandwidth-oriented, moves slices.
//! - [`DistanceDoubling`]: latency-oriented, moves whole vectors.
//!
//! [`ReductionRouter`] multiplexes concurrent reductions on one participant
//! by stamp. [`sim::SimCluster`] drives a whole group deterministically in
//! one thread; [`AmClient`] runs one tokio task per rank.

pub mod collective;
pub mod config;
pub mod error;
pub mod protocol;
pub mod reduce;
pub mod router;
pub mod runtime;
pub mod sim;
pub mod topology;
pub mod transport;
pub mod types;

pub use collective::{
    CompletionCallback, DistanceDoubling, ReduceScatterAllgather, ReductionHandler, SliceSchedule,
};
pub use config::AmReduceConfig;
pub use error::{AmReduceError, Result};
pub use protocol::{Phase, StepMessage};
pub use reduce::{Combiner, Element, combiner_fn};
pub use router::ReductionRouter;
pub use runtime::{AmClient, ReductionGroup, ReductionHandle};
pub use topology::{RankRole, Topology, VirtualRank};
pub use transport::{ActiveMessageTransport, ChannelTransport};
pub use types::{Algorithm, Progress, Rank, ReduceOp, Stamp, Step};
