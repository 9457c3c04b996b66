//! In-process tokio runtime: one dispatch task per rank, connected by
//! unbounded channels carrying encoded frames.

mod client;
mod handle;
pub(crate) mod participant;

pub use client::AmClient;
pub use handle::{ReductionGroup, ReductionHandle};
