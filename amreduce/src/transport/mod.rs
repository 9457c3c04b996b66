//! The boundary between the reduction engines and whatever moves bytes.
//!
//! Engines see only [`ActiveMessageTransport`]: who am I, how many of us are
//! there, and fire-and-forget sends. Delivery back into an engine goes
//! through a [`ReductionRouter`](crate::router::ReductionRouter), which the
//! transport's receive side drives.

pub(crate) mod channel;

use crate::error::Result;
use crate::protocol::StepMessage;
use crate::types::Rank;

pub use channel::ChannelTransport;

/// Point-to-point, non-blocking message transport.
///
/// `send` must not wait for the receiver: engines call it from inside
/// message handlers and rely on handlers running to completion.
pub trait ActiveMessageTransport {
    /// Rank of the participant this transport sends from.
    fn rank(&self) -> Rank;

    /// Number of participants reachable through this transport.
    fn world_size(&self) -> u32;

    /// Queue `msg` for delivery to `dest`.
    ///
    /// An error means the destination is gone; it says nothing about
    /// whether the message was processed.
    fn send(&self, dest: Rank, msg: StepMessage) -> Result<()>;
}
