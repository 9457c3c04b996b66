use crate::protocol::Phase;
use crate::types::{Rank, Stamp, Step};

pub type Result<T> = std::result::Result<T, AmReduceError>;

#[derive(Debug, thiserror::Error)]
pub enum AmReduceError {
    #[error("invalid participant count {world_size}: at least one participant is required")]
    InvalidParticipantCount { world_size: u32 },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error(
        "protocol violation in reduction {stamp} at {phase} step {step}: expected {expected}, got {actual}"
    )]
    ProtocolViolation {
        stamp: Stamp,
        phase: Phase,
        step: Step,
        expected: String,
        actual: String,
    },

    #[error("reduction {stamp} is already registered on rank {rank}")]
    DuplicateStamp { stamp: Stamp, rank: Rank },

    #[error("reduction {stamp} is not registered on rank {rank}")]
    UnknownStamp { stamp: Stamp, rank: Rank },

    #[error("message for completed reduction {stamp} arrived at rank {rank} from rank {src}")]
    RetiredStamp { stamp: Stamp, rank: Rank, src: Rank },

    #[error("rank {rank} is holding {limit} messages for reductions it has not initialized")]
    ParkedOverflow { rank: Rank, limit: usize },

    #[error("payload of {len} bytes is not a whole number of {elem_size}-byte elements")]
    PayloadMisaligned { len: usize, elem_size: usize },

    #[error("frame decode failed: {0}")]
    DecodeFailed(String),

    #[error("frame encode failed: {0}")]
    EncodeFailed(String),

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("reduction {stamp} did not complete within {timeout_ms}ms")]
    Timeout { stamp: Stamp, timeout_ms: u64 },

    #[error("reduction {stamp} went quiescent with {completed} of {world_size} participants complete")]
    Incomplete {
        stamp: Stamp,
        completed: usize,
        world_size: u32,
    },

    #[error("participant {rank} aborted: {reason}")]
    ParticipantAborted { rank: Rank, reason: String },
}

impl AmReduceError {
    /// Build a `ProtocolViolation` from anything displayable.
    pub fn violation(
        stamp: Stamp,
        phase: Phase,
        step: Step,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::ProtocolViolation {
            stamp,
            phase,
            step,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Errors after which a participant must stop dispatching.
    ///
    /// These mean the transport or a peer is corrupt; there is no state the
    /// participant can continue from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. }
                | Self::RetiredStamp { .. }
                | Self::ParkedOverflow { .. }
                | Self::PayloadMisaligned { .. }
                | Self::DecodeFailed(_)
        )
    }
}
