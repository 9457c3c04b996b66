use crate::error::{AmReduceError, Result};
use crate::reduce::Element;
use crate::types::{Stamp, Step};

/// Which part of the protocol a `StepMessage` belongs to.
///
/// Together with `step` this names the handler the message is routed to on
/// the receiving engine.
#[derive(
    rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum Phase {
    /// Odd adjustment member's lower half, sent to the even member.
    AdjustLower,
    /// Even adjustment member's upper half, sent to the odd member.
    AdjustUpper,
    /// Odd member's combined upper half, returned to the even member.
    AdjustCombined,
    /// Odd member's whole vector (distance doubling only).
    AdjustFull,
    /// Recursive-halving slice exchange.
    ReduceScatter,
    /// Recursive-doubling slice exchange.
    Allgather,
    /// Whole-accumulator exchange.
    DistanceDouble,
    /// Final vector forwarded to an excluded odd member.
    Distribute,
}

impl Phase {
    pub const fn name(self) -> &'static str {
        match self {
            Phase::AdjustLower => "adjust-lower",
            Phase::AdjustUpper => "adjust-upper",
            Phase::AdjustCombined => "adjust-combined",
            Phase::AdjustFull => "adjust-full",
            Phase::ReduceScatter => "reduce-scatter",
            Phase::Allgather => "allgather",
            Phase::DistanceDouble => "distance-double",
            Phase::Distribute => "distribute",
        }
    }

    /// Phases that carry a meaningful step index.
    pub const fn is_stepped(self) -> bool {
        matches!(
            self,
            Phase::ReduceScatter | Phase::Allgather | Phase::DistanceDouble
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The unit of exchange between two engines.
///
/// The sender is not part of the message; the transport reports it on
/// delivery.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub struct StepMessage {
    pub stamp: Stamp,
    pub phase: Phase,
    /// Step index for stepped phases, 0 otherwise.
    pub step: Step,
    /// Element offset of the payload within the accumulator.
    pub offset: u64,
    /// Little-endian packed elements.
    pub payload: Vec<u8>,
}

impl StepMessage {
    /// Build a message carrying `elems`, which start at `offset`.
    pub fn new<T: Element>(
        stamp: Stamp,
        phase: Phase,
        step: Step,
        offset: usize,
        elems: &[T],
    ) -> Self {
        Self {
            stamp,
            phase,
            step,
            offset: offset as u64,
            payload: pack_elements(elems),
        }
    }

    /// Number of `T` elements in the payload, if it divides evenly.
    pub fn element_count<T: Element>(&self) -> Result<usize> {
        if self.payload.len() % T::SIZE != 0 {
            return Err(AmReduceError::PayloadMisaligned {
                len: self.payload.len(),
                elem_size: T::SIZE,
            });
        }
        Ok(self.payload.len() / T::SIZE)
    }

    /// Decode the payload.
    pub fn elements<T: Element>(&self) -> Result<Vec<T>> {
        unpack_elements(&self.payload)
    }
}

/// Pack elements little-endian, `T::SIZE` bytes each.
pub fn pack_elements<T: Element>(elems: &[T]) -> Vec<u8> {
    let mut buf = vec![0u8; elems.len() * T::SIZE];
    for (e, chunk) in elems.iter().zip(buf.chunks_exact_mut(T::SIZE)) {
        e.write_le(chunk);
    }
    buf
}

/// Inverse of [`pack_elements`].
pub fn unpack_elements<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(AmReduceError::PayloadMisaligned {
            len: bytes.len(),
            elem_size: T::SIZE,
        });
    }
    Ok(bytes.chunks_exact(T::SIZE).map(T::read_le).collect())
}
