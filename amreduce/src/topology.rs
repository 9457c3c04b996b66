//! Virtual topology for non-power-of-two participant counts.
//!
//! Both engines run their main phase on the largest power-of-two subset of
//! ranks. The lowest `2 * rem` ranks pair up (even, odd); each pair folds into
//! one virtual rank held by the even member while the odd member sits out
//! and receives the final vector at the end.

use crate::error::{AmReduceError, Result};
use crate::types::{Rank, Step};

/// A rank's position in the power-of-two sub-topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualRank {
    /// Takes part in the main phase under this virtual rank.
    Participating(u32),
    /// Odd member of an adjustment pair; waits for the final vector.
    Excluded,
}

impl VirtualRank {
    pub fn get(self) -> Option<u32> {
        match self {
            VirtualRank::Participating(v) => Some(v),
            VirtualRank::Excluded => None,
        }
    }
}

/// Everything a single rank needs to know about its place in a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankRole {
    pub rank: Rank,
    pub vrank: VirtualRank,
    /// True iff `rank < 2 * rem`.
    pub adjustment_member: bool,
    pub is_even: bool,
}

impl RankRole {
    /// Partner in the adjustment exchange, if this rank is in the group.
    pub fn adjustment_partner(&self) -> Option<Rank> {
        match (self.adjustment_member, self.is_even) {
            (true, true) => Some(self.rank + 1),
            (true, false) => Some(self.rank - 1),
            (false, _) => None,
        }
    }
}

/// Derived constants for one participant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    world_size: u32,
    steps: u32,
    pof2: u32,
    rem: u32,
}

impl Topology {
    /// Rejects `world_size == 0`.
    pub fn new(world_size: u32) -> Result<Self> {
        if world_size == 0 {
            return Err(AmReduceError::InvalidParticipantCount { world_size });
        }
        let steps = world_size.ilog2();
        let pof2 = 1u32 << steps;
        Ok(Self {
            world_size,
            steps,
            pof2,
            rem: world_size - pof2,
        })
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// `floor(log2(world_size))`: number of main-phase exchange steps.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Largest power of two not exceeding `world_size`.
    pub fn pof2(&self) -> u32 {
        self.pof2
    }

    /// Ranks beyond the power-of-two subset.
    pub fn rem(&self) -> u32 {
        self.rem
    }

    /// Role of `rank`, or `InvalidRank` if it is out of range.
    pub fn role(&self, rank: Rank) -> Result<RankRole> {
        if rank >= self.world_size {
            return Err(AmReduceError::InvalidRank {
                rank,
                world_size: self.world_size,
            });
        }
        Ok(compute_virtual_rank(rank, self.world_size))
    }

    pub fn virtual_to_real(&self, vrank: u32) -> Rank {
        map_virtual_to_real(vrank, self.rem)
    }

    /// Real rank of the main-phase partner of `vrank` at `step`.
    pub fn partner(&self, vrank: u32, step: Step) -> Rank {
        let mask = 1u32 << step;
        assert!(
            mask < self.pof2,
            "mask {mask} out of range for pof2 {}",
            self.pof2
        );
        self.virtual_to_real(vrank ^ mask)
    }
}

/// Map a real rank to its role in the largest power-of-two sub-topology.
///
/// Panics if `world_size == 0` or `rank >= world_size`; use
/// [`Topology::role`] for checked input.
pub fn compute_virtual_rank(rank: Rank, world_size: u32) -> RankRole {
    assert!(
        rank < world_size,
        "rank {rank} out of range for world {world_size}"
    );
    let pof2 = 1u32 << world_size.ilog2();
    let rem = world_size - pof2;
    let is_even = rank % 2 == 0;
    let adjustment_member = rank < 2 * rem;

    let vrank = if adjustment_member {
        if is_even {
            VirtualRank::Participating(rank / 2)
        } else {
            VirtualRank::Excluded
        }
    } else {
        VirtualRank::Participating(rank - rem)
    };

    RankRole {
        rank,
        vrank,
        adjustment_member,
        is_even,
    }
}

/// Inverse of [`compute_virtual_rank`] for participating ranks.
pub fn map_virtual_to_real(vrank: u32, rem: u32) -> Rank {
    if vrank < rem { vrank * 2 } else { vrank + rem }
}
