/// Rank of a participant in the reduction group (0-indexed).
pub type Rank = u32;

/// Caller-chosen identifier that keeps concurrent reductions apart.
pub type Stamp = u64;

/// Index of a main-phase exchange step, in `[0, steps)`.
pub type Step = u32;

/// Reduction operations with a built-in combiner.
///
/// Every variant is commutative and associative over the supported
/// element types, which is what both engines require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Element-wise sum across ranks.
    Sum,
    /// Element-wise product across ranks.
    Prod,
    /// Element-wise minimum across ranks.
    Min,
    /// Element-wise maximum across ranks.
    Max,
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
        }
    }
}

/// Which allreduce engine drives a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Recursive halving then recursive doubling over vector slices.
    /// Moves about `2 * len` elements per rank in total.
    ReduceScatterAllgather,
    /// Whole-vector exchange at every step with per-step buffering.
    /// Fewer moving parts and tolerant of cross-step reordering.
    DistanceDoubling,
    /// Pick per reduction from the contributed vector's byte size.
    Auto,
}

impl Algorithm {
    /// Resolve `Auto` against the payload size and the configured threshold.
    pub fn resolve(self, payload_bytes: usize, large_msg_bytes: usize) -> Algorithm {
        match self {
            Algorithm::Auto if payload_bytes >= large_msg_bytes => {
                Algorithm::ReduceScatterAllgather
            }
            Algorithm::Auto => Algorithm::DistanceDoubling,
            other => other,
        }
    }

    /// Human-readable name, also accepted by `FromStr`.
    pub const fn name(self) -> &'static str {
        match self {
            Algorithm::ReduceScatterAllgather => "rsag",
            Algorithm::DistanceDoubling => "distance-doubling",
            Algorithm::Auto => "auto",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsag" | "reduce-scatter-allgather" => Ok(Algorithm::ReduceScatterAllgather),
            "distance-doubling" | "dd" => Ok(Algorithm::DistanceDoubling),
            "auto" => Ok(Algorithm::Auto),
            other => Err(format!("unknown allreduce algorithm: {other}")),
        }
    }
}

/// Outcome of feeding one event into a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More messages are needed before the reduction can finish.
    Pending,
    /// The completion callback has fired.
    Complete,
}

impl Progress {
    pub fn is_complete(self) -> bool {
        matches!(self, Progress::Complete)
    }
}
