// error.rs
//
// Failures surfaced by the guessor. `Infeasible` is a normal negative answer
// for one room count and is consumed by the sweep; the rest end a run.

/// Why an input document was rejected before any solving happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedInput {
    #[error("no traces given")]
    NoTraces,
    #[error("plans.len()={plans} != results.len()={results}")]
    PlanCountMismatch { plans: usize, results: usize },
    #[error("results[{idx}] has {obs_len} labels, plan has {plan_len} doors (expected plan+1)")]
    ResultLength {
        idx: usize,
        plan_len: usize,
        obs_len: usize,
    },
    #[error("plan {idx} ({plan:?}) is neither 0-5 nor 1-6 digits")]
    BadDoor { idx: usize, plan: String },
    #[error("results[{idx}][{pos}] = {value} is not a 2-bit label")]
    BadLabel { idx: usize, pos: usize, value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuessError {
    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),
    #[error("no map with {rooms} rooms is consistent with the traces")]
    Infeasible { rooms: usize },
    #[error("no room count in {min}..={max} is consistent with the traces")]
    InfeasibleForAllK { min: usize, max: usize },
    #[error("oracle gave up at K={rooms} (iteration {iteration}) without a definite answer")]
    Indeterminate { rooms: usize, iteration: usize },
    #[error("decoded model breaks a graph invariant: {0}")]
    InvariantDecodeFailure(String),
    #[error("K={rooms} still refining after {iterations} iterations")]
    MaxIterationsExceeded { rooms: usize, iterations: usize },
    #[error("K={rooms} cancelled")]
    Cancelled { rooms: usize },
    #[error("worker failed: {0}")]
    Worker(String),
}

impl GuessError {
    /// True when the failure says nothing definite about the room count,
    /// so a sweep should move on without treating it as proof.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            GuessError::Indeterminate { .. } | GuessError::MaxIterationsExceeded { .. }
        )
    }
}
