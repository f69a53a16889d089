//! Candidate enumeration by indexed probing.
//!
//! The contract has no count accessor, so slots are read from index 0 upward
//! until a read fails or the probe bound is hit. A failing read is taken as the
//! end of the list; a transient error therefore truncates the result.

use futures::future::join_all;
use shared::{
    domain::{Candidate, CandidateIndex},
    error::ChainError,
};
use tracing::debug;

use crate::ContractReader;

pub const DEFAULT_PROBE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStrategy {
    /// One read at a time.
    #[default]
    Sequential,
    /// Up to `width` reads in flight; results are consumed in index order and
    /// truncated at the first failure.
    Windowed { width: usize },
}

/// Why enumeration stopped. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStop {
    OutOfRange {
        index: CandidateIndex,
        error: ChainError,
    },
    /// Bound reached without a failing read; more slots may exist.
    LimitReached,
    CountReached,
    /// The contract reported more candidates than the probe bound allows.
    Truncated { available: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub candidates: Vec<Candidate>,
    pub probes: usize,
    pub stop: ProbeStop,
}

pub async fn enumerate_candidates(
    reader: &dyn ContractReader,
    limit: usize,
    strategy: ProbeStrategy,
) -> ProbeOutcome {
    let (bound, exhausted) = match reader.candidate_count().await {
        Ok(Some(available)) => {
            let count = usize::try_from(available).unwrap_or(usize::MAX);
            if count <= limit {
                (count, ProbeStop::CountReached)
            } else {
                (limit, ProbeStop::Truncated { available })
            }
        }
        Ok(None) => (limit, ProbeStop::LimitReached),
        Err(err) => {
            debug!(error = %err, "candidates: count accessor failed, probing instead");
            (limit, ProbeStop::LimitReached)
        }
    };

    let mut outcome = match strategy {
        ProbeStrategy::Sequential => probe_sequential(reader, bound).await,
        ProbeStrategy::Windowed { width } => probe_windowed(reader, bound, width.max(1)).await,
    };
    if outcome.stop == ProbeStop::LimitReached {
        outcome.stop = exhausted;
    }
    outcome
}

async fn probe_sequential(reader: &dyn ContractReader, bound: usize) -> ProbeOutcome {
    let mut candidates = Vec::new();
    for slot in 0..bound {
        let index = CandidateIndex(slot as u64);
        match reader.get_candidate(index).await {
            Ok(record) => candidates.push(Candidate::from_record(index, record)),
            Err(error) => {
                return ProbeOutcome {
                    candidates,
                    probes: slot + 1,
                    stop: ProbeStop::OutOfRange { index, error },
                }
            }
        }
    }
    ProbeOutcome {
        candidates,
        probes: bound,
        stop: ProbeStop::LimitReached,
    }
}

async fn probe_windowed(reader: &dyn ContractReader, bound: usize, width: usize) -> ProbeOutcome {
    let mut candidates = Vec::new();
    let mut start = 0;
    while start < bound {
        let end = (start + width).min(bound);
        let reads = (start..end).map(|slot| reader.get_candidate(CandidateIndex(slot as u64)));
        let results = join_all(reads).await;
        for (offset, result) in results.into_iter().enumerate() {
            let index = CandidateIndex((start + offset) as u64);
            match result {
                Ok(record) => candidates.push(Candidate::from_record(index, record)),
                Err(error) => {
                    return ProbeOutcome {
                        candidates,
                        probes: end,
                        stop: ProbeStop::OutOfRange { index, error },
                    }
                }
            }
        }
        start = end;
    }
    ProbeOutcome {
        candidates,
        probes: bound,
        stop: ProbeStop::LimitReached,
    }
}
