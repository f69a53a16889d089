use super::*;
use std::collections::HashSet;

use shared::{domain::Address, error::ErrorCode};
use tokio::{sync::Notify, time::timeout};

use crate::actions::{is_permitted, register_candidate_call, vote_call, ActionKind};

const ALICE: &str = "0x00000000000000000000000000000000000a11ce";

fn address(byte: u8) -> Address {
    Address([byte; 20])
}

fn record(name: &str, votes: u64, byte: u8) -> CandidateRecord {
    CandidateRecord {
        name: name.to_string(),
        vote_count: votes,
        address: address(byte),
    }
}

/// In-memory stand-in for the deployed contract. Writes take effect when
/// their confirmation is awaited, mirroring inclusion in a block.
struct MockContract {
    phase: Mutex<Option<u8>>,
    candidates: Mutex<Vec<CandidateRecord>>,
    missing_slots: HashSet<u64>,
    winner: Mutex<Option<Winner>>,
    count: Option<u64>,
    enforce_vote_phase: bool,
    submit_error: Option<ChainError>,
    confirm_error: Option<ChainError>,
    status_reads: Mutex<u32>,
    candidate_reads: Mutex<Vec<u64>>,
    submitted: Mutex<Vec<(ContractCall, Option<Wei>)>>,
}

impl MockContract {
    fn new(phase: u8, candidates: Vec<CandidateRecord>) -> Self {
        Self {
            phase: Mutex::new(Some(phase)),
            candidates: Mutex::new(candidates),
            missing_slots: HashSet::new(),
            winner: Mutex::new(None),
            count: None,
            enforce_vote_phase: false,
            submit_error: None,
            confirm_error: None,
            status_reads: Mutex::new(0),
            candidate_reads: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    fn with_named_candidates(phase: u8, count: usize) -> Self {
        let candidates = (0..count)
            .map(|i| record(&format!("candidate-{i}"), i as u64, i as u8))
            .collect();
        Self::new(phase, candidates)
    }

    fn enforcing_vote_phase(mut self) -> Self {
        self.enforce_vote_phase = true;
        self
    }

    async fn status_reads(&self) -> u32 {
        *self.status_reads.lock().await
    }

    async fn reads_of_slot(&self, slot: u64) -> usize {
        self.candidate_reads
            .lock()
            .await
            .iter()
            .filter(|read| **read == slot)
            .count()
    }

    async fn reset_counters(&self) {
        *self.status_reads.lock().await = 0;
        self.candidate_reads.lock().await.clear();
    }
}

#[async_trait]
impl ContractReader for MockContract {
    async fn workflow_status(&self) -> ChainResult<u8> {
        *self.status_reads.lock().await += 1;
        self.phase
            .lock()
            .await
            .ok_or_else(|| ChainError::transport("node unreachable"))
    }

    async fn get_candidate(&self, index: CandidateIndex) -> ChainResult<CandidateRecord> {
        self.candidate_reads.lock().await.push(index.0);
        if self.missing_slots.contains(&index.0) {
            return Err(ChainError::transport("flaky read"));
        }
        self.candidates
            .lock()
            .await
            .get(index.0 as usize)
            .cloned()
            .ok_or_else(|| ChainError::reverted("Candidate index out of bounds"))
    }

    async fn get_winner(&self) -> ChainResult<Winner> {
        self.winner
            .lock()
            .await
            .clone()
            .ok_or_else(|| ChainError::reverted("Voting is not completed"))
    }

    async fn candidate_count(&self) -> ChainResult<Option<u64>> {
        Ok(self.count)
    }
}

#[async_trait]
impl ContractWriter for MockContract {
    async fn submit(&self, call: &ContractCall, value: Option<Wei>) -> ChainResult<TxHash> {
        self.submitted.lock().await.push((call.clone(), value));
        if let Some(err) = &self.submit_error {
            return Err(err.clone());
        }
        if self.enforce_vote_phase {
            if let ContractCall::Vote { .. } = call {
                if *self.phase.lock().await != Some(WorkflowPhase::Vote.ordinal()) {
                    return Err(ChainError::reverted("Voting is not open"));
                }
            }
        }
        let nonce = self.submitted.lock().await.len() as u8;
        Ok(TxHash([nonce; 32]))
    }

    async fn await_confirmation(&self, _hash: TxHash) -> ChainResult<()> {
        if let Some(err) = &self.confirm_error {
            return Err(err.clone());
        }
        let last = self.submitted.lock().await.last().cloned();
        match last {
            Some((ContractCall::RegisterCandidate { name, address }, _)) => {
                self.candidates.lock().await.push(CandidateRecord {
                    name,
                    vote_count: 0,
                    address,
                });
            }
            Some((ContractCall::SetWorkflowStatus { phase }, _)) => {
                *self.phase.lock().await = Some(phase.ordinal());
            }
            Some((ContractCall::Vote { index }, _)) => {
                if let Some(candidate) = self.candidates.lock().await.get_mut(index.0 as usize) {
                    candidate.vote_count += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn synchronizer(mock: &Arc<MockContract>, settings: SyncSettings) -> Arc<StateSynchronizer> {
    StateSynchronizer::new(mock.clone(), mock.clone(), settings)
}

#[tokio::test]
async fn refresh_phase_caches_each_phase_ordinal() {
    for ordinal in 0..=3u8 {
        let mock = Arc::new(MockContract::new(ordinal, Vec::new()));
        let sync = synchronizer(&mock, SyncSettings::default());

        let view = sync.refresh_phase().await;
        assert_eq!(view.code(), i16::from(ordinal));
        assert_eq!(sync.snapshot().await.phase, view);
    }
}

#[tokio::test]
async fn phase_is_unknown_until_first_successful_read() {
    let mock = Arc::new(MockContract::new(0, Vec::new()));
    *mock.phase.lock().await = None;
    let sync = synchronizer(&mock, SyncSettings::default());

    assert_eq!(sync.snapshot().await.phase.code(), PhaseView::UNKNOWN_CODE);
    assert_eq!(sync.refresh_phase().await, PhaseView::Unknown);
    assert!(matches!(
        sync.try_refresh_phase().await,
        Err(SyncError::ReadFailure(_))
    ));
}

#[tokio::test]
async fn failed_phase_read_keeps_previous_value() {
    let mock = Arc::new(MockContract::new(2, Vec::new()));
    let sync = synchronizer(&mock, SyncSettings::default());
    let mut events = sync.subscribe_events();

    assert_eq!(sync.refresh_phase().await, PhaseView::Known(WorkflowPhase::Vote));
    *mock.phase.lock().await = None;
    assert_eq!(sync.refresh_phase().await, PhaseView::Known(WorkflowPhase::Vote));

    assert!(matches!(
        events.recv().await.expect("event"),
        SyncEvent::PhaseUpdated(_)
    ));
    assert!(matches!(
        events.recv().await.expect("event"),
        SyncEvent::ReadFailed {
            function: "workflowStatus",
            ..
        }
    ));
}

#[tokio::test]
async fn out_of_range_phase_ordinal_is_treated_as_read_failure() {
    let mock = Arc::new(MockContract::new(9, Vec::new()));
    let sync = synchronizer(&mock, SyncSettings::default());

    let err = sync.try_refresh_phase().await.expect_err("ordinal 9");
    assert_eq!(err.code(), ErrorCode::Decode);
    assert_eq!(sync.snapshot().await.phase, PhaseView::Unknown);
}

#[tokio::test]
async fn refresh_candidates_returns_contiguous_prefix_within_probe_limit() {
    for k in [0usize, 1, 5, 19, 20, 25] {
        let mock = Arc::new(MockContract::with_named_candidates(0, k));
        let sync = synchronizer(&mock, SyncSettings::default());

        let candidates = sync.refresh_candidates().await;
        let expected = k.min(DEFAULT_PROBE_LIMIT);
        assert_eq!(candidates.len(), expected, "k={k}");
        for (position, candidate) in candidates.iter().enumerate() {
            assert_eq!(candidate.index, CandidateIndex(position as u64));
            assert_eq!(candidate.name, format!("candidate-{position}"));
        }

        let probes = mock.candidate_reads.lock().await.len();
        assert!(probes <= DEFAULT_PROBE_LIMIT, "k={k} probes={probes}");
        assert_eq!(probes, (k + 1).min(DEFAULT_PROBE_LIMIT), "k={k}");
    }
}

#[tokio::test]
async fn refresh_candidates_is_idempotent() {
    let mock = Arc::new(MockContract::with_named_candidates(2, 3));
    let sync = synchronizer(&mock, SyncSettings::default());

    let first = sync.refresh_candidates().await;
    let second = sync.refresh_candidates().await;
    assert_eq!(first, second);
    assert_eq!(mock.reads_of_slot(0).await, 2);
}

#[tokio::test]
async fn probe_limit_is_configurable() {
    let mock = Arc::new(MockContract::with_named_candidates(0, 10));
    let sync = synchronizer(
        &mock,
        SyncSettings {
            probe_limit: 3,
            ..SyncSettings::default()
        },
    );

    assert_eq!(sync.refresh_candidates().await.len(), 3);
    assert_eq!(mock.candidate_reads.lock().await.len(), 3);
}

#[tokio::test]
async fn windowed_probe_truncates_at_first_failure() {
    let mut mock = MockContract::with_named_candidates(0, 6);
    mock.missing_slots.insert(2);
    let mock = Arc::new(mock);

    let outcome = probe::enumerate_candidates(
        mock.as_ref(),
        DEFAULT_PROBE_LIMIT,
        ProbeStrategy::Windowed { width: 4 },
    )
    .await;

    assert_eq!(outcome.candidates.len(), 2);
    assert!(matches!(
        outcome.stop,
        ProbeStop::OutOfRange {
            index: CandidateIndex(2),
            ..
        }
    ));
    // Slot 3 was read in the same window and succeeded, but is not reported.
    assert_eq!(mock.reads_of_slot(3).await, 1);
    assert_eq!(outcome.probes, 4);
}

#[tokio::test]
async fn windowed_probe_matches_sequential_result() {
    let mock = Arc::new(MockContract::with_named_candidates(0, 7));

    let sequential =
        probe::enumerate_candidates(mock.as_ref(), DEFAULT_PROBE_LIMIT, ProbeStrategy::Sequential)
            .await;
    let windowed = probe::enumerate_candidates(
        mock.as_ref(),
        DEFAULT_PROBE_LIMIT,
        ProbeStrategy::Windowed { width: 3 },
    )
    .await;

    assert_eq!(sequential.candidates, windowed.candidates);
    assert!(windowed.probes <= DEFAULT_PROBE_LIMIT);
}

#[tokio::test]
async fn explicit_count_bounds_the_probe() {
    let mut mock = MockContract::with_named_candidates(0, 5);
    mock.count = Some(2);
    let mock = Arc::new(mock);

    let outcome =
        probe::enumerate_candidates(mock.as_ref(), DEFAULT_PROBE_LIMIT, ProbeStrategy::Sequential)
            .await;

    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.stop, ProbeStop::CountReached);
    assert_eq!(mock.candidate_reads.lock().await.len(), 2);
}

#[tokio::test]
async fn list_filling_the_bound_exactly_is_not_reported_as_truncated() {
    let mock = Arc::new(MockContract::with_named_candidates(0, 4));

    let outcome = probe::enumerate_candidates(mock.as_ref(), 4, ProbeStrategy::Sequential).await;

    assert_eq!(outcome.candidates.len(), 4);
    assert_eq!(outcome.stop, ProbeStop::LimitReached);
    assert_eq!(outcome.probes, 4);
    assert_eq!(mock.reads_of_slot(4).await, 0);
}

#[tokio::test]
async fn count_above_the_bound_is_reported_as_truncated() {
    let mut mock = MockContract::with_named_candidates(0, 6);
    mock.count = Some(6);
    let mock = Arc::new(mock);

    let outcome = probe::enumerate_candidates(mock.as_ref(), 4, ProbeStrategy::Sequential).await;

    assert_eq!(outcome.candidates.len(), 4);
    assert_eq!(outcome.stop, ProbeStop::Truncated { available: 6 });
}

#[tokio::test]
async fn vote_is_forwarded_regardless_of_cached_phase() {
    let mock = Arc::new(MockContract::with_named_candidates(0, 3).enforcing_vote_phase());
    let sync = synchronizer(&mock, SyncSettings::default());
    assert_eq!(
        sync.refresh_phase().await,
        PhaseView::Known(WorkflowPhase::RegisterCandidates)
    );

    let err = sync
        .submit_and_confirm(vote_call(CandidateIndex(2)))
        .await
        .expect_err("contract rejects vote outside VOTE phase");

    assert!(matches!(err, SyncError::WriteRejected(_)));
    assert_eq!(err.code(), ErrorCode::Reverted);
    let submitted = mock.submitted.lock().await.clone();
    assert_eq!(
        submitted,
        vec![(
            ContractCall::Vote {
                index: CandidateIndex(2)
            },
            None
        )]
    );
    let pending = sync.snapshot().await.pending.expect("pending");
    assert_eq!(pending.error(), Some("Voting is not open"));
    assert!(pending.hash.is_none());
}

#[tokio::test]
async fn confirmation_refreshes_phase_and_candidates_exactly_once() {
    let mock = Arc::new(MockContract::with_named_candidates(1, 2));
    let sync = synchronizer(&mock, SyncSettings::default());

    let tx = sync
        .submit_and_confirm(ContractCall::Withdraw)
        .await
        .expect("withdraw");

    assert!(tx.is_confirmed());
    assert_eq!(mock.status_reads().await, 1);
    assert_eq!(mock.reads_of_slot(0).await, 1);
    assert_eq!(sync.snapshot().await.candidates.len(), 2);
}

#[tokio::test]
async fn registering_a_candidate_shows_up_after_confirmation() {
    let mock = Arc::new(MockContract::new(0, Vec::new()));
    let sync = synchronizer(&mock, SyncSettings::default());

    let snapshot = sync.refresh_all().await;
    assert!(snapshot.candidates.is_empty());
    assert!(is_permitted(snapshot.phase, ActionKind::RegisterCandidate));
    assert!(!is_permitted(snapshot.phase, ActionKind::Vote));

    mock.reset_counters().await;
    let call = register_candidate_call("Alice", ALICE).expect("call");
    let tx = sync.submit_and_confirm(call).await.expect("register");
    assert!(tx.is_confirmed());
    assert!(tx.hash.is_some());

    let snapshot = sync.snapshot().await;
    assert_eq!(snapshot.phase, PhaseView::Known(WorkflowPhase::RegisterCandidates));
    assert_eq!(
        snapshot.candidates,
        vec![Candidate {
            index: CandidateIndex(0),
            name: "Alice".into(),
            vote_count: 0,
            address: ALICE.parse().expect("address"),
        }]
    );
    assert_eq!(mock.status_reads().await, 1);
    assert_eq!(mock.reads_of_slot(0).await, 1);
}

#[tokio::test]
async fn background_submission_refreshes_after_confirmation() {
    let mock = Arc::new(MockContract::with_named_candidates(1, 2));
    let sync = synchronizer(&mock, SyncSettings::default());
    let mut events = sync.subscribe_events();

    let tx = sync
        .submit_write(advance_phase_call())
        .await
        .expect("submit");
    assert_eq!(tx.status, TxStatus::Confirming);

    let refreshed = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.expect("event") {
                SyncEvent::PhaseUpdated(view) => break view,
                _ => continue,
            }
        }
    })
    .await
    .expect("phase refresh after confirmation");

    assert_eq!(refreshed, PhaseView::Known(WorkflowPhase::Vote));
    let pending = sync.snapshot().await.pending.expect("pending");
    assert!(pending.is_confirmed());
}

fn advance_phase_call() -> ContractCall {
    actions::advance_phase_call(WorkflowPhase::Vote)
}

#[tokio::test]
async fn wallet_rejection_surfaces_reason_and_skips_refresh() {
    let mut mock = MockContract::with_named_candidates(0, 1);
    mock.submit_error = Some(ChainError::new(
        ErrorCode::UserRejected,
        "User denied transaction signature.",
    ));
    let mock = Arc::new(mock);
    let sync = synchronizer(&mock, SyncSettings::default());

    let err = sync
        .submit_and_confirm(ContractCall::FundCandidates)
        .await
        .expect_err("rejected");

    assert_eq!(err.user_message(), "User denied transaction signature.");
    assert_eq!(mock.status_reads().await, 0);
    assert_eq!(
        sync.snapshot().await.pending.expect("pending").error(),
        Some("User denied transaction signature.")
    );
}

#[tokio::test]
async fn failed_confirmation_marks_transaction_failed() {
    let mut mock = MockContract::with_named_candidates(2, 1);
    mock.confirm_error = Some(ChainError::reverted("transaction reverted on-chain"));
    let mock = Arc::new(mock);
    let sync = synchronizer(&mock, SyncSettings::default());

    let err = sync
        .submit_and_confirm(vote_call(CandidateIndex(0)))
        .await
        .expect_err("reverted");

    assert!(matches!(err, SyncError::WriteRejected(_)));
    let pending = sync.snapshot().await.pending.expect("pending");
    assert!(pending.hash.is_some());
    assert_eq!(pending.error(), Some("transaction reverted on-chain"));
    assert_eq!(mock.status_reads().await, 0);
}

#[tokio::test]
async fn funding_attaches_configured_amount_and_other_calls_do_not() {
    let mock = Arc::new(MockContract::new(1, Vec::new()));
    let sync = synchronizer(
        &mock,
        SyncSettings {
            funding_amount: Wei(42),
            ..SyncSettings::default()
        },
    );

    sync.submit_and_confirm(ContractCall::FundCandidates)
        .await
        .expect("fund");
    sync.submit_and_confirm(ContractCall::Withdraw)
        .await
        .expect("withdraw");

    let submitted = mock.submitted.lock().await.clone();
    assert_eq!(submitted[0], (ContractCall::FundCandidates, Some(Wei(42))));
    assert_eq!(submitted[1], (ContractCall::Withdraw, None));
}

#[tokio::test]
async fn blank_candidate_name_never_reaches_the_chain() {
    let mock = Arc::new(MockContract::new(0, Vec::new()));
    let sync = synchronizer(&mock, SyncSettings::default());

    let err = sync
        .submit_and_confirm(ContractCall::RegisterCandidate {
            name: "   ".into(),
            address: address(1),
        })
        .await
        .expect_err("blank name");

    assert!(matches!(err, SyncError::InvalidInput(_)));
    assert!(mock.submitted.lock().await.is_empty());
    assert!(sync.snapshot().await.pending.is_none());
}

#[tokio::test]
async fn winner_lookup_is_benign_before_completion() {
    let mock = Arc::new(MockContract::with_named_candidates(2, 2));
    let sync = synchronizer(&mock, SyncSettings::default());

    assert_eq!(sync.snapshot().await.winner, WinnerView::NotRequested);
    assert_eq!(sync.fetch_winner().await, WinnerView::Undecided);

    *mock.winner.lock().await = Some(Winner {
        name: "candidate-1".into(),
        vote_count: 4,
    });
    assert_eq!(
        sync.fetch_winner().await,
        WinnerView::Decided(Winner {
            name: "candidate-1".into(),
            vote_count: 4,
        })
    );
}

#[tokio::test]
async fn read_only_synchronizer_rejects_writes() {
    let mock = Arc::new(MockContract::new(0, Vec::new()));
    let sync = StateSynchronizer::read_only(mock.clone(), SyncSettings::default());

    let err = sync
        .submit_and_confirm(ContractCall::Withdraw)
        .await
        .expect_err("no writer");
    assert!(matches!(err, SyncError::WriteRejected(_)));
    assert_eq!(sync.refresh_phase().await.code(), 0);
}

/// Holds the first `workflow_status` read until released so a later read can
/// overtake it.
struct GatedPhaseReader {
    calls: Mutex<u32>,
    entered: Notify,
    gate: Notify,
}

#[async_trait]
impl ContractReader for GatedPhaseReader {
    async fn workflow_status(&self) -> ChainResult<u8> {
        let call = {
            let mut calls = self.calls.lock().await;
            *calls += 1;
            *calls
        };
        if call == 1 {
            self.entered.notify_one();
            self.gate.notified().await;
            return Ok(WorkflowPhase::RegisterCandidates.ordinal());
        }
        Ok(WorkflowPhase::Vote.ordinal())
    }

    async fn get_candidate(&self, _index: CandidateIndex) -> ChainResult<CandidateRecord> {
        Err(ChainError::reverted("empty"))
    }

    async fn get_winner(&self) -> ChainResult<Winner> {
        Err(ChainError::reverted("undecided"))
    }
}

#[tokio::test]
async fn stale_phase_response_does_not_overwrite_newer_one() {
    let reader = Arc::new(GatedPhaseReader {
        calls: Mutex::new(0),
        entered: Notify::new(),
        gate: Notify::new(),
    });
    let sync = StateSynchronizer::read_only(reader.clone(), SyncSettings::default());

    let slow = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.refresh_phase().await })
    };
    reader.entered.notified().await;

    assert_eq!(sync.refresh_phase().await, PhaseView::Known(WorkflowPhase::Vote));
    reader.gate.notify_one();

    let slow_view = slow.await.expect("join");
    assert_eq!(slow_view, PhaseView::Known(WorkflowPhase::Vote));
    assert_eq!(sync.snapshot().await.phase, PhaseView::Known(WorkflowPhase::Vote));
}

#[tokio::test]
async fn refresh_loop_polls_in_background() {
    let mock = Arc::new(MockContract::with_named_candidates(3, 1));
    let sync = synchronizer(&mock, SyncSettings::default());
    let mut events = sync.subscribe_events();

    let handle = sync.spawn_refresh_loop(Duration::from_millis(250));
    let update = timeout(Duration::from_secs(5), async {
        loop {
            if let SyncEvent::CandidatesUpdated(list) = events.recv().await.expect("event") {
                break list;
            }
        }
    })
    .await
    .expect("background refresh");
    handle.abort();

    assert_eq!(update.len(), 1);
    assert!(mock.status_reads().await >= 1);
}
