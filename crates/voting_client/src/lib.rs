use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{Candidate, CandidateIndex, CandidateRecord, PhaseView, TxHash, Wei, Winner, WorkflowPhase},
    error::{ChainError, ChainResult},
    protocol::ContractCall,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

pub mod abi;
pub mod actions;
pub mod error;
pub mod probe;
pub mod rpc;
pub mod snapshot;

pub use error::SyncError;
pub use probe::{ProbeOutcome, ProbeStop, ProbeStrategy, DEFAULT_PROBE_LIMIT};
pub use rpc::{JsonRpcVotingContract, RpcSettings};
pub use snapshot::{ContractSnapshot, PendingTransaction, TxStatus, TxTicket, WinnerView};

use snapshot::SyncState;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Read side of the voting contract.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn workflow_status(&self) -> ChainResult<u8>;
    /// Fails for indices past the end of the contract's candidate list.
    async fn get_candidate(&self, index: CandidateIndex) -> ChainResult<CandidateRecord>;
    /// Fails until the contract has a winner.
    async fn get_winner(&self) -> ChainResult<Winner>;
    /// Explicit candidate count, for contracts that expose one.
    async fn candidate_count(&self) -> ChainResult<Option<u64>> {
        Ok(None)
    }
}

/// Write side: transaction submission and confirmation.
#[async_trait]
pub trait ContractWriter: Send + Sync {
    async fn submit(&self, call: &ContractCall, value: Option<Wei>) -> ChainResult<TxHash>;
    async fn await_confirmation(&self, hash: TxHash) -> ChainResult<()>;
}

pub struct MissingChain;

#[async_trait]
impl ContractReader for MissingChain {
    async fn workflow_status(&self) -> ChainResult<u8> {
        Err(ChainError::transport("chain backend unavailable"))
    }

    async fn get_candidate(&self, index: CandidateIndex) -> ChainResult<CandidateRecord> {
        Err(ChainError::transport(format!(
            "chain backend unavailable for candidate {}",
            index.0
        )))
    }

    async fn get_winner(&self) -> ChainResult<Winner> {
        Err(ChainError::transport("chain backend unavailable"))
    }
}

#[async_trait]
impl ContractWriter for MissingChain {
    async fn submit(&self, call: &ContractCall, _value: Option<Wei>) -> ChainResult<TxHash> {
        Err(ChainError::transport(format!(
            "no transaction sender configured for {}",
            call.function_name()
        )))
    }

    async fn await_confirmation(&self, hash: TxHash) -> ChainResult<()> {
        Err(ChainError::transport(format!(
            "no transaction sender configured to confirm {hash}"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub probe_limit: usize,
    pub probe_strategy: ProbeStrategy,
    pub funding_amount: Wei,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            probe_limit: DEFAULT_PROBE_LIMIT,
            probe_strategy: ProbeStrategy::Sequential,
            funding_amount: Wei::DEFAULT_FUNDING,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    PhaseUpdated(PhaseView),
    CandidatesUpdated(Vec<Candidate>),
    TransactionUpdated(PendingTransaction),
    WinnerUpdated(WinnerView),
    ReadFailed {
        function: &'static str,
        message: String,
    },
}

/// Keeps a local [`ContractSnapshot`] in step with the contract.
pub struct StateSynchronizer {
    reader: Arc<dyn ContractReader>,
    writer: Arc<dyn ContractWriter>,
    settings: SyncSettings,
    inner: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl StateSynchronizer {
    pub fn new(
        reader: Arc<dyn ContractReader>,
        writer: Arc<dyn ContractWriter>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            reader,
            writer,
            settings,
            inner: Mutex::new(SyncState::default()),
            events,
        })
    }

    /// A synchronizer that can read but rejects every write.
    pub fn read_only(reader: Arc<dyn ContractReader>, settings: SyncSettings) -> Arc<Self> {
        Self::new(reader, Arc::new(MissingChain), settings)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ContractSnapshot {
        self.inner.lock().await.snapshot().clone()
    }

    /// Reads the phase, surfacing the failure instead of keeping the stale value quietly.
    pub async fn try_refresh_phase(&self) -> Result<PhaseView, SyncError> {
        let token = self.inner.lock().await.begin_phase_refresh();
        let result = self
            .reader
            .workflow_status()
            .await
            .and_then(WorkflowPhase::try_from);

        let mut guard = self.inner.lock().await;
        match result {
            Ok(phase) => {
                if guard.apply_phase(token, phase) {
                    let view = guard.snapshot().phase;
                    let _ = self.events.send(SyncEvent::PhaseUpdated(view));
                } else {
                    debug!(?token, "sync: dropped stale workflow status response");
                }
                Ok(guard.snapshot().phase)
            }
            Err(err) => {
                let _ = self.events.send(SyncEvent::ReadFailed {
                    function: "workflowStatus",
                    message: err.to_string(),
                });
                Err(SyncError::ReadFailure(err))
            }
        }
    }

    /// Background-safe phase refresh: a failed read keeps the cached phase.
    pub async fn refresh_phase(&self) -> PhaseView {
        match self.try_refresh_phase().await {
            Ok(view) => view,
            Err(err) => {
                warn!(error = %err, "sync: workflow status read failed, keeping cached phase");
                self.inner.lock().await.snapshot().phase
            }
        }
    }

    pub async fn refresh_candidates(&self) -> Vec<Candidate> {
        let token = self.inner.lock().await.begin_candidates_refresh();
        let outcome = probe::enumerate_candidates(
            self.reader.as_ref(),
            self.settings.probe_limit,
            self.settings.probe_strategy,
        )
        .await;

        match &outcome.stop {
            ProbeStop::OutOfRange { index, error } => debug!(
                index = index.0,
                probes = outcome.probes,
                %error,
                "sync: candidate probe stopped at first failing slot"
            ),
            ProbeStop::Truncated { available } => warn!(
                limit = self.settings.probe_limit,
                available,
                "sync: contract has more candidates than the probe limit"
            ),
            ProbeStop::LimitReached => debug!(
                limit = self.settings.probe_limit,
                "sync: candidate probe limit reached without a failing slot"
            ),
            _ => debug!(probes = outcome.probes, "sync: candidate probe complete"),
        }

        let mut guard = self.inner.lock().await;
        if guard.apply_candidates(token, outcome.candidates) {
            let candidates = guard.snapshot().candidates.clone();
            let _ = self.events.send(SyncEvent::CandidatesUpdated(candidates));
        } else {
            debug!(?token, "sync: dropped stale candidate list");
        }
        guard.snapshot().candidates.clone()
    }

    /// Refreshes phase and candidates concurrently and returns the resulting view.
    pub async fn refresh_all(&self) -> ContractSnapshot {
        tokio::join!(self.refresh_phase(), self.refresh_candidates());
        self.snapshot().await
    }

    /// On-demand winner lookup; a failing read means the vote is not decided yet.
    pub async fn fetch_winner(&self) -> WinnerView {
        let token = self.inner.lock().await.begin_winner_fetch();
        let view = match self.reader.get_winner().await {
            Ok(winner) => WinnerView::Decided(winner),
            Err(err) => {
                info!(error = %err, "sync: winner not available yet");
                WinnerView::Undecided
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.apply_winner(token, view) {
            let _ = self
                .events
                .send(SyncEvent::WinnerUpdated(guard.snapshot().winner.clone()));
        }
        guard.snapshot().winner.clone()
    }

    pub fn spawn_refresh_loop(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        let every = every.max(MIN_REFRESH_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sync.refresh_all().await;
            }
        })
    }

    /// Submits `call` and returns once the wallet has produced a hash.
    /// Confirmation, and the refresh that follows it, continue in the background.
    pub async fn submit_write(
        self: &Arc<Self>,
        call: ContractCall,
    ) -> Result<PendingTransaction, SyncError> {
        let tx = self.begin_write(call).await?;
        let sync = Arc::clone(self);
        let background = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = sync.drive_confirmation(background).await {
                warn!(error = %err, "tx: background confirmation ended in failure");
            }
        });
        Ok(tx)
    }

    /// Submits `call` and drives it to a terminal state before returning.
    pub async fn submit_and_confirm(
        &self,
        call: ContractCall,
    ) -> Result<PendingTransaction, SyncError> {
        let tx = self.begin_write(call).await?;
        self.drive_confirmation(tx).await
    }

    async fn begin_write(&self, call: ContractCall) -> Result<PendingTransaction, SyncError> {
        actions::validate_call(&call)?;
        let value = call.is_payable().then_some(self.settings.funding_amount);

        let mut tx = {
            let mut guard = self.inner.lock().await;
            guard.begin_submission(call, Utc::now())
        };
        let _ = self.events.send(SyncEvent::TransactionUpdated(tx.clone()));
        info!(
            ticket = tx.ticket.0,
            function = tx.call.function_name(),
            "tx: submitting"
        );

        match self.writer.submit(&tx.call, value).await {
            Ok(hash) => {
                tx.attach_hash(hash);
                info!(ticket = tx.ticket.0, %hash, "tx: broadcast, awaiting confirmation");
                self.publish_pending(&tx).await;
                Ok(tx)
            }
            Err(err) => {
                warn!(ticket = tx.ticket.0, error = %err, "tx: submission rejected");
                tx.mark_failed(err.reason());
                self.publish_pending(&tx).await;
                Err(SyncError::WriteRejected(err))
            }
        }
    }

    async fn drive_confirmation(
        &self,
        mut tx: PendingTransaction,
    ) -> Result<PendingTransaction, SyncError> {
        let Some(hash) = tx.hash else {
            return Ok(tx);
        };

        match self.writer.await_confirmation(hash).await {
            Ok(()) => {
                tx.mark_confirmed();
                info!(ticket = tx.ticket.0, %hash, "tx: confirmed");
                self.publish_pending(&tx).await;
                self.refresh_all().await;
                Ok(tx)
            }
            Err(err) => {
                error!(ticket = tx.ticket.0, %hash, error = %err, "tx: failed");
                tx.mark_failed(err.reason());
                self.publish_pending(&tx).await;
                Err(SyncError::WriteRejected(err))
            }
        }
    }

    async fn publish_pending(&self, tx: &PendingTransaction) {
        let current = self.inner.lock().await.update_pending(tx);
        if current {
            let _ = self.events.send(SyncEvent::TransactionUpdated(tx.clone()));
        } else {
            debug!(ticket = tx.ticket.0, "tx: update for superseded submission ignored");
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
