//! Local view of the contract and the pure transitions that keep it current.
//!
//! Every refresh takes a [`RequestToken`] before it suspends on the chain and
//! hands it back with the response. Tokens are issued per field in increasing
//! order, and a response is only applied when its token is newer than the last
//! one applied for that field, so a slow reply can never overwrite fresher data.

use chrono::{DateTime, Utc};
use shared::{
    domain::{Candidate, PhaseView, TxHash, Winner, WorkflowPhase},
    protocol::ContractCall,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Identifies one write submission; a newer ticket supersedes older ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxTicket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Handed to the wallet, hash not known yet.
    Submitting,
    /// Broadcast; waiting for a receipt.
    Confirming,
    Confirmed,
    Failed { reason: String },
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub ticket: TxTicket,
    pub call: ContractCall,
    pub hash: Option<TxHash>,
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn is_confirming(&self) -> bool {
        self.status == TxStatus::Confirming
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TxStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// `Submitting -> Confirming`. Returns false if the transition does not apply.
    pub fn attach_hash(&mut self, hash: TxHash) -> bool {
        if self.status != TxStatus::Submitting {
            return false;
        }
        self.hash = Some(hash);
        self.status = TxStatus::Confirming;
        true
    }

    /// `Confirming -> Confirmed`.
    pub fn mark_confirmed(&mut self) -> bool {
        if self.status != TxStatus::Confirming {
            return false;
        }
        self.status = TxStatus::Confirmed;
        true
    }

    /// `Submitting | Confirming -> Failed`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TxStatus::Failed {
            reason: reason.into(),
        };
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WinnerView {
    #[default]
    NotRequested,
    /// `getWinner` is expected to fail until the vote is over.
    Undecided,
    Decided(Winner),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractSnapshot {
    pub phase: PhaseView,
    pub candidates: Vec<Candidate>,
    pub pending: Option<PendingTransaction>,
    pub winner: WinnerView,
}

#[derive(Debug, Default)]
struct Sequence {
    issued: u64,
    applied: u64,
}

impl Sequence {
    fn issue(&mut self) -> RequestToken {
        self.issued += 1;
        RequestToken(self.issued)
    }

    fn accept(&mut self, token: RequestToken) -> bool {
        if token.0 <= self.applied {
            return false;
        }
        self.applied = token.0;
        true
    }
}

#[derive(Debug, Default)]
pub struct SyncState {
    snapshot: ContractSnapshot,
    phase_requests: Sequence,
    candidate_requests: Sequence,
    winner_requests: Sequence,
    last_ticket: u64,
}

impl SyncState {
    pub fn snapshot(&self) -> &ContractSnapshot {
        &self.snapshot
    }

    pub fn begin_phase_refresh(&mut self) -> RequestToken {
        self.phase_requests.issue()
    }

    pub fn apply_phase(&mut self, token: RequestToken, phase: WorkflowPhase) -> bool {
        if !self.phase_requests.accept(token) {
            return false;
        }
        self.snapshot.phase = PhaseView::Known(phase);
        true
    }

    pub fn begin_candidates_refresh(&mut self) -> RequestToken {
        self.candidate_requests.issue()
    }

    pub fn apply_candidates(&mut self, token: RequestToken, candidates: Vec<Candidate>) -> bool {
        if !self.candidate_requests.accept(token) {
            return false;
        }
        self.snapshot.candidates = candidates;
        true
    }

    pub fn begin_winner_fetch(&mut self) -> RequestToken {
        self.winner_requests.issue()
    }

    pub fn apply_winner(&mut self, token: RequestToken, winner: WinnerView) -> bool {
        if !self.winner_requests.accept(token) {
            return false;
        }
        self.snapshot.winner = winner;
        true
    }

    /// Starts a fresh submission, superseding whatever was pending.
    pub fn begin_submission(
        &mut self,
        call: ContractCall,
        submitted_at: DateTime<Utc>,
    ) -> PendingTransaction {
        self.last_ticket += 1;
        let pending = PendingTransaction {
            ticket: TxTicket(self.last_ticket),
            call,
            hash: None,
            status: TxStatus::Submitting,
            submitted_at,
        };
        self.snapshot.pending = Some(pending.clone());
        pending
    }

    /// Stores `tx` if it is still the current submission.
    pub fn update_pending(&mut self, tx: &PendingTransaction) -> bool {
        if tx.ticket.0 != self.last_ticket {
            return false;
        }
        self.snapshot.pending = Some(tx.clone());
        true
    }
}
