//! Phase gating for front ends and validated construction of contract calls.
//!
//! Gating here is advisory: it decides which affordances a front end offers.
//! The synchronizer forwards every write regardless, and the contract has the
//! final say.

use shared::{
    domain::{Address, CandidateIndex, PhaseView, WorkflowPhase},
    protocol::ContractCall,
};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    AdvancePhase,
    RegisterCandidate,
    Vote,
    Fund,
    Withdraw,
    GetWinner,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::AdvancePhase,
        ActionKind::RegisterCandidate,
        ActionKind::Vote,
        ActionKind::Fund,
        ActionKind::Withdraw,
        ActionKind::GetWinner,
    ];

    /// Phase the action is restricted to, if any.
    pub fn required_phase(self) -> Option<WorkflowPhase> {
        match self {
            ActionKind::RegisterCandidate => Some(WorkflowPhase::RegisterCandidates),
            ActionKind::Vote => Some(WorkflowPhase::Vote),
            ActionKind::AdvancePhase
            | ActionKind::Fund
            | ActionKind::Withdraw
            | ActionKind::GetWinner => None,
        }
    }

    pub fn of_call(call: &ContractCall) -> Self {
        match call {
            ContractCall::SetWorkflowStatus { .. } => ActionKind::AdvancePhase,
            ContractCall::RegisterCandidate { .. } => ActionKind::RegisterCandidate,
            ContractCall::Vote { .. } => ActionKind::Vote,
            ContractCall::FundCandidates => ActionKind::Fund,
            ContractCall::Withdraw => ActionKind::Withdraw,
        }
    }
}

pub fn is_permitted(phase: PhaseView, action: ActionKind) -> bool {
    match action.required_phase() {
        None => true,
        Some(required) => phase.is(required),
    }
}

pub fn permitted_actions(phase: PhaseView) -> Vec<ActionKind> {
    ActionKind::ALL
        .into_iter()
        .filter(|action| is_permitted(phase, *action))
        .collect()
}

pub fn advance_phase_call(phase: WorkflowPhase) -> ContractCall {
    ContractCall::SetWorkflowStatus { phase }
}

pub fn register_candidate_call(name: &str, address: &str) -> Result<ContractCall, SyncError> {
    let name = name.trim();
    let address = address.trim();
    if name.is_empty() {
        return Err(SyncError::InvalidInput(
            "candidate name must not be empty".into(),
        ));
    }
    if address.is_empty() {
        return Err(SyncError::InvalidInput(
            "candidate address must not be empty".into(),
        ));
    }
    let address: Address = address
        .parse()
        .map_err(|err: shared::error::ChainError| SyncError::InvalidInput(err.message))?;
    Ok(ContractCall::RegisterCandidate {
        name: name.to_string(),
        address,
    })
}

pub fn vote_call(index: CandidateIndex) -> ContractCall {
    ContractCall::Vote { index }
}

/// Rejects calls whose arguments can never be valid, before touching the chain.
pub fn validate_call(call: &ContractCall) -> Result<(), SyncError> {
    match call {
        ContractCall::RegisterCandidate { name, .. } if name.trim().is_empty() => Err(
            SyncError::InvalidInput("candidate name must not be empty".into()),
        ),
        _ => Ok(()),
    }
}
