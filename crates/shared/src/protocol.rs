use serde::{Deserialize, Serialize};

use crate::domain::{Address, CandidateIndex, WorkflowPhase};

/// State-changing calls accepted by the voting contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ContractCall {
    SetWorkflowStatus {
        phase: WorkflowPhase,
    },
    RegisterCandidate {
        name: String,
        address: Address,
    },
    Vote {
        index: CandidateIndex,
    },
    FundCandidates,
    Withdraw,
}

impl ContractCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::SetWorkflowStatus { .. } => "setWorkflowStatus",
            ContractCall::RegisterCandidate { .. } => "registerCandidate",
            ContractCall::Vote { .. } => "vote",
            ContractCall::FundCandidates => "fundCandidates",
            ContractCall::Withdraw => "withdraw",
        }
    }

    /// Canonical Solidity signature used to derive the function selector.
    pub fn signature(&self) -> &'static str {
        match self {
            ContractCall::SetWorkflowStatus { .. } => "setWorkflowStatus(uint8)",
            ContractCall::RegisterCandidate { .. } => "registerCandidate(string,address)",
            ContractCall::Vote { .. } => "vote(uint256)",
            ContractCall::FundCandidates => "fundCandidates()",
            ContractCall::Withdraw => "withdraw()",
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self, ContractCall::FundCandidates)
    }
}

/// Read-only calls issued through `eth_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ContractQuery {
    WorkflowStatus,
    GetCandidate { index: CandidateIndex },
    GetWinner,
}

impl ContractQuery {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractQuery::WorkflowStatus => "workflowStatus",
            ContractQuery::GetCandidate { .. } => "getCandidate",
            ContractQuery::GetWinner => "getWinner",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            ContractQuery::WorkflowStatus => "workflowStatus()",
            ContractQuery::GetCandidate { .. } => "getCandidate(uint256)",
            ContractQuery::GetWinner => "getWinner()",
        }
    }
}
