use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ChainError, ErrorCode};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(CandidateIndex);
id_newtype!(ChainId);

/// Fixed-width byte strings rendered as `0x`-prefixed lowercase hex.
macro_rules! hex_bytes_newtype {
    ($name:ident, $len:expr, $what:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ChainError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let trimmed = raw.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .ok_or_else(|| {
                        ChainError::new(
                            ErrorCode::Validation,
                            format!("{} must start with 0x: '{trimmed}'", $what),
                        )
                    })?;
                if digits.len() != $len * 2 {
                    return Err(ChainError::new(
                        ErrorCode::Validation,
                        format!(
                            "{} must be {} hex digits, got {}",
                            $what,
                            $len * 2,
                            digits.len()
                        ),
                    ));
                }
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(digits, &mut bytes).map_err(|err| {
                    ChainError::new(ErrorCode::Validation, format!("invalid {}: {err}", $what))
                })?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes_newtype!(Address, 20, "account address");
hex_bytes_newtype!(TxHash, 32, "transaction hash");

/// Amount in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Wei(pub u128);

impl Wei {
    pub const PER_ETHER: u128 = 1_000_000_000_000_000_000;

    /// 0.001 ETH, the fixed payment attached to `fundCandidates`.
    pub const DEFAULT_FUNDING: Wei = Wei(1_000_000_000_000_000);
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::PER_ETHER;
        let frac = self.0 % Self::PER_ETHER;
        if frac == 0 {
            return write!(f, "{whole} ETH");
        }
        let frac = format!("{frac:018}");
        write!(f, "{whole}.{} ETH", frac.trim_end_matches('0'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    RegisterCandidates,
    FoundCandidates,
    Vote,
    Completed,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 4] = [
        WorkflowPhase::RegisterCandidates,
        WorkflowPhase::FoundCandidates,
        WorkflowPhase::Vote,
        WorkflowPhase::Completed,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            WorkflowPhase::RegisterCandidates => 0,
            WorkflowPhase::FoundCandidates => 1,
            WorkflowPhase::Vote => 2,
            WorkflowPhase::Completed => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkflowPhase::RegisterCandidates => "REGISTER_CANDIDATES",
            WorkflowPhase::FoundCandidates => "FOUND_CANDIDATES",
            WorkflowPhase::Vote => "VOTE",
            WorkflowPhase::Completed => "COMPLETED",
        }
    }
}

impl TryFrom<u8> for WorkflowPhase {
    type Error = ChainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(value as usize).copied().ok_or_else(|| {
            ChainError::new(
                ErrorCode::Decode,
                format!("unknown workflow phase ordinal {value}"),
            )
        })
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cached view of the contract phase; `Unknown` until the first read resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum PhaseView {
    #[default]
    Unknown,
    Known(WorkflowPhase),
}

impl PhaseView {
    pub const UNKNOWN_CODE: i16 = -1;

    pub fn code(self) -> i16 {
        match self {
            PhaseView::Unknown => Self::UNKNOWN_CODE,
            PhaseView::Known(phase) => i16::from(phase.ordinal()),
        }
    }

    pub fn phase(self) -> Option<WorkflowPhase> {
        match self {
            PhaseView::Unknown => None,
            PhaseView::Known(phase) => Some(phase),
        }
    }

    pub fn is(self, phase: WorkflowPhase) -> bool {
        self == PhaseView::Known(phase)
    }
}

/// Raw `getCandidate(index)` return tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub vote_count: u64,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: CandidateIndex,
    pub name: String,
    pub vote_count: u64,
    pub address: Address,
}

impl Candidate {
    pub fn from_record(index: CandidateIndex, record: CandidateRecord) -> Self {
        Self {
            index,
            name: record.name,
            vote_count: record.vote_count,
            address: record.address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub name: String,
    pub vote_count: u64,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {} votes", self.name, self.vote_count)
    }
}
