//! Minimal Solidity ABI codec for the voting contract's functions.

use sha3::{Digest, Keccak256};
use shared::{
    domain::{Address, CandidateRecord, Winner},
    error::{ChainError, ChainResult},
    protocol::{ContractCall, ContractQuery},
};

pub const WORD: usize = 32;
const SELECTOR_LEN: usize = 4;
/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

pub fn selector(signature: &str) -> [u8; SELECTOR_LEN] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&digest[..SELECTOR_LEN]);
    out
}

#[derive(Debug, Clone, Copy)]
pub enum Token<'a> {
    Uint(u128),
    Address(&'a Address),
    String(&'a str),
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - Address::LEN..].copy_from_slice(address.as_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Head/tail encoding of `args` prefixed with the selector of `signature`.
pub fn encode_call(signature: &str, args: &[Token<'_>]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::String(text) => {
                let offset = head_len + tail.len();
                head.extend_from_slice(&uint_word(offset as u128));
                let bytes = text.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                tail.resize(tail.len() + padded_len(bytes.len()) - bytes.len(), 0);
            }
        }
    }

    let mut out = Vec::with_capacity(SELECTOR_LEN + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

pub fn encode_query(query: &ContractQuery) -> Vec<u8> {
    match query {
        ContractQuery::WorkflowStatus | ContractQuery::GetWinner => {
            encode_call(query.signature(), &[])
        }
        ContractQuery::GetCandidate { index } => {
            encode_call(query.signature(), &[Token::Uint(u128::from(index.0))])
        }
    }
}

pub fn encode_contract_call(call: &ContractCall) -> Vec<u8> {
    let signature = call.signature();
    match call {
        ContractCall::SetWorkflowStatus { phase } => {
            encode_call(signature, &[Token::Uint(u128::from(phase.ordinal()))])
        }
        ContractCall::RegisterCandidate { name, address } => {
            encode_call(signature, &[Token::String(name), Token::Address(address)])
        }
        ContractCall::Vote { index } => encode_call(signature, &[Token::Uint(u128::from(index.0))]),
        ContractCall::FundCandidates | ContractCall::Withdraw => encode_call(signature, &[]),
    }
}

/// Reader over ABI-encoded return data.
struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> ChainResult<Self> {
        if data.is_empty() {
            return Err(ChainError::decode("empty return data"));
        }
        Ok(Self { data })
    }

    fn word_at(&self, offset: usize) -> ChainResult<&'a [u8]> {
        self.data
            .get(offset..offset + WORD)
            .ok_or_else(|| ChainError::decode(format!("return data too short at byte {offset}")))
    }

    fn uint_at(&self, offset: usize, bits: u32) -> ChainResult<u128> {
        let word = self.word_at(offset)?;
        let (high, low) = word.split_at(WORD - 16);
        if high.iter().any(|b| *b != 0) {
            return Err(ChainError::decode(format!(
                "value at byte {offset} exceeds {bits} bits"
            )));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(low);
        let value = u128::from_be_bytes(buf);
        if bits < 128 && value >> bits != 0 {
            return Err(ChainError::decode(format!(
                "value at byte {offset} exceeds {bits} bits"
            )));
        }
        Ok(value)
    }

    fn uint(&self, slot: usize, bits: u32) -> ChainResult<u128> {
        self.uint_at(slot * WORD, bits)
    }

    fn address(&self, slot: usize) -> ChainResult<Address> {
        let word = self.word_at(slot * WORD)?;
        let (padding, raw) = word.split_at(WORD - Address::LEN);
        if padding.iter().any(|b| *b != 0) {
            return Err(ChainError::decode(format!("slot {slot} is not an address")));
        }
        let mut bytes = [0u8; Address::LEN];
        bytes.copy_from_slice(raw);
        Ok(Address(bytes))
    }

    fn string(&self, slot: usize) -> ChainResult<String> {
        let offset = self.uint(slot, 32)? as usize;
        let len = self.uint_at(offset, 32)? as usize;
        let start = offset + WORD;
        let bytes = self
            .data
            .get(start..start + len)
            .ok_or_else(|| ChainError::decode("string runs past end of return data"))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ChainError::decode(format!("string is not utf-8: {err}")))
    }
}

pub fn decode_workflow_status(data: &[u8]) -> ChainResult<u8> {
    let value = Decoder::new(data)?.uint(0, 8)?;
    Ok(value as u8)
}

/// `getCandidate(uint256) returns (string, uint256, address)`
pub fn decode_candidate(data: &[u8]) -> ChainResult<CandidateRecord> {
    let decoder = Decoder::new(data)?;
    Ok(CandidateRecord {
        name: decoder.string(0)?,
        vote_count: decoder.uint(1, 64)? as u64,
        address: decoder.address(2)?,
    })
}

/// `getWinner() returns (string, uint256)`
pub fn decode_winner(data: &[u8]) -> ChainResult<Winner> {
    let decoder = Decoder::new(data)?;
    Ok(Winner {
        name: decoder.string(0)?,
        vote_count: decoder.uint(1, 64)? as u64,
    })
}

/// Extracts the message of an `Error(string)` revert, if that is what `data` holds.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    Decoder::new(payload).ok()?.string(0).ok()
}

pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn from_hex(raw: &str) -> ChainResult<Vec<u8>> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|err| ChainError::decode(format!("invalid hex data: {err}")))
}
