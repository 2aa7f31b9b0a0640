//! For Recursive Length Prefix encoding/decoding of trie values.
//!
//! Storage slot values are stored as rlp(U256). Accounts are stored as rlp(Account).

use ethers::types::U256;
use thiserror::Error;

use crate::{
    account::Account,
    node::{NodeError, TrieNode},
};

#[derive(Debug, Error)]
pub enum RlpValueError {
    #[error("RLP decode error {0}")]
    DecodeError(#[from] rlp::DecoderError),
    #[error("NodeError {0}")]
    NodeError(#[from] NodeError),
    #[error("Expected a leaf node, got {0}")]
    NotALeaf(String),
}

/// Encodes a storage value for storage in a trie.
pub fn encode_storage_value(value: U256) -> Vec<u8> {
    rlp::encode(&value).to_vec()
}

/// Decodes a storage value. An empty value (absent slot) is zero.
pub fn decode_storage_value(value: &[u8]) -> Result<U256, RlpValueError> {
    if value.is_empty() {
        return Ok(U256::zero());
    }
    Ok(rlp::decode(value)?)
}

pub fn encode_account(account: &Account) -> Vec<u8> {
    rlp::encode(account).to_vec()
}

pub fn decode_account(value: &[u8]) -> Result<Account, RlpValueError> {
    Ok(rlp::decode(value)?)
}

/// Value held in a leaf node.
fn leaf_value(leaf_rlp: &[u8]) -> Result<Vec<u8>, RlpValueError> {
    match TrieNode::decode(leaf_rlp)? {
        TrieNode::Leaf { value, .. } => Ok(value),
        other => Err(RlpValueError::NotALeaf(other.kind().to_string())),
    }
}

/// Decodes the final node of an account proof and returns an account object.
///
/// The node comprises: rlp(path, rlp(account))
pub fn decode_account_leaf(leaf_rlp: &[u8]) -> Result<Account, RlpValueError> {
    decode_account(&leaf_value(leaf_rlp)?)
}
