//! For constructing the proof of a single key.
//!
//! The walk collects the nodes from the root toward the key. If the walk stops at (or
//! finds the key directly below) a branch, the divergence resolver may add the lone
//! sibling's node. The result is then encoded. Nothing is returned unless every step
//! succeeds.
use thiserror::Error;

use crate::{
    divergence::resolve_neighbor,
    encode::{encode, EncodedProof, EncodingError},
    node::NodeError,
    path::{to_nibbles, PathError},
    store::{NodeSource, StoreError},
    walk::{walk, WalkOutcome},
};

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("Unable to retrieve node using node hash {hash}")]
    NodeNotFound { hash: String },
    #[error("Node at depth {depth} is malformed: {source}")]
    MalformedNode { depth: usize, source: NodeError },
    #[error("Leaf matched at nibble {reached} but the key has {expected} nibbles")]
    LeafPathIncomplete { reached: usize, expected: usize },
    #[error("StoreError {0}")]
    Store(#[from] StoreError),
    #[error("EncodingError {0}")]
    Encoding(#[from] EncodingError),
    #[error("PathError {0}")]
    PathError(#[from] PathError),
}

/// A proof for a key together with what the walk found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProof {
    pub encoded: EncodedProof,
    pub outcome: WalkOutcome,
}

impl KeyProof {
    /// The value stored under the key, if present.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.outcome {
            WalkOutcome::Found { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Proof bytes for the key against the root of the source.
pub fn prove<S: NodeSource + ?Sized>(source: &S, key: &[u8]) -> Result<EncodedProof, ProofError> {
    Ok(build_proof(source, key)?.encoded)
}

/// Proof bytes for the key, with the walk outcome.
pub fn build_proof<S: NodeSource + ?Sized>(
    source: &S,
    key: &[u8],
) -> Result<KeyProof, ProofError> {
    let walk = walk(source, key)?;
    let neighbor = match walk.outcome.divergence() {
        Some(record) => resolve_neighbor(source, &to_nibbles(key), record)?,
        None => None,
    };
    let encoded = encode(&walk.proof, neighbor.as_deref())?;
    Ok(KeyProof {
        encoded,
        outcome: walk.outcome,
    })
}
