//! Content addressed node stores that a proof can be constructed from.
//!
//! A store holds node RLP keyed by the keccak256 hash of that RLP. For the lifetime of a
//! snapshot the same hash always resolves to the same bytes, so proofs built from one
//! snapshot are deterministic.
use std::{collections::HashMap, sync::Arc};

use eth_trie::{MemoryDB, DB};
use ethers::{types::H256, utils::keccak256};
use rlp::NULL_RLP;
use thiserror::Error;

use crate::{
    account::EMPTY_TRIE_ROOT,
    node::NodeRef,
    utils::hex_encode,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backing database error: {0}")]
    Database(String),
    #[error("Node with hash {computed} does not match root {expected}")]
    RootMismatch { expected: String, computed: String },
}

/// Read access to the nodes of a single trie root.
pub trait NodeSource {
    /// Reference to the root node of the trie.
    fn root_reference(&self) -> NodeRef;
    /// Node RLP for the given node hash, if the store has it.
    fn node_by_hash(&self, hash: &H256) -> Result<Option<Vec<u8>>, StoreError>;
    /// Resolves a reference to raw node RLP.
    ///
    /// Inline references carry their node and the empty reference is the empty node, neither
    /// touch the store. The empty trie root resolves without a lookup.
    fn dereference(&self, reference: &NodeRef) -> Result<Option<Vec<u8>>, StoreError> {
        match reference {
            NodeRef::Empty => Ok(Some(NULL_RLP.to_vec())),
            NodeRef::Inline(raw) => Ok(Some(raw.clone())),
            NodeRef::Hash(hash) if *hash == EMPTY_TRIE_ROOT => Ok(Some(NULL_RLP.to_vec())),
            NodeRef::Hash(hash) => self.node_by_hash(hash),
        }
    }
}

/// A fixed root over an `eth_trie` in-memory database.
///
/// The database must not discard nodes of old roots (non-light mode) for a snapshot to
/// remain readable after the trie it was taken from moves on.
#[derive(Clone)]
pub struct TrieSnapshot {
    db: Arc<MemoryDB>,
    root: H256,
}

impl TrieSnapshot {
    pub fn new(db: Arc<MemoryDB>, root: H256) -> Self {
        Self { db, root }
    }
    pub fn root(&self) -> H256 {
        self.root
    }
}

impl NodeSource for TrieSnapshot {
    fn root_reference(&self) -> NodeRef {
        NodeRef::Hash(self.root)
    }
    fn node_by_hash(&self, hash: &H256) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(hash.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

/// Nodes held in a map, e.g., collected from proofs.
#[derive(Clone, Debug, Default)]
pub struct MemoryNodes {
    root: H256,
    /// node_hash -> node_rlp
    data: HashMap<H256, Vec<u8>>,
}

impl MemoryNodes {
    /// Create a new store with a known root.
    pub fn init(root: H256) -> Self {
        Self {
            root,
            data: HashMap::default(),
        }
    }
    /// Add a single node, keyed by its hash.
    pub fn insert_node(&mut self, node: Vec<u8>) -> H256 {
        let hash: H256 = keccak256(&node).into();
        self.data.insert(hash, node);
        hash
    }
    /// Add the nodes of a root-first proof.
    ///
    /// If the store has no root, the root is obtained from the proof.
    pub fn insert_proof(&mut self, proof: Vec<Vec<u8>>) -> Result<(), StoreError> {
        for (index, node) in proof.into_iter().enumerate() {
            let hash = self.insert_node(node);
            if index == 0 && self.root == H256::default() {
                self.root = hash;
            }
            if index == 0 && hash != self.root {
                return Err(StoreError::RootMismatch {
                    expected: hex_encode(self.root),
                    computed: hex_encode(hash),
                });
            }
        }
        Ok(())
    }
    pub fn root(&self) -> H256 {
        self.root
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl NodeSource for MemoryNodes {
    fn root_reference(&self) -> NodeRef {
        NodeRef::Hash(self.root)
    }
    fn node_by_hash(&self, hash: &H256) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(hash).cloned())
    }
}
