//! For processing a node in a Merkle PATRICIA Trie.
//!
//! A node is an RLP list of 2 items (leaf or extension, told apart by the hex prefix of the
//! path) or 17 items (branch). The empty node is the RLP empty string.
//!
//! Nodes refer to their children either by the keccak hash of the child (32 bytes) or, when
//! the child encodes to fewer than 32 bytes, by embedding the child's RLP list directly.
use std::fmt::Display;

use ethers::{types::H256, utils::keccak256};
use rlp::{Rlp, RlpStream};
use thiserror::Error;

use crate::path::{
    nibbles_to_prefixed_bytes, prefixed_bytes_to_nibbles, PathError, PrefixEncoding,
    TargetNodeEncoding,
};

/// Length at or above which a node is referenced by hash rather than embedded in its parent.
pub const HASH_REFERENCE_LENGTH: usize = 32;

/// Number of nibble-indexed children of a branch node. The value occupies slot 16.
pub const BRANCH_CHILDREN: usize = 16;

/// Slot index of the branch node value.
pub const BRANCH_VALUE_SLOT: usize = 16;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum NodeError {
    #[error("RLP decode error {0}")]
    DecodeError(#[from] rlp::DecoderError),
    #[error("Merkle Patricia Node to have 2 or 17 items, got {0}")]
    InvalidNodeItemCount(usize),
    #[error("Node item expected to be a 32 byte hash or an embedded node, got {0} bytes")]
    InvalidReferenceLength(usize),
    #[error("Embedded node expected to be shorter than 32 bytes, got {0} bytes")]
    EmbeddedNodeTooLong(usize),
    #[error("Extension node has no next node")]
    ExtensionNodeNoNextNode,
    #[error("Leaf node value expected to be a byte string")]
    LeafValueNotData,
    #[error("Branch node value expected to be a byte string")]
    BranchValueNotData,
    #[error("Node expected to be a list or the empty string")]
    NotANode,
    #[error("Trie path error {0}")]
    PathError(#[from] PathError),
}

/// How a node points at one of its children.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// No child.
    #[default]
    Empty,
    /// Child node RLP embedded in the parent (shorter than 32 bytes).
    Inline(Vec<u8>),
    /// keccak256 of the child node RLP, which lives in the backing store.
    Hash(H256),
}

impl NodeRef {
    /// Reads a child reference from an item of a node.
    fn from_rlp(item: &Rlp) -> Result<Self, NodeError> {
        if item.is_list() {
            let raw = item.as_raw();
            if raw.len() >= HASH_REFERENCE_LENGTH {
                return Err(NodeError::EmbeddedNodeTooLong(raw.len()));
            }
            return Ok(NodeRef::Inline(raw.to_vec()));
        }
        let data = item.data()?;
        match data.len() {
            0 => Ok(NodeRef::Empty),
            32 => Ok(NodeRef::Hash(H256::from_slice(data))),
            len => Err(NodeError::InvalidReferenceLength(len)),
        }
    }
    /// How a parent would refer to a node with this RLP encoding.
    pub fn for_encoded(node_rlp: &[u8]) -> Self {
        if node_rlp.len() < HASH_REFERENCE_LENGTH {
            NodeRef::Inline(node_rlp.to_vec())
        } else {
            NodeRef::Hash(keccak256(node_rlp).into())
        }
    }
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }
    fn append_to(&self, stream: &mut RlpStream) {
        match self {
            NodeRef::Empty => {
                stream.append_empty_data();
            }
            NodeRef::Inline(raw) => {
                stream.append_raw(raw, 1);
            }
            NodeRef::Hash(hash) => {
                stream.append(&hash.as_bytes().to_vec());
            }
        }
    }
}

/// A branch node: 16 nibble-indexed children plus an optional value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub children: Box<[NodeRef; BRANCH_CHILDREN]>,
    pub value: Option<Vec<u8>>,
}

impl BranchNode {
    /// Whether slot 0-15 holds a child, or slot 16 holds a value.
    pub fn slot_is_populated(&self, slot: usize) -> bool {
        match slot {
            BRANCH_VALUE_SLOT => self.value.is_some(),
            child => self
                .children
                .get(child)
                .map(|reference| !reference.is_empty())
                .unwrap_or(false),
        }
    }
    /// The child reference at a nibble index. Slot 16 (or beyond) has no child.
    pub fn child(&self, nibble: usize) -> Option<&NodeRef> {
        self.children.get(nibble)
    }
    /// Populated slots (0-16), in ascending order.
    pub fn populated_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..=BRANCH_VALUE_SLOT).filter(|slot| self.slot_is_populated(*slot))
    }
}

/// A node as seen while walking from the root towards a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    Empty,
    Leaf {
        path: Vec<u8>,
        remaining_path_is_odd: bool,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: NodeRef,
    },
    Branch(BranchNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Empty,
    Branch,
    Extension,
    Leaf,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Empty => "empty",
            NodeKind::Branch => "branch",
            NodeKind::Extension => "extension",
            NodeKind::Leaf => "leaf",
        };
        write!(f, "{name}")
    }
}

impl TrieNode {
    /// Decodes raw node RLP into one of the four node shapes.
    pub fn decode(raw: &[u8]) -> Result<Self, NodeError> {
        if raw.is_empty() {
            return Ok(TrieNode::Empty);
        }
        let rlp = Rlp::new(raw);
        if !rlp.is_list() {
            // The empty node is the empty string (0x80). Anything else is not a node.
            if rlp.is_empty() {
                return Ok(TrieNode::Empty);
            }
            return Err(NodeError::NotANode);
        }
        match rlp.item_count()? {
            17 => {
                let mut children = Vec::with_capacity(BRANCH_CHILDREN);
                for index in 0..BRANCH_CHILDREN {
                    children.push(NodeRef::from_rlp(&rlp.at(index)?)?);
                }
                let children: [NodeRef; BRANCH_CHILDREN] = children
                    .try_into()
                    .map_err(|_| NodeError::InvalidNodeItemCount(17))?;
                let value_item = rlp.at(BRANCH_VALUE_SLOT)?;
                if value_item.is_list() {
                    return Err(NodeError::BranchValueNotData);
                }
                let value = value_item.data()?;
                Ok(TrieNode::Branch(BranchNode {
                    children: Box::new(children),
                    value: (!value.is_empty()).then(|| value.to_vec()),
                }))
            }
            2 => {
                let encoded_path = rlp.at(0)?.data()?;
                let encoding = PrefixEncoding::try_from(encoded_path)?;
                let path = prefixed_bytes_to_nibbles(encoded_path)?;
                let second = rlp.at(1)?;
                if encoding.is_leaf() {
                    if second.is_list() {
                        return Err(NodeError::LeafValueNotData);
                    }
                    Ok(TrieNode::Leaf {
                        path,
                        remaining_path_is_odd: encoding.is_odd(),
                        value: second.data()?.to_vec(),
                    })
                } else {
                    let child = NodeRef::from_rlp(&second)?;
                    if child.is_empty() {
                        return Err(NodeError::ExtensionNodeNoNextNode);
                    }
                    Ok(TrieNode::Extension { path, child })
                }
            }
            num => Err(NodeError::InvalidNodeItemCount(num)),
        }
    }
    /// Encodes the node as RLP, the inverse of [TrieNode::decode].
    pub fn encode(&self) -> Result<Vec<u8>, NodeError> {
        let rlp = match self {
            TrieNode::Empty => {
                let mut stream = RlpStream::new();
                stream.append_empty_data();
                stream
            }
            TrieNode::Leaf { path, value, .. } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&nibbles_to_prefixed_bytes(path, TargetNodeEncoding::Leaf)?);
                stream.append(value);
                stream
            }
            TrieNode::Extension { path, child } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&nibbles_to_prefixed_bytes(
                    path,
                    TargetNodeEncoding::Extension,
                )?);
                child.append_to(&mut stream);
                stream
            }
            TrieNode::Branch(branch) => {
                let mut stream = RlpStream::new_list(17);
                for child in branch.children.iter() {
                    child.append_to(&mut stream);
                }
                match &branch.value {
                    Some(value) => stream.append(value),
                    None => stream.append_empty_data(),
                };
                stream
            }
        };
        Ok(rlp.out().to_vec())
    }
    pub fn kind(&self) -> NodeKind {
        match self {
            TrieNode::Empty => NodeKind::Empty,
            TrieNode::Leaf { .. } => NodeKind::Leaf,
            TrieNode::Extension { .. } => NodeKind::Extension,
            TrieNode::Branch(_) => NodeKind::Branch,
        }
    }
}
