//! For following a key from the root of a trie toward its leaf.
//!
//! The nodes visited along the way form the simple proof for the key. The walk also
//! records why it stopped, which decides whether a neighbor node is needed to prove
//! the key absent (or to delete it).
use log::trace;

use crate::{
    node::{BranchNode, NodeRef, TrieNode, BRANCH_VALUE_SLOT},
    path::{NibblePath, PathNature},
    proof::ProofError,
    store::NodeSource,
    utils::hex_encode,
};

/// The branch node at which a key could not be followed further (or, for a key that is
/// present, the branch that its terminal node hangs from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceRecord {
    pub node: BranchNode,
    /// Number of key nibbles consumed before reaching the branch.
    pub nibbles_passed: usize,
    /// Slot of the branch that the key selects. 16 when the key ends at the branch.
    pub nibble: usize,
}

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Key is present. The parent branch is recorded if the terminal node hangs directly
    /// from one, a verifier removing the key may need to collapse that branch.
    Found {
        value: Vec<u8>,
        parent: Option<DivergenceRecord>,
    },
    /// Key is absent, the branch slot for the next nibble is empty.
    AbsentAtBranch(DivergenceRecord),
    /// Key is absent, a leaf or extension path diverges from the key (or the trie is empty).
    AbsentAtPathMismatch,
}

impl WalkOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, WalkOutcome::Found { .. })
    }
    /// The branch that the divergence resolver inspects, if any.
    pub fn divergence(&self) -> Option<&DivergenceRecord> {
        match self {
            WalkOutcome::Found { parent, .. } => parent.as_ref(),
            WalkOutcome::AbsentAtBranch(record) => Some(record),
            WalkOutcome::AbsentAtPathMismatch => None,
        }
    }
}

/// Nodes visited while following a key, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    pub proof: Vec<Vec<u8>>,
    pub outcome: WalkOutcome,
}

/// Reads the node behind a reference, failing if the store does not have it.
pub(crate) fn load_node<S: NodeSource + ?Sized>(
    source: &S,
    reference: &NodeRef,
    depth: usize,
) -> Result<(Vec<u8>, TrieNode), ProofError> {
    let raw = source
        .dereference(reference)?
        .ok_or_else(|| ProofError::NodeNotFound {
            hash: match reference {
                NodeRef::Hash(hash) => hex_encode(hash),
                NodeRef::Inline(raw) => hex_encode(raw),
                NodeRef::Empty => String::from("empty"),
            },
        })?;
    let node =
        TrieNode::decode(&raw).map_err(|source| ProofError::MalformedNode { depth, source })?;
    Ok((raw, node))
}

/// Follow the key from the root of the source, collecting each node visited.
///
/// Read only. Every node is obtained from the source, which must present a stable view
/// of the trie for the duration of the walk. The divergence resolver walks from the same
/// root, so a record always describes the trie its neighbor is taken from.
pub fn walk<S: NodeSource + ?Sized>(source: &S, key: &[u8]) -> Result<Walk, ProofError> {
    let mut traversal = NibblePath::init(key);
    let mut next_node = source.root_reference();
    let mut proof: Vec<Vec<u8>> = vec![];
    // Branch that the next node hangs from.
    let mut parent: Option<DivergenceRecord> = None;
    // Start at root, follow path toward leaves.
    loop {
        let depth = proof.len();
        let (raw, node) = load_node(source, &next_node, depth)?;
        trace!(
            "walk depth {depth}: {} node, {} nibbles passed",
            node.kind(),
            traversal.visiting_index()
        );
        proof.push(raw);
        let outcome = match node {
            TrieNode::Empty => WalkOutcome::AbsentAtPathMismatch,
            TrieNode::Branch(branch) => {
                let nibbles_passed = traversal.visiting_index();
                let Some(nibble) = traversal.peek_path_nibble() else {
                    // Key ends at this branch, only the value slot can hold it.
                    let value = branch.value.clone();
                    let record = DivergenceRecord {
                        node: branch,
                        nibbles_passed,
                        nibble: BRANCH_VALUE_SLOT,
                    };
                    let outcome = match value {
                        Some(value) => WalkOutcome::Found {
                            value,
                            parent: Some(record),
                        },
                        None => WalkOutcome::AbsentAtBranch(record),
                    };
                    return Ok(Walk { proof, outcome });
                };
                let nibble = nibble as usize;
                let child = branch.child(nibble).cloned().unwrap_or(NodeRef::Empty);
                let record = DivergenceRecord {
                    node: branch,
                    nibbles_passed,
                    nibble,
                };
                if child.is_empty() {
                    WalkOutcome::AbsentAtBranch(record)
                } else {
                    traversal.visit_path_nibble()?;
                    parent = Some(record);
                    next_node = child;
                    continue;
                }
            }
            TrieNode::Extension { path, child } => match traversal.match_or_mismatch(&path) {
                PathNature::SubPathMatches | PathNature::FullPathMatches => {
                    traversal.skip(path.len())?;
                    // An extension always leads to a branch, never to a terminal node.
                    parent = None;
                    next_node = child;
                    continue;
                }
                PathNature::Diverges(_) => WalkOutcome::AbsentAtPathMismatch,
            },
            TrieNode::Leaf { path, value, .. } => match traversal.match_or_mismatch(&path) {
                PathNature::FullPathMatches => WalkOutcome::Found {
                    value,
                    parent: parent.take(),
                },
                PathNature::SubPathMatches => {
                    return Err(ProofError::LeafPathIncomplete {
                        reached: traversal.visiting_index() + path.len(),
                        expected: traversal.len(),
                    })
                }
                PathNature::Diverges(_) => WalkOutcome::AbsentAtPathMismatch,
            },
        };
        return Ok(Walk { proof, outcome });
    }
}
