//! For finding the neighbor node that a verifier needs alongside a divergent branch.
//!
//! When a key stops at a branch, a verifier can only conclude what the branch looks like
//! without the key (absence) or after removing the key (deletion) if it can see the lone
//! remaining child. If the branch has exactly one other populated slot and that child is
//! referenced by hash, the child's node is fetched and attached to the proof.
use log::debug;

use crate::{
    node::{NodeRef, TrieNode, BRANCH_VALUE_SLOT},
    path::{pad_to_bytes, NibblePath, PathError, PathNature},
    proof::ProofError,
    store::NodeSource,
    walk::{load_node, DivergenceRecord},
};

/// Returns the node of the lone sibling of the key at the divergent branch.
///
/// `key_nibbles` are the nibbles of the key that produced the record. No node is returned
/// when the branch has zero or several other populated slots, when the only other slot is
/// the branch value, or when the sibling is embedded in the branch.
pub fn resolve_neighbor<S: NodeSource + ?Sized>(
    source: &S,
    key_nibbles: &[u8],
    record: &DivergenceRecord,
) -> Result<Option<Vec<u8>>, ProofError> {
    let others: Vec<usize> = record
        .node
        .populated_slots()
        .filter(|slot| *slot != record.nibble)
        .collect();
    let sibling = match others.as_slice() {
        [sibling] => *sibling,
        _ => {
            debug!(
                "Ambiguous divergence at nibble {} ({} nibbles passed): {} other populated slots, no neighbor attached",
                record.nibble,
                record.nibbles_passed,
                others.len()
            );
            return Ok(None);
        }
    };
    if sibling == BRANCH_VALUE_SLOT {
        debug!("Only other populated slot is the branch value, no neighbor attached");
        return Ok(None);
    }
    if !matches!(record.node.child(sibling), Some(NodeRef::Hash(_))) {
        debug!("Sibling at nibble {sibling} is embedded in the branch, no neighbor attached");
        return Ok(None);
    }
    // Sibling key: the nibbles that led to the branch, then the sibling nibble.
    let history = key_nibbles
        .get(..record.nibbles_passed)
        .ok_or(PathError::NextNodeNotInPath)?;
    let mut sibling_nibbles = history.to_vec();
    sibling_nibbles.push(sibling as u8);
    let sibling_key = pad_to_bytes(&sibling_nibbles)?;
    let neighbor = terminal_node(source, &sibling_key, sibling_nibbles.len())?;
    debug!(
        "Attached neighbor at nibble {sibling} for divergence at nibble {} ({} nibbles passed)",
        record.nibble, record.nibbles_passed
    );
    Ok(Some(neighbor))
}

/// Follows a key from the root and returns the last node on its path.
///
/// Only the first `follow` nibbles are followed, the remainder is padding. Unlike a proof
/// walk, reaching an empty slot or a diverging path is not an outcome, the walk just ends
/// at the node it is on.
fn terminal_node<S: NodeSource + ?Sized>(
    source: &S,
    key: &[u8],
    follow: usize,
) -> Result<Vec<u8>, ProofError> {
    let mut traversal = NibblePath::init(key);
    let mut next_node = source.root_reference();
    let mut depth = 0;
    loop {
        let (raw, node) = load_node(source, &next_node, depth)?;
        depth += 1;
        let next = match node {
            TrieNode::Branch(branch) if traversal.visiting_index() < follow => {
                let nibble = traversal.visit_path_nibble()? as usize;
                branch.child(nibble).filter(|child| !child.is_empty()).cloned()
            }
            TrieNode::Extension { path, child }
                if traversal.visiting_index() + path.len() <= follow =>
            {
                match traversal.match_or_mismatch(&path) {
                    PathNature::SubPathMatches | PathNature::FullPathMatches => {
                        traversal.skip(path.len())?;
                        Some(child)
                    }
                    PathNature::Diverges(_) => None,
                }
            }
            _ => None,
        };
        match next {
            Some(reference) => next_node = reference,
            None => return Ok(raw),
        }
    }
}
