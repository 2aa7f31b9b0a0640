//! Reference verifier for encoded proofs.
//!
//! Loads the nodes of a proof into an empty content addressed database. Reads, inserts and
//! updates open an `eth_trie` at the claimed root. Anything the verifier needs beyond the
//! proof is missing from that database, so an insufficient proof fails rather than reading
//! real trie state.
//!
//! Removals do not go through `eth_trie`. When a branch collapses into a lone extension,
//! `eth_trie` also loads the extension's child to see whether it can merge further. An
//! extension always points at a branch, so a verifier only needs the extension itself,
//! and that is all a proof carries. Removal is therefore applied here over the proof nodes,
//! collapsing branches with nothing more than the lone child's node.
#![allow(dead_code)]
use std::{collections::HashMap, sync::Arc};

use eth_trie::{EthTrie, MemoryDB, Trie, DB};
use ethers::{types::H256, utils::keccak256};
use rand::{rngs::StdRng, Rng, SeedableRng};
use trieproof::{
    account::EMPTY_TRIE_ROOT,
    encode::EncodedProof,
    node::{NodeRef, TrieNode, BRANCH_VALUE_SLOT},
    path::to_nibbles,
};

/// Outcome of verifying a key against a root with a proof.
#[derive(Debug, PartialEq, Eq)]
pub struct Verification {
    /// The proof was sufficient to reach a conclusion.
    pub success: bool,
    pub value: Option<Vec<u8>>,
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open(root: H256, proof: &EncodedProof) -> anyhow::Result<Option<EthTrie<MemoryDB>>> {
    let db = Arc::new(MemoryDB::new(false));
    for node in proof.nodes()? {
        db.insert(&keccak256(&node), node)?;
    }
    if root == EMPTY_TRIE_ROOT {
        return Ok(Some(EthTrie::new(db)));
    }
    Ok(EthTrie::from(db, root.to_fixed_bytes().into()).ok())
}

/// Reads the key from a trie made of the proof nodes only.
pub fn verify_proof(root: H256, key: &[u8], proof: &EncodedProof) -> anyhow::Result<Verification> {
    let Some(trie) = open(root, proof)? else {
        return Ok(Verification {
            success: false,
            value: None,
        });
    };
    Ok(match trie.get(key) {
        Ok(value) => Verification {
            success: true,
            value,
        },
        Err(_) => Verification {
            success: false,
            value: None,
        },
    })
}

/// Applies an update (empty value removes the key) to a trie made of the proof nodes only
/// and returns the new root, or None if the proof was insufficient.
pub fn update_root(
    root: H256,
    key: &[u8],
    value: &[u8],
    proof: &EncodedProof,
) -> anyhow::Result<Option<H256>> {
    if value.is_empty() {
        return remove_root(root, key, proof);
    }
    let Some(mut trie) = open(root, proof)? else {
        return Ok(None);
    };
    if trie.insert(key, value).is_err() {
        return Ok(None);
    }
    Ok(trie
        .root_hash()
        .ok()
        .map(|hash| H256::from_slice(hash.as_bytes())))
}

/// Removes the key from a trie made of the proof nodes only and returns the new root, or
/// None if the proof was insufficient.
pub fn remove_root(root: H256, key: &[u8], proof: &EncodedProof) -> anyhow::Result<Option<H256>> {
    let nodes: HashMap<H256, Vec<u8>> = proof
        .nodes()?
        .into_iter()
        .map(|node| (H256::from(keccak256(&node)), node))
        .collect();
    let Some(root_node) = load(&nodes, &NodeRef::Hash(root))? else {
        return Ok(None);
    };
    let Some(updated) = remove_from(&nodes, root_node, &to_nibbles(key))? else {
        return Ok(None);
    };
    Ok(Some(match updated {
        TrieNode::Empty => EMPTY_TRIE_ROOT,
        node => H256::from(keccak256(node.encode()?)),
    }))
}

/// Node behind a reference, None if the proof does not hold it.
fn load(nodes: &HashMap<H256, Vec<u8>>, reference: &NodeRef) -> anyhow::Result<Option<TrieNode>> {
    Ok(match reference {
        NodeRef::Empty => Some(TrieNode::Empty),
        NodeRef::Hash(hash) if *hash == EMPTY_TRIE_ROOT => Some(TrieNode::Empty),
        NodeRef::Inline(raw) => Some(TrieNode::decode(raw)?),
        NodeRef::Hash(hash) => match nodes.get(hash) {
            Some(raw) => Some(TrieNode::decode(raw)?),
            None => None,
        },
    })
}

fn reference_to(node: &TrieNode) -> anyhow::Result<NodeRef> {
    Ok(match node {
        TrieNode::Empty => NodeRef::Empty,
        node => NodeRef::for_encoded(&node.encode()?),
    })
}

fn leaf(path: Vec<u8>, value: Vec<u8>) -> TrieNode {
    TrieNode::Leaf {
        remaining_path_is_odd: path.len() % 2 == 1,
        path,
        value,
    }
}

/// Node that replaces `node` once the key (remaining nibbles) is removed below it.
fn remove_from(
    nodes: &HashMap<H256, Vec<u8>>,
    node: TrieNode,
    key: &[u8],
) -> anyhow::Result<Option<TrieNode>> {
    match node {
        TrieNode::Empty => Ok(Some(TrieNode::Empty)),
        TrieNode::Leaf { ref path, .. } if path.as_slice() == key => Ok(Some(TrieNode::Empty)),
        TrieNode::Leaf { .. } => Ok(Some(node)),
        TrieNode::Extension { ref path, ref child } if key.starts_with(path) => {
            let Some(child_node) = load(nodes, child)? else {
                return Ok(None);
            };
            let Some(updated) = remove_from(nodes, child_node, &key[path.len()..])? else {
                return Ok(None);
            };
            Ok(Some(join(path.clone(), updated)?))
        }
        TrieNode::Extension { .. } => Ok(Some(node)),
        TrieNode::Branch(mut branch) => {
            match key.split_first() {
                None => branch.value = None,
                Some((nibble, rest)) => {
                    let slot = *nibble as usize;
                    let Some(child_node) = load(nodes, &branch.children[slot])? else {
                        return Ok(None);
                    };
                    let Some(updated) = remove_from(nodes, child_node, rest)? else {
                        return Ok(None);
                    };
                    branch.children[slot] = reference_to(&updated)?;
                }
            }
            let populated: Vec<usize> = branch.populated_slots().collect();
            match populated.as_slice() {
                [] => Ok(Some(TrieNode::Empty)),
                [slot] if *slot == BRANCH_VALUE_SLOT => {
                    Ok(Some(leaf(vec![], branch.value.unwrap_or_default())))
                }
                [slot] => {
                    // Collapse into the lone child, which must be in the proof.
                    let Some(child_node) = load(nodes, &branch.children[*slot])? else {
                        return Ok(None);
                    };
                    Ok(Some(join(vec![*slot as u8], child_node)?))
                }
                _ => Ok(Some(TrieNode::Branch(branch))),
            }
        }
    }
}

/// Node for `prefix` nibbles followed by `node`, merging paths where node shapes allow.
fn join(prefix: Vec<u8>, node: TrieNode) -> anyhow::Result<TrieNode> {
    Ok(match node {
        TrieNode::Empty => TrieNode::Empty,
        TrieNode::Leaf { path, value, .. } => leaf([prefix, path].concat(), value),
        TrieNode::Extension { path, child } => TrieNode::Extension {
            path: [prefix, path].concat(),
            child,
        },
        branch @ TrieNode::Branch(_) => TrieNode::Extension {
            path: prefix,
            child: reference_to(&branch)?,
        },
    })
}

/// Key of 64 nibbles: `prefix` (hex), then `fill` up to the full length.
pub fn key_of(prefix: &str, fill: char) -> Vec<u8> {
    let mut hex_key = prefix.to_string();
    while hex_key.len() < 64 {
        hex_key.push(fill);
    }
    hex::decode(hex_key).unwrap()
}

/// `count` repetitions of a two byte pattern.
pub fn repeated(pattern: [u8; 2], count: usize) -> Vec<u8> {
    pattern.repeat(count)
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random 32 byte keys with values of random length.
///
/// Half of the keys copy a prefix of an earlier key, producing extensions, deep branches
/// and leaves short enough to be embedded in their parent.
pub fn random_pairs(rng: &mut StdRng, count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![];
    for _ in 0..count {
        let mut key: [u8; 32] = rng.gen();
        if !pairs.is_empty() && rng.gen_bool(0.5) {
            let (earlier, _) = &pairs[rng.gen_range(0..pairs.len())];
            let shared = rng.gen_range(1..32);
            key[..shared].copy_from_slice(&earlier[..shared]);
        }
        let len = match rng.gen_bool(0.3) {
            true => rng.gen_range(1..4),
            false => rng.gen_range(1..80),
        };
        let value: Vec<u8> = (0..len).map(|_| rng.gen_range(1..=255)).collect();
        pairs.push((key.to_vec(), value));
    }
    pairs
}
