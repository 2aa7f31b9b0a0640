//! Construction of Merkle PATRICIA Trie proofs that a verifier can use to confirm or deny
//! that a key is in a trie, and to recompute the root after the key is updated or removed.
pub mod account;
pub mod divergence;
pub mod encode;
pub mod node;
pub mod path;
pub mod proof;
pub mod rlp;
pub mod store;
pub mod trie;
pub mod utils;
pub mod walk;
