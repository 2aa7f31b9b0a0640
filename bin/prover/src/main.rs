use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Write},
};

use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use trieproof::{
    proof::KeyProof,
    trie::ProofTrie,
    utils::{hex_decode, hex_encode},
    walk::WalkOutcome,
};

use crate::cli::{AppArgs, OutputKind};

mod cli;

/// Summary of a proof, written as JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofReport {
    root: String,
    key: String,
    outcome: &'static str,
    value: Option<String>,
    divergent_neighbor: bool,
    proof: String,
}

impl ProofReport {
    fn new(root: String, key: String, proof: &KeyProof) -> Self {
        let outcome = match proof.outcome {
            WalkOutcome::Found { .. } => "found",
            WalkOutcome::AbsentAtBranch(_) => "absentAtBranch",
            WalkOutcome::AbsentAtPathMismatch => "absentAtPathMismatch",
        };
        Self {
            root,
            key,
            outcome,
            value: proof.value().map(hex_encode),
            divergent_neighbor: proof.encoded.has_divergent_neighbor(),
            proof: proof.encoded.to_hex(),
        }
    }
}

/// Create a proof for a key.
///
/// Reads key/value pairs, inserts them into a trie and proves the requested key against
/// the resulting root. The proof is either a proof of the value, or a proof that the key
/// is absent.
fn main() -> Result<()> {
    env_logger::init();

    let args = AppArgs::parse();

    let pairs: BTreeMap<String, String> = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let mut trie = match args.secure {
        true => ProofTrie::new_secure(),
        false => ProofTrie::new(),
    };
    for (key, value) in &pairs {
        trie.put(&hex_decode(key)?, &hex_decode(value)?)?;
    }
    info!("Inserted {} pairs, root {}", pairs.len(), hex_encode(trie.root()));

    let key = hex_decode(&args.key)?;
    let proof = trie.prove_key(&key)?;
    info!(
        "Key {} found: {}, divergent neighbor: {}",
        args.key,
        proof.outcome.is_found(),
        proof.encoded.has_divergent_neighbor()
    );

    let bytes = match args.output {
        OutputKind::HexString => {
            let report = ProofReport::new(hex_encode(trie.root()), hex_encode(&key), &proof);
            serde_json::to_vec_pretty(&report)?
        }
        OutputKind::Binary => proof.encoded.into_bytes(),
    };
    match &args.file {
        Some(path) => {
            if fs::metadata(path).is_ok() {
                bail!("{} file already exists", path.display());
            };
            File::create(path)?.write_all(&bytes)?;
        }
        None => io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
