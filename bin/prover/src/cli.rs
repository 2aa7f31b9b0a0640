//! For Command Line Interface for trieproof_cli

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct AppArgs {
    /// JSON file of 0x-prefixed key/value pairs to insert. E.g., {"0x1111": "0x6677"}
    #[clap(short, long)]
    pub input: PathBuf,
    /// 0x-prefixed key to prove
    #[clap(short, long)]
    pub key: String,
    /// Hash keys with keccak256 before use (secure trie)
    #[clap(short, long, default_value_t = false)]
    pub secure: bool,
    /// Kind of data to write.
    #[clap(value_enum, default_value_t=OutputKind::HexString)]
    pub output: OutputKind,
    /// File to create. Written to stdout if absent.
    #[clap(short, long)]
    pub file: Option<PathBuf>,
}

/// Format of data to be written.
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputKind {
    /// JSON report with root, outcome and 0x-prefixed hex-string proof
    HexString,
    /// Encoded proof bytes only
    Binary,
}
