//! For serializing a proof into the bytes a verifier consumes.
//!
//! Wire format: `[marker][RLP list of nodes]`. The marker is `0xfe` when the first node
//! of the list is a divergent neighbor, `0xff` otherwise. Nodes shorter than 32 bytes are
//! left out, a verifier recomputes them from their parent.
use rlp::{Rlp, RlpStream};
use thiserror::Error;

use crate::{node::HASH_REFERENCE_LENGTH, utils::hex_encode};

/// Marker for a proof whose first node is the divergent neighbor.
pub const DIVERGENT_NEIGHBOR_MARKER: u8 = 0xfe;
/// Marker for a proof without a divergent neighbor.
pub const NO_NEIGHBOR_MARKER: u8 = 0xff;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Cannot encode a proof with no nodes")]
    EmptyProof,
    #[error("Encoded proof has no marker byte")]
    NoMarker,
    #[error("Encoded proof has invalid marker {0:#04x}")]
    InvalidMarker(u8),
    #[error("Encoded proof nodes are not an RLP list")]
    NotAList,
    #[error("Encoded proof marks a divergent neighbor but has no nodes")]
    MissingNeighbor,
    #[error("RLP decode error {0}")]
    DecodeError(#[from] rlp::DecoderError),
}

/// Proof bytes in wire format.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncodedProof(Vec<u8>);

impl EncodedProof {
    /// Wraps wire bytes after checking the marker and the node list.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EncodingError> {
        let (marker, list) = bytes.split_first().ok_or(EncodingError::NoMarker)?;
        if *marker != DIVERGENT_NEIGHBOR_MARKER && *marker != NO_NEIGHBOR_MARKER {
            return Err(EncodingError::InvalidMarker(*marker));
        }
        let rlp = Rlp::new(list);
        if !rlp.is_list() {
            return Err(EncodingError::NotAList);
        }
        if *marker == DIVERGENT_NEIGHBOR_MARKER && rlp.item_count()? == 0 {
            return Err(EncodingError::MissingNeighbor);
        }
        Ok(Self(bytes))
    }
    pub fn marker(&self) -> u8 {
        self.0[0]
    }
    pub fn has_divergent_neighbor(&self) -> bool {
        self.marker() == DIVERGENT_NEIGHBOR_MARKER
    }
    /// Every node in the list, neighbor included.
    pub fn nodes(&self) -> Result<Vec<Vec<u8>>, EncodingError> {
        let rlp = Rlp::new(&self.0[1..]);
        let mut nodes = vec![];
        for item in rlp.iter() {
            nodes.push(item.as_raw().to_vec());
        }
        Ok(nodes)
    }
    pub fn divergent_neighbor(&self) -> Result<Option<Vec<u8>>, EncodingError> {
        if !self.has_divergent_neighbor() {
            return Ok(None);
        }
        Ok(Some(Rlp::new(&self.0[1..]).at(0)?.as_raw().to_vec()))
    }
    /// Nodes of the simple proof, root first, without the neighbor.
    pub fn proof_nodes(&self) -> Result<Vec<Vec<u8>>, EncodingError> {
        let mut nodes = self.nodes()?;
        if self.has_divergent_neighbor() {
            nodes.remove(0);
        }
        Ok(nodes)
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
    /// As a 0x-prefixed hex string.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

impl AsRef<[u8]> for EncodedProof {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serializes a root-first simple proof, with the divergent neighbor if there is one.
pub fn encode(
    simple_proof: &[Vec<u8>],
    divergent_neighbor: Option<&[u8]>,
) -> Result<EncodedProof, EncodingError> {
    if simple_proof.is_empty() {
        return Err(EncodingError::EmptyProof);
    }
    let nodes: Vec<&[u8]> = divergent_neighbor
        .into_iter()
        .chain(
            simple_proof
                .iter()
                .map(|node| node.as_slice())
                .filter(|node| node.len() >= HASH_REFERENCE_LENGTH),
        )
        .collect();
    let mut rlp = RlpStream::new_list(nodes.len());
    for node in nodes {
        rlp.append_raw(node, 1);
    }
    let marker = match divergent_neighbor {
        Some(_) => DIVERGENT_NEIGHBOR_MARKER,
        None => NO_NEIGHBOR_MARKER,
    };
    let mut bytes = vec![marker];
    bytes.extend_from_slice(&rlp.out());
    Ok(EncodedProof(bytes))
}
