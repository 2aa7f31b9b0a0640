//! For navigating a key's traversal path in a Merkle PATRICIA Trie.
//!
//! A key of N bytes is followed as 2N nibbles, most significant nibble of each byte first.
//! Branch nodes consume one nibble, extension and leaf nodes consume the nibbles stored
//! in their (hex prefix encoded) path.
//!
//! A traversal may reach a node whose stored path diverges from the remaining nibbles of
//! the key. This means that the key is not in the trie and the nodes visited so far form
//! an exclusion proof.

use thiserror::Error;

/// An error with a Merkle Patricia Trie path.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PathError {
    #[error("Unable to decode invalid hex compact trie path encoding prefix")]
    InvalidPathPrefix,
    #[error("Nibble must be in the range 0-15, got {0}")]
    InvalidNibble(u8),
    #[error("Attempted traversal to next node in path but path has no remaining nibbles")]
    NextNodeNotInPath,
    #[error("Not enough nibbles to create encoded path")]
    NibblesEmpty,
    #[error("Encoded path does not contain a first byte")]
    PathEmpty,
    #[error("Must pass an even number of nibbles")]
    OddNumberOfNibbles,
    #[error("Unable to skip {skip} nibbles with {remaining} remaining")]
    SkipPastEnd { skip: usize, remaining: usize },
}

/// A sequence of nibbles that represent a traversal from the root of a merkle patricia trie,
/// together with how far along that sequence the traversal has come.
///
/// E.g., Path 5a1 Follow node indices in this order: [5, 10, 1]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct NibblePath {
    // Nibble (u4) sequence represented as sequence of u8.
    path: Vec<u8>,
    // Index of nibble in path that is being visited.
    visiting_index: usize,
}

impl NibblePath {
    /// Turn a byte array into a nibble array.
    pub fn init(path_bytes: &[u8]) -> Self {
        Self {
            path: to_nibbles(path_bytes),
            visiting_index: 0,
        }
    }
    /// Visits the next nibble in the traversal and then increment.
    pub fn visit_path_nibble(&mut self) -> Result<u8, PathError> {
        let node_index = self
            .path
            .get(self.visiting_index)
            .ok_or(PathError::NextNodeNotInPath)?;
        self.visiting_index += 1;
        Ok(*node_index)
    }
    /// Returns the nibble that the next branch would select, without visiting it.
    pub fn peek_path_nibble(&self) -> Option<u8> {
        self.path.get(self.visiting_index).copied()
    }
    /// Moves past nibbles that a leaf or extension node has already been matched against.
    pub fn skip(&mut self, count: usize) -> Result<(), PathError> {
        let remaining = self.path.len() - self.visiting_index;
        if count > remaining {
            return Err(PathError::SkipPastEnd {
                skip: count,
                remaining,
            });
        }
        self.visiting_index += count;
        Ok(())
    }
    /// Checks if the path stored in a leaf/extension node matches (inclusion) or
    /// doesn't match (exclusion) the nibbles that have not been traversed yet.
    pub fn match_or_mismatch(&self, node_path: &[u8]) -> PathNature {
        let matching = matching_prefix_length(self.pending(), node_path);
        if matching != node_path.len() {
            return PathNature::Diverges(self.visiting_index + matching);
        }
        if self.visiting_index + matching == self.path.len() {
            return PathNature::FullPathMatches;
        }
        PathNature::SubPathMatches
    }
    /// Returns the nibbles that have not yet been traversed.
    pub fn pending(&self) -> &[u8] {
        &self.path[self.visiting_index..]
    }
    /// Returns the index of the nibble being visiting next.
    pub fn visiting_index(&self) -> usize {
        self.visiting_index
    }
    pub fn len(&self) -> usize {
        self.path.len()
    }
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// How the path of a leaf/extension node relates to the key being traversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNature {
    /// Node path matches, key has nibbles left over.
    SubPathMatches,
    /// Node path matches and consumes the rest of the key.
    FullPathMatches,
    /// Node path diverges from the key. Contains index of first divergent nibble.
    Diverges(usize),
}

/// Expands bytes into nibbles: `[0x12, 0xab]` -> `[0x1, 0x2, 0xa, 0xb]`.
///
/// Empty input yields an empty sequence.
pub fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(byte_to_nibbles).collect()
}

/// Count of leading nibbles that two sequences have in common.
pub fn matching_prefix_length(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Turns sequence of bytes in to sequence of nibbles. The bytes are prefixed
/// with extension/node and even/odd encoding. This encoding is removed from the result.
///
/// Each nibble will be represented as a u8.
///
/// E.g. from an encoded odd leaf path:
///
/// `vec![0x3f, 0x1c, 0xb8]` -> `vec![0xf, 0x1, 0xc, 0xb, 0x8]`
pub fn prefixed_bytes_to_nibbles(bytes: &[u8]) -> Result<Vec<u8>, PathError> {
    let mut nibbles = vec![];

    let first_byte = bytes.first().ok_or(PathError::PathEmpty)?;
    match PrefixEncoding::try_from(first_byte)? {
        PrefixEncoding::ExtensionEven | PrefixEncoding::LeafEven => {
            // Do nothing. Whole first byte is encoding/padding.
        }
        PrefixEncoding::ExtensionOdd(nibble) | PrefixEncoding::LeafOdd(nibble) => {
            nibbles.push(nibble)
        }
    };
    bytes
        .iter()
        .skip(1) // First byte is compact encoding.
        .flat_map(byte_to_nibbles)
        .for_each(|nibble| nibbles.push(nibble));

    Ok(nibbles)
}

/// Converts a collection of nibbles into prefix-encoded bytes.
///
/// E.g. into an encoded odd leaf path:
///
/// `vec![0xf, 0x1, 0xc, 0xb, 0x8]` -> `vec![0x3f, 0x1c, 0xb8]`
pub fn nibbles_to_prefixed_bytes(
    unencoded_nibbles: &[u8],
    target: TargetNodeEncoding,
) -> Result<Vec<u8>, PathError> {
    let is_even = unencoded_nibbles.len() % 2 == 0;
    let flag = match target {
        TargetNodeEncoding::Extension => 0x0,
        TargetNodeEncoding::Leaf => 0x2,
    };
    let mut encoded: Vec<u8> = vec![];
    if is_even {
        // flag 0 + remaining
        encoded.push(flag << 4);
        encoded.extend(nibbles_to_bytes(unencoded_nibbles)?);
    } else {
        // flag+1 first + remaining
        let (first, remaining) = unencoded_nibbles
            .split_first()
            .ok_or(PathError::NibblesEmpty)?;
        encoded.push(nibbles_to_byte(&[flag | 0x1, *first])?);
        encoded.extend(nibbles_to_bytes(remaining)?);
    }
    Ok(encoded)
}

/// Packs nibbles into whole bytes, appending a `0` nibble when the count is odd.
///
/// E.g. `[0x1, 0x2, 0x3]` -> `[0x12, 0x30]`
pub fn pad_to_bytes(nibbles: &[u8]) -> Result<Vec<u8>, PathError> {
    let mut padded = nibbles.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(0);
    }
    nibbles_to_bytes(&padded)
}

/// Hex prefix encoding, used for paths in Merkle Patricia Tries. The Odd variants
/// contain a nibble of data, the even variants only contain a padding.
///
/// https://ethereum.org/en/developers/docs/data-structures-and-encoding/patricia-merkle-trie/#specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixEncoding {
    ExtensionEven,
    ExtensionOdd(u8),
    LeafEven,
    LeafOdd(u8),
}

impl PrefixEncoding {
    pub fn is_leaf(&self) -> bool {
        matches!(self, PrefixEncoding::LeafEven | PrefixEncoding::LeafOdd(_))
    }
    pub fn is_odd(&self) -> bool {
        matches!(
            self,
            PrefixEncoding::ExtensionOdd(_) | PrefixEncoding::LeafOdd(_)
        )
    }
}

impl TryFrom<&u8> for PrefixEncoding {
    type Error = PathError;

    fn try_from(value: &u8) -> Result<Self, Self::Error> {
        let nibbles = byte_to_nibbles(value);
        let encoding = match nibbles {
            [0, _] => PrefixEncoding::ExtensionEven,
            [1, nibble] => PrefixEncoding::ExtensionOdd(nibble),
            [2, _] => PrefixEncoding::LeafEven,
            [3, nibble] => PrefixEncoding::LeafOdd(nibble),
            [_, _] => return Err(PathError::InvalidPathPrefix),
        };
        Ok(encoding)
    }
}

impl TryFrom<&[u8]> for PrefixEncoding {
    type Error = PathError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let first_byte = value.first().ok_or(PathError::PathEmpty)?;
        first_byte.try_into()
    }
}

/// Represents byte as an array of nibbles: 0xbc -> [0xb, 0xc]
fn byte_to_nibbles(byte: &u8) -> [u8; 2] {
    let high = byte >> 4;
    let low = byte & 0xF;
    [high, low]
}

/// Represents array of nibbles as a byte: [0xb, 0xc] -> 0xbc
pub fn nibbles_to_byte(nibbles: &[u8; 2]) -> Result<u8, PathError> {
    if nibbles[0] > 15 {
        return Err(PathError::InvalidNibble(nibbles[0]));
    }
    if nibbles[1] > 15 {
        return Err(PathError::InvalidNibble(nibbles[1]));
    }
    Ok((nibbles[0] << 4) | nibbles[1])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetNodeEncoding {
    Leaf,
    Extension,
}

/// Converts a collection of nibbles into bytes: [0xb, 0xc, 0x3, 0xa] -> [0xbc, 0x3a]
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Result<Vec<u8>, PathError> {
    if nibbles.len() % 2 != 0 {
        return Err(PathError::OddNumberOfNibbles);
    }
    nibbles
        .chunks_exact(2)
        .map(|pair| nibbles_to_byte(&[pair[0], pair[1]]))
        .collect()
}
