// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
//!
//! Every structural artifact the compiler synthesizes (default sources, wire
//! state, global bus taps) gets a deterministic id derived from an *anchor*:
//! a domain-separated hash of the user-level target it serves. This lets
//! incremental recompiles map state across edits without churn (spec.md §9).

use blake3::Hasher;

/// Canonical 256-bit hash used to address blocks, edges, buses, and anchors.
pub type Hash = [u8; 32];

/// Dense integer index assigned to a block by pass 1 (Normalize).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIndex(pub u32);

/// Dense integer index assigned to an edge by pass 1 (Normalize).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeIndex(pub u32);

/// Dense integer index of a port within a block's input or output list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortIndex(pub u32);

/// Stable, user- or editor-assigned identifier for a block (string form, as
/// carried on the wire in [`crate::graph::Block`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub String);

/// Stable, user- or editor-assigned identifier for an edge.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeId(pub String);

/// Stable, user- or editor-assigned identifier for a bus.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusId(pub String);

/// Port slot identifier within a block declaration (string form, e.g. `"in"`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortId(pub String);

/// Produces a stable, domain-separated anchor hash.
///
/// `anchor_hash("defaultSource", &[block_id, port_id])` is the recipe spec.md
/// §4.2 uses for pass 0's synthesized default-source blocks; the same helper
/// backs wire-state and global-bus-tap anchors (§9).
#[must_use]
pub fn anchor_hash(kind: &str, parts: &[&str]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

/// Produces a stable, domain-separated id for a block synthesized by pass 0.
#[must_use]
pub fn structural_block_id(kind: &str, block_id: &str, port_id: &str) -> BlockId {
    let h = anchor_hash(kind, &[block_id, port_id]);
    BlockId(format!("__{kind}:{}", hex::encode(h)))
}

/// Produces a stable, domain-separated id for an edge synthesized by pass 0.
#[must_use]
pub fn structural_edge_id(kind: &str, block_id: &str, port_id: &str) -> EdgeId {
    let h = anchor_hash(kind, &[block_id, port_id]);
    EdgeId(format!("__{kind}-edge:{}", hex::encode(h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_hash_is_domain_separated() {
        let a = anchor_hash("defaultSource", &["blockA", "in"]);
        let b = anchor_hash("wireState", &["blockA", "in"]);
        assert_ne!(a, b);
    }

    #[test]
    fn anchor_hash_is_deterministic() {
        let a = anchor_hash("defaultSource", &["blockA", "in"]);
        let b = anchor_hash("defaultSource", &["blockA", "in"]);
        assert_eq!(a, b);
    }

    #[test]
    fn structural_ids_are_stable_across_calls() {
        let a = structural_block_id("defaultSource", "blockA", "in");
        let b = structural_block_id("defaultSource", "blockA", "in");
        assert_eq!(a, b);
    }
}
