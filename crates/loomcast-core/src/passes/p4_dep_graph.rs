// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 4: DepGraph. Builds the block-level dependency graph from
//! port-to-port edges. Bus-touching edges are deliberately excluded: a bus
//! combine is resolved against its publishers' already-evaluated slots, so
//! routing a value through a bus can never itself introduce a cycle the way
//! a direct port edge can (spec.md §4.5).

use std::collections::BTreeMap;

use crate::graph::Endpoint;
use crate::ident::NodeIndex;
use crate::passes::p1_normalize::NormalizedPatch;

/// The block-level directed graph pass 5 (SCC) and pass 6/7 (lowering order)
/// operate on.
#[derive(Debug, Default)]
pub struct DepGraph {
    /// `u -> [v, ...]`: `u`'s block output feeds one of `v`'s input ports.
    pub successors: BTreeMap<NodeIndex, Vec<NodeIndex>>,
    /// Total number of nodes (equal to the normalized block count).
    pub node_count: usize,
}

impl DepGraph {
    /// Successors of `node`, or an empty slice if it has none.
    #[must_use]
    pub fn successors_of(&self, node: NodeIndex) -> &[NodeIndex] {
        self.successors.get(&node).map_or(&[], Vec::as_slice)
    }
}

/// Builds the dependency graph for `normalized`, considering only edges
/// whose both endpoints are block ports.
#[must_use]
pub fn build(normalized: &NormalizedPatch<'_>) -> DepGraph {
    let mut successors: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();

    for edge in &normalized.edges {
        let (Endpoint::Port { block_id: from_id, .. }, Endpoint::Port { block_id: to_id, .. }) =
            (&edge.from, &edge.to)
        else {
            continue;
        };
        let (Some(from), Some(to)) = (normalized.node_index(from_id), normalized.node_index(to_id)) else {
            continue; // dangling endpoints surfaced by pass 2
        };
        successors.entry(from).or_default().push(to);
    }

    DepGraph { successors, node_count: normalized.blocks.len() }
}
