// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 1: Normalize. Assigns dense, deterministic indices to every block
//! and edge, sorted by stable id so recompiles of an unchanged patch always
//! produce the same numbering (spec.md §4.2).

use std::collections::BTreeMap;

use crate::graph::{Block, Edge, Endpoint, RawPatch};
use crate::ident::{BlockId, BusId, EdgeId, EdgeIndex, NodeIndex};

/// A patch with every block/edge assigned a dense index, plus id -> index
/// lookup tables later passes use to build the dependency graph.
#[derive(Debug)]
pub struct NormalizedPatch<'a> {
    /// Source patch, borrowed for the remaining passes.
    pub patch: &'a RawPatch,
    /// Blocks in index order.
    pub blocks: Vec<&'a Block>,
    /// Edges in index order.
    pub edges: Vec<&'a Edge>,
    /// `BlockId` -> `NodeIndex`.
    pub block_index: BTreeMap<BlockId, NodeIndex>,
    /// `EdgeId` -> `EdgeIndex`.
    pub edge_index: BTreeMap<EdgeId, EdgeIndex>,
}

impl<'a> NormalizedPatch<'a> {
    /// Looks up a block's assigned index.
    #[must_use]
    pub fn node_index(&self, id: &BlockId) -> Option<NodeIndex> {
        self.block_index.get(id).copied()
    }
}

/// Normalizes `patch`, sorting blocks by their stable string id and edges by
/// the canonical key spec.md §3.2 pins: "stable sort by `(toBlockIdx,
/// toPortIdx, fromBlockIdx, fromPortIdx)`", with the edge id as a final
/// tiebreak so two edges that share every positional key (e.g. two bus
/// publishers from the same block/port) still land in a total order.
#[must_use]
pub fn normalize(patch: &RawPatch) -> NormalizedPatch<'_> {
    let mut blocks: Vec<&Block> = patch.blocks.iter().collect();
    blocks.sort_by(|a, b| a.id.0.cmp(&b.id.0));

    let block_index: BTreeMap<BlockId, NodeIndex> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.clone(), NodeIndex(i as u32)))
        .collect();

    let mut bus_ids: Vec<&BusId> = patch.buses.iter().map(|bus| &bus.id).collect();
    bus_ids.sort_by(|a, b| a.0.cmp(&b.0));
    let bus_index: BTreeMap<BusId, u32> = bus_ids.into_iter().enumerate().map(|(i, id)| (id.clone(), i as u32)).collect();

    let mut edges: Vec<&Edge> = patch.edges.iter().filter(|e| e.enabled).collect();
    edges.sort_by(|a, b| edge_sort_key(patch, &block_index, &bus_index, a).cmp(&edge_sort_key(patch, &block_index, &bus_index, b)));

    let edge_index = edges
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), EdgeIndex(i as u32)))
        .collect();

    NormalizedPatch { patch, blocks, edges, block_index, edge_index }
}

/// `(endpointClass, blockIdx, portIdx)`: a total order over an [`Endpoint`],
/// with ports sorted ahead of buses (class `0` vs `1`) and unresolvable
/// references (dangling endpoints, surfaced as errors by pass 2) pushed to
/// the end rather than panicking here.
type EndpointKey = (u8, u32, u32);

/// Which of a block's port lists an endpoint's port id is looked up in: the
/// source side of an edge names an output port, the destination side names
/// an input port.
#[derive(Clone, Copy)]
enum PortSide {
    Input,
    Output,
}

fn endpoint_key(
    patch: &RawPatch,
    block_index: &BTreeMap<BlockId, NodeIndex>,
    bus_index: &BTreeMap<BusId, u32>,
    endpoint: &Endpoint,
    side: PortSide,
) -> EndpointKey {
    match endpoint {
        Endpoint::Port { block_id, port_id } => {
            let block_idx = block_index.get(block_id).map_or(u32::MAX, |n| n.0);
            let port_idx = patch
                .block(block_id)
                .and_then(|b| {
                    let ports = match side {
                        PortSide::Input => &b.inputs,
                        PortSide::Output => &b.outputs,
                    };
                    ports.iter().position(|p| p == port_id)
                })
                .map_or(u32::MAX, |i| i as u32);
            (0, block_idx, port_idx)
        }
        Endpoint::Bus { bus_id } => (1, bus_index.get(bus_id).copied().unwrap_or(u32::MAX), 0),
    }
}

/// `(toKey, fromKey, id)` — the canonical edge order of spec.md §3.2.
fn edge_sort_key(
    patch: &RawPatch,
    block_index: &BTreeMap<BlockId, NodeIndex>,
    bus_index: &BTreeMap<BusId, u32>,
    edge: &Edge,
) -> (EndpointKey, EndpointKey, String) {
    (
        endpoint_key(patch, block_index, bus_index, &edge.to, PortSide::Input),
        endpoint_key(patch, block_index, bus_index, &edge.from, PortSide::Output),
        edge.id.0.clone(),
    )
}
