// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 0: Materialize. Synthesizes a `DefaultSource*` block and edge for
//! every declared input port with no inbound enabled edge, and a
//! `GlobalBusTap` block for every edge listening directly off a bus, so
//! later passes only ever resolve port-to-port edges (spec.md §4.2, §9).

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::graph::{Block, BlockRole, Edge, EdgeRole, Endpoint, ParamValue, RawPatch, StructuralKind};
use crate::ident::{structural_block_id, structural_edge_id, BlockId, PortId};
use crate::registry::{BlockRegistry, DefaultSourceKind};

/// Returns a new patch with default-source blocks/edges appended for every
/// unconnected input port. Ports with no `default_source` declared are left
/// dangling; later passes surface that as `DanglingEndpoint` only if the
/// port is actually read.
#[must_use]
pub fn materialize(patch: &RawPatch, registry: &BlockRegistry) -> RawPatch {
    let mut out = patch.clone();
    tap_buses(&mut out);

    let mut connected: HashSet<(String, String)> = HashSet::new();
    for edge in &out.edges {
        if !edge.enabled {
            continue;
        }
        if let Endpoint::Port { block_id, port_id } = &edge.to {
            connected.insert((block_id.0.clone(), port_id.0.clone()));
        }
    }

    let mut new_blocks = Vec::new();
    let mut new_edges = Vec::new();

    for block in &out.blocks {
        let Some(decl) = registry.get(&block.type_tag) else {
            continue; // surfaced as UnknownBlockType by pass 2
        };
        for port_decl in decl.inputs() {
            let key = (block.id.0.clone(), port_decl.id.0.clone());
            if connected.contains(&key) {
                continue;
            }
            let Some(default_kind) = &port_decl.default_source else {
                continue;
            };
            let (type_tag, params) = default_source_block(default_kind);
            let src_id = structural_block_id("defaultSource", &block.id.0, &port_decl.id.0);
            let edge_id = structural_edge_id("defaultSource", &block.id.0, &port_decl.id.0);

            new_blocks.push(Block {
                id: src_id.clone(),
                type_tag: type_tag.to_string(),
                params,
                inputs: vec![],
                outputs: vec![crate::ident::PortId("out".to_string())],
                role: BlockRole::Structural {
                    kind: StructuralKind::DefaultSource,
                    anchor: format!("{}:{}", block.id.0, port_decl.id.0),
                },
            });
            new_edges.push(Edge {
                id: edge_id,
                from: Endpoint::Port { block_id: src_id, port_id: crate::ident::PortId("out".to_string()) },
                to: Endpoint::Port { block_id: block.id.clone(), port_id: port_decl.id.clone() },
                transforms: vec![],
                enabled: true,
                role: EdgeRole::Default,
            });
        }
    }

    out.blocks.extend(new_blocks);
    out.edges.extend(new_edges);
    out
}

/// Rewrites every edge listening directly off a bus (`from: Endpoint::Bus`)
/// to instead source from a shared `GlobalBusTap` block, one per distinct
/// bus actually tapped. Edges publishing *into* a bus (`to: Endpoint::Bus`)
/// are untouched; those are resolved by pass 6/7 against the bus's combined
/// slot directly.
fn tap_buses(patch: &mut RawPatch) {
    let mut taps: HashMap<String, BlockId> = HashMap::new();
    let mut new_blocks = Vec::new();

    for edge in &mut patch.edges {
        let Endpoint::Bus { bus_id } = &edge.from else {
            continue;
        };
        let tap_id = taps.entry(bus_id.0.clone()).or_insert_with(|| {
            let id = structural_block_id("globalBusTap", &bus_id.0, "out");
            new_blocks.push(Block {
                id: id.clone(),
                type_tag: "GlobalBusTap".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![PortId("out".to_string())],
                role: BlockRole::Structural { kind: StructuralKind::GlobalBus, anchor: bus_id.0.clone() },
            });
            id
        });
        edge.from = Endpoint::Port { block_id: tap_id.clone(), port_id: PortId("out".to_string()) };
        edge.role = EdgeRole::BusTap;
    }

    patch.blocks.extend(new_blocks);
}

fn default_source_block(kind: &DefaultSourceKind) -> (&'static str, std::collections::BTreeMap<String, ParamValue>) {
    let mut params = std::collections::BTreeMap::new();
    match *kind {
        DefaultSourceKind::ConstSignalFloat(v) => {
            params.insert("value".to_string(), ParamValue::Float(v));
            ("DSConstSignalFloat", params)
        }
        DefaultSourceKind::ConstSignalVec2([x, y]) => {
            params.insert("x".to_string(), ParamValue::Float(x));
            params.insert("y".to_string(), ParamValue::Float(y));
            ("DSConstSignalVec2", params)
        }
        DefaultSourceKind::ConstSignalColor([r, g, b, a]) => {
            params.insert("r".to_string(), ParamValue::Float(r));
            params.insert("g".to_string(), ParamValue::Float(g));
            params.insert("b".to_string(), ParamValue::Float(b));
            params.insert("a".to_string(), ParamValue::Float(a));
            ("DSConstColor", params)
        }
        DefaultSourceKind::ConstSignalBool(v) => {
            params.insert("value".to_string(), ParamValue::Bool(v));
            ("DSConstSignalFloat", params)
        }
        DefaultSourceKind::ConstDomain(n) => {
            params.insert("n".to_string(), ParamValue::Int(i64::from(n)));
            ("DSConstDomain", params)
        }
    }
}
