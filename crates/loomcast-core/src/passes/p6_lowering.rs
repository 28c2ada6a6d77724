// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 6: Block lowering, interleaved with pass 7's edge resolution. Blocks
//! are visited in a topological order derived from pass 5's condensation
//! (spec.md §4.6); each block's inputs are resolved from already-lowered
//! producers immediately before it is lowered.
//!
//! A legal cycle (pass 5 already confirmed one of its blocks is a
//! `stateBoundary`) is broken the same way a `stateBoundary` block breaks it
//! at runtime: an edge whose source hasn't been lowered yet is bound to a
//! freshly allocated state slot read (last frame's value) instead of the
//! live producer. Once that producer is actually lowered later in this same
//! pass, its value is written into that slot, so next frame's read observes
//! it — the one-frame-delayed feedback a cyclic dataflow graph requires.
//!
//! Bus-publish edges are resolved inline, right as their source block's
//! outputs become available, rather than in a trailing pass over all edges:
//! this keeps any reducer/adapter/lens work a publish edge needs appended to
//! `ir.sigs.nodes` at its true dependency position, and lets [`LoweringResult::bus_ready_at`]
//! record the exact point a bus's combine becomes eligible to run.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{CompileError, CompileWarning};
use crate::graph::{BlockRole, CombineMode, Endpoint, ParamValue, ScrubPolicy, StructuralKind};
use crate::ident::{BlockId, BusId, EdgeId, Hash, NodeIndex, PortId};
use crate::ir::{ConstId, StateId, ValueRef, ValueSlot};
use crate::ir_builder::IrBuilder;
use crate::passes::p1_normalize::NormalizedPatch;
use crate::passes::p2_type_graph::TypeGraph;
use crate::passes::p3_time_topology::TimeTopology;
use crate::passes::p5_scc::SccResult;
use crate::passes::p7_link::resolve_edge_value;
use crate::registry::block::{port, LowerCtx};
use crate::registry::BlockRegistry;
use crate::schedule::RenderPlan;
use crate::types::TypeDesc;

/// Everything pass 6/7 produces for pass 8 to assemble into a schedule and
/// `CompiledProgram`.
#[derive(Default)]
pub struct LoweringResult {
    /// Each bus's pre-allocated combined-output slot.
    pub bus_slots: BTreeMap<BusId, ValueSlot>,
    /// Each bus's publisher slots, in edge-declaration order.
    pub bus_writers: BTreeMap<BusId, Vec<ValueSlot>>,
    /// For each bus, the `ir.sigs.nodes` length at the moment its last
    /// publisher was resolved — the earliest point in signal-eval order its
    /// `BusCombine` step may run. Pass 8 interleaves `BusCombine` steps into
    /// the `SigEval` stream at these positions, since a listener's lens
    /// chain on a bus tap produces further `SigEval` nodes that must run
    /// after the combine they read from.
    pub bus_ready_at: BTreeMap<BusId, usize>,
    /// Each bus's combine mode and pooled default value, carried straight
    /// into its `BusCombine` step so the executor never has to look a bus
    /// up by id against the source patch.
    pub bus_meta: BTreeMap<BusId, (CombineMode, Option<ConstId>)>,
    /// Every render sink's materialization plan.
    pub render_plans: Vec<RenderPlan>,
    /// The node owning each entry of `render_plans`, at the same index —
    /// used only to seed unused-block reachability (spec.md §7).
    pub render_sink_nodes: Vec<NodeIndex>,
    /// Every allocated state slot's metadata.
    pub state_meta: Vec<(StateId, ScrubPolicy, BlockId, Hash)>,
    /// Debug-probe entries, sourced from promoted `Lens` anchor blocks.
    pub debug_entries: Vec<(String, ValueSlot, BlockId)>,
    /// Non-fatal diagnostics accumulated while lowering.
    pub warnings: Vec<CompileWarning>,
}

/// Lowers every block in `normalized` to IR, resolving edges as it goes.
pub fn run(
    normalized: &NormalizedPatch<'_>,
    registry: &BlockRegistry,
    type_graph: &TypeGraph,
    scc: &SccResult,
    time: &TimeTopology,
    ir: &mut IrBuilder,
    seed: u32,
) -> Result<LoweringResult, Vec<CompileError>> {
    let mut result = LoweringResult::default();
    for bus in &normalized.patch.buses {
        result.bus_slots.insert(bus.id.clone(), ir.alloc_value_slot(bus.r#type.clone()));
        let default = bus_default_const(bus, ir);
        result.bus_meta.insert(bus.id.clone(), (bus.combine_mode.clone(), default));
    }

    // `bus_writer_edge_order` is filled by walking `normalized.edges` and is
    // never re-sorted here: every edge publishing into the same bus shares
    // that bus as its `to` endpoint, so pass 1's canonical
    // `(toKey, fromKey, id)` order already leaves them in ascending
    // `(fromBlockIdx, fromPortIdx, id)` order among themselves — exactly the
    // "(sortKey, id)" writer order spec.md §3.2 requires, and the order
    // `Last`/`First` combine modes resolve their winner from (spec.md §4.8).
    let mut incoming: BTreeMap<(BlockId, PortId), &crate::graph::Edge> = BTreeMap::new();
    let mut publish_edges_by_source: BTreeMap<BlockId, Vec<(&crate::graph::Edge, BusId)>> = BTreeMap::new();
    let mut bus_writer_edge_order: BTreeMap<BusId, Vec<EdgeId>> = BTreeMap::new();
    for edge in &normalized.edges {
        if let Endpoint::Port { block_id, port_id } = &edge.to {
            incoming.insert((block_id.clone(), port_id.clone()), edge);
        }
        if let (Endpoint::Port { block_id, .. }, Endpoint::Bus { bus_id }) = (&edge.from, &edge.to) {
            publish_edges_by_source.entry(block_id.clone()).or_default().push((edge, bus_id.clone()));
            bus_writer_edge_order.entry(bus_id.clone()).or_default().push(edge.id.clone());
        }
    }
    let mut bus_writer_remaining: BTreeMap<BusId, usize> =
        bus_writer_edge_order.iter().map(|(bus, edges)| (bus.clone(), edges.len())).collect();
    let mut bus_writer_values: BTreeMap<EdgeId, ValueSlot> = BTreeMap::new();
    for bus in &normalized.patch.buses {
        if bus_writer_remaining.get(&bus.id).copied().unwrap_or(0) == 0 {
            result.bus_ready_at.insert(bus.id.clone(), 0);
        }
    }

    let order: Vec<NodeIndex> = {
        let mut order = Vec::with_capacity(normalized.blocks.len());
        for component in scc.components.iter().rev() {
            let mut component = component.clone();
            component.sort();
            order.extend(component);
        }
        order
    };

    let mut resolved_outputs: BTreeMap<NodeIndex, BTreeMap<PortId, ValueRef>> = BTreeMap::new();
    let mut pending_feedback: BTreeMap<NodeIndex, Vec<(PortId, StateId, TypeDesc)>> = BTreeMap::new();
    let mut errors = Vec::new();

    for node in order {
        let block = normalized.blocks[node.0 as usize];

        if block.type_tag == "GlobalBusTap" {
            let bus_id = match &block.role {
                BlockRole::Structural { kind: StructuralKind::GlobalBus, anchor } => BusId(anchor.clone()),
                _ => {
                    errors.push(CompileError::DanglingEndpoint {
                        edge: EdgeId(String::new()),
                        detail: format!("GlobalBusTap {:?} has no bus anchor", block.id),
                    });
                    resolved_outputs.insert(node, BTreeMap::new());
                    settle_feedback(ir, node, &resolved_outputs, &mut pending_feedback);
                    continue;
                }
            };
            match result.bus_slots.get(&bus_id) {
                Some(&slot) => {
                    let mut outputs_by_id = BTreeMap::new();
                    outputs_by_id.insert(port("out"), ValueRef::Sig(slot));
                    resolved_outputs.insert(node, outputs_by_id);
                }
                None => {
                    errors.push(CompileError::DanglingEndpoint {
                        edge: EdgeId(String::new()),
                        detail: format!("GlobalBusTap {:?} references unknown bus {bus_id:?}", block.id),
                    });
                    resolved_outputs.insert(node, BTreeMap::new());
                }
            }
            settle_feedback(ir, node, &resolved_outputs, &mut pending_feedback);
            let empty = BTreeMap::new();
            let outputs = resolved_outputs.get(&node).unwrap_or(&empty);
            resolve_publishes(
                ir,
                &block.id,
                outputs,
                type_graph,
                &publish_edges_by_source,
                &mut bus_writer_remaining,
                &mut bus_writer_values,
                &mut result.bus_ready_at,
                &mut result.warnings,
                &mut errors,
            );
            continue;
        }

        let Some(decl) = registry.get(&block.type_tag) else {
            // Surfaced as `UnknownBlockType` by pass 2; nothing to lower.
            resolved_outputs.insert(node, BTreeMap::new());
            resolve_publishes(
                ir,
                &block.id,
                &BTreeMap::new(),
                type_graph,
                &publish_edges_by_source,
                &mut bus_writer_remaining,
                &mut bus_writer_values,
                &mut result.bus_ready_at,
                &mut result.warnings,
                &mut errors,
            );
            continue;
        };

        let mut inputs_by_id = BTreeMap::new();
        for port_decl in decl.inputs() {
            let Some(edge) = incoming.get(&(block.id.clone(), port_decl.id.clone())) else {
                continue;
            };
            let source = match &edge.from {
                Endpoint::Bus { bus_id } => match result.bus_slots.get(bus_id) {
                    Some(&slot) => ValueRef::Sig(slot),
                    None => {
                        errors.push(CompileError::DanglingEndpoint {
                            edge: edge.id.clone(),
                            detail: format!("edge references unknown bus {bus_id:?}"),
                        });
                        continue;
                    }
                },
                Endpoint::Port { block_id: src_block, port_id: src_port } => {
                    match resolved_outputs.get(&normalized.node_index(src_block).unwrap_or(NodeIndex(u32::MAX))) {
                        Some(outputs) if outputs.contains_key(src_port) => outputs[src_port],
                        _ => make_feedback(
                            ir,
                            normalized,
                            registry,
                            src_block,
                            src_port,
                            &mut pending_feedback,
                            &mut result.state_meta,
                            &block.id,
                            &edge.id,
                        ),
                    }
                }
            };
            let Some(resolution) = type_graph.resolutions.get(&edge.id) else {
                continue; // surfaced as a pass-2 error already
            };
            match resolve_edge_value(ir, edge, resolution, source, &block.id, &mut result.warnings) {
                Ok(v) => {
                    inputs_by_id.insert(port_decl.id.clone(), v);
                }
                Err(e) => errors.push(e),
            }
        }

        let mut ctx = LowerCtx { ir: &mut *ir, seed, time: time.slots };
        match decl.lower(&mut ctx, &block.params, &inputs_by_id) {
            Ok(lower_output) => {
                for (i, &(state_id, policy)) in lower_output.state_meta.iter().enumerate() {
                    let anchor = crate::ident::anchor_hash("state", &[block.id.0.as_str(), &i.to_string()]);
                    result.state_meta.push((state_id, policy, block.id.clone(), anchor));
                }
                if let Some(plan) = &lower_output.render_plan {
                    result.render_plans.push(plan.clone());
                    result.render_sink_nodes.push(node);
                }
                if let BlockRole::Structural { kind: StructuralKind::Lens, anchor } = &block.role {
                    if let Some(ValueRef::Sig(slot)) = lower_output.outputs_by_id.get(&port("out")) {
                        result.debug_entries.push((anchor.clone(), *slot, block.id.clone()));
                    }
                }
                resolved_outputs.insert(node, lower_output.outputs_by_id);
            }
            Err(e) => {
                errors.push(e);
                resolved_outputs.insert(node, BTreeMap::new());
            }
        }

        settle_feedback(ir, node, &resolved_outputs, &mut pending_feedback);
        let empty = BTreeMap::new();
        let outputs = resolved_outputs.get(&node).unwrap_or(&empty);
        resolve_publishes(
            ir,
            &block.id,
            outputs,
            type_graph,
            &publish_edges_by_source,
            &mut bus_writer_remaining,
            &mut bus_writer_values,
            &mut result.bus_ready_at,
            &mut result.warnings,
            &mut errors,
        );
    }

    for (bus_id, edge_order) in &bus_writer_edge_order {
        let writers = edge_order.iter().filter_map(|eid| bus_writer_values.get(eid).copied()).collect();
        result.bus_writers.insert(bus_id.clone(), writers);
    }

    for bus in &normalized.patch.buses {
        if result.bus_writers.get(&bus.id).map_or(true, Vec::is_empty) {
            result.warnings.push(CompileWarning::EmptyBus { bus: bus.id.clone() });
        }
        // Every bus must have a readiness mark so pass 8 can place its
        // `BusCombine` step even when lowering never visited a publisher
        // (e.g. a declared-but-unwired bus).
        result.bus_ready_at.entry(bus.id.clone()).or_insert_with(|| ir.sigs.nodes.len());
    }

    result.warnings.extend(unused_block_warnings(normalized, registry, &result));

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(errors)
    }
}

/// Interns a bus's declared default literal as a pooled constant, if one was
/// authored and its type matches the bus's domain. A mismatched or absent
/// default leaves the executor to fall back to the domain's zero value.
fn bus_default_const(bus: &crate::graph::Bus, ir: &mut IrBuilder) -> Option<ConstId> {
    match (&bus.default, bus.r#type.domain) {
        (Some(ParamValue::Float(v)), _) => Some(ir.const_float(*v)),
        (Some(ParamValue::Bool(b)), crate::types::Domain::Boolean) => Some(ir.const_bool(*b)),
        _ => None,
    }
}

/// Binds an edge whose producer hasn't been lowered yet (a back-edge through
/// a `stateBoundary`) to a state-read of last frame's value, registering a
/// deferred write for once the producer is lowered.
#[allow(clippy::too_many_arguments)]
fn make_feedback(
    ir: &mut IrBuilder,
    normalized: &NormalizedPatch<'_>,
    registry: &BlockRegistry,
    src_block: &BlockId,
    src_port: &PortId,
    pending_feedback: &mut BTreeMap<NodeIndex, Vec<(PortId, StateId, TypeDesc)>>,
    state_meta: &mut Vec<(StateId, ScrubPolicy, BlockId, Hash)>,
    owner_block: &BlockId,
    edge_id: &EdgeId,
) -> ValueRef {
    let src_node = normalized.node_index(src_block).expect("edge source validated by pass 2");
    let ty = registry
        .get(&normalized.blocks[src_node.0 as usize].type_tag)
        .and_then(|decl| decl.outputs().iter().find(|p| &p.id == src_port).map(|p| p.ty.clone()))
        .unwrap_or_else(|| TypeDesc::new(crate::types::World::Signal, crate::types::Domain::Float));

    let state_id = ir.alloc_state_id();
    let read_slot = ir.sig_state_read(ty.clone(), state_id);
    pending_feedback.entry(src_node).or_default().push((src_port.clone(), state_id, ty));

    let anchor = crate::ident::anchor_hash("feedback", &[edge_id.0.as_str()]);
    state_meta.push((state_id, ScrubPolicy::Preserve, owner_block.clone(), anchor));
    ValueRef::Sig(read_slot)
}

/// Resolves every bus-publish edge sourced from `node_block_id`'s just-lowered
/// outputs, and — once a bus's last publisher has been resolved — records the
/// `ir.sigs.nodes` position its `BusCombine` step becomes eligible to run at.
#[allow(clippy::too_many_arguments)]
fn resolve_publishes(
    ir: &mut IrBuilder,
    node_block_id: &BlockId,
    outputs: &BTreeMap<PortId, ValueRef>,
    type_graph: &TypeGraph,
    publish_edges_by_source: &BTreeMap<BlockId, Vec<(&crate::graph::Edge, BusId)>>,
    bus_writer_remaining: &mut BTreeMap<BusId, usize>,
    bus_writer_values: &mut BTreeMap<EdgeId, ValueSlot>,
    bus_ready_at: &mut BTreeMap<BusId, usize>,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    let Some(edges) = publish_edges_by_source.get(node_block_id) else {
        return;
    };
    for entry in edges {
        let edge: &crate::graph::Edge = entry.0;
        let bus_id: &BusId = &entry.1;

        if let Endpoint::Port { port_id, .. } = &edge.from {
            if let Some(&value) = outputs.get(port_id) {
                if let Some(resolution) = type_graph.resolutions.get(&edge.id) {
                    match resolve_edge_value(ir, edge, resolution, value, node_block_id, warnings) {
                        Ok(ValueRef::Sig(slot)) => {
                            bus_writer_values.insert(edge.id.clone(), slot);
                        }
                        Ok(_) => errors.push(CompileError::InvalidCombineModeForType {
                            endpoint: bus_id.clone(),
                            mode: "publisher".to_string(),
                            ty: "non-signal".to_string(),
                        }),
                        Err(e) => errors.push(e),
                    }
                }
            }
        }

        let remaining = bus_writer_remaining.entry(bus_id.clone()).or_insert(0);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            bus_ready_at.entry(bus_id.clone()).or_insert_with(|| ir.sigs.nodes.len());
        }
    }
}

fn settle_feedback(
    ir: &mut IrBuilder,
    node: NodeIndex,
    resolved_outputs: &BTreeMap<NodeIndex, BTreeMap<PortId, ValueRef>>,
    pending_feedback: &mut BTreeMap<NodeIndex, Vec<(PortId, StateId, TypeDesc)>>,
) {
    let Some(pending) = pending_feedback.remove(&node) else {
        return;
    };
    let Some(outputs) = resolved_outputs.get(&node) else {
        return;
    };
    for (port_id, state_id, ty) in pending {
        if let Some(ValueRef::Sig(slot)) = outputs.get(&port_id) {
            ir.sig_state_write(ty, state_id, *slot);
        }
    }
}

/// Computes spec.md §7's unused-block warning: a `User`-role block with no
/// data-flow path to any render sink or debug probe. Reachability walks
/// block-to-block port edges plus publish-to-bus edges (a publisher reaches
/// the bus's `GlobalBusTap`, which pass 0 already wired to every listener
/// with an ordinary port edge), since a block that only feeds a render sink
/// through a bus is not unused. `TimeRoot` blocks are exempt: they configure
/// the schedule's canonical time slots directly through `LowerCtx::time` and
/// never have outputs an edge could wire up, so they would otherwise always
/// look unreachable.
fn unused_block_warnings(normalized: &NormalizedPatch<'_>, registry: &BlockRegistry, result: &LoweringResult) -> Vec<CompileWarning> {
    let mut tap_node_by_bus: BTreeMap<BusId, NodeIndex> = BTreeMap::new();
    for (i, block) in normalized.blocks.iter().enumerate() {
        if let BlockRole::Structural { kind: StructuralKind::GlobalBus, anchor } = &block.role {
            tap_node_by_bus.insert(BusId(anchor.clone()), NodeIndex(i as u32));
        }
    }

    let mut forward: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();
    for edge in &normalized.edges {
        match (&edge.from, &edge.to) {
            (Endpoint::Port { block_id: from_id, .. }, Endpoint::Port { block_id: to_id, .. }) => {
                if let (Some(from), Some(to)) = (normalized.node_index(from_id), normalized.node_index(to_id)) {
                    forward.entry(from).or_default().push(to);
                }
            }
            (Endpoint::Port { block_id: from_id, .. }, Endpoint::Bus { bus_id }) => {
                if let (Some(from), Some(&tap)) = (normalized.node_index(from_id), tap_node_by_bus.get(bus_id)) {
                    forward.entry(from).or_default().push(tap);
                }
            }
            _ => {}
        }
    }

    let mut reverse: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();
    for (&from, tos) in &forward {
        for &to in tos {
            reverse.entry(to).or_default().push(from);
        }
    }

    let sinks: Vec<NodeIndex> = result
        .render_sink_nodes
        .iter()
        .copied()
        .chain(result.debug_entries.iter().filter_map(|(_, _, owner)| normalized.node_index(owner)))
        .collect();

    let mut reaches_sink: BTreeSet<NodeIndex> = sinks.iter().copied().collect();
    let mut queue: VecDeque<NodeIndex> = sinks.into();
    while let Some(node) = queue.pop_front() {
        for &pred in reverse.get(&node).into_iter().flatten() {
            if reaches_sink.insert(pred) {
                queue.push_back(pred);
            }
        }
    }

    normalized
        .blocks
        .iter()
        .enumerate()
        .filter_map(|(i, block)| {
            if block.role != BlockRole::User {
                return None;
            }
            if registry.get(&block.type_tag).is_some_and(|decl| decl.is_time_root()) {
                return None;
            }
            let node = NodeIndex(i as u32);
            (!reaches_sink.contains(&node)).then(|| CompileWarning::UnusedBlock { block: block.id.clone() })
        })
        .collect()
}
