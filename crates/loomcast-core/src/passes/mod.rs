// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The nine-pass compiler pipeline (spec.md §4, §2 Phase A): each pass
//! consumes the previous one's output and either hands a result forward or
//! accumulates [`crate::error::CompileError`]s, mirroring how every pass in
//! this pipeline is built to fail loud and report everything wrong with a
//! patch in one compile rather than stopping at the first error.

pub mod p0_materialize;
pub mod p1_normalize;
pub mod p2_type_graph;
pub mod p3_time_topology;
pub mod p4_dep_graph;
pub mod p5_scc;
pub mod p6_lowering;
pub mod p7_link;
pub mod p8_schedule_build;

use tracing::instrument;

use crate::compiled_program::CompiledProgram;
use crate::error::CompileError;
use crate::graph::RawPatch;
use crate::ir_builder::IrBuilder;
use crate::registry::BlockRegistry;

/// Runs the full pipeline against `patch`, using `registry` to resolve block
/// types. Returns every accumulated error across all nine passes, or the
/// finished program.
#[instrument(level = "debug", skip_all)]
pub fn compile_with_registry(patch: &RawPatch, registry: &BlockRegistry) -> Result<CompiledProgram, Vec<CompileError>> {
    let materialized = materialize_span(patch, registry);
    let normalized = normalize_span(&materialized);

    let type_graph = type_graph_span(&normalized, registry, materialized.settings.adapter_cost_budget)?;

    let mut ir = IrBuilder::default();
    let time = time_topology_span(&normalized, registry, &mut ir)?;

    let dep_graph = dep_graph_span(&normalized);
    let scc = scc_span(&normalized, &dep_graph, registry)?;

    let lowering = lowering_span(&normalized, registry, &type_graph, &scc, &time, &mut ir, materialized.settings.seed)?;

    let program = schedule_build_span(
        &ir,
        lowering,
        &time,
        materialized.settings.seed,
        normalized.blocks.len() as u32,
        normalized.edges.len() as u32,
    );

    Ok(program)
}

#[instrument(level = "trace", name = "compile::pass0", skip_all)]
fn materialize_span(patch: &RawPatch, registry: &BlockRegistry) -> RawPatch {
    p0_materialize::materialize(patch, registry)
}

#[instrument(level = "trace", name = "compile::pass1", skip_all)]
fn normalize_span(patch: &RawPatch) -> p1_normalize::NormalizedPatch<'_> {
    p1_normalize::normalize(patch)
}

#[instrument(level = "trace", name = "compile::pass2", skip_all)]
fn type_graph_span(
    normalized: &p1_normalize::NormalizedPatch<'_>,
    registry: &BlockRegistry,
    adapter_cost_budget: u32,
) -> Result<p2_type_graph::TypeGraph, Vec<CompileError>> {
    p2_type_graph::check(normalized, registry, adapter_cost_budget)
}

#[instrument(level = "trace", name = "compile::pass3", skip_all)]
fn time_topology_span(
    normalized: &p1_normalize::NormalizedPatch<'_>,
    registry: &BlockRegistry,
    ir: &mut IrBuilder,
) -> Result<p3_time_topology::TimeTopology, Vec<CompileError>> {
    p3_time_topology::resolve(normalized, registry, ir)
}

#[instrument(level = "trace", name = "compile::pass4", skip_all)]
fn dep_graph_span(normalized: &p1_normalize::NormalizedPatch<'_>) -> p4_dep_graph::DepGraph {
    p4_dep_graph::build(normalized)
}

#[instrument(level = "trace", name = "compile::pass5", skip_all)]
fn scc_span(
    normalized: &p1_normalize::NormalizedPatch<'_>,
    graph: &p4_dep_graph::DepGraph,
    registry: &BlockRegistry,
) -> Result<p5_scc::SccResult, Vec<CompileError>> {
    p5_scc::check(normalized, graph, registry)
}

#[instrument(level = "trace", name = "compile::pass6", skip_all)]
#[allow(clippy::too_many_arguments)]
fn lowering_span(
    normalized: &p1_normalize::NormalizedPatch<'_>,
    registry: &BlockRegistry,
    type_graph: &p2_type_graph::TypeGraph,
    scc: &p5_scc::SccResult,
    time: &p3_time_topology::TimeTopology,
    ir: &mut IrBuilder,
    seed: u32,
) -> Result<p6_lowering::LoweringResult, Vec<CompileError>> {
    p6_lowering::run(normalized, registry, type_graph, scc, time, ir, seed)
}

#[instrument(level = "trace", name = "compile::pass8", skip_all)]
#[allow(clippy::too_many_arguments)]
fn schedule_build_span(
    ir: &IrBuilder,
    lowering: p6_lowering::LoweringResult,
    time: &p3_time_topology::TimeTopology,
    patch_seed: u32,
    source_block_count: u32,
    source_edge_count: u32,
) -> CompiledProgram {
    p8_schedule_build::build(ir, lowering, time, patch_seed, source_block_count, source_edge_count, Vec::new())
}
