// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 8: ScheduleBuild. Assembles the linear, phase-partitioned [`Schedule`]
//! and final [`CompiledProgram`] from everything passes 3/6/7 produced
//! (spec.md §3.3, §4.8).

use crate::compiled_program::{CompiledProgram, DebugIndex, DebugIndexEntry, ProgramMeta, StateSlotMeta, StateTable};
use crate::domain::DomainTable;
use crate::error::CompileWarning;
use crate::ir_builder::IrBuilder;
use crate::passes::p3_time_topology::TimeTopology;
use crate::passes::p6_lowering::LoweringResult;
use crate::schedule::{Schedule, Step};

/// Builds the final `CompiledProgram` from a completed lowering.
#[must_use]
pub fn build(
    ir: &IrBuilder,
    lowering: LoweringResult,
    time: &TimeTopology,
    patch_seed: u32,
    source_block_count: u32,
    source_edge_count: u32,
    mut warnings: Vec<CompileWarning>,
) -> CompiledProgram {
    let mut schedule = Schedule::default();

    schedule.push(Step::TimeDerive {
        time_model: time.time_model,
        t_abs_ms: time.slots.t_abs_ms,
        t_model_ms: time.slots.t_model_ms,
        progress01: time.slots.progress01,
        end_event: time.slots.end_event,
    });

    // `BusCombine` steps are interleaved into the `SigEval` stream at the
    // position pass 6 recorded as each bus's last publisher completing
    // (`bus_ready_at`), never dumped in afterward: a lens chain on a bus tap
    // lowers to further `SigEval` nodes that must run after the combine they
    // read from, and those nodes are interspersed throughout `ir.sigs.nodes`
    // rather than confined to its tail.
    let mut bus_events: Vec<(usize, &crate::ident::BusId)> =
        lowering.bus_ready_at.iter().map(|(bus, &at)| (at, bus)).collect();
    bus_events.sort_by_key(|(at, _)| *at);
    let mut bus_events = bus_events.into_iter().peekable();

    let push_bus_combine = |schedule: &mut Schedule, bus_id: &crate::ident::BusId| {
        let writers = lowering.bus_writers.get(bus_id).cloned().unwrap_or_default();
        let slot = lowering.bus_slots[bus_id];
        let (combine_mode, default) = lowering
            .bus_meta
            .get(bus_id)
            .cloned()
            .unwrap_or((crate::graph::CombineMode::Last, None));
        schedule.push(Step::BusCombine { bus: bus_id.clone(), writers, slot, combine_mode, default });
    };

    for (i, &(_, slot)) in ir.sigs.nodes.iter().enumerate() {
        while bus_events.peek().is_some_and(|&(at, _)| at <= i) {
            if let Some((_, bus_id)) = bus_events.next() {
                push_bus_combine(&mut schedule, bus_id);
            }
        }
        schedule.push(Step::SigEval { expr: crate::ir::SigExprId(i as u32), slot });
    }
    for (_, bus_id) in bus_events {
        push_bus_combine(&mut schedule, bus_id);
    }

    for plan in &lowering.render_plans {
        for buf in &plan.buffers {
            schedule.push(Step::FieldMaterialize {
                expr: buf.field,
                domain: buf.domain,
                format: buf.format,
                buffer_tag: buf.name.clone(),
            });
        }
        schedule.push(Step::RenderAssemble { sink: plan.sink, plan: plan.clone() });
    }

    for (probe_id, slot, _owner) in &lowering.debug_entries {
        schedule.push(Step::DebugProbe { slot: *slot, probe_id: probe_id.clone() });
    }

    schedule.finalize_phase_order();

    warnings.extend(lowering.warnings);

    let state_table = StateTable {
        slots: lowering
            .state_meta
            .into_iter()
            .map(|(state, scrub_policy, owner_block, anchor)| StateSlotMeta { state, scrub_policy, owner_block, anchor })
            .collect(),
    };

    let debug_index = DebugIndex {
        entries: lowering
            .debug_entries
            .into_iter()
            .map(|(probe_id, slot, owner_block)| DebugIndexEntry { probe_id, slot, owner_block })
            .collect(),
    };

    CompiledProgram {
        meta: ProgramMeta { patch_seed, source_block_count, source_edge_count },
        types: ir.types.clone(),
        consts: ir.consts.clone(),
        sigs: ir.sigs.clone(),
        fields: ir.fields.clone(),
        domains: DomainTable::from_populations(ir.domains().to_vec()),
        schedule,
        state_table,
        debug_index,
        time_model: time.time_model,
        warnings,
    }
}
