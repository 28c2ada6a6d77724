// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end scenario coverage built directly on `IrBuilder` and
//! hand-assembled `CompiledProgram`s, bypassing the block registry. Each
//! scenario exercises one runtime behavior (signal math, field
//! materialization, bus combine, stateful scrub, hot swap) without
//! depending on any particular block's exact parameter/port names.

use loomcast_core::compiled_program::{CompiledProgram, DebugIndex, ProgramMeta, StateSlotMeta, StateTable};
use loomcast_core::domain::DomainTable;
use loomcast_core::executor::hotswap::SwapKind;
use loomcast_core::executor::ScheduleExecutor;
use loomcast_core::graph::{CombineMode, ScrubPolicy, TimeModel};
use loomcast_core::ident::{BlockId, BusId};
use loomcast_core::ir::{Op, SigExprId};
use loomcast_core::ir_builder::IrBuilder;
use loomcast_core::schedule::{BufferFormat, BufferRequest, RenderPlan, Schedule, SinkType, Step, UniformRequest};
use loomcast_core::types::{Domain, TypeDesc, World};

/// Pushes one `SigEval` step per node in `b.sigs`, in arena order. Every
/// scenario below builds its signal chain with calls in dependency order, so
/// arena order and evaluation order coincide (same convention the executor's
/// own `minimal_program` test helper uses).
fn push_all_sig_evals(b: &IrBuilder, schedule: &mut Schedule, count: u32) {
    for i in 0..count {
        let id = SigExprId(i);
        let (_, slot) = b.sigs.get(id);
        schedule.push(Step::SigEval { expr: id, slot: *slot });
    }
}

fn float_ty() -> TypeDesc {
    TypeDesc::new(World::Signal, Domain::Float)
}

fn duration_ty() -> TypeDesc {
    TypeDesc::new(World::Signal, Domain::Duration)
}

/// S2: an oscillator (`sin(2*pi*phase)`) scaled and offset, computed purely
/// from `tModelMs` with no state — `5*sin(2*pi*(tModelMs/period)) + 10`.
fn oscillator_program() -> CompiledProgram {
    let mut b = IrBuilder::default();
    let t_abs = b.alloc_value_slot(duration_ty());
    let t_model = b.alloc_value_slot(duration_ty());

    let period_c = b.const_float(1000.0);
    let period = b.sig_const(float_ty(), period_c);
    let tau_c = b.const_float(std::f64::consts::TAU);
    let tau = b.sig_const(float_ty(), tau_c);
    let scale_c = b.const_float(5.0);
    let scale = b.sig_const(float_ty(), scale_c);
    let offset_c = b.const_float(10.0);
    let offset = b.sig_const(float_ty(), offset_c);

    let raw_phase = b.sig_zip(float_ty(), Op::Div, t_model, period);
    let phase01 = b.sig_map(TypeDesc::new(World::Signal, Domain::Phase), Op::Fract, raw_phase);
    let angle = b.sig_zip(float_ty(), Op::Mul, phase01, tau);
    let osc = b.sig_map(float_ty(), Op::Sin, angle);
    let scaled = b.sig_zip(float_ty(), Op::Mul, osc, scale);
    let result = b.sig_zip(float_ty(), Op::Add, scaled, offset);

    let populations = b.domains().to_vec();

    let mut schedule = Schedule::default();
    schedule.push(Step::TimeDerive {
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        t_abs_ms: t_abs,
        t_model_ms: t_model,
        progress01: None,
        end_event: None,
    });
    push_all_sig_evals(&b, &mut schedule, 10);
    schedule.push(Step::DebugProbe { slot: result, probe_id: "osc".to_string() });
    schedule.finalize_phase_order();

    CompiledProgram {
        meta: ProgramMeta { patch_seed: 0, source_block_count: 1, source_edge_count: 0 },
        types: b.types,
        consts: b.consts,
        sigs: b.sigs,
        fields: b.fields,
        domains: DomainTable::from_populations(populations),
        schedule,
        state_table: StateTable::default(),
        debug_index: DebugIndex::default(),
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        warnings: Vec::new(),
    }
}

/// Same oscillator as [`oscillator_program`], but its result also drives a
/// render pass's sole uniform, over a single-element domain with no
/// buffers — enough to give invariant 8 a `RenderFrameIR` worth comparing.
fn oscillating_render_program() -> CompiledProgram {
    let mut program = oscillator_program();
    let domain = DomainTable::from_populations(vec![1]);
    program.domains = domain;

    let result_slot = match program.schedule.steps.iter().find_map(|s| match s {
        Step::DebugProbe { slot, probe_id } if probe_id == "osc" => Some(*slot),
        _ => None,
    }) {
        Some(slot) => slot,
        None => unreachable!("oscillator_program always emits an \"osc\" debug probe"),
    };

    program.schedule.push(Step::RenderAssemble {
        sink: SinkType::Instances2d,
        plan: RenderPlan {
            sink: SinkType::Instances2d,
            instance_domain: loomcast_core::ir::DomainId(0),
            buffers: Vec::new(),
            uniforms: vec![UniformRequest { name: "osc".to_string(), slot: result_slot }],
        },
    });
    program.schedule.finalize_phase_order();
    program
}

#[test]
fn s2_oscillator_scale_matches_expected_value_at_quarter_period() {
    let mut exec = ScheduleExecutor::new(oscillator_program());
    exec.trace_mut().set_enabled(true);
    exec.run_frame(250.0).unwrap();
    let value = exec.trace_mut().get("osc").unwrap().value.as_float();
    assert!((value - 15.0).abs() < 1e-9, "expected 5*sin(pi/2)+10 = 15.0, got {value}");
}

/// S3: a 3x3 position grid, spacing 10, origin at the patch origin.
fn grid_program() -> CompiledProgram {
    let mut b = IrBuilder::default();
    let domain = b.alloc_domain(9);
    let pos_field = b.field_pos_grid(domain, 3, 3, 10.0, [0.0, 0.0]);
    let populations = b.domains().to_vec();

    let t_abs = b.alloc_value_slot(duration_ty());
    let t_model = b.alloc_value_slot(duration_ty());

    let mut schedule = Schedule::default();
    schedule.push(Step::TimeDerive {
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        t_abs_ms: t_abs,
        t_model_ms: t_model,
        progress01: None,
        end_event: None,
    });
    schedule.push(Step::FieldMaterialize {
        expr: pos_field,
        domain,
        format: BufferFormat::Vec2F32,
        buffer_tag: "pos".to_string(),
    });
    schedule.push(Step::RenderAssemble {
        sink: SinkType::Instances2d,
        plan: RenderPlan {
            sink: SinkType::Instances2d,
            instance_domain: domain,
            buffers: vec![BufferRequest {
                name: "pos".to_string(),
                field: pos_field,
                domain,
                format: BufferFormat::Vec2F32,
            }],
            uniforms: Vec::new(),
        },
    });
    schedule.finalize_phase_order();

    CompiledProgram {
        meta: ProgramMeta { patch_seed: 0, source_block_count: 1, source_edge_count: 0 },
        types: b.types,
        consts: b.consts,
        sigs: b.sigs,
        fields: b.fields,
        domains: DomainTable::from_populations(populations),
        schedule,
        state_table: StateTable::default(),
        debug_index: DebugIndex::default(),
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        warnings: Vec::new(),
    }
}

#[test]
fn s3_grid_render_produces_expected_positions() {
    let mut exec = ScheduleExecutor::new(grid_program());
    let frame = exec.run_frame(0.0).unwrap();
    assert_eq!(frame.passes.len(), 1);
    let pass = &frame.passes[0];
    assert_eq!(pass.instance_count, 9);
    assert_eq!(pass.buffers.len(), 1);
    let (name, bytes) = &pass.buffers[0];
    assert_eq!(name, "pos");
    let floats: &[f32] = bytemuck::cast_slice(bytes);
    let expected: [f32; 18] =
        [0.0, 0.0, 10.0, 0.0, 20.0, 0.0, 0.0, 10.0, 10.0, 10.0, 20.0, 10.0, 0.0, 20.0, 10.0, 20.0, 20.0, 20.0];
    assert_eq!(floats, &expected);
}

/// S4: two bus publishers, `0.3` and `0.7`, combined under `Sum`.
fn bus_combine_program() -> CompiledProgram {
    let mut b = IrBuilder::default();
    let t_abs = b.alloc_value_slot(duration_ty());
    let t_model = b.alloc_value_slot(duration_ty());

    let a_c = b.const_float(0.3);
    let a = b.sig_const(float_ty(), a_c);
    let c_c = b.const_float(0.7);
    let c = b.sig_const(float_ty(), c_c);
    let bus_out = b.alloc_value_slot(float_ty());

    let populations = b.domains().to_vec();

    let mut schedule = Schedule::default();
    schedule.push(Step::TimeDerive {
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        t_abs_ms: t_abs,
        t_model_ms: t_model,
        progress01: None,
        end_event: None,
    });
    push_all_sig_evals(&b, &mut schedule, 2);
    schedule.push(Step::BusCombine {
        bus: BusId("mix".to_string()),
        writers: vec![a, c],
        slot: bus_out,
        combine_mode: CombineMode::Sum,
        default: None,
    });
    schedule.push(Step::DebugProbe { slot: bus_out, probe_id: "bus".to_string() });
    schedule.finalize_phase_order();

    CompiledProgram {
        meta: ProgramMeta { patch_seed: 0, source_block_count: 2, source_edge_count: 0 },
        types: b.types,
        consts: b.consts,
        sigs: b.sigs,
        fields: b.fields,
        domains: DomainTable::from_populations(populations),
        schedule,
        state_table: StateTable::default(),
        debug_index: DebugIndex::default(),
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        warnings: Vec::new(),
    }
}

#[test]
fn s4_bus_sum_combine_adds_publishers() {
    let mut exec = ScheduleExecutor::new(bus_combine_program());
    exec.trace_mut().set_enabled(true);
    exec.run_frame(0.0).unwrap();
    let value = exec.trace_mut().get("bus").unwrap().value.as_float();
    assert!((value - 1.0).abs() < 1e-9, "expected 0.3 + 0.7 = 1.0, got {value}");
}

/// S5/S6: a `stateBoundary` integrator, `acc' = read(acc) + delta`, with a
/// `Reset` scrub policy and a caller-supplied anchor so two instances can
/// simulate a hot swap.
fn integrator_program(delta: f64, anchor: [u8; 32]) -> CompiledProgram {
    let mut b = IrBuilder::default();
    let t_abs = b.alloc_value_slot(duration_ty());
    let t_model = b.alloc_value_slot(duration_ty());

    let state_id = b.alloc_state_id();
    let read_slot = b.sig_state_read(float_ty(), state_id);
    let delta_c = b.const_float(delta);
    let delta_slot = b.sig_const(float_ty(), delta_c);
    let sum = b.sig_zip(float_ty(), Op::Add, read_slot, delta_slot);
    let write_slot = b.sig_state_write(float_ty(), state_id, sum);

    let populations = b.domains().to_vec();

    let mut schedule = Schedule::default();
    schedule.push(Step::TimeDerive {
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        t_abs_ms: t_abs,
        t_model_ms: t_model,
        progress01: None,
        end_event: None,
    });
    push_all_sig_evals(&b, &mut schedule, 4);
    schedule.push(Step::DebugProbe { slot: write_slot, probe_id: "acc".to_string() });
    schedule.finalize_phase_order();

    CompiledProgram {
        meta: ProgramMeta { patch_seed: 0, source_block_count: 1, source_edge_count: 0 },
        types: b.types,
        consts: b.consts,
        sigs: b.sigs,
        fields: b.fields,
        domains: DomainTable::from_populations(populations),
        schedule,
        state_table: StateTable {
            slots: vec![StateSlotMeta {
                state: state_id,
                scrub_policy: ScrubPolicy::Reset,
                owner_block: BlockId("integ".to_string()),
                anchor,
            }],
        },
        debug_index: DebugIndex::default(),
        time_model: TimeModel::Infinite { window_ms: 1000.0 },
        warnings: Vec::new(),
    }
}

#[test]
fn s5_scrub_resets_integrator_state() {
    let mut exec = ScheduleExecutor::new(integrator_program(1.0, [1u8; 32]));
    exec.trace_mut().set_enabled(true);

    exec.run_frame(0.0).unwrap();
    assert!((exec.trace_mut().get("acc").unwrap().value.as_float() - 1.0).abs() < 1e-9);

    exec.run_frame(16.0).unwrap();
    assert!((exec.trace_mut().get("acc").unwrap().value.as_float() - 2.0).abs() < 1e-9);

    // Backward jump: a scrub, so the integrator's Reset policy snaps it back
    // to its initial value before this frame accumulates.
    exec.run_frame(5.0).unwrap();
    let value = exec.trace_mut().get("acc").unwrap().value.as_float();
    assert!((value - 1.0).abs() < 1e-9, "scrub should reset the accumulator, not continue from 2.0, got {value}");
}

#[test]
fn s6_hot_swap_preserves_state_by_anchor() {
    let anchor = [9u8; 32];
    let mut exec = ScheduleExecutor::new(integrator_program(1.0, anchor));
    exec.trace_mut().set_enabled(true);

    exec.run_frame(0.0).unwrap();
    exec.run_frame(16.0).unwrap();
    exec.run_frame(32.0).unwrap();
    let before = exec.trace_mut().get("acc").unwrap().value.as_float();
    assert!((before - 3.0).abs() < 1e-9);

    let result = exec.hot_swap(integrator_program(2.0, anchor));
    assert_eq!(result.kind, SwapKind::Compatible);
    assert!(result.warnings.is_empty());

    exec.run_frame(48.0).unwrap();
    let after = exec.trace_mut().get("acc").unwrap().value.as_float();
    assert!((after - 5.0).abs() < 1e-9, "state should carry across the swap: 3.0 preserved + delta 2.0 = 5.0, got {after}");
}

#[test]
fn invariant8_replaying_from_an_earlier_frame_matches_a_direct_execute() {
    let mut exec_a = ScheduleExecutor::new(oscillating_render_program());
    exec_a.run_frame(250.0).unwrap();
    let frame_a = exec_a.run_frame(500.0).unwrap();

    let mut exec_b = ScheduleExecutor::new(oscillating_render_program());
    let frame_b = exec_b.run_frame(500.0).unwrap();

    assert_eq!(frame_a.passes, frame_b.passes, "a stateless derived-time block must render identically at the same tAbsMs regardless of prior frames");
}
