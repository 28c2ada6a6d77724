// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-frame runtime: walks a [`CompiledProgram`]'s schedule once per
//! frame, evaluating signals, combining buses, materializing fields, and
//! assembling render passes (spec.md §4.9).

pub mod buffer_pool;
pub mod debug;
pub mod field;
pub mod hotswap;
pub mod render;
pub mod state;
pub mod time;
pub mod value;

use tracing::{instrument, trace};

use crate::compiled_program::CompiledProgram;
use crate::error::ExecError;
use crate::executor::buffer_pool::{BufferPool, FrameBuffers};
use crate::executor::debug::TraceController;
use crate::executor::field::FieldCache;
use crate::executor::render::{RenderFrameIR, RenderPassIR};
use crate::executor::state::StateStore;
use crate::executor::time::TimeState;
use crate::executor::value::{combine_values, eval_map, eval_mix, eval_zip, hue_shift_rgba, rotate2d, Value, ValueStore};
use crate::ir::SignalExpr;
use crate::schedule::Step;

/// Owns a compiled program's mutable runtime state and drives it one frame
/// at a time. `value.rs`/`time.rs`/`state.rs`/`field.rs` hold the pure
/// evaluation logic this type dispatches to; this module is just the
/// schedule walk spec.md §4.9 describes.
pub struct ScheduleExecutor {
    program: CompiledProgram,
    values: ValueStore,
    state: StateStore,
    pool: BufferPool,
    time: TimeState,
    trace: TraceController,
    frame_id: u64,
    last_frame: Option<RenderFrameIR>,
}

impl ScheduleExecutor {
    /// Builds an executor for `program`, with fresh value/state stores.
    #[must_use]
    pub fn new(program: CompiledProgram) -> Self {
        let values = ValueStore::new(program.types.len());
        let state = StateStore::new(program.state_table.slots.len());
        Self {
            program,
            values,
            state,
            pool: BufferPool::with_default_capacity(),
            time: TimeState::new(),
            trace: TraceController::new(),
            frame_id: 0,
            last_frame: None,
        }
    }

    /// The program this executor is running.
    #[must_use]
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Mutable access to the trace controller, for a caller to arm or
    /// disarm debug probes between frames.
    pub fn trace_mut(&mut self) -> &mut TraceController {
        &mut self.trace
    }

    /// Replaces the running program across a hot-swap, migrating state by
    /// anchor (spec.md §4.13). Returns the swap classification and any
    /// parked-binding warnings for the caller to surface.
    pub fn hot_swap(&mut self, new_program: CompiledProgram) -> hotswap::SwapResult {
        let (new_state, result) = hotswap::migrate(&self.program.state_table, &self.state, &new_program.state_table);
        self.values = ValueStore::new(new_program.types.len());
        self.state = new_state;
        self.program = new_program;
        result
    }

    /// Runs one frame at `t_abs_ms`, returning its assembled render output.
    ///
    /// # Errors
    /// Returns [`ExecError::PoolExhausted`] if a field materialize step
    /// cannot acquire its buffer; the caller should re-present the last
    /// successful frame (spec.md §7).
    #[instrument(level = "trace", skip(self))]
    pub fn run_frame(&mut self, t_abs_ms: f64) -> Result<RenderFrameIR, ExecError> {
        self.frame_id += 1;

        if self.time.is_scrub(t_abs_ms) {
            trace!(frame_id = self.frame_id, t_abs_ms, "scrub detected, resetting scoped state");
            self.state.scrub(&self.program.state_table);
        }

        let mut frame_buffers = FrameBuffers::new();
        let mut field_cache = FieldCache::new();
        let mut passes = Vec::new();

        // Schedule steps are taken out of `self` for the loop's duration so
        // `run_step` can freely borrow `self` mutably; put back before
        // returning on every exit path, successful or not.
        let steps = std::mem::take(&mut self.program.schedule.steps);
        let mut failure = None;
        for step in &steps {
            match self.run_step(step, &mut frame_buffers, &mut field_cache, t_abs_ms) {
                Ok(Some(pass)) => passes.push(pass),
                Ok(None) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.program.schedule.steps = steps;

        frame_buffers.release_all(&mut self.pool);
        if let Some(err) = failure {
            return Err(err);
        }

        let frame = RenderFrameIR { frame_id: self.frame_id, passes };
        self.last_frame = Some(frame.clone());
        Ok(frame)
    }

    /// The last successfully produced frame, for a caller to re-present
    /// after a [`ExecError::PoolExhausted`] (spec.md §7).
    #[must_use]
    pub fn last_frame(&self) -> Option<&RenderFrameIR> {
        self.last_frame.as_ref()
    }

    fn run_step(
        &mut self,
        step: &Step,
        frame_buffers: &mut FrameBuffers,
        field_cache: &mut FieldCache,
        t_abs_ms: f64,
    ) -> Result<Option<RenderPassIR>, ExecError> {
        match step {
            Step::TimeDerive { time_model, t_abs_ms: slot_abs, t_model_ms, progress01, end_event } => {
                let out = self.time.resolve(*time_model, t_abs_ms);
                self.values.set(*slot_abs, Value::Float(out.t_abs_ms));
                self.values.set(*t_model_ms, Value::Float(out.t_model_ms));
                if let (Some(slot), Some(p)) = (progress01, out.progress01) {
                    self.values.set(*slot, Value::Float(p));
                }
                if let (Some(slot), Some(e)) = (end_event, out.end_event) {
                    self.values.set(*slot, Value::Bool(e));
                }
                Ok(None)
            }
            Step::SigEval { expr, slot } => {
                let value = self.eval_signal(*expr, field_cache);
                self.values.set(*slot, value);
                Ok(None)
            }
            Step::BusCombine { writers, slot, combine_mode, default, .. } => {
                let values: Vec<Value> = writers.iter().map(|&s| self.values.get(s)).collect();
                let default_value =
                    default.as_ref().map_or(Value::default(), |&c| Value::from_const(self.program.consts.get(c)));
                self.values.set(*slot, combine_values(combine_mode, &values, default_value));
                Ok(None)
            }
            Step::FieldMaterialize { expr, domain, format, buffer_tag } => {
                let buf = field::eval(*expr, *domain, &self.program, &self.values, field_cache);
                let population = self.program.domains.population(*domain);
                let mut bytes = self.pool.acquire(*format, population)?;
                field::encode_into(&buf, *format, &mut bytes);
                frame_buffers.insert(buffer_tag.clone(), *format, bytes);
                Ok(None)
            }
            Step::RenderAssemble { plan, .. } => {
                let pass = render::assemble(plan, frame_buffers, &self.values, &self.program.domains);
                Ok(Some(pass))
            }
            Step::DebugProbe { slot, probe_id } => {
                if self.trace.is_enabled() {
                    let value = self.values.get(*slot);
                    self.trace.record(probe_id, self.frame_id, value);
                }
                Ok(None)
            }
        }
    }

    /// Evaluates one node of the signal expression DAG.
    ///
    /// `TimeAbs`/`TimeModel`/`Phase01` are never actually constructed by any
    /// lowering pass (pass 3 allocates the canonical time slots directly and
    /// every reader references the slot, not the signal node), but they stay
    /// matched here so this dispatcher is exhaustive against [`SignalExpr`]
    /// rather than silently wrong if a future pass starts emitting them.
    fn eval_signal(&mut self, expr: crate::ir::SigExprId, field_cache: &mut FieldCache) -> Value {
        let node = self.program.sigs.get(expr).0.clone();
        match node {
            SignalExpr::Const(c) => Value::from_const(self.program.consts.get(c)),
            SignalExpr::TimeAbs => unreachable!("TimeAbs is never lowered; pass 3 writes its slot directly"),
            SignalExpr::TimeModel => unreachable!("TimeModel is never lowered; pass 3 writes its slot directly"),
            SignalExpr::Phase01 => unreachable!("Phase01 is never lowered; pass 3 writes its slot directly"),
            SignalExpr::Zip(op, a, b) => eval_zip(op, self.values.get(a), self.values.get(b)),
            SignalExpr::Map(op, a) => eval_map(op, self.values.get(a)),
            SignalExpr::Mix(cond, a, b) => eval_mix(self.values.get(cond).as_bool(), self.values.get(a), self.values.get(b)),
            SignalExpr::ReduceField(reducer, field_expr, domain) => {
                let buf = field::eval(field_expr, domain, &self.program, &self.values, field_cache);
                field::reduce(&buf, reducer)
            }
            SignalExpr::StateRead(id) => self.state.read(id),
            SignalExpr::StateWrite(id, src) => {
                let value = self.values.get(src);
                self.state.write(id, value);
                value
            }
            SignalExpr::Splat2(src) => {
                let x = self.values.get(src).as_float();
                Value::Vec2([x, x])
            }
            SignalExpr::Rotate2d(src, radians) => Value::Vec2(rotate2d(self.values.get(src).as_vec2(), radians)),
            SignalExpr::HueShiftColor(src, degrees) => Value::Color(hue_shift_rgba(self.values.get(src).as_color(), degrees)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled_program::{DebugIndex, ProgramMeta, StateTable};
    use crate::domain::DomainTable;
    use crate::graph::TimeModel;
    use crate::ir::{ConstPool, FieldArena, Op, SignalArena, TypeTable, ValueSlot};
    use crate::schedule::Schedule;
    use crate::types::{Domain, TypeDesc, World};

    fn minimal_program() -> CompiledProgram {
        let mut types = TypeTable::default();
        let t_abs = types.alloc(TypeDesc::new(World::Signal, Domain::Duration));
        let t_model = types.alloc(TypeDesc::new(World::Signal, Domain::Duration));
        let const_slot = types.alloc(TypeDesc::new(World::Signal, Domain::Float));
        let doubled = types.alloc(TypeDesc::new(World::Signal, Domain::Float));

        let mut consts = ConstPool::default();
        let two = consts.intern(crate::ir::TypedConst::Float(2.0));

        let mut sigs = SignalArena::default();
        sigs.push(SignalExpr::Const(two), const_slot);
        sigs.push(SignalExpr::Zip(Op::Mul, t_model, const_slot), doubled);

        let mut schedule = Schedule::default();
        schedule.push(Step::TimeDerive {
            time_model: TimeModel::Infinite { window_ms: 1000.0 },
            t_abs_ms: t_abs,
            t_model_ms: t_model,
            progress01: None,
            end_event: None,
        });
        schedule.push(Step::SigEval { expr: crate::ir::SigExprId(0), slot: const_slot });
        schedule.push(Step::SigEval { expr: crate::ir::SigExprId(1), slot: doubled });
        schedule.finalize_phase_order();

        CompiledProgram {
            meta: ProgramMeta { patch_seed: 0, source_block_count: 0, source_edge_count: 0 },
            types,
            consts,
            sigs,
            fields: FieldArena::default(),
            domains: DomainTable::from_populations(vec![]),
            schedule,
            state_table: StateTable::default(),
            debug_index: DebugIndex::default(),
            time_model: TimeModel::Infinite { window_ms: 1000.0 },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn run_frame_evaluates_signals_in_schedule_order() {
        let mut exec = ScheduleExecutor::new(minimal_program());
        let frame = exec.run_frame(21.0).unwrap();
        assert_eq!(frame.frame_id, 1);
        assert_eq!(exec.values.get(ValueSlot(3)).as_float(), 42.0);
    }

    #[test]
    fn scrub_is_detected_on_a_backward_jump() {
        let mut exec = ScheduleExecutor::new(minimal_program());
        exec.run_frame(100.0).unwrap();
        exec.run_frame(50.0).unwrap();
        assert!(exec.time.is_scrub(25.0));
    }
}
