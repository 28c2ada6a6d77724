// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `IRBuilder`: the shared construction surface lowering functions call
//! (spec.md §4.6). Owns the arenas that become part of the final
//! [`crate::compiled_program::CompiledProgram`].

use crate::graph::{CombineMode, ReducerKind};
use crate::ir::{
    ConstId, ConstPool, DomainId, FieldArena, FieldExpr, FieldExprId, Op, SignalArena, SignalExpr,
    StateId, TypeTable, TypedConst, ValueSlot,
};
use crate::types::TypeDesc;

/// Canonical time slots allocated by pass 3 (spec.md §4.4). Lowering
/// functions read these instead of re-deriving time.
#[derive(Clone, Copy, Debug)]
pub struct TimeSlots {
    /// `tAbsMs`, the frame's absolute input time.
    pub t_abs_ms: ValueSlot,
    /// `tModelMs`, time after `TimeModel` resolution.
    pub t_model_ms: ValueSlot,
    /// `progress01`, only present for a `Finite` `TimeRoot`.
    pub progress01: Option<ValueSlot>,
    /// `endEvent`, only present for a `Finite` `TimeRoot`.
    pub end_event: Option<ValueSlot>,
}

/// Owns the IR arenas and exposes the construction methods block and
/// transform lowering functions call (`sigConst`, `sigZip`, `fieldBroadcast`,
/// `allocValueSlot`, `allocStateId`, ... per spec.md §4.6).
#[derive(Default)]
pub struct IrBuilder {
    /// Interned typed constants.
    pub consts: ConstPool,
    /// Slot -> type map.
    pub types: TypeTable,
    /// Signal expression arena.
    pub sigs: SignalArena,
    /// Field expression arena.
    pub fields: FieldArena,
    /// Population of each allocated domain, indexed by `DomainId`.
    domains: Vec<u32>,
    state_count: u32,
}

impl IrBuilder {
    /// Allocates a fresh, uninitialized value slot of the given type.
    pub fn alloc_value_slot(&mut self, ty: TypeDesc) -> ValueSlot {
        self.types.alloc(ty)
    }

    /// Allocates a fresh domain (element population) handle of the given
    /// fixed element count.
    pub fn alloc_domain(&mut self, population: u32) -> DomainId {
        let id = DomainId(self.domains.len() as u32);
        self.domains.push(population);
        id
    }

    /// The element population of a previously allocated domain.
    #[must_use]
    pub fn domain_population(&self, id: DomainId) -> u32 {
        self.domains[id.0 as usize]
    }

    /// All allocated domains' populations, indexed by `DomainId`.
    #[must_use]
    pub fn domains(&self) -> &[u32] {
        &self.domains
    }

    /// Allocates a fresh state slot for a `stateful`-flagged block.
    pub fn alloc_state_id(&mut self) -> StateId {
        let id = StateId(self.state_count);
        self.state_count += 1;
        id
    }

    /// Total number of state slots allocated so far.
    #[must_use]
    pub fn state_count(&self) -> u32 {
        self.state_count
    }

    /// Interns a float constant.
    pub fn const_float(&mut self, v: f64) -> ConstId {
        self.consts.intern(TypedConst::Float(v))
    }

    /// Interns a vec2 constant.
    pub fn const_vec2(&mut self, v: [f64; 2]) -> ConstId {
        self.consts.intern(TypedConst::Vec2(v))
    }

    /// Interns a color constant.
    pub fn const_color(&mut self, v: [f64; 4]) -> ConstId {
        self.consts.intern(TypedConst::Color(v))
    }

    /// Interns a bool constant.
    pub fn const_bool(&mut self, v: bool) -> ConstId {
        self.consts.intern(TypedConst::Bool(v))
    }

    /// Registers a pooled constant as a signal, allocating its output slot.
    pub fn sig_const(&mut self, ty: TypeDesc, c: ConstId) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::Const(c), slot);
        slot
    }

    /// Registers a binary elementwise signal combination.
    pub fn sig_zip(&mut self, ty: TypeDesc, op: Op, a: ValueSlot, b: ValueSlot) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::Zip(op, a, b), slot);
        slot
    }

    /// Registers a unary elementwise signal map.
    pub fn sig_map(&mut self, ty: TypeDesc, op: Op, src: ValueSlot) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::Map(op, src), slot);
        slot
    }

    /// Registers a boolean-selected mix of two signals.
    pub fn sig_mix(&mut self, ty: TypeDesc, cond: ValueSlot, a: ValueSlot, b: ValueSlot) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::Mix(cond, a, b), slot);
        slot
    }

    /// Registers a read of last frame's value for a state slot.
    pub fn sig_state_read(&mut self, ty: TypeDesc, state: StateId) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::StateRead(state), slot);
        slot
    }

    /// Registers a write of this frame's value into a state slot.
    pub fn sig_state_write(&mut self, ty: TypeDesc, state: StateId, src: ValueSlot) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs.push(SignalExpr::StateWrite(state, src), slot);
        slot
    }

    /// Registers a scalar-to-`vec2` splat.
    pub fn sig_splat2(&mut self, src: ValueSlot) -> ValueSlot {
        let slot = self.alloc_value_slot(TypeDesc::new(crate::types::World::Signal, crate::types::Domain::Vec2));
        self.sigs.push(SignalExpr::Splat2(src), slot);
        slot
    }

    /// Registers a `vec2` signal rotation by a fixed angle in radians.
    pub fn sig_rotate2d(&mut self, src: ValueSlot, radians: f64) -> ValueSlot {
        let slot = self.alloc_value_slot(TypeDesc::new(crate::types::World::Signal, crate::types::Domain::Vec2));
        self.sigs.push(SignalExpr::Rotate2d(src, radians), slot);
        slot
    }

    /// Registers a color signal hue rotation by a fixed number of degrees.
    pub fn sig_hue_shift(&mut self, src: ValueSlot, degrees: f64) -> ValueSlot {
        let slot = self.alloc_value_slot(TypeDesc::new(crate::types::World::Signal, crate::types::Domain::Color));
        self.sigs.push(SignalExpr::HueShiftColor(src, degrees), slot);
        slot
    }

    /// Registers a field-to-signal reduction.
    pub fn sig_reduce_field(
        &mut self,
        ty: TypeDesc,
        reducer: ReducerKind,
        field: FieldExprId,
        domain: DomainId,
    ) -> ValueSlot {
        let slot = self.alloc_value_slot(ty);
        self.sigs
            .push(SignalExpr::ReduceField(reducer, field, domain), slot);
        slot
    }

    /// Registers a field that replicates a constant across every element.
    pub fn field_const(&mut self, c: ConstId) -> FieldExprId {
        self.fields.push(FieldExpr::Const(c))
    }

    /// Registers a field that broadcasts a signal's value across a domain.
    pub fn field_broadcast(&mut self, sig: ValueSlot, domain: DomainId) -> FieldExprId {
        self.fields.push(FieldExpr::BroadcastSig(sig, domain))
    }

    /// Registers a deterministic per-element hash field.
    pub fn field_hash01(&mut self, domain: DomainId, seed: u64) -> FieldExprId {
        self.fields.push(FieldExpr::Hash01ById(domain, seed))
    }

    /// Registers a regular-grid position field.
    #[allow(clippy::too_many_arguments)]
    pub fn field_pos_grid(
        &mut self,
        domain: DomainId,
        rows: u32,
        cols: u32,
        spacing: f64,
        origin: [f64; 2],
    ) -> FieldExprId {
        self.fields.push(FieldExpr::PosGrid {
            domain,
            rows,
            cols,
            spacing,
            origin,
        })
    }

    /// Registers a unary elementwise field map.
    pub fn field_map(&mut self, op: Op, src: FieldExprId) -> FieldExprId {
        self.fields.push(FieldExpr::Map(op, src))
    }

    /// Registers a binary elementwise field combination.
    pub fn field_zip(&mut self, op: Op, a: FieldExprId, b: FieldExprId) -> FieldExprId {
        self.fields.push(FieldExpr::Zip(op, a, b))
    }

    /// Registers a multi-term field combine under a bus-style combine mode.
    pub fn field_combine(&mut self, mode: CombineMode, terms: Vec<FieldExprId>) -> FieldExprId {
        self.fields.push(FieldExpr::Combine(mode, terms))
    }

    /// Registers a `vec2` field rotation by a fixed angle in radians.
    pub fn field_rotate2d(&mut self, src: FieldExprId, radians: f64) -> FieldExprId {
        self.fields.push(FieldExpr::Rotate2d(src, radians))
    }

    /// Registers a color field hue rotation by a fixed number of degrees.
    pub fn field_hue_shift(&mut self, src: FieldExprId, degrees: f64) -> FieldExprId {
        self.fields.push(FieldExpr::HueShiftColor(src, degrees))
    }
}
