// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Block registry contract (spec.md §6): every registered block type
//! supplies exactly one lowering function to IR. There is no fallback path.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::error::CompileError;
use crate::graph::{ParamValue, ScrubPolicy};
use crate::ident::PortId;
use crate::ir::{StateId, ValueRef};
use crate::ir_builder::{IrBuilder, TimeSlots};
use crate::schedule::RenderPlan;
use crate::types::TypeDesc;

/// Builds a [`PortId`] from a string literal; used throughout built-in block
/// declarations.
#[must_use]
pub fn port(id: &str) -> PortId {
    PortId(id.to_string())
}

/// The capability a block declares, gating which non-pure effects it may
/// have (spec.md §9 "closed primitive set + capability tags").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    /// Declares the patch's `TimeModel` (exactly one per patch).
    Time,
    /// No special capability; participates in cycles only via plain deps.
    Identity,
    /// Allocates a state slot and may mediate a cycle (§4.5 `stateBoundary`).
    State,
    /// Consumes buffers/uniforms and emits a `RenderAssemble` step.
    Render,
    /// Reads external assets at compile time (never at frame time).
    Io,
    /// A pure, stateless function of its inputs.
    Pure,
}

/// A declared input or output port.
#[derive(Clone, Debug)]
pub struct PortDecl {
    /// Port identifier, unique within the block.
    pub id: PortId,
    /// The port's declared type.
    pub ty: TypeDesc,
    /// For input ports with no inbound edge, what pass 0 should synthesize.
    /// `None` means the port has no default and is left unconnected (an
    /// error will surface downstream as a dangling reference if actually
    /// read).
    pub default_source: Option<DefaultSourceKind>,
}

/// What pass 0 synthesizes for an unconnected input port (spec.md §4.2).
#[derive(Clone, Copy, Debug)]
pub enum DefaultSourceKind {
    /// `DSConstSignalFloat`: a constant float signal.
    ConstSignalFloat(f64),
    /// A constant vec2 signal.
    ConstSignalVec2([f64; 2]),
    /// A constant color signal.
    ConstSignalColor([f64; 4]),
    /// A constant boolean signal.
    ConstSignalBool(bool),
    /// `DomainN`: a fixed-population domain handle.
    ConstDomain(u32),
}

/// The per-call context a lowering function receives.
pub struct LowerCtx<'a> {
    /// Shared IR construction surface.
    pub ir: &'a mut IrBuilder,
    /// The patch's per-compile settings seed.
    pub seed: u32,
    /// Canonical time slots allocated by pass 3.
    pub time: TimeSlots,
}

/// What a lowering function hands back to pass 6/7.
#[derive(Default)]
pub struct LowerOutput {
    /// Resolved output `ValueRef` per declared output port.
    pub outputs_by_id: BTreeMap<PortId, ValueRef>,
    /// Present only for render-sink blocks: the plan pass 8 turns into a
    /// `RenderAssemble` step.
    pub render_plan: Option<RenderPlan>,
    /// State slots this block allocated, tagged with their scrub policy
    /// (spec.md §4.13). Consumed when pass 8 assembles `CompiledProgram`'s
    /// state table.
    pub state_meta: Vec<(StateId, ScrubPolicy)>,
}

/// A registered block type's full declaration, including its one lowering
/// function (spec.md §4.6, §6 `BlockTypeDecl`).
pub trait BlockTypeDecl: Send + Sync {
    /// The block's registered type tag (matches `Block.type_tag`).
    fn type_tag(&self) -> &'static str;
    /// Declared input ports, in order.
    fn inputs(&self) -> &[PortDecl];
    /// Declared output ports, in order.
    fn outputs(&self) -> &[PortDecl];
    /// The block's capability tag.
    fn capability(&self) -> Capability;
    /// Whether this block type declares the patch's `TimeModel`.
    fn is_time_root(&self) -> bool {
        false
    }
    /// Whether this block type can legally mediate a cycle (spec.md §4.5).
    fn is_state_boundary(&self) -> bool {
        false
    }
    /// Lowers one block instance to IR, given its resolved input
    /// `ValueRef`s (already passed through any edge transform chain).
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError>;
}

/// Reads a float-valued param, falling back to `default` when absent.
#[must_use]
pub fn param_f64(params: &BTreeMap<String, ParamValue>, name: &str, default: f64) -> f64 {
    match params.get(name) {
        Some(ParamValue::Float(v)) => *v,
        Some(ParamValue::Int(v)) => *v as f64,
        _ => default,
    }
}

/// Reads an integer-valued param, falling back to `default` when absent.
#[must_use]
pub fn param_u32(params: &BTreeMap<String, ParamValue>, name: &str, default: u32) -> u32 {
    match params.get(name) {
        Some(ParamValue::Int(v)) => (*v).max(0) as u32,
        Some(ParamValue::Float(v)) => (*v).max(0.0) as u32,
        _ => default,
    }
}

/// Reads a string-valued param, falling back to `default` when absent.
#[must_use]
pub fn param_str<'a>(params: &'a BTreeMap<String, ParamValue>, name: &str, default: &'a str) -> &'a str {
    match params.get(name) {
        Some(ParamValue::Str(v)) => v.as_str(),
        _ => default,
    }
}

/// Reads a boolean-valued param, falling back to `default` when absent.
#[must_use]
pub fn param_bool(params: &BTreeMap<String, ParamValue>, name: &str, default: bool) -> bool {
    match params.get(name) {
        Some(ParamValue::Bool(v)) => *v,
        _ => default,
    }
}

/// Registry of all known block types, keyed by type tag. Unknown types
/// are rejected with `UnknownBlockType` at pass 2 (spec.md §6).
#[derive(Default)]
pub struct BlockRegistry {
    decls: FxHashMap<&'static str, Box<dyn BlockTypeDecl>>,
}

impl BlockRegistry {
    /// Registers a block type, panicking on duplicate registration (a
    /// programmer error, not a patch-authoring error).
    pub fn register(&mut self, decl: Box<dyn BlockTypeDecl>) {
        let tag = decl.type_tag();
        assert!(
            self.decls.insert(tag, decl).is_none(),
            "duplicate block type registration: {tag}"
        );
    }

    /// Looks up a block type's declaration.
    #[must_use]
    pub fn get(&self, type_tag: &str) -> Option<&dyn BlockTypeDecl> {
        self.decls.get(type_tag).map(std::convert::AsRef::as_ref)
    }

    /// Builds the registry with every built-in block type (spec.md §4.14).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut reg = Self::default();
        crate::registry::builtin_blocks::register_all(&mut reg);
        reg
    }
}
