// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The linear, per-frame program pass 8 emits (spec.md §3.3, §4.8).

use crate::graph::{CombineMode, TimeModel};
use crate::ident::BusId;
use crate::ir::{ConstId, DomainId, FieldExprId, SigExprId, ValueSlot};

/// Which phase a [`Step`] belongs to. Execution order within a phase is the
/// order steps were emitted; phases themselves always run in this order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Resolve `tAbsMs` into the canonical time slots.
    Time,
    /// Evaluate signal expressions.
    Signals,
    /// Combine bus publishers.
    Buses,
    /// Materialize fields into pooled buffers.
    Fields,
    /// Assemble render passes.
    Render,
    /// Emit debug-probe summaries.
    Debug,
}

/// The typed, per-element buffer format a materialize step produces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferFormat {
    /// One `f32` per element.
    F32,
    /// Two `f32`s per element (`vec2`).
    Vec2F32,
    /// Canonical `linear_premul_rgba8` color encoding (spec.md §4.12).
    Rgba8,
}

impl BufferFormat {
    /// Number of bytes a single element occupies in this format.
    #[must_use]
    pub const fn element_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::Vec2F32 => 8,
            Self::Rgba8 => 4,
        }
    }
}

/// Identifies which render sink a [`Step::RenderAssemble`] step feeds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SinkType {
    /// 2D instanced geometry.
    Instances2d,
    /// Vector paths.
    Paths,
    /// A composited layer.
    Layer,
}

/// A single buffer a render pass needs, tagged with its source expression
/// and requested format.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferRequest {
    /// Buffer name as it will appear in `RenderPassIR.buffers` (e.g. `"pos"`).
    pub name: String,
    /// Source field expression to materialize.
    pub field: FieldExprId,
    /// Domain the field is defined over.
    pub domain: DomainId,
    /// Requested physical encoding.
    pub format: BufferFormat,
}

/// A scalar uniform a render pass needs.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformRequest {
    /// Uniform name.
    pub name: String,
    /// Source signal slot.
    pub slot: ValueSlot,
}

/// The full materialization plan for one render sink.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderPlan {
    /// Which sink kind this plan assembles.
    pub sink: SinkType,
    /// Domain driving `instanceCount`.
    pub instance_domain: DomainId,
    /// Per-element buffers this sink consumes.
    pub buffers: Vec<BufferRequest>,
    /// Scalar uniforms this sink consumes.
    pub uniforms: Vec<UniformRequest>,
}

/// One entry in a [`Schedule`] (spec.md §3.3).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Step {
    /// Resolve the frame's `tAbsMs` input against the captured `TimeModel`,
    /// writing the canonical time slots pass 3 allocated (spec.md §4.4).
    TimeDerive {
        /// The patch's time topology.
        time_model: TimeModel,
        /// Slot the frame's raw `tAbsMs` input is written to.
        t_abs_ms: ValueSlot,
        /// Slot the resolved `tModelMs` is written to.
        t_model_ms: ValueSlot,
        /// Slot `progress01` is written to; present only for `Finite`.
        progress01: Option<ValueSlot>,
        /// Slot `endEvent` is written to; present only for `Finite`.
        end_event: Option<ValueSlot>,
    },
    /// Evaluate one signal expression, writing its output slot.
    SigEval {
        /// Expression to evaluate.
        expr: SigExprId,
        /// Slot the result is written to.
        slot: ValueSlot,
    },
    /// Materialize one field expression into a pooled typed buffer.
    FieldMaterialize {
        /// Expression to materialize.
        expr: FieldExprId,
        /// Domain the expression is defined over.
        domain: DomainId,
        /// Requested physical encoding.
        format: BufferFormat,
        /// Tag used to key the buffer pool and the frame-local acquired list.
        buffer_tag: String,
    },
    /// Combine a bus's publisher values into its output slot.
    BusCombine {
        /// Bus being combined.
        bus: BusId,
        /// Publisher slots, pre-sorted into the order writers apply in
        /// (spec.md §3.2 writer ordering).
        writers: Vec<ValueSlot>,
        /// Output slot the combined value is written to.
        slot: ValueSlot,
        /// How the publishers combine.
        combine_mode: CombineMode,
        /// Value used when `writers` is empty; `None` falls back to the
        /// bus domain's zero value (spec.md §3.2).
        default: Option<ConstId>,
    },
    /// Assemble one render sink's pass from already-evaluated buffers.
    RenderAssemble {
        /// Which sink this assembles.
        sink: SinkType,
        /// The sink's materialization plan.
        plan: RenderPlan,
    },
    /// Summarize a slot's value for the trace controller.
    DebugProbe {
        /// Source slot.
        slot: ValueSlot,
        /// Probe identifier the debug UI reads by.
        probe_id: String,
    },
}

impl Step {
    /// The phase this step belongs to (spec.md §4.8).
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::TimeDerive { .. } => Phase::Time,

            Self::SigEval { .. } => Phase::Signals,
            Self::BusCombine { .. } => Phase::Buses,
            Self::FieldMaterialize { .. } => Phase::Fields,
            Self::RenderAssemble { .. } => Phase::Render,
            Self::DebugProbe { .. } => Phase::Debug,
        }
    }
}

/// The ordered, phase-partitioned program the executor runs once per frame.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schedule {
    /// Steps in final execution order (already phase-sorted stably).
    pub steps: Vec<Step>,
}

impl Schedule {
    /// Appends `step` in emission order.
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Stably groups steps into three buckets: `Time` first, `Debug` last,
    /// and everything else (`Signals`/`Buses`/`Fields`/`Render`) in between.
    ///
    /// The middle bucket is deliberately *not* further sorted by phase: a
    /// listener may apply further signal transforms to a bus-tapped value
    /// (spec.md §4.7 lens chains on bus taps), which only evaluate correctly
    /// if their `SigEval` step runs after the `BusCombine` step it depends
    /// on. Pass 7/8 already emit steps in true dependency order (blocks are
    /// lowered and linked topologically, and a bus's `BusCombine` is only
    /// emitted once all its publishers have been evaluated), so a coarser
    /// stable sort that preserves relative emission order within this
    /// bucket is both correct and keeps each step's descriptive [`Phase`]
    /// tag available for introspection.
    pub fn finalize_phase_order(&mut self) {
        self.steps.sort_by_key(Step::phase_bucket);
    }

    /// Steps belonging to a single phase, in emitted order.
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.phase() == phase)
    }
}

impl Step {
    fn phase_bucket(&self) -> u8 {
        match self.phase() {
            Phase::Time => 0,
            Phase::Signals | Phase::Buses | Phase::Fields | Phase::Render => 1,
            Phase::Debug => 2,
        }
    }
}
