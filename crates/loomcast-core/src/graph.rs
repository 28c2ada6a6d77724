// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The raw patch graph: blocks, edges, buses (spec.md §3.2, §6).

use std::collections::BTreeMap;

use crate::ident::{BlockId, BusId, EdgeId, PortId};
use crate::types::TypeDesc;

/// Parameter value carried by a block or transform step.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    /// Floating-point literal.
    Float(f64),
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// String literal (e.g. a shape tag).
    Str(String),
    /// A wire reference: the output port of another block, resolved at link
    /// time instead of taken as a literal (spec.md §4.7 param resolution).
    Wire {
        /// Producer block.
        block: BlockId,
        /// Producer output port.
        port: PortId,
    },
    /// A bus tap: read the combined value of a bus (subject to its own
    /// transforms), resolved at link time.
    BusTap(BusId),
}

/// A block's declared role in the patch.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockRole {
    /// Authored directly by the user.
    User,
    /// Synthesized by the compiler or editor for a structural purpose.
    Structural {
        /// What kind of structural artifact this is.
        kind: StructuralKind,
        /// The `(blockId, portId)` or similar target this artifact serves.
        anchor: String,
    },
}

/// The kind of structural artifact a [`BlockRole::Structural`] block is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StructuralKind {
    /// Pass 0 default-source provider for an unconnected input.
    DefaultSource,
    /// Infrastructure block materializing a stateful edge modifier.
    WireState,
    /// Internal shim for a bus publisher/listener.
    GlobalBus,
    /// Anchor for a promoted user lens instance (debug-index only).
    Lens,
}

/// A node in the patch graph.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// Stable, user- or editor-assigned identifier.
    pub id: BlockId,
    /// Registered block type tag (looked up in the block registry).
    pub type_tag: String,
    /// Declared parameters, keyed by parameter name.
    pub params: BTreeMap<String, ParamValue>,
    /// Declared input port ids, in declaration order.
    pub inputs: Vec<PortId>,
    /// Declared output port ids, in declaration order.
    pub outputs: Vec<PortId>,
    /// Whether this block is user-authored or compiler/editor-synthesized.
    pub role: BlockRole,
}

/// One endpoint of an [`Edge`].
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endpoint {
    /// A block's port.
    Port {
        /// Target block.
        block_id: BlockId,
        /// Target port.
        port_id: PortId,
    },
    /// A bus.
    Bus {
        /// Target bus.
        bus_id: BusId,
    },
}

/// An edge's provenance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeRole {
    /// Authored directly by the user.
    User,
    /// Synthesized by pass 0 for an unconnected input.
    Default,
    /// A publisher/listener shim for a bus.
    BusTap,
    /// Synthesized automatically during link resolution (e.g. an adapter
    /// promoted to a visible edge for debug purposes).
    Auto,
}

/// A single transform step carried on an edge (spec.md §4.1).
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformStep {
    /// An automatically-inserted, stateless type-changing step. Adapters are
    /// normally inserted by pass 2/7 rather than authored, but may appear
    /// explicitly if the author wants to pin a specific adapter choice.
    Adapter(crate::types::Conversion),
    /// A user-authored, stateless, type-preserving parametric transform.
    Lens {
        /// Which lens kind to apply.
        kind: LensKind,
        /// Lens parameters, keyed by parameter name.
        params: BTreeMap<String, ParamValue>,
    },
    /// An explicit field-to-signal reducer. Required whenever an edge needs
    /// to narrow a field down to a signal (spec.md §3.1: "field→signal
    /// requires explicit reducer").
    Reducer(ReducerKind),
}

/// The closed set of user-authored lens kinds (spec.md §4.1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LensKind {
    /// Linear `value * scale + offset`.
    Scale,
    /// Clamp to `[min, max]`.
    Clamp,
    /// Snap to the nearest multiple of `step`.
    Quantize,
    /// Affine remap from one range to another.
    MapRange,
    /// Optional sign flip.
    Polarity,
    /// Zero out values below a threshold.
    Deadzone,
    /// Rotate a color's hue by a number of degrees.
    HueShift,
    /// Rotate a `vec2` by an angle in radians.
    Rotate2d,
    /// Affine transform of a `vec2`: `v * gain + bias`.
    Vec2GainBias,
}

/// How a `stateBoundary` block's persisted state reacts to a scrub
/// (an out-of-order `tAbsMs`) or a hot-swap (spec.md §4.13).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScrubPolicy {
    /// Snap the accumulator back to its initial value.
    Reset,
    /// Keep the accumulator untouched; the next frame's delta may be large.
    Preserve,
    /// Re-run accumulation from the last known-good anchor to the new time.
    Reintegrate,
}

/// The closed set of field-to-signal reducers (spec.md §3.1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReducerKind {
    /// Sum of all elements.
    Sum,
    /// Arithmetic mean of all elements.
    Avg,
    /// Minimum element.
    Min,
    /// Maximum element.
    Max,
}

/// A directed connection between two endpoints.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    /// Stable, user- or editor-assigned identifier.
    pub id: EdgeId,
    /// Source endpoint.
    pub from: Endpoint,
    /// Destination endpoint.
    pub to: Endpoint,
    /// User-authored transform chain (adapters are appended by the
    /// compiler at link time and are not required here).
    pub transforms: Vec<TransformStep>,
    /// Whether the edge participates in compilation. Disabled edges are
    /// skipped by every later pass as if absent.
    pub enabled: bool,
    /// Provenance of this edge.
    pub role: EdgeRole,
}

/// How a bus combines values from multiple publishers (spec.md §3.2).
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CombineMode {
    /// The highest-sort-key publisher wins.
    Last,
    /// The lowest-sort-key publisher wins.
    First,
    /// Sum of all publishers.
    Sum,
    /// Arithmetic mean of all publishers.
    Average,
    /// Minimum of all publishers.
    Min,
    /// Maximum of all publishers.
    Max,
    /// Logical OR (booleans).
    Or,
    /// Logical AND (booleans).
    And,
    /// A named custom reducer, resolved against the transform registry.
    Custom(String),
}

/// A named, typed channel with publishers and listeners.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bus {
    /// Stable identifier.
    pub id: BusId,
    /// Human-readable name.
    pub name: String,
    /// Declared type. Publisher types must be compatible with this type;
    /// mismatches are a compile error (pass 2).
    pub r#type: TypeDesc,
    /// How multiple publishers combine into one value.
    pub combine_mode: CombineMode,
    /// Value used when there are zero enabled publishers.
    pub default: Option<ParamValue>,
}

/// The declared time topology of a patch (spec.md §3.2, §4.4).
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeModel {
    /// A fixed-length timeline; `progress01` and `endEvent` are derived.
    Finite {
        /// Total duration in milliseconds.
        duration_ms: f64,
    },
    /// An unbounded timeline; cyclic structure is built in-patch via
    /// `PhaseClock` blocks. `window_ms` is a render/UI hint only (spec.md §9
    /// Open Question, resolved in SPEC_FULL.md §9.2).
    Infinite {
        /// UI hint for the visible time window, in milliseconds.
        window_ms: f64,
    },
}

/// Global, per-compile settings (spec.md §6).
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatchSettings {
    /// Seed for deterministic per-element hashing (`hash01ById`).
    pub seed: u32,
    /// Maximum total adapter-chain cost pass 2 will accept (default 4).
    pub adapter_cost_budget: u32,
    /// Maximum recursion depth for param-chain resolution (default 16,
    /// spec.md §4.7).
    pub param_chain_max_depth: u32,
    /// Whether debug-probe steps carry nonzero cost even when no debug UI
    /// is attached. Defaults to `false`.
    pub trace_enabled: bool,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            adapter_cost_budget: 4,
            param_chain_max_depth: 16,
            trace_enabled: false,
        }
    }
}

/// The compiler's input: a complete, possibly partially-wired patch graph.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawPatch {
    /// All blocks (user-authored; pass 0 adds structural ones).
    pub blocks: Vec<Block>,
    /// All edges (user-authored; pass 0 adds default-source edges).
    pub edges: Vec<Edge>,
    /// All buses.
    pub buses: Vec<Bus>,
    /// Global settings.
    pub settings: PatchSettings,
}

impl RawPatch {
    /// Looks up a block by id.
    #[must_use]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Looks up a bus by id.
    #[must_use]
    pub fn bus(&self, id: &BusId) -> Option<&Bus> {
        self.buses.iter().find(|b| &b.id == id)
    }
}
