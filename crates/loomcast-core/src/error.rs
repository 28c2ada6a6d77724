// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Compiler and runtime error types (spec.md §6 wire error codes, §7).

use thiserror::Error;

use crate::ident::{BlockId, BusId, EdgeId};

/// A structured, machine-inspectable compile error. Variant names match the
/// stable wire error codes of spec.md §6.
#[derive(Debug, Error, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompileError {
    /// No `TimeRoot` block was found in the patch.
    #[error("patch has no TimeRoot block")]
    MissingTimeRoot,
    /// More than one `TimeRoot` block was found.
    #[error("patch has multiple TimeRoot blocks: {ids:?}")]
    MultipleTimeRoots {
        /// The conflicting blocks' ids.
        ids: Vec<BlockId>,
    },
    /// A block's `type_tag` is not registered.
    #[error("unknown block type: {type_tag}")]
    UnknownBlockType {
        /// The unregistered type tag.
        type_tag: String,
    },
    /// An edge connects two incompatible types with no adapter chain found.
    #[error("type mismatch on edge {edge:?}: {from:?} -> {to:?}")]
    TypeMismatch {
        /// The offending edge.
        edge: EdgeId,
        /// Source type description.
        from: String,
        /// Sink type description.
        to: String,
    },
    /// A cyclic subgraph contains no `stateBoundary` block.
    #[error("illegal cycle through blocks: {nodes:?}")]
    IllegalCycle {
        /// The blocks participating in the illegal cycle.
        nodes: Vec<BlockId>,
    },
    /// No adapter chain within budget connects `from` to `to`.
    #[error("no adapter path from {from} to {to}")]
    AdapterNotFound {
        /// Source type description.
        from: String,
        /// Sink type description.
        to: String,
    },
    /// A transform step has no IR lowering.
    #[error("transform {step_id} on edge {edge_id:?} has no IR lowering: {reason}")]
    TransformIrUnsupported {
        /// The offending edge.
        edge_id: EdgeId,
        /// The offending step's identifying label.
        step_id: String,
        /// Human-readable explanation and remediation.
        reason: String,
    },
    /// A bus's declared combine mode is not valid for its declared type.
    #[error("combine mode {mode} invalid for type {ty} at bus {endpoint:?}")]
    InvalidCombineModeForType {
        /// The bus in question.
        endpoint: BusId,
        /// The offending combine mode, formatted for display.
        mode: String,
        /// The bus's declared type, formatted for display.
        ty: String,
    },
    /// A `Custom(id)` combine mode names a reducer the registry doesn't know.
    #[error("unknown custom combine reducer: {id}")]
    UnknownCustomCombineReducer {
        /// The unresolved reducer id.
        id: String,
    },
    /// Param-chain resolution recursed past the configured depth.
    #[error("param chain on edge {edge:?} exceeds max depth {max_depth}")]
    ParamChainTooDeep {
        /// The offending edge.
        edge: EdgeId,
        /// The configured maximum depth.
        max_depth: u32,
    },
    /// A bus-to-bus edge was declared; only port<->bus and port<->port are
    /// valid endpoint combinations (spec.md §3.2).
    #[error("edge {edge:?} connects bus to bus, which is invalid")]
    InvalidBusToBusEdge {
        /// The offending edge.
        edge: EdgeId,
    },
    /// An edge references a block or port id that does not exist.
    #[error("edge {edge:?} references unknown endpoint: {detail}")]
    DanglingEndpoint {
        /// The offending edge.
        edge: EdgeId,
        /// Which endpoint and why.
        detail: String,
    },
}

/// A non-fatal diagnostic surfaced alongside a successful compile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompileWarning {
    /// A user block has no path to any render sink or debug probe.
    UnusedBlock {
        /// The unused block's id.
        block: BlockId,
    },
    /// A bus has zero enabled publishers.
    EmptyBus {
        /// The empty bus's id.
        bus: BusId,
    },
    /// A field reducer or materialize step consumes a field with a large
    /// element count, flagged for perf awareness.
    HeavyReducer {
        /// The block that owns the heavy reduction.
        block: BlockId,
        /// Element count that triggered the warning.
        element_count: u32,
    },
    /// A state slot's anchor no longer exists in the new program after a
    /// hot-swap; its state was dropped (spec.md §4.13 partial swap).
    ParkedBindingAfterHotSwap {
        /// The anchor that could not be carried over.
        anchor: String,
    },
}

/// Errors raised by the runtime executor (spec.md §7: "rare by design").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The buffer pool could not satisfy an allocation request. Fatal for
    /// the frame; the caller should re-present the previous `RenderFrameIR`.
    #[error("buffer pool exhausted requesting {count} elements of {format:?}")]
    PoolExhausted {
        /// Requested element count.
        count: u32,
        /// Requested format, formatted for display.
        format: String,
    },
}
