// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `CompiledProgram`: pass 8's final output (spec.md §3.3, §6). Immutable
//! once built; the executor only ever reads from it.

use crate::domain::DomainTable;
use crate::error::CompileWarning;
use crate::graph::{ScrubPolicy, TimeModel};
use crate::ident::BlockId;
use crate::ir::{ConstPool, FieldArena, SignalArena, StateId, TypeTable, ValueSlot};
use crate::schedule::Schedule;

/// Compile-level metadata carried alongside the program, useful for
/// diagnostics and the CLI's `inspect` subcommand.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramMeta {
    /// The patch's configured seed (`PatchSettings.seed`).
    pub patch_seed: u32,
    /// Number of user-authored blocks in the source patch.
    pub source_block_count: u32,
    /// Number of enabled edges in the source patch.
    pub source_edge_count: u32,
}

/// One persistent state slot's metadata, carried so the executor and
/// hot-swap machinery know how to initialize and scrub it (spec.md §4.13).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSlotMeta {
    /// The slot itself.
    pub state: StateId,
    /// How this slot reacts to a scrub or hot-swap.
    pub scrub_policy: ScrubPolicy,
    /// The block that owns this state slot.
    pub owner_block: BlockId,
    /// Stable anchor hash used to match this slot across a hot-swap (spec.md
    /// §9, §4.13).
    pub anchor: crate::ident::Hash,
}

/// Every persistent state slot a program allocates, in allocation order.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateTable {
    /// One entry per allocated [`StateId`].
    pub slots: Vec<StateSlotMeta>,
}

impl StateTable {
    /// Looks up a slot's metadata by id.
    #[must_use]
    pub fn get(&self, id: StateId) -> Option<&StateSlotMeta> {
        self.slots.iter().find(|s| s.state == id)
    }
}

/// One entry in the debug index: a named probe point a debug UI can read
/// (spec.md §4.10).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugIndexEntry {
    /// Stable probe identifier.
    pub probe_id: String,
    /// The slot this probe reads.
    pub slot: ValueSlot,
    /// The block that owns this probe point.
    pub owner_block: BlockId,
}

/// All debug probe points in a compiled program.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugIndex {
    /// Every registered probe point.
    pub entries: Vec<DebugIndexEntry>,
}

/// The compiler's output: IR, schedule, and every table the executor and
/// tooling need, bundled together (spec.md §3.3, §6). Built exactly once by
/// pass 8; never partially constructed on a failing compile.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompiledProgram {
    /// Compile-level metadata.
    pub meta: ProgramMeta,
    /// Slot -> type map.
    pub types: TypeTable,
    /// Interned constants.
    pub consts: ConstPool,
    /// The signal expression arena `SigEval` steps index into.
    pub sigs: SignalArena,
    /// The field expression arena `FieldMaterialize` steps index into.
    pub fields: FieldArena,
    /// Allocated domains' populations.
    pub domains: DomainTable,
    /// The linear, phase-partitioned per-frame program.
    pub schedule: Schedule,
    /// Persistent state slot metadata.
    pub state_table: StateTable,
    /// Debug probe points.
    pub debug_index: DebugIndex,
    /// The patch's declared time topology.
    pub time_model: TimeModel,
    /// Non-fatal diagnostics surfaced alongside a successful compile.
    pub warnings: Vec<CompileWarning>,
}
