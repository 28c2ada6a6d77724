// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! State migration across a compiler hot-swap (spec.md §4.13).

use crate::compiled_program::StateTable;
use crate::error::CompileWarning;
use crate::executor::state::StateStore;

/// Duration a renderer crossfades old and new render output over on an
/// incompatible swap, before dropping the old program (spec.md §4.13 gives
/// a 100-300ms range; 200ms is the fixed midpoint this runtime uses).
pub const CROSSFADE_MS: f64 = 200.0;

/// Which of spec.md §4.13's three swap policies a migration landed in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SwapKind {
    /// Every old anchor still exists in the new program; state carries over
    /// whole.
    Compatible,
    /// Some anchors carried over, some were dropped and reinitialized.
    Partial,
    /// No anchors carried over; the renderer should crossfade.
    Incompatible,
}

/// The outcome of migrating state across a hot-swap.
pub struct SwapResult {
    /// Which policy applied.
    pub kind: SwapKind,
    /// One `ParkedBindingAfterHotSwap` warning per anchor that could not be
    /// carried over.
    pub warnings: Vec<CompileWarning>,
}

/// Builds a fresh [`StateStore`] for `new_table`, carrying over each slot
/// whose anchor hash also appears in `old_table` (spec.md §4.13). Anchors
/// are how incremental recompiles map state across edits without churn
/// (spec.md §9) — dense `StateId` order alone is not stable across a
/// recompile that adds or removes blocks upstream.
#[must_use]
pub fn migrate(old_table: &StateTable, old_store: &StateStore, new_table: &StateTable) -> (StateStore, SwapResult) {
    let mut new_store = StateStore::new(new_table.slots.len());
    let mut warnings = Vec::new();
    let mut carried = 0usize;

    for new_slot in &new_table.slots {
        match old_table.slots.iter().find(|old_slot| old_slot.anchor == new_slot.anchor) {
            Some(old_slot) => {
                new_store.write(new_slot.state, old_store.read(old_slot.state));
                carried += 1;
            }
            None => warnings.push(CompileWarning::ParkedBindingAfterHotSwap { anchor: hex::encode(new_slot.anchor) }),
        }
    }

    let kind = if carried == 0 && !old_table.slots.is_empty() {
        SwapKind::Incompatible
    } else if carried == new_table.slots.len() {
        SwapKind::Compatible
    } else {
        SwapKind::Partial
    };

    (new_store, SwapResult { kind, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled_program::StateSlotMeta;
    use crate::graph::ScrubPolicy;
    use crate::ident::BlockId;
    use crate::ir::StateId;
    use crate::executor::value::Value;

    fn meta(state: StateId, anchor: [u8; 32], owner: &str) -> StateSlotMeta {
        StateSlotMeta { state, scrub_policy: ScrubPolicy::Preserve, owner_block: BlockId(owner.to_string()), anchor }
    }

    #[test]
    fn matching_anchors_carry_state_over() {
        let old_table = StateTable { slots: vec![meta(StateId(0), [1u8; 32], "a")] };
        let mut old_store = StateStore::new(1);
        old_store.write(StateId(0), Value::Float(42.0));

        let new_table = StateTable { slots: vec![meta(StateId(0), [1u8; 32], "a")] };
        let (new_store, result) = migrate(&old_table, &old_store, &new_table);

        assert_eq!(result.kind, SwapKind::Compatible);
        assert!(result.warnings.is_empty());
        assert_eq!(new_store.read(StateId(0)), Value::Float(42.0));
    }

    #[test]
    fn unmatched_anchor_parks_with_a_warning() {
        let old_table = StateTable { slots: vec![meta(StateId(0), [1u8; 32], "a")] };
        let old_store = StateStore::new(1);

        let new_table = StateTable { slots: vec![meta(StateId(0), [9u8; 32], "b")] };
        let (_, result) = migrate(&old_table, &old_store, &new_table);

        assert_eq!(result.kind, SwapKind::Incompatible);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn partial_overlap_yields_partial_swap() {
        let old_table = StateTable { slots: vec![meta(StateId(0), [1u8; 32], "a")] };
        let old_store = StateStore::new(1);

        let new_table =
            StateTable { slots: vec![meta(StateId(0), [1u8; 32], "a"), meta(StateId(1), [2u8; 32], "c")] };
        let (_, result) = migrate(&old_table, &old_store, &new_table);

        assert_eq!(result.kind, SwapKind::Partial);
        assert_eq!(result.warnings.len(), 1);
    }
}
