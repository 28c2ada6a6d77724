// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persistent state storage and scrub handling (spec.md §4.9, §4.11, §4.13).

use std::collections::HashSet;

use crate::compiled_program::StateTable;
use crate::executor::value::Value;
use crate::graph::ScrubPolicy;
use crate::ident::BlockId;
use crate::ir::StateId;

/// Every `stateBoundary` block's accumulator, persisted across frames.
/// Unlike `ValueStore`, this is never wholesale-overwritten; individual
/// slots are only touched by `StateWrite` evaluation or a scrub.
#[derive(Clone, Debug)]
pub struct StateStore {
    values: Vec<Value>,
}

impl StateStore {
    /// Builds a store sized to a compiled program's allocated state count.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self { values: vec![Value::default(); count] }
    }

    /// Reads last frame's value of a state slot.
    #[must_use]
    pub fn read(&self, id: StateId) -> Value {
        self.values[id.0 as usize]
    }

    /// Writes this frame's value into a state slot.
    pub fn write(&mut self, id: StateId, value: Value) {
        self.values[id.0 as usize] = value;
    }

    /// Applies every slot's `ScrubPolicy` after an out-of-order `tAbsMs` is
    /// detected (spec.md §4.13).
    ///
    /// Only a block's *primary* slot is reset: a `stateBoundary` block that
    /// allocates more than one state id (e.g. `IntegrateBlock`'s accumulator
    /// plus its `prevTMs` bookkeeping slot) lists its accumulator first, by
    /// convention (see `registry::builtin_blocks::IntegrateBlock::lower`);
    /// bookkeeping slots are already kept correct every frame regardless of
    /// scrub status (`prevTMs` is unconditionally overwritten each frame), so
    /// touching them here would be redundant.
    ///
    /// `Reintegrate` would replay accumulation from the last known-good
    /// anchor to the new time; without a recorded history to replay from,
    /// this degrades to `Reset`'s behavior, same as the teacher's own
    /// documented fallback for unsupported replay depths.
    pub fn scrub(&mut self, state_table: &StateTable) {
        let mut seen_owners: HashSet<&BlockId> = HashSet::new();
        for slot in &state_table.slots {
            let is_primary = seen_owners.insert(&slot.owner_block);
            if !is_primary {
                continue;
            }
            match slot.scrub_policy {
                ScrubPolicy::Preserve => {}
                ScrubPolicy::Reset | ScrubPolicy::Reintegrate => {
                    self.write(slot.state, Value::default());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled_program::StateSlotMeta;

    fn meta(state: StateId, policy: ScrubPolicy, owner: &str) -> StateSlotMeta {
        StateSlotMeta { state, scrub_policy: policy, owner_block: BlockId(owner.to_string()), anchor: [0u8; 32] }
    }

    #[test]
    fn reset_zeroes_primary_slot_only() {
        let mut store = StateStore::new(2);
        store.write(StateId(0), Value::Float(42.0));
        store.write(StateId(1), Value::Float(7.0));
        let table = StateTable {
            slots: vec![meta(StateId(0), ScrubPolicy::Reset, "integ"), meta(StateId(1), ScrubPolicy::Reset, "integ")],
        };
        store.scrub(&table);
        assert_eq!(store.read(StateId(0)), Value::Float(0.0));
        assert_eq!(store.read(StateId(1)), Value::Float(7.0), "bookkeeping slot is left alone");
    }

    #[test]
    fn preserve_leaves_state_untouched() {
        let mut store = StateStore::new(1);
        store.write(StateId(0), Value::Float(42.0));
        let table = StateTable { slots: vec![meta(StateId(0), ScrubPolicy::Preserve, "feedback")] };
        store.scrub(&table);
        assert_eq!(store.read(StateId(0)), Value::Float(42.0));
    }
}
