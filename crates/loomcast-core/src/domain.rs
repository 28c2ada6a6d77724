// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element-population bookkeeping for domains (spec.md §3.1 `domain`).
//!
//! Domains are allocated during block lowering (see
//! [`crate::ir_builder::IrBuilder::alloc_domain`]); this module holds the
//! read-only snapshot of populations that becomes part of a
//! [`crate::compiled_program::CompiledProgram`] once compilation finishes.

use crate::ir::DomainId;

/// Maps each allocated [`DomainId`] to its fixed element population.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainTable {
    populations: Vec<u32>,
}

impl DomainTable {
    /// Builds a table from an `IrBuilder`'s allocated domains, in allocation
    /// order (so `DomainId(i)` indexes `populations[i]`).
    #[must_use]
    pub fn from_populations(populations: Vec<u32>) -> Self {
        Self { populations }
    }

    /// The element population of `id`.
    #[must_use]
    pub fn population(&self, id: DomainId) -> u32 {
        self.populations[id.0 as usize]
    }

    /// Number of allocated domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.populations.len()
    }

    /// Whether no domains have been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_allocation_order() {
        let table = DomainTable::from_populations(vec![4, 16, 1]);
        assert_eq!(table.population(DomainId(1)), 16);
    }
}
