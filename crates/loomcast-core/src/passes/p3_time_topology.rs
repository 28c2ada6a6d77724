// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 3: TimeTopology. Finds the patch's single `TimeRoot` block, derives
//! its `TimeModel`, and allocates the canonical time slots (spec.md §4.4).

use crate::error::CompileError;
use crate::graph::TimeModel;
use crate::ident::BlockId;
use crate::ir_builder::{IrBuilder, TimeSlots};
use crate::passes::p1_normalize::NormalizedPatch;
use crate::registry::BlockRegistry;
use crate::registry::block::param_f64;
use crate::types::{Domain, TypeDesc, World};

/// The patch's resolved time topology: which block declares it, the derived
/// `TimeModel`, and the canonical slots every other pass reads time from.
#[derive(Debug)]
pub struct TimeTopology {
    /// The single block that declared the patch's time model.
    pub time_root: BlockId,
    /// The derived time model.
    pub time_model: TimeModel,
    /// Canonical time slots allocated in `ir`.
    pub slots: TimeSlots,
}

/// Finds the patch's unique time root and allocates its canonical slots.
pub fn resolve(
    normalized: &NormalizedPatch<'_>,
    registry: &BlockRegistry,
    ir: &mut IrBuilder,
) -> Result<TimeTopology, Vec<CompileError>> {
    let mut roots = Vec::new();
    for block in &normalized.blocks {
        if let Some(decl) = registry.get(&block.type_tag) {
            if decl.is_time_root() {
                roots.push(*block);
            }
        }
    }

    if roots.is_empty() {
        return Err(vec![CompileError::MissingTimeRoot]);
    }
    if roots.len() > 1 {
        return Err(vec![CompileError::MultipleTimeRoots {
            ids: roots.iter().map(|b| b.id.clone()).collect(),
        }]);
    }

    let root = roots[0];
    let time_model = match root.type_tag.as_str() {
        "FiniteTimeRoot" => TimeModel::Finite {
            duration_ms: param_f64(&root.params, "durationMs", 1000.0),
        },
        _ => TimeModel::Infinite {
            window_ms: param_f64(&root.params, "windowMs", 10_000.0),
        },
    };

    let t_abs_ms = ir.alloc_value_slot(TypeDesc::new(World::Signal, Domain::TimeMs));
    let t_model_ms = ir.alloc_value_slot(TypeDesc::new(World::Signal, Domain::TimeMs));
    let (progress01, end_event) = match time_model {
        TimeModel::Finite { .. } => (
            Some(ir.alloc_value_slot(TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)"))),
            Some(ir.alloc_value_slot(TypeDesc::new(World::Signal, Domain::Boolean))),
        ),
        TimeModel::Infinite { .. } => (None, None),
    };

    Ok(TimeTopology {
        time_root: root.id.clone(),
        time_model,
        slots: TimeSlots { t_abs_ms, t_model_ms, progress01, end_event },
    })
}
