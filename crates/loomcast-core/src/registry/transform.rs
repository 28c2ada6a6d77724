// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The transform registry contract (spec.md §4.1, §6): adapters are a
//! closed, automatically-applied set; lenses are a closed, user-authored
//! set. Both are dispatched here rather than through a `Box<dyn>` registry
//! like [`crate::registry::block::BlockRegistry`], since spec.md closes
//! both sets explicitly (§4.15) and neither is ever extended by a patch
//! author.

use std::collections::{BTreeMap, VecDeque};

use crate::error::CompileError;
use crate::graph::{LensKind, ParamValue};
use crate::ident::EdgeId;
use crate::ir::{DomainId, FieldExprId, Op, ValueRef};
use crate::ir_builder::IrBuilder;
use crate::types::{Conversion, Domain, TypeDesc, World};

/// A resolved sequence of adapter steps connecting one type to another,
/// found by pass 2's shortest-chain search (spec.md §4.1).
#[derive(Clone, Debug, Default)]
pub struct AdapterChain {
    /// Steps to apply, in order.
    pub steps: Vec<Conversion>,
}

impl AdapterChain {
    /// Total cost charged against `PatchSettings.adapter_cost_budget`.
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.steps.iter().map(|c| c.cost()).sum()
    }
}

/// Breadth-first search over the `(World, Domain)` graph induced by
/// [`Conversion::all`]: each conversion either bumps the world (leaving
/// domain untouched) or retargets the domain (leaving world untouched), so
/// a single unweighted BFS over this product graph finds the cheapest chain
/// between any two types (all built-in conversions cost 1). Ties are
/// broken by the lexical order `Conversion::all()` already guarantees,
/// since edges are explored in that order at each BFS layer.
#[must_use]
pub fn find_adapter_chain(from: (World, Domain), to: (World, Domain), budget: u32) -> Option<AdapterChain> {
    if from == to {
        return Some(AdapterChain::default());
    }
    let mut visited = std::collections::HashSet::new();
    visited.insert(from);
    let mut queue = VecDeque::new();
    queue.push_back((from, Vec::<Conversion>::new()));

    while let Some((node, path)) = queue.pop_front() {
        if path.len() as u32 >= budget {
            continue;
        }
        for &conv in Conversion::all() {
            let (src_world, src_domain) = conv.source();
            let applies = match (src_world, src_domain) {
                (Some(w), None) => node.0 == w,
                (None, Some(d)) => node.1 == d,
                _ => false,
            };
            if !applies {
                continue;
            }
            let (tgt_world, tgt_domain) = conv.target();
            let next = (tgt_world.unwrap_or(node.0), tgt_domain.unwrap_or(node.1));
            if next == to {
                let mut steps = path.clone();
                steps.push(conv);
                return Some(AdapterChain { steps });
            }
            if visited.insert(next) {
                let mut steps = path.clone();
                steps.push(conv);
                queue.push_back((next, steps));
            }
        }
    }
    None
}

/// Applies a resolved adapter chain to a value, producing IR for each step
/// in order. `domain_hint` supplies the target domain for a `SignalToField`
/// step when the consuming port's domain is already known to the caller;
/// it is `None` for the built-in block set, whose field-accepting ports
/// (`RenderInstances2D`, `PositionMapGrid`) resolve broadcasting themselves
/// against their own `domain` input instead of routing through this path.
pub fn apply_adapter_chain(
    ir: &mut IrBuilder,
    chain: &AdapterChain,
    mut value: ValueRef,
    edge: &EdgeId,
    domain_hint: Option<DomainId>,
) -> Result<ValueRef, CompileError> {
    for &conv in &chain.steps {
        value = apply_adapter(ir, conv, value, edge, domain_hint)?;
    }
    Ok(value)
}

fn apply_adapter(
    ir: &mut IrBuilder,
    conv: Conversion,
    value: ValueRef,
    _edge: &EdgeId,
    domain_hint: Option<DomainId>,
) -> Result<ValueRef, CompileError> {
    match conv {
        Conversion::ScalarToSignal => match value {
            ValueRef::ScalarConst(c) => {
                let ty = scalar_const_type(ir, c);
                Ok(ValueRef::Sig(ir.sig_const(ty, c)))
            }
            other => Ok(other),
        },
        Conversion::SignalToField => match value {
            ValueRef::Sig(slot) => match domain_hint {
                Some(domain) => Ok(ValueRef::Field(ir.field_broadcast(slot, domain), domain)),
                // No domain context at this edge. The only field-accepting
                // built-in ports (`RenderInstances2D`, `PositionMapGrid`)
                // resolve broadcasting themselves against their own `domain`
                // input (`resolve_as_field`), so the signal is passed
                // through unchanged and materialized there instead.
                None => Ok(ValueRef::Sig(slot)),
            },
            other => Ok(other),
        },
        Conversion::PhaseToFloat | Conversion::NumberToDurationMs => relabel_signal(ir, value, conv),
        Conversion::FloatToPhase => wrap_phase(ir, value),
        Conversion::FloatToVec2Splat => splat_vec2(ir, value),
    }
}

fn scalar_const_type(ir: &IrBuilder, c: crate::ir::ConstId) -> TypeDesc {
    match ir.consts.get(c) {
        crate::ir::TypedConst::Float(_) => TypeDesc::new(World::Signal, Domain::Float),
        crate::ir::TypedConst::Vec2(_) => TypeDesc::new(World::Signal, Domain::Vec2),
        crate::ir::TypedConst::Color(_) => TypeDesc::new(World::Signal, Domain::Color),
        crate::ir::TypedConst::Bool(_) => TypeDesc::new(World::Signal, Domain::Boolean),
    }
}

fn relabel_signal(ir: &mut IrBuilder, value: ValueRef, conv: Conversion) -> Result<ValueRef, CompileError> {
    let target_domain = conv.target().1.expect("relabel conversions always target a domain");
    match value {
        ValueRef::Sig(slot) => {
            let ty = TypeDesc::new(World::Signal, target_domain);
            Ok(ValueRef::Sig(ir.sig_map(ty, Op::Identity, slot)))
        }
        ValueRef::ScalarConst(c) => Ok(ValueRef::ScalarConst(c)),
        other => Ok(other),
    }
}

fn wrap_phase(ir: &mut IrBuilder, value: ValueRef) -> Result<ValueRef, CompileError> {
    match value {
        ValueRef::Sig(slot) => {
            let ty = TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)");
            Ok(ValueRef::Sig(ir.sig_map(ty, Op::Fract, slot)))
        }
        ValueRef::ScalarConst(c) => Ok(ValueRef::ScalarConst(c)),
        other => Ok(other),
    }
}

fn splat_vec2(ir: &mut IrBuilder, value: ValueRef) -> Result<ValueRef, CompileError> {
    match value {
        ValueRef::Sig(slot) => Ok(ValueRef::Sig(ir.sig_splat2(slot))),
        ValueRef::ScalarConst(c) => {
            if let crate::ir::TypedConst::Float(v) = *ir.consts.get(c) {
                Ok(ValueRef::ScalarConst(ir.const_vec2([v, v])))
            } else {
                Ok(ValueRef::ScalarConst(c))
            }
        }
        other => Ok(other),
    }
}

/// Applies a user-authored lens to a signal-world value (spec.md §4.15).
pub fn apply_lens_signal(
    ir: &mut IrBuilder,
    kind: LensKind,
    input: crate::ir::ValueSlot,
    params: &BTreeMap<String, ParamValue>,
    ty: &TypeDesc,
) -> Result<crate::ir::ValueSlot, CompileError> {
    crate::registry::builtin_transforms::apply_lens_signal(ir, kind, input, params, ty)
}

/// Applies a user-authored lens to a field-world value (spec.md §4.15).
pub fn apply_lens_field(
    ir: &mut IrBuilder,
    kind: LensKind,
    input: FieldExprId,
    params: &BTreeMap<String, ParamValue>,
) -> Result<FieldExprId, CompileError> {
    crate::registry::builtin_transforms::apply_lens_field(ir, kind, input, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_need_no_chain() {
        let chain = find_adapter_chain(
            (World::Signal, Domain::Float),
            (World::Signal, Domain::Float),
            4,
        )
        .unwrap();
        assert!(chain.steps.is_empty());
    }

    #[test]
    fn scalar_float_to_signal_field_chains_two_steps() {
        let chain = find_adapter_chain(
            (World::Scalar, Domain::Float),
            (World::Field, Domain::Float),
            4,
        )
        .unwrap();
        assert_eq!(chain.steps, vec![Conversion::ScalarToSignal, Conversion::SignalToField]);
    }

    #[test]
    fn phase_to_vec2_field_is_unreachable() {
        let chain = find_adapter_chain(
            (World::Signal, Domain::Phase),
            (World::Field, Domain::Vec2),
            4,
        );
        assert!(chain.is_none());
    }

    #[test]
    fn budget_of_zero_only_allows_identical_types() {
        let chain = find_adapter_chain(
            (World::Scalar, Domain::Float),
            (World::Signal, Domain::Float),
            0,
        );
        assert!(chain.is_none());
    }
}
