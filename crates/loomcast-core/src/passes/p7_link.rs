// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 7: Link resolution. Turns one edge's already-lowered source value
//! into the value its consuming port sees, applying the pass-2 plan in the
//! fixed order spec.md §4.7 requires: explicit reducer, then adapter chain,
//! then any user-authored lenses declared on the edge.

use std::collections::BTreeMap;

use crate::error::{CompileError, CompileWarning};
use crate::graph::{Edge, ParamValue, ReducerKind, TransformStep};
use crate::ident::BlockId;
use crate::ir::{DomainId, ValueRef};
use crate::ir_builder::IrBuilder;
use crate::passes::p2_type_graph::EdgeResolution;
use crate::registry::{apply_adapter_chain, apply_lens_field, apply_lens_signal};
use crate::types::{Domain, TypeDesc, World};

/// Element count above which reducing a field is flagged for perf awareness
/// rather than silently accepted (spec.md §4.9 perf guardrails).
const HEAVY_REDUCER_THRESHOLD: u32 = 2048;

/// Resolves `edge`'s consuming-side value from its already-lowered source
/// value and pass-2 plan.
#[tracing::instrument(level = "trace", name = "compile::pass7", skip_all, fields(edge = %edge.id.0))]
pub fn resolve_edge_value(
    ir: &mut IrBuilder,
    edge: &Edge,
    resolution: &EdgeResolution,
    source: ValueRef,
    owner_block: &BlockId,
    warnings: &mut Vec<CompileWarning>,
) -> Result<ValueRef, CompileError> {
    let mut value = source;

    if resolution.has_reducer {
        let reducer = edge
            .transforms
            .iter()
            .find_map(|t| match t {
                TransformStep::Reducer(r) => Some(*r),
                _ => None,
            })
            .expect("EdgeResolution.has_reducer implies a Reducer step is present");
        if let ValueRef::Field(_, domain) = value {
            if ir.domain_population(domain) > HEAVY_REDUCER_THRESHOLD {
                warnings.push(CompileWarning::HeavyReducer {
                    block: owner_block.clone(),
                    element_count: ir.domain_population(domain),
                });
            }
        }
        value = apply_reducer(ir, reducer, resolution.source_value_domain, value);
    }

    // The built-in block set never needs a concrete domain to apply a
    // `SignalToField` step generically (see `apply_adapter_chain`'s doc).
    let domain_hint: Option<DomainId> = None;
    value = apply_adapter_chain(ir, &resolution.chain, value, &edge.id, domain_hint)?;

    for step in &edge.transforms {
        if let TransformStep::Lens { kind, params } = step {
            value = apply_lens(ir, *kind, value, params, &edge.id)?;
        }
    }

    Ok(value)
}

fn apply_reducer(ir: &mut IrBuilder, reducer: ReducerKind, value_domain: Domain, value: ValueRef) -> ValueRef {
    match value {
        ValueRef::Field(expr, domain) => {
            let ty = TypeDesc::new(World::Signal, value_domain);
            ValueRef::Sig(ir.sig_reduce_field(ty, reducer, expr, domain))
        }
        other => other,
    }
}

fn apply_lens(
    ir: &mut IrBuilder,
    kind: crate::graph::LensKind,
    value: ValueRef,
    params: &BTreeMap<String, ParamValue>,
    edge_id: &crate::ident::EdgeId,
) -> Result<ValueRef, CompileError> {
    match value {
        ValueRef::Sig(slot) => {
            let ty = ir.types.type_of(slot).clone();
            let out = apply_lens_signal(ir, kind, slot, params, &ty)?;
            Ok(ValueRef::Sig(out))
        }
        ValueRef::Field(expr, domain) => {
            let out = apply_lens_field(ir, kind, expr, params)?;
            Ok(ValueRef::Field(out, domain))
        }
        other @ (ValueRef::ScalarConst(_) | ValueRef::DomainHandle(_)) => {
            // A lens on a compile-time constant or opaque domain handle is a
            // no-op; such edges shouldn't declare lenses, but nothing about
            // the value needs changing either way.
            let _ = edge_id;
            Ok(other)
        }
    }
}
