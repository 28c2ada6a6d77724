// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 2: TypeGraph. Resolves every edge's source/sink type and finds (or
//! rejects) the adapter chain connecting them (spec.md §4.3).

use std::collections::BTreeMap;

use crate::error::CompileError;
use crate::graph::{CombineMode, Endpoint, TransformStep};
use crate::ident::EdgeId;
use crate::passes::p1_normalize::NormalizedPatch;
use crate::registry::{find_adapter_chain, AdapterChain, BlockRegistry};
use crate::types::{Domain, TypeDesc, World};

/// The resolved type-level plan for a single edge: the adapter chain pass 7
/// must apply, and whether an explicit field->signal reducer already
/// narrowed its source type.
#[derive(Clone, Debug)]
pub struct EdgeResolution {
    /// Adapter steps to apply after any explicit reducer.
    pub chain: AdapterChain,
    /// Whether `edge.transforms` already contains a `Reducer` step.
    pub has_reducer: bool,
    /// The source port's value domain (e.g. `Float`, `Vec2`) before any
    /// reduction, needed to type a reducer's output signal.
    pub source_value_domain: crate::types::Domain,
}

/// All edges' resolved type-level plans.
#[derive(Debug, Default)]
pub struct TypeGraph {
    /// Per-edge resolution, keyed by edge id.
    pub resolutions: BTreeMap<EdgeId, EdgeResolution>,
}

/// Resolves every edge in `normalized` against `registry`'s declared port
/// types, returning all accumulated errors rather than failing on the
/// first (spec.md §7: compile errors accumulate per pass).
pub fn check(normalized: &NormalizedPatch<'_>, registry: &BlockRegistry, adapter_cost_budget: u32) -> Result<TypeGraph, Vec<CompileError>> {
    let mut graph = TypeGraph::default();
    let mut errors = Vec::new();

    for bus in &normalized.patch.buses {
        if let Err(e) = check_bus(bus) {
            errors.push(e);
        }
    }

    for edge in &normalized.edges {
        match resolve_edge(normalized, registry, adapter_cost_budget, edge) {
            Ok(resolution) => {
                graph.resolutions.insert(edge.id.clone(), resolution);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(graph)
    } else {
        Err(errors)
    }
}

/// Bus combination is implemented at the `Signal` world only (spec.md §3.2's
/// `BusCombine` step writes a single per-frame slot per writer); a
/// field-world bus is out of scope for this implementation. `Custom` modes
/// have no reducer registry to resolve against yet, so they always fail.
fn check_bus(bus: &crate::graph::Bus) -> Result<(), CompileError> {
    if bus.r#type.world != World::Signal {
        return Err(CompileError::InvalidCombineModeForType {
            endpoint: bus.id.clone(),
            mode: format!("{:?}", bus.combine_mode),
            ty: format!("{:?}", bus.r#type),
        });
    }

    let ok = match &bus.combine_mode {
        CombineMode::Last | CombineMode::First => true,
        CombineMode::Or | CombineMode::And => bus.r#type.domain == Domain::Boolean,
        CombineMode::Sum | CombineMode::Average | CombineMode::Min | CombineMode::Max => matches!(
            bus.r#type.domain,
            Domain::Float | Domain::Vec2 | Domain::Vec3 | Domain::Vec4 | Domain::Color | Domain::Duration | Domain::TimeMs
        ),
        CombineMode::Custom(id) => {
            return Err(CompileError::UnknownCustomCombineReducer { id: id.clone() });
        }
    };

    if ok {
        Ok(())
    } else {
        Err(CompileError::InvalidCombineModeForType {
            endpoint: bus.id.clone(),
            mode: format!("{:?}", bus.combine_mode),
            ty: format!("{:?}", bus.r#type),
        })
    }
}

fn resolve_edge(
    normalized: &NormalizedPatch<'_>,
    registry: &BlockRegistry,
    adapter_cost_budget: u32,
    edge: &crate::graph::Edge,
) -> Result<EdgeResolution, CompileError> {
    if matches!((&edge.from, &edge.to), (Endpoint::Bus { .. }, Endpoint::Bus { .. })) {
        return Err(CompileError::InvalidBusToBusEdge { edge: edge.id.clone() });
    }

    let from_ty = endpoint_type(normalized, registry, &edge.from, true, &edge.id)?;
    let to_ty = endpoint_type(normalized, registry, &edge.to, false, &edge.id)?;

    if from_ty.world == World::Event || to_ty.world == World::Event {
        return Err(CompileError::TypeMismatch {
            edge: edge.id.clone(),
            from: format!("{from_ty:?}"),
            to: format!("{to_ty:?}"),
        });
    }

    let has_reducer = edge.transforms.iter().any(|t| matches!(t, TransformStep::Reducer(_)));

    let effective_from = if from_ty.world == World::Field && to_ty.world != World::Field {
        if !has_reducer {
            return Err(CompileError::TypeMismatch {
                edge: edge.id.clone(),
                from: format!("{from_ty:?}"),
                to: format!("{to_ty:?}"),
            });
        }
        TypeDesc::new(World::Signal, from_ty.domain)
    } else {
        from_ty.clone()
    };

    let chain = find_adapter_chain(
        (effective_from.world, effective_from.domain),
        (to_ty.world, to_ty.domain),
        adapter_cost_budget,
    )
    .ok_or_else(|| CompileError::AdapterNotFound {
        from: format!("{effective_from:?}"),
        to: format!("{to_ty:?}"),
    })?;

    Ok(EdgeResolution { chain, has_reducer, source_value_domain: from_ty.domain })
}

fn endpoint_type(
    normalized: &NormalizedPatch<'_>,
    registry: &BlockRegistry,
    endpoint: &Endpoint,
    is_source: bool,
    edge_id: &EdgeId,
) -> Result<TypeDesc, CompileError> {
    match endpoint {
        Endpoint::Bus { bus_id } => normalized
            .patch
            .bus(bus_id)
            .map(|b| b.r#type.clone())
            .ok_or_else(|| CompileError::DanglingEndpoint {
                edge: edge_id.clone(),
                detail: format!("bus {bus_id:?} does not exist"),
            }),
        Endpoint::Port { block_id, port_id } => {
            let block = normalized.patch.block(block_id).ok_or_else(|| CompileError::DanglingEndpoint {
                edge: edge_id.clone(),
                detail: format!("block {block_id:?} does not exist"),
            })?;
            let decl = registry.get(&block.type_tag).ok_or_else(|| CompileError::UnknownBlockType {
                type_tag: block.type_tag.clone(),
            })?;
            let ports = if is_source { decl.outputs() } else { decl.inputs() };
            ports
                .iter()
                .find(|p| &p.id == port_id)
                .map(|p| p.ty.clone())
                .ok_or_else(|| CompileError::DanglingEndpoint {
                    edge: edge_id.clone(),
                    detail: format!("block {block_id:?} has no port {port_id:?}"),
                })
        }
    }
}
