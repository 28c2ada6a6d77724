// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pass 5: SCC. Tarjan's algorithm over the pass-4 dependency graph. A
//! nontrivial strongly-connected component (or a self-loop) is legal only if
//! it contains at least one `stateBoundary` block (spec.md §4.5).

use crate::error::CompileError;
use crate::ident::NodeIndex;
use crate::passes::p1_normalize::NormalizedPatch;
use crate::passes::p4_dep_graph::DepGraph;
use crate::registry::BlockRegistry;

/// The patch's blocks partitioned into strongly-connected components.
///
/// Tarjan completes (and pushes) a component only once every node it can
/// reach has also been completed, so `components[0]` is always a sink of the
/// condensation (no edges leave it to a later component) and the last entry
/// is always a source. Pass 6/7 walks `components.iter().rev()` to get a
/// valid producer-before-consumer order.
#[derive(Debug, Default)]
pub struct SccResult {
    /// Components in Tarjan completion order (sinks first, sources last).
    pub components: Vec<Vec<NodeIndex>>,
}

struct Tarjan<'a> {
    graph: &'a DepGraph,
    index_counter: u32,
    indices: Vec<Option<u32>>,
    low_links: Vec<u32>,
    on_stack: Vec<bool>,
    stack: Vec<NodeIndex>,
    components: Vec<Vec<NodeIndex>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a DepGraph) -> Self {
        Self {
            graph,
            index_counter: 0,
            indices: vec![None; graph.node_count],
            low_links: vec![0; graph.node_count],
            on_stack: vec![false; graph.node_count],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<NodeIndex>> {
        for i in 0..self.graph.node_count {
            let node = NodeIndex(i as u32);
            if self.indices[i].is_none() {
                self.strongconnect(node);
            }
        }
        self.components
    }

    fn strongconnect(&mut self, v: NodeIndex) {
        let vi = v.0 as usize;
        self.indices[vi] = Some(self.index_counter);
        self.low_links[vi] = self.index_counter;
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack[vi] = true;

        for &w in self.graph.successors_of(v) {
            let wi = w.0 as usize;
            if self.indices[wi].is_none() {
                self.strongconnect(w);
                self.low_links[vi] = self.low_links[vi].min(self.low_links[wi]);
            } else if self.on_stack[wi] {
                self.low_links[vi] = self.low_links[vi].min(self.indices[wi].expect("visited"));
            }
        }

        if self.low_links[vi] == self.indices[vi].expect("visited") {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().expect("component root is on stack");
                self.on_stack[w.0 as usize] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Computes SCCs and rejects any illegal (state-boundary-free) cycle.
pub fn check(
    normalized: &NormalizedPatch<'_>,
    graph: &DepGraph,
    registry: &BlockRegistry,
) -> Result<SccResult, Vec<CompileError>> {
    let components = Tarjan::new(graph).run();
    let mut errors = Vec::new();

    for component in &components {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.successors_of(n).contains(&n));
        if !is_cycle {
            continue;
        }
        let has_state_boundary = component.iter().any(|&n| {
            let tag = &normalized.blocks[n.0 as usize].type_tag;
            registry.get(tag).is_some_and(|decl| decl.is_state_boundary())
        });
        if !has_state_boundary {
            errors.push(CompileError::IllegalCycle {
                nodes: component.iter().map(|&n| normalized.blocks[n.0 as usize].id.clone()).collect(),
            });
        }
    }

    if errors.is_empty() {
        Ok(SccResult { components })
    } else {
        Err(errors)
    }
}
