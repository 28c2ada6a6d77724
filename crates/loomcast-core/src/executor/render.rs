// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render pass assembly from a completed frame's materialized buffers
//! (spec.md §4.9, §4.10).

use crate::domain::DomainTable;
use crate::executor::buffer_pool::FrameBuffers;
use crate::executor::value::{Value, ValueStore};
use crate::schedule::{RenderPlan, SinkType};

/// One render sink's assembled pass: its instance count, named buffers, and
/// named uniforms, ready for a renderer to consume.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPassIR {
    /// Which sink kind this pass feeds.
    pub sink_type: SinkType,
    /// Element count driving instancing/vertex count.
    pub instance_count: u32,
    /// `(name, bytes)` pairs, in the plan's declared buffer order.
    pub buffers: Vec<(String, Vec<u8>)>,
    /// `(name, value)` pairs, in the plan's declared uniform order.
    pub uniforms: Vec<(String, Value)>,
}

/// A full frame's render output: one pass per active render sink.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderFrameIR {
    /// Monotonic frame counter, incremented once per `run_frame` call.
    pub frame_id: u64,
    /// Assembled passes, in schedule emission order.
    pub passes: Vec<RenderPassIR>,
}

/// Assembles one sink's pass from its plan's already-materialized buffers
/// and already-evaluated uniform slots.
///
/// # Panics
/// Panics if `frame_buffers` is missing a buffer the plan declares — every
/// `FieldMaterialize` step for this plan's buffers is scheduled strictly
/// before the matching `RenderAssemble` step, so this should never happen.
#[must_use]
pub fn assemble(plan: &RenderPlan, frame_buffers: &FrameBuffers, values: &ValueStore, domains: &DomainTable) -> RenderPassIR {
    let instance_count = domains.population(plan.instance_domain);
    let buffers = plan
        .buffers
        .iter()
        .map(|req| {
            let bytes = frame_buffers
                .get(&req.name)
                .unwrap_or_else(|| panic!("render plan references unmaterialized buffer {:?}", req.name));
            (req.name.clone(), bytes.to_vec())
        })
        .collect();
    let uniforms = plan.uniforms.iter().map(|u| (u.name.clone(), values.get(u.slot))).collect();
    RenderPassIR { sink_type: plan.sink, instance_count, buffers, uniforms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DomainId, FieldExprId, ValueSlot};
    use crate::schedule::{BufferFormat, BufferRequest, UniformRequest};

    #[test]
    fn assembles_pass_from_named_buffers_and_uniforms() {
        let domains = DomainTable::from_populations(vec![4]);
        let mut values = ValueStore::new(1);
        values.set(ValueSlot(0), Value::Float(2.0));
        let mut frame_buffers = FrameBuffers::new();
        frame_buffers.insert("pos".to_string(), BufferFormat::Vec2F32, vec![0u8; 32]);

        let plan = RenderPlan {
            sink: SinkType::Instances2d,
            instance_domain: DomainId(0),
            buffers: vec![BufferRequest {
                name: "pos".to_string(),
                field: FieldExprId(0),
                domain: DomainId(0),
                format: BufferFormat::Vec2F32,
            }],
            uniforms: vec![UniformRequest { name: "scale".to_string(), slot: ValueSlot(0) }],
        };

        let pass = assemble(&plan, &frame_buffers, &values, &domains);
        assert_eq!(pass.instance_count, 4);
        assert_eq!(pass.buffers, vec![("pos".to_string(), vec![0u8; 32])]);
        assert_eq!(pass.uniforms, vec![("scale".to_string(), Value::Float(2.0))]);
    }
}
