// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in block type declarations (spec.md §4.14). Each struct here is a
//! single `BlockTypeDecl` with exactly one lowering path; there is no
//! fallback path for an unregistered type (spec.md §6).

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::error::CompileError;
use crate::graph::{ParamValue, ScrubPolicy};
use crate::ir::{Op, ValueRef};
use crate::registry::block::{
    param_bool, param_f64, param_str, param_u32, port, BlockRegistry, BlockTypeDecl, Capability,
    DefaultSourceKind, LowerCtx, LowerOutput, PortDecl,
};
use crate::schedule::{BufferFormat, BufferRequest, RenderPlan, SinkType};
use crate::types::{Domain, TypeDesc, World};

fn sig(domain: Domain) -> TypeDesc {
    TypeDesc::new(World::Signal, domain)
}

fn scalar(domain: Domain) -> TypeDesc {
    TypeDesc::new(World::Scalar, domain)
}

fn field(domain: Domain) -> TypeDesc {
    TypeDesc::new(World::Field, domain)
}

/// Resolves a value-or-field input to a `FieldExprId` over `domain`,
/// broadcasting a signal or scalar constant as needed. Used by blocks that
/// accept either shape on a per-element input (spec.md §4.14
/// `RenderInstances2D`).
fn resolve_as_field(
    ctx: &mut LowerCtx<'_>,
    value: Option<&ValueRef>,
    domain: crate::ir::DomainId,
    fallback_const: f64,
) -> crate::ir::FieldExprId {
    match value {
        Some(ValueRef::Field(expr, _)) => *expr,
        Some(ValueRef::Sig(slot)) => ctx.ir.field_broadcast(*slot, domain),
        Some(ValueRef::ScalarConst(c)) => ctx.ir.field_const(*c),
        _ => {
            let c = ctx.ir.const_float(fallback_const);
            ctx.ir.field_const(c)
        }
    }
}

/// `FiniteTimeRoot{durationMs}`: declares a bounded timeline. Reads the
/// canonical time slots pass 3 already allocated rather than deriving them
/// itself (spec.md §4.4).
pub struct FiniteTimeRoot {
    outputs: Vec<PortDecl>,
}

impl FiniteTimeRoot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: vec![
                PortDecl { id: port("tAbsMs"), ty: sig(Domain::TimeMs), default_source: None },
                PortDecl { id: port("tModelMs"), ty: sig(Domain::TimeMs), default_source: None },
                PortDecl {
                    id: port("progress01"),
                    ty: TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)"),
                    default_source: None,
                },
                PortDecl { id: port("endEvent"), ty: sig(Domain::Boolean), default_source: None },
            ],
        }
    }
}

impl Default for FiniteTimeRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for FiniteTimeRoot {
    fn type_tag(&self) -> &'static str {
        "FiniteTimeRoot"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Time
    }
    fn is_time_root(&self) -> bool {
        true
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        _params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("tAbsMs"), ValueRef::Sig(ctx.time.t_abs_ms));
        outputs_by_id.insert(port("tModelMs"), ValueRef::Sig(ctx.time.t_model_ms));
        if let Some(p) = ctx.time.progress01 {
            outputs_by_id.insert(port("progress01"), ValueRef::Sig(p));
        }
        if let Some(e) = ctx.time.end_event {
            outputs_by_id.insert(port("endEvent"), ValueRef::Sig(e));
        }
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `InfiniteTimeRoot{windowMs}`: declares an unbounded timeline. Produces
/// only `tAbsMs`/`tModelMs`, no phase or wrap (spec.md §4.4).
pub struct InfiniteTimeRoot {
    outputs: Vec<PortDecl>,
}

impl InfiniteTimeRoot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: vec![
                PortDecl { id: port("tAbsMs"), ty: sig(Domain::TimeMs), default_source: None },
                PortDecl { id: port("tModelMs"), ty: sig(Domain::TimeMs), default_source: None },
            ],
        }
    }
}

impl Default for InfiniteTimeRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for InfiniteTimeRoot {
    fn type_tag(&self) -> &'static str {
        "InfiniteTimeRoot"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Time
    }
    fn is_time_root(&self) -> bool {
        true
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        _params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("tAbsMs"), ValueRef::Sig(ctx.time.t_abs_ms));
        outputs_by_id.insert(port("tModelMs"), ValueRef::Sig(ctx.time.t_model_ms));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `PhaseClock{periodMs}`: pure. Derives a wrapping `phase01` signal from
/// `tAbsMs`, independent of any `TimeRoot`'s own progress.
pub struct PhaseClock {
    outputs: Vec<PortDecl>,
}

impl PhaseClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: vec![PortDecl {
                id: port("phase01"),
                ty: TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)"),
                default_source: None,
            }],
        }
    }
}

impl Default for PhaseClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for PhaseClock {
    fn type_tag(&self) -> &'static str {
        "PhaseClock"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let period_ms = param_f64(params, "periodMs", 1000.0).max(f64::EPSILON);
        let period_const = ctx.ir.const_float(period_ms);
        let period_slot = ctx.ir.sig_const(sig(Domain::Duration), period_const);
        let ratio = ctx.ir.sig_zip(sig(Domain::Float), Op::Div, ctx.time.t_abs_ms, period_slot);
        let phase = ctx.ir.sig_map(
            TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)"),
            Op::Fract,
            ratio,
        );
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("phase01"), ValueRef::Sig(phase));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `Oscillator{shape}`: pure. Maps a `phase01` signal to `[-1,1]`.
pub struct Oscillator {
    inputs: Vec<PortDecl>,
    outputs: Vec<PortDecl>,
}

impl Oscillator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![PortDecl {
                id: port("phase01"),
                ty: TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)"),
                default_source: None,
            }],
            outputs: vec![PortDecl { id: port("value"), ty: sig(Domain::Float), default_source: None }],
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for Oscillator {
    fn type_tag(&self) -> &'static str {
        "Oscillator"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let phase_slot = match inputs_by_id.get(&port("phase01")) {
            Some(ValueRef::Sig(s)) => *s,
            _ => {
                return Err(CompileError::TransformIrUnsupported {
                    edge_id: crate::ident::EdgeId(String::new()),
                    step_id: "Oscillator.phase01".to_string(),
                    reason: "Oscillator requires a signal<phase> input".to_string(),
                })
            }
        };
        let shape = param_str(params, "shape", "sine").to_string();
        let ty_f = sig(Domain::Float);
        let value = match shape.as_str() {
            "saw" => {
                let two = ctx.ir.const_float(2.0);
                let two_slot = ctx.ir.sig_const(ty_f.clone(), two);
                let one = ctx.ir.const_float(1.0);
                let one_slot = ctx.ir.sig_const(ty_f.clone(), one);
                let scaled = ctx.ir.sig_zip(ty_f.clone(), Op::Mul, phase_slot, two_slot);
                ctx.ir.sig_zip(ty_f, Op::Sub, scaled, one_slot)
            }
            "triangle" => {
                let two = ctx.ir.const_float(2.0);
                let two_slot = ctx.ir.sig_const(ty_f.clone(), two);
                let one = ctx.ir.const_float(1.0);
                let one_slot = ctx.ir.sig_const(ty_f.clone(), one);
                let scaled = ctx.ir.sig_zip(ty_f.clone(), Op::Mul, phase_slot, two_slot);
                let centered = ctx.ir.sig_zip(ty_f.clone(), Op::Sub, scaled, one_slot);
                let folded = ctx.ir.sig_map(ty_f.clone(), Op::Abs, centered);
                let doubled = ctx.ir.sig_zip(ty_f.clone(), Op::Mul, folded, two_slot);
                let shifted = ctx.ir.sig_zip(ty_f.clone(), Op::Sub, one_slot, doubled);
                shifted
            }
            "square" => {
                let tau = ctx.ir.const_float(TAU);
                let tau_slot = ctx.ir.sig_const(ty_f.clone(), tau);
                let theta = ctx.ir.sig_zip(ty_f.clone(), Op::Mul, phase_slot, tau_slot);
                let wave = ctx.ir.sig_map(ty_f.clone(), Op::Sin, theta);
                ctx.ir.sig_map(ty_f, Op::Sign, wave)
            }
            _ => {
                let tau = ctx.ir.const_float(TAU);
                let tau_slot = ctx.ir.sig_const(ty_f.clone(), tau);
                let theta = ctx.ir.sig_zip(ty_f.clone(), Op::Mul, phase_slot, tau_slot);
                ctx.ir.sig_map(ty_f, Op::Sin, theta)
            }
        };
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("value"), ValueRef::Sig(value));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `ConstFloat{value}`: pure scalar source.
pub struct ConstFloat {
    outputs: Vec<PortDecl>,
}

impl ConstFloat {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("value"), ty: scalar(Domain::Float), default_source: None }] }
    }
}

impl Default for ConstFloat {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for ConstFloat {
    fn type_tag(&self) -> &'static str {
        "ConstFloat"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let c = ctx.ir.const_float(param_f64(params, "value", 0.0));
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("value"), ValueRef::ScalarConst(c));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `ConstVec2{x,y}`: pure scalar source.
pub struct ConstVec2 {
    outputs: Vec<PortDecl>,
}

impl ConstVec2 {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("value"), ty: scalar(Domain::Vec2), default_source: None }] }
    }
}

impl Default for ConstVec2 {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for ConstVec2 {
    fn type_tag(&self) -> &'static str {
        "ConstVec2"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let x = param_f64(params, "x", 0.0);
        let y = param_f64(params, "y", 0.0);
        let c = ctx.ir.const_vec2([x, y]);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("value"), ValueRef::ScalarConst(c));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `ConstColor{r,g,b,a}`: pure scalar source.
pub struct ConstColor {
    outputs: Vec<PortDecl>,
}

impl ConstColor {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("value"), ty: scalar(Domain::Color), default_source: None }] }
    }
}

impl Default for ConstColor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for ConstColor {
    fn type_tag(&self) -> &'static str {
        "ConstColor"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let r = param_f64(params, "r", 0.0);
        let g = param_f64(params, "g", 0.0);
        let b = param_f64(params, "b", 0.0);
        let a = param_f64(params, "a", 1.0);
        let c = ctx.ir.const_color([r, g, b, a]);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("value"), ValueRef::ScalarConst(c));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `DomainN{n}`: pure. Produces a `domain` value of fixed population `n`.
pub struct DomainN {
    outputs: Vec<PortDecl>,
}

impl DomainN {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: vec![PortDecl {
                id: port("domain"),
                ty: scalar(Domain::ElementDomain),
                default_source: None,
            }],
        }
    }
}

impl Default for DomainN {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for DomainN {
    fn type_tag(&self) -> &'static str {
        "DomainN"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let n = param_u32(params, "n", 1);
        let d = ctx.ir.alloc_domain(n);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("domain"), ValueRef::DomainHandle(d));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `PositionMapGrid{rows,cols,spacing,origin}`: pure field block producing a
/// `vec2` field over a domain (spec.md S3).
pub struct PositionMapGrid {
    inputs: Vec<PortDecl>,
    outputs: Vec<PortDecl>,
}

impl PositionMapGrid {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![PortDecl {
                id: port("domain"),
                ty: scalar(Domain::ElementDomain),
                default_source: None,
            }],
            outputs: vec![PortDecl { id: port("pos"), ty: field(Domain::Vec2), default_source: None }],
        }
    }
}

impl Default for PositionMapGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for PositionMapGrid {
    fn type_tag(&self) -> &'static str {
        "PositionMapGrid"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let domain = match inputs_by_id.get(&port("domain")) {
            Some(ValueRef::DomainHandle(d)) => *d,
            _ => {
                return Err(CompileError::DanglingEndpoint {
                    edge: crate::ident::EdgeId(String::new()),
                    detail: "PositionMapGrid.domain has no bound domain handle".to_string(),
                })
            }
        };
        let rows = param_u32(params, "rows", 1);
        let cols = param_u32(params, "cols", 1);
        let spacing = param_f64(params, "spacing", 1.0);
        let origin_x = param_f64(params, "originX", 0.0);
        let origin_y = param_f64(params, "originY", 0.0);
        let pos = ctx.ir.field_pos_grid(domain, rows, cols, spacing, [origin_x, origin_y]);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("pos"), ValueRef::Field(pos, domain));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `RenderInstances2D{shape,size,fill}`: a render sink consuming `pos`
/// (field vec2), `size`/`color` (field or signal), and a domain, emitting
/// one `RenderAssemble` step.
pub struct RenderInstances2D {
    inputs: Vec<PortDecl>,
}

impl RenderInstances2D {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![
                PortDecl { id: port("domain"), ty: scalar(Domain::ElementDomain), default_source: None },
                PortDecl { id: port("pos"), ty: field(Domain::Vec2), default_source: None },
                PortDecl {
                    id: port("size"),
                    ty: sig(Domain::Float),
                    default_source: Some(DefaultSourceKind::ConstSignalFloat(1.0)),
                },
                PortDecl {
                    id: port("color"),
                    ty: sig(Domain::Color),
                    default_source: Some(DefaultSourceKind::ConstSignalColor([1.0, 1.0, 1.0, 1.0])),
                },
            ],
        }
    }
}

impl Default for RenderInstances2D {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for RenderInstances2D {
    fn type_tag(&self) -> &'static str {
        "RenderInstances2D"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &[]
    }
    fn capability(&self) -> Capability {
        Capability::Render
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        _params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let domain = match inputs_by_id.get(&port("domain")) {
            Some(ValueRef::DomainHandle(d)) => *d,
            _ => {
                return Err(CompileError::DanglingEndpoint {
                    edge: crate::ident::EdgeId(String::new()),
                    detail: "RenderInstances2D.domain has no bound domain handle".to_string(),
                })
            }
        };
        let pos_expr = match inputs_by_id.get(&port("pos")) {
            Some(ValueRef::Field(expr, _)) => *expr,
            Some(ValueRef::Sig(slot)) => ctx.ir.field_broadcast(*slot, domain),
            _ => {
                return Err(CompileError::DanglingEndpoint {
                    edge: crate::ident::EdgeId(String::new()),
                    detail: "RenderInstances2D.pos is unconnected".to_string(),
                })
            }
        };
        let size_expr = resolve_as_field(ctx, inputs_by_id.get(&port("size")), domain, 1.0);
        let color_expr = resolve_as_field(ctx, inputs_by_id.get(&port("color")), domain, 1.0);
        let plan = RenderPlan {
            sink: SinkType::Instances2d,
            instance_domain: domain,
            buffers: vec![
                BufferRequest {
                    name: "pos".to_string(),
                    field: pos_expr,
                    domain,
                    format: BufferFormat::Vec2F32,
                },
                BufferRequest {
                    name: "size".to_string(),
                    field: size_expr,
                    domain,
                    format: BufferFormat::F32,
                },
                BufferRequest {
                    name: "color".to_string(),
                    field: color_expr,
                    domain,
                    format: BufferFormat::Rgba8,
                },
            ],
            uniforms: vec![],
        };
        Ok(LowerOutput { render_plan: Some(plan), ..Default::default() })
    }
}

/// `IntegrateBlock{rate,scrubPolicy}`: a `stateBoundary` block accumulating
/// `next = prev + rate * dtMs/1000` each frame, tracking its own previous
/// `tAbsMs` to compute `dtMs` (spec.md §4.5, §4.13).
pub struct IntegrateBlock {
    inputs: Vec<PortDecl>,
    outputs: Vec<PortDecl>,
}

impl IntegrateBlock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![PortDecl {
                id: port("rate"),
                ty: sig(Domain::Float),
                default_source: Some(DefaultSourceKind::ConstSignalFloat(0.0)),
            }],
            outputs: vec![PortDecl { id: port("value"), ty: sig(Domain::Float), default_source: None }],
        }
    }
}

impl Default for IntegrateBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for IntegrateBlock {
    fn type_tag(&self) -> &'static str {
        "IntegrateBlock"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::State
    }
    fn is_state_boundary(&self) -> bool {
        true
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let rate_slot = match inputs_by_id.get(&port("rate")) {
            Some(ValueRef::Sig(s)) => *s,
            Some(ValueRef::ScalarConst(c)) => ctx.ir.sig_const(sig(Domain::Float), *c),
            _ => {
                return Err(CompileError::DanglingEndpoint {
                    edge: crate::ident::EdgeId(String::new()),
                    detail: "IntegrateBlock.rate is unconnected".to_string(),
                })
            }
        };
        let scrub_policy = match param_str(params, "scrubPolicy", "preserve") {
            "reset" => ScrubPolicy::Reset,
            "reintegrate" => ScrubPolicy::Reintegrate,
            _ => ScrubPolicy::Preserve,
        };

        let value_state = ctx.ir.alloc_state_id();
        let prev_t_state = ctx.ir.alloc_state_id();

        let prev_t = ctx.ir.sig_state_read(sig(Domain::Duration), prev_t_state);
        let dt_ms = ctx.ir.sig_zip(sig(Domain::Duration), Op::Sub, ctx.time.t_abs_ms, prev_t);
        let ms_to_s = ctx.ir.const_float(0.001);
        let ms_to_s_slot = ctx.ir.sig_const(sig(Domain::Float), ms_to_s);
        let dt_s = ctx.ir.sig_zip(sig(Domain::Float), Op::Mul, dt_ms, ms_to_s_slot);
        let delta = ctx.ir.sig_zip(sig(Domain::Float), Op::Mul, rate_slot, dt_s);

        let prev_val = ctx.ir.sig_state_read(sig(Domain::Float), value_state);
        let next_val = ctx.ir.sig_zip(sig(Domain::Float), Op::Add, prev_val, delta);

        let written_val = ctx.ir.sig_state_write(sig(Domain::Float), value_state, next_val);
        let _written_t = ctx.ir.sig_state_write(sig(Domain::Duration), prev_t_state, ctx.time.t_abs_ms);

        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("value"), ValueRef::Sig(written_val));
        Ok(LowerOutput {
            outputs_by_id,
            render_plan: None,
            state_meta: vec![(value_state, scrub_policy), (prev_t_state, scrub_policy)],
        })
    }
}

/// `ModulationRack`: a bundle of four constant publisher outputs the user
/// wires to buses they declare (spec.md §9 Open Question, resolved against
/// treating rails as user-authored, not compiler-reserved).
pub struct ModulationRack {
    outputs: Vec<PortDecl>,
}

impl ModulationRack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: (1..=4)
                .map(|i| PortDecl {
                    id: port(&format!("rail{i}")),
                    ty: sig(Domain::Float),
                    default_source: None,
                })
                .collect(),
        }
    }
}

impl Default for ModulationRack {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for ModulationRack {
    fn type_tag(&self) -> &'static str {
        "ModulationRack"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Io
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let mut outputs_by_id = BTreeMap::new();
        for i in 1..=4u32 {
            let value = param_f64(params, &format!("rail{i}"), 0.0);
            let c = ctx.ir.const_float(value);
            let slot = ctx.ir.sig_const(sig(Domain::Float), c);
            outputs_by_id.insert(port(&format!("rail{i}")), ValueRef::Sig(slot));
        }
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `DSConstSignalFloat`: pass 0's default source for an unconnected
/// `signal<float>` input (spec.md §4.2).
pub struct DsConstSignalFloat {
    outputs: Vec<PortDecl>,
}

impl DsConstSignalFloat {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Float), default_source: None }] }
    }
}

impl Default for DsConstSignalFloat {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for DsConstSignalFloat {
    fn type_tag(&self) -> &'static str {
        "DSConstSignalFloat"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let c = ctx.ir.const_float(param_f64(params, "value", 0.0));
        let slot = ctx.ir.sig_const(sig(Domain::Float), c);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("out"), ValueRef::Sig(slot));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `DSConstColor`: pass 0's default source for an unconnected
/// `signal<color>` input.
pub struct DsConstColor {
    outputs: Vec<PortDecl>,
}

impl DsConstColor {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Color), default_source: None }] }
    }
}

impl Default for DsConstColor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for DsConstColor {
    fn type_tag(&self) -> &'static str {
        "DSConstColor"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let r = param_f64(params, "r", 1.0);
        let g = param_f64(params, "g", 1.0);
        let b = param_f64(params, "b", 1.0);
        let a = param_f64(params, "a", 1.0);
        let c = ctx.ir.const_color([r, g, b, a]);
        let slot = ctx.ir.sig_const(sig(Domain::Color), c);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("out"), ValueRef::Sig(slot));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `DSConstSignalVec2`: pass 0's default source for an unconnected
/// `signal<vec2>` input.
pub struct DsConstSignalVec2 {
    outputs: Vec<PortDecl>,
}

impl DsConstSignalVec2 {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Vec2), default_source: None }] }
    }
}

impl Default for DsConstSignalVec2 {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for DsConstSignalVec2 {
    fn type_tag(&self) -> &'static str {
        "DSConstSignalVec2"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let x = param_f64(params, "x", 0.0);
        let y = param_f64(params, "y", 0.0);
        let c = ctx.ir.const_vec2([x, y]);
        let slot = ctx.ir.sig_const(sig(Domain::Vec2), c);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("out"), ValueRef::Sig(slot));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `DSConstDomain`: pass 0's default source for an unconnected `domain`
/// input.
pub struct DsConstDomain {
    outputs: Vec<PortDecl>,
}

impl DsConstDomain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: vec![PortDecl {
                id: port("out"),
                ty: scalar(Domain::ElementDomain),
                default_source: None,
            }],
        }
    }
}

impl Default for DsConstDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for DsConstDomain {
    fn type_tag(&self) -> &'static str {
        "DSConstDomain"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let n = param_u32(params, "n", 1);
        let d = ctx.ir.alloc_domain(n);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("out"), ValueRef::DomainHandle(d));
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// `WireState`: infrastructure for a stateful edge modifier (slew/delay/
/// hysteresis lenses promoted to a block, spec.md §4.1). Holds one state
/// slot and passes its input through unchanged on the first frame, then
/// blends toward it at `rate` per second thereafter (slew-style smoothing;
/// the specific stateful lens kind is selected at authoring time and
/// encoded in `params.kind`, all sharing this one state shape).
pub struct WireState {
    inputs: Vec<PortDecl>,
    outputs: Vec<PortDecl>,
}

impl WireState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![PortDecl {
                id: port("in"),
                ty: sig(Domain::Float),
                default_source: Some(DefaultSourceKind::ConstSignalFloat(0.0)),
            }],
            outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Float), default_source: None }],
        }
    }
}

impl Default for WireState {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for WireState {
    fn type_tag(&self) -> &'static str {
        "WireState"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::State
    }
    fn is_state_boundary(&self) -> bool {
        true
    }
    fn lower(
        &self,
        ctx: &mut LowerCtx<'_>,
        params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let input_slot = match inputs_by_id.get(&port("in")) {
            Some(ValueRef::Sig(s)) => *s,
            Some(ValueRef::ScalarConst(c)) => ctx.ir.sig_const(sig(Domain::Float), *c),
            _ => {
                return Err(CompileError::DanglingEndpoint {
                    edge: crate::ident::EdgeId(String::new()),
                    detail: "WireState.in is unconnected".to_string(),
                })
            }
        };
        let rate = param_f64(params, "rate", 1.0).clamp(0.0, 1.0);
        let state = ctx.ir.alloc_state_id();
        let prev = ctx.ir.sig_state_read(sig(Domain::Float), state);
        let rate_const = ctx.ir.const_float(rate);
        let rate_slot = ctx.ir.sig_const(sig(Domain::Float), rate_const);
        let one_minus_rate_const = ctx.ir.const_float(1.0 - rate);
        let one_minus_rate_slot = ctx.ir.sig_const(sig(Domain::Float), one_minus_rate_const);
        let weighted_in = ctx.ir.sig_zip(sig(Domain::Float), Op::Mul, input_slot, rate_slot);
        let weighted_prev = ctx.ir.sig_zip(sig(Domain::Float), Op::Mul, prev, one_minus_rate_slot);
        let blended = ctx.ir.sig_zip(sig(Domain::Float), Op::Add, weighted_in, weighted_prev);
        let written = ctx.ir.sig_state_write(sig(Domain::Float), state, blended);
        let mut outputs_by_id = BTreeMap::new();
        outputs_by_id.insert(port("out"), ValueRef::Sig(written));
        Ok(LowerOutput {
            outputs_by_id,
            render_plan: None,
            state_meta: vec![(state, ScrubPolicy::Preserve)],
        })
    }
}

/// `GlobalBusTap`: internal shim block materializing a bus listener's read
/// as an ordinary signal source (spec.md §9). Pass 7 allocates the bus's
/// output slot directly; this decl exists so the structural block can be
/// looked up uniformly, but its lowering is a pass-through of whatever slot
/// pass 7 already bound.
pub struct GlobalBusTap {
    outputs: Vec<PortDecl>,
}

impl GlobalBusTap {
    #[must_use]
    pub fn new() -> Self {
        Self { outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Float), default_source: None }] }
    }
}

impl Default for GlobalBusTap {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for GlobalBusTap {
    fn type_tag(&self) -> &'static str {
        "GlobalBusTap"
    }
    fn inputs(&self) -> &[PortDecl] {
        &[]
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        _ctx: &mut LowerCtx<'_>,
        _params: &BTreeMap<String, ParamValue>,
        _inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        // Pass 7 binds this block's output directly to the bus's combined
        // slot; `lower` is never invoked for a `GlobalBusTap` instance.
        Ok(LowerOutput::default())
    }
}

/// `Lens`: anchor block for a user-authored lens instance the editor chose
/// to promote to a node for debugging. Never consulted by the compiler;
/// exists only so the debug index has a stable id to point at.
pub struct Lens {
    inputs: Vec<PortDecl>,
    outputs: Vec<PortDecl>,
}

impl Lens {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: vec![PortDecl { id: port("in"), ty: sig(Domain::Float), default_source: None }],
            outputs: vec![PortDecl { id: port("out"), ty: sig(Domain::Float), default_source: None }],
        }
    }
}

impl Default for Lens {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTypeDecl for Lens {
    fn type_tag(&self) -> &'static str {
        "Lens"
    }
    fn inputs(&self) -> &[PortDecl] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortDecl] {
        &self.outputs
    }
    fn capability(&self) -> Capability {
        Capability::Pure
    }
    fn lower(
        &self,
        _ctx: &mut LowerCtx<'_>,
        _params: &BTreeMap<String, ParamValue>,
        inputs_by_id: &BTreeMap<crate::ident::PortId, ValueRef>,
    ) -> Result<LowerOutput, CompileError> {
        let mut outputs_by_id = BTreeMap::new();
        if let Some(v) = inputs_by_id.get(&port("in")) {
            outputs_by_id.insert(port("out"), *v);
        }
        Ok(LowerOutput { outputs_by_id, ..Default::default() })
    }
}

/// Registers every built-in block type.
pub fn register_all(reg: &mut BlockRegistry) {
    reg.register(Box::new(FiniteTimeRoot::new()));
    reg.register(Box::new(InfiniteTimeRoot::new()));
    reg.register(Box::new(PhaseClock::new()));
    reg.register(Box::new(Oscillator::new()));
    reg.register(Box::new(ConstFloat::new()));
    reg.register(Box::new(ConstVec2::new()));
    reg.register(Box::new(ConstColor::new()));
    reg.register(Box::new(DomainN::new()));
    reg.register(Box::new(PositionMapGrid::new()));
    reg.register(Box::new(RenderInstances2D::new()));
    reg.register(Box::new(IntegrateBlock::new()));
    reg.register(Box::new(ModulationRack::new()));
    reg.register(Box::new(DsConstSignalFloat::new()));
    reg.register(Box::new(DsConstSignalVec2::new()));
    reg.register(Box::new(DsConstColor::new()));
    reg.register(Box::new(DsConstDomain::new()));
    reg.register(Box::new(WireState::new()));
    reg.register(Box::new(GlobalBusTap::new()));
    reg.register(Box::new(Lens::new()));
}
