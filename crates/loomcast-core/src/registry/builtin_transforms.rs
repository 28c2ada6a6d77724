// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in lens implementations (spec.md §4.15). Each lens is stateless
//! and type-preserving: signal in, signal out (or field in, field out).

use std::collections::BTreeMap;

use crate::error::CompileError;
use crate::graph::{LensKind, ParamValue};
use crate::ident::EdgeId;
use crate::ir::{FieldExprId, Op, ValueSlot};
use crate::ir_builder::IrBuilder;
use crate::registry::block::param_f64;
use crate::types::TypeDesc;

fn unsupported(kind: LensKind, reason: &str) -> CompileError {
    CompileError::TransformIrUnsupported {
        edge_id: EdgeId(String::new()),
        step_id: format!("{kind:?}"),
        reason: reason.to_string(),
    }
}

/// Applies `kind` to a signal-world value of type `ty`.
pub fn apply_lens_signal(
    ir: &mut IrBuilder,
    kind: LensKind,
    input: ValueSlot,
    params: &BTreeMap<String, ParamValue>,
    ty: &TypeDesc,
) -> Result<ValueSlot, CompileError> {
    match kind {
        LensKind::Scale => {
            let scale = ir.const_float(param_f64(params, "scale", 1.0));
            let offset = ir.const_float(param_f64(params, "offset", 0.0));
            let scale_slot = ir.sig_const(ty.clone(), scale);
            let offset_slot = ir.sig_const(ty.clone(), offset);
            let scaled = ir.sig_zip(ty.clone(), Op::Mul, input, scale_slot);
            Ok(ir.sig_zip(ty.clone(), Op::Add, scaled, offset_slot))
        }
        LensKind::Clamp => {
            let min = ir.const_float(param_f64(params, "min", f64::MIN));
            let max = ir.const_float(param_f64(params, "max", f64::MAX));
            let min_slot = ir.sig_const(ty.clone(), min);
            let max_slot = ir.sig_const(ty.clone(), max);
            let floored = ir.sig_zip(ty.clone(), Op::Max, input, min_slot);
            Ok(ir.sig_zip(ty.clone(), Op::Min, floored, max_slot))
        }
        LensKind::Quantize => {
            let step = param_f64(params, "step", 1.0).max(f64::EPSILON);
            let step_const = ir.const_float(step);
            let step_slot = ir.sig_const(ty.clone(), step_const);
            let ratio = ir.sig_zip(ty.clone(), Op::Div, input, step_slot);
            let frac = ir.sig_map(ty.clone(), Op::Fract, ratio);
            let floor = ir.sig_zip(ty.clone(), Op::Sub, ratio, frac);
            Ok(ir.sig_zip(ty.clone(), Op::Mul, floor, step_slot))
        }
        LensKind::MapRange => {
            let in_min = param_f64(params, "inMin", 0.0);
            let in_max = param_f64(params, "inMax", 1.0);
            let out_min = param_f64(params, "outMin", 0.0);
            let out_max = param_f64(params, "outMax", 1.0);
            let in_span = if (in_max - in_min).abs() < f64::EPSILON { 1.0 } else { in_max - in_min };
            let in_min_const = ir.const_float(in_min);
            let in_span_const = ir.const_float(in_span);
            let out_min_const = ir.const_float(out_min);
            let out_span_const = ir.const_float(out_max - out_min);
            let in_min_c = ir.sig_const(ty.clone(), in_min_const);
            let in_span_c = ir.sig_const(ty.clone(), in_span_const);
            let out_min_c = ir.sig_const(ty.clone(), out_min_const);
            let out_span_c = ir.sig_const(ty.clone(), out_span_const);
            let shifted = ir.sig_zip(ty.clone(), Op::Sub, input, in_min_c);
            let normalized = ir.sig_zip(ty.clone(), Op::Div, shifted, in_span_c);
            let rescaled = ir.sig_zip(ty.clone(), Op::Mul, normalized, out_span_c);
            Ok(ir.sig_zip(ty.clone(), Op::Add, rescaled, out_min_c))
        }
        LensKind::Polarity => {
            if param_f64(params, "invert", 0.0) != 0.0 {
                Ok(ir.sig_map(ty.clone(), Op::Neg, input))
            } else {
                Ok(ir.sig_map(ty.clone(), Op::Identity, input))
            }
        }
        LensKind::Deadzone => {
            let threshold = param_f64(params, "threshold", 0.0).abs();
            let threshold_const = ir.const_float(threshold);
            let zero_const = ir.const_float(0.0);
            let threshold_c = ir.sig_const(ty.clone(), threshold_const);
            let zero_c = ir.sig_const(ty.clone(), zero_const);
            let magnitude = ir.sig_map(ty.clone(), Op::Abs, input);
            let sign = ir.sig_map(ty.clone(), Op::Sign, input);
            let excess = ir.sig_zip(ty.clone(), Op::Sub, magnitude, threshold_c);
            let clamped_excess = ir.sig_zip(ty.clone(), Op::Max, excess, zero_c);
            Ok(ir.sig_zip(ty.clone(), Op::Mul, sign, clamped_excess))
        }
        LensKind::Vec2GainBias => {
            let gain_x = param_f64(params, "gainX", 1.0);
            let gain_y = param_f64(params, "gainY", 1.0);
            let bias_x = param_f64(params, "biasX", 0.0);
            let bias_y = param_f64(params, "biasY", 0.0);
            let gain_const = ir.const_vec2([gain_x, gain_y]);
            let bias_const = ir.const_vec2([bias_x, bias_y]);
            let gain_c = ir.sig_const(ty.clone(), gain_const);
            let bias_c = ir.sig_const(ty.clone(), bias_const);
            let scaled = ir.sig_zip(ty.clone(), Op::Mul, input, gain_c);
            Ok(ir.sig_zip(ty.clone(), Op::Add, scaled, bias_c))
        }
        LensKind::Rotate2d => {
            let radians = param_f64(params, "radians", 0.0);
            Ok(ir.sig_rotate2d(input, radians))
        }
        LensKind::HueShift => {
            let degrees = param_f64(params, "degrees", 0.0);
            Ok(ir.sig_hue_shift(input, degrees))
        }
    }
}

/// Applies `kind` to a field-world value. Lenses with no dedicated field
/// path (all but `rotate2d`/`hueShift`, which are channel-mixing) compose
/// their signal-level `Op` chain over [`crate::ir_builder::IrBuilder::field_map`]/
/// [`crate::ir_builder::IrBuilder::field_zip`] against constant fields
/// instead.
pub fn apply_lens_field(
    ir: &mut IrBuilder,
    kind: LensKind,
    input: FieldExprId,
    params: &BTreeMap<String, ParamValue>,
) -> Result<FieldExprId, CompileError> {
    match kind {
        LensKind::Scale => {
            let scale = ir.const_float(param_f64(params, "scale", 1.0));
            let offset = ir.const_float(param_f64(params, "offset", 0.0));
            let scale_f = ir.field_const(scale);
            let offset_f = ir.field_const(offset);
            let scaled = ir.field_zip(Op::Mul, input, scale_f);
            Ok(ir.field_zip(Op::Add, scaled, offset_f))
        }
        LensKind::Clamp => {
            let min = ir.const_float(param_f64(params, "min", f64::MIN));
            let max = ir.const_float(param_f64(params, "max", f64::MAX));
            let min_f = ir.field_const(min);
            let max_f = ir.field_const(max);
            let floored = ir.field_zip(Op::Max, input, min_f);
            Ok(ir.field_zip(Op::Min, floored, max_f))
        }
        LensKind::Quantize => {
            let step = param_f64(params, "step", 1.0).max(f64::EPSILON);
            let step_const = ir.const_float(step);
            let step_f = ir.field_const(step_const);
            let ratio = ir.field_zip(Op::Div, input, step_f);
            let frac = ir.field_map(Op::Fract, ratio);
            let floor = ir.field_zip(Op::Sub, ratio, frac);
            Ok(ir.field_zip(Op::Mul, floor, step_f))
        }
        LensKind::Polarity => {
            if param_f64(params, "invert", 0.0) != 0.0 {
                Ok(ir.field_map(Op::Neg, input))
            } else {
                Ok(ir.field_map(Op::Identity, input))
            }
        }
        LensKind::Deadzone => {
            let threshold = param_f64(params, "threshold", 0.0).abs();
            let threshold_const = ir.const_float(threshold);
            let threshold_f = ir.field_const(threshold_const);
            let zero_const = ir.const_float(0.0);
            let zero_f = ir.field_const(zero_const);
            let magnitude = ir.field_map(Op::Abs, input);
            let sign = ir.field_map(Op::Sign, input);
            let excess = ir.field_zip(Op::Sub, magnitude, threshold_f);
            let clamped_excess = ir.field_zip(Op::Max, excess, zero_f);
            Ok(ir.field_zip(Op::Mul, sign, clamped_excess))
        }
        LensKind::Rotate2d => {
            let radians = param_f64(params, "radians", 0.0);
            Ok(ir.field_rotate2d(input, radians))
        }
        LensKind::HueShift => {
            let degrees = param_f64(params, "degrees", 0.0);
            Ok(ir.field_hue_shift(input, degrees))
        }
        LensKind::MapRange | LensKind::Vec2GainBias => {
            Err(unsupported(kind, "not yet lowered over fields; available on signals only"))
        }
    }
}
