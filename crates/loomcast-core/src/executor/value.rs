// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime value representation and the per-frame `ValueStore` (spec.md §4.9).
//!
//! Only the domains a built-in block can actually produce at runtime get a
//! [`Value`] variant: `Vec3`/`Vec4`/`ElementDomain`/`RenderTree`/`Path` are
//! structural or currently-unconstructed domains (see `types::Domain`), so
//! carrying them here would add dead match arms with no caller.

use crate::graph::CombineMode;
use crate::ir::{Op, TypedConst};

/// A single frame's value at one `ValueSlot`. `Duration`/`TimeMs`/`Phase`
/// collapse onto `Float` — those domains only change what an edge's adapter
/// chain is allowed to do at compile time (spec.md §3.1); the physical
/// representation is always an `f64`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// A scalar float, or any domain that erases to one (`Phase`, `Duration`,
    /// `TimeMs`).
    Float(f64),
    /// A two-component vector.
    Vec2([f64; 2]),
    /// An RGBA color, components nominally in `[0,1]`.
    Color([f64; 4]),
    /// A boolean.
    Bool(bool),
}

impl Value {
    /// Converts a pooled constant to its runtime value.
    #[must_use]
    pub fn from_const(c: &TypedConst) -> Self {
        match *c {
            TypedConst::Float(v) => Self::Float(v),
            TypedConst::Vec2(v) => Self::Vec2(v),
            TypedConst::Color(v) => Self::Color(v),
            TypedConst::Bool(v) => Self::Bool(v),
        }
    }

    /// Unwraps a `Float`. Pass 2 guarantees every slot this is called on was
    /// type-checked as scalar; a mismatch means a lowering bug, not bad input.
    #[must_use]
    pub fn as_float(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            other => panic!("expected Value::Float, found {other:?} (type checker should have rejected this)"),
        }
    }

    /// Unwraps a `Vec2`.
    #[must_use]
    pub fn as_vec2(&self) -> [f64; 2] {
        match self {
            Self::Vec2(v) => *v,
            other => panic!("expected Value::Vec2, found {other:?} (type checker should have rejected this)"),
        }
    }

    /// Unwraps a `Color`.
    #[must_use]
    pub fn as_color(&self) -> [f64; 4] {
        match self {
            Self::Color(v) => *v,
            other => panic!("expected Value::Color, found {other:?} (type checker should have rejected this)"),
        }
    }

    /// Unwraps a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            other => panic!("expected Value::Bool, found {other:?} (type checker should have rejected this)"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Float(0.0)
    }
}

/// Dense, per-frame array of every signal slot's current value. Overwritten
/// wholesale each frame; only `StateStore` persists across frames.
#[derive(Clone, Debug)]
pub struct ValueStore {
    slots: Vec<Value>,
}

impl ValueStore {
    /// Builds a store sized to a compiled program's type table.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { slots: vec![Value::default(); len] }
    }

    /// Reads a slot's current value.
    #[must_use]
    pub fn get(&self, slot: crate::ir::ValueSlot) -> Value {
        self.slots[slot.0 as usize]
    }

    /// Writes a slot's value for this frame.
    pub fn set(&mut self, slot: crate::ir::ValueSlot, value: Value) {
        self.slots[slot.0 as usize] = value;
    }
}

/// Applies a scalar unary op. `libm`, not `f64`'s platform transcendentals,
/// backs `Sin` so the result is bit-identical across targets (spec.md §8
/// determinism).
fn apply_unary_op(op: Op, a: f64) -> f64 {
    match op {
        Op::Sin => libm::sin(a),
        Op::Neg => -a,
        Op::Abs => libm::fabs(a),
        Op::Fract => a - libm::floor(a),
        Op::Sign => {
            if a > 0.0 {
                1.0
            } else if a < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Op::Identity => a,
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Min | Op::Max => {
            unreachable!("{op:?} is a binary op; only `Zip` nodes carry it")
        }
    }
}

/// Applies a scalar binary op.
fn apply_binary_op(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Min => a.min(b),
        Op::Max => a.max(b),
        Op::Sin | Op::Neg | Op::Abs | Op::Fract | Op::Sign | Op::Identity => {
            unreachable!("{op:?} is a unary op; only `Map` nodes carry it")
        }
    }
}

/// Maps a scalar function over every component of a value, preserving shape.
fn map_components(v: Value, f: impl Fn(f64) -> f64) -> Value {
    match v {
        Value::Float(a) => Value::Float(f(a)),
        Value::Vec2(a) => Value::Vec2([f(a[0]), f(a[1])]),
        Value::Color(a) => Value::Color([f(a[0]), f(a[1]), f(a[2]), f(a[3])]),
        Value::Bool(_) => v,
    }
}

/// Zips a scalar function over two same-shaped values componentwise.
fn zip_components(a: Value, b: Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => Value::Float(f(x, y)),
        (Value::Vec2(x), Value::Vec2(y)) => Value::Vec2([f(x[0], y[0]), f(x[1], y[1])]),
        (Value::Color(x), Value::Color(y)) => Value::Color([f(x[0], y[0]), f(x[1], y[1]), f(x[2], y[2]), f(x[3], y[3])]),
        _ => panic!("zip between mismatched Value shapes: {a:?} vs {b:?} (type checker should have rejected this)"),
    }
}

/// Evaluates a `Map(op, _)` node's op against an already-evaluated operand.
#[must_use]
pub fn eval_map(op: Op, v: Value) -> Value {
    map_components(v, |x| apply_unary_op(op, x))
}

/// Evaluates a `Zip(op, _, _)` node's op against already-evaluated operands.
#[must_use]
pub fn eval_zip(op: Op, a: Value, b: Value) -> Value {
    zip_components(a, b, |x, y| apply_binary_op(op, x, y))
}

/// Selects `a` or `b` by a boolean condition, componentwise-shape-preserving.
#[must_use]
pub fn eval_mix(cond: bool, a: Value, b: Value) -> Value {
    if cond { a } else { b }
}

/// Rotates a `vec2` by a fixed angle in radians.
#[must_use]
pub fn rotate2d(v: [f64; 2], radians: f64) -> [f64; 2] {
    let s = libm::sin(radians);
    let c = libm::cos(radians);
    [v[0] * c - v[1] * s, v[0] * s + v[1] * c]
}

/// Rotates an RGBA color's hue by a fixed number of degrees, leaving alpha
/// untouched. Round-trips through HSV.
#[must_use]
pub fn hue_shift_rgba(rgba: [f64; 4], degrees: f64) -> [f64; 4] {
    let [r, g, b, a] = rgba;
    let (h, s, v) = rgb_to_hsv(r, g, b);
    let h = (h + degrees / 360.0).rem_euclid(1.0);
    let (r, g, b) = hsv_to_rgb(h, s, v);
    [r, g, b, a]
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let h = if delta.abs() < f64::EPSILON {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if (max - g).abs() < f64::EPSILON {
        (((b - r) / delta) + 2.0) / 6.0
    } else {
        (((r - g) / delta) + 4.0) / 6.0
    };
    let s = if max.abs() < f64::EPSILON { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s.abs() < f64::EPSILON {
        return (v, v, v);
    }
    let h6 = h.rem_euclid(1.0) * 6.0;
    #[allow(clippy::cast_possible_truncation)]
    let i = libm::floor(h6) as i64;
    let f = h6 - libm::floor(h6);
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i.rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Combines a bus's (or field reducer's) publisher values under a combine
/// mode, falling back to `default` when `values` is empty (spec.md §3.2,
/// §4.9). `Custom` modes are rejected at compile time (pass 2) and never
/// reach here.
#[must_use]
pub fn combine_values(mode: &CombineMode, values: &[Value], default: Value) -> Value {
    if values.is_empty() {
        return default;
    }
    match mode {
        CombineMode::Last => *values.last().expect("checked non-empty above"),
        CombineMode::First => values[0],
        CombineMode::Sum => values.iter().skip(1).fold(values[0], |acc, &v| zip_components(acc, v, |a, b| a + b)),
        CombineMode::Average => {
            let sum = values.iter().skip(1).fold(values[0], |acc, &v| zip_components(acc, v, |a, b| a + b));
            let n = values.len() as f64;
            map_components(sum, |x| x / n)
        }
        CombineMode::Min => values.iter().skip(1).fold(values[0], |acc, &v| zip_components(acc, v, f64::min)),
        CombineMode::Max => values.iter().skip(1).fold(values[0], |acc, &v| zip_components(acc, v, f64::max)),
        CombineMode::Or => Value::Bool(values.iter().any(Value::as_bool)),
        CombineMode::And => Value::Bool(values.iter().all(Value::as_bool)),
        CombineMode::Custom(id) => unreachable!("custom combine reducer {id:?} is rejected at compile time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fract_is_floor_based_not_sign_preserving() {
        let v = eval_map(Op::Fract, Value::Float(-0.25));
        assert!((v.as_float() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn sign_is_zero_aware() {
        assert_eq!(eval_map(Op::Sign, Value::Float(0.0)).as_float(), 0.0);
        assert_eq!(eval_map(Op::Sign, Value::Float(3.0)).as_float(), 1.0);
        assert_eq!(eval_map(Op::Sign, Value::Float(-3.0)).as_float(), -1.0);
    }

    #[test]
    fn combine_sum_matches_scalar_sum() {
        let values = [Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)];
        let v = combine_values(&CombineMode::Sum, &values, Value::Float(0.0));
        assert_eq!(v.as_float(), 6.0);
    }

    #[test]
    fn combine_empty_uses_default() {
        let v = combine_values(&CombineMode::Sum, &[], Value::Float(9.0));
        assert_eq!(v.as_float(), 9.0);
    }

    #[test]
    fn combine_last_picks_last_writer() {
        let values = [Value::Float(1.0), Value::Float(2.0)];
        let v = combine_values(&CombineMode::Last, &values, Value::Float(0.0));
        assert_eq!(v.as_float(), 2.0);
    }

    #[test]
    fn hue_shift_round_trips_at_360_degrees() {
        let c = [0.2, 0.6, 0.9, 1.0];
        let shifted = hue_shift_rgba(c, 360.0);
        for (a, b) in c.iter().zip(shifted.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn rotate2d_by_full_turn_is_identity() {
        let v = [1.0, 0.0];
        let r = rotate2d(v, std::f64::consts::TAU);
        assert!((r[0] - v[0]).abs() < 1e-9);
        assert!((r[1] - v[1]).abs() < 1e-9);
    }
}
