// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field expression evaluation and buffer encoding (spec.md §4.9, §4.12).

use std::collections::HashMap;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use crate::compiled_program::CompiledProgram;
use crate::executor::value::{combine_values, eval_map, eval_zip, hue_shift_rgba, rotate2d, Value, ValueStore};
use crate::graph::{CombineMode, ReducerKind};
use crate::ir::{DomainId, FieldExpr, FieldExprId};
use crate::schedule::BufferFormat;

/// A materialized field: one value per element of its domain, held
/// column-major by shape rather than as `Vec<Value>` so encoding to a
/// typed buffer is a single `bytemuck::cast_slice` away.
#[derive(Clone, Debug)]
pub enum FieldBuffer {
    /// Per-element scalar.
    Float(Vec<f64>),
    /// Per-element 2-vector.
    Vec2(Vec<[f64; 2]>),
    /// Per-element RGBA color.
    Color(Vec<[f64; 4]>),
    /// Per-element boolean.
    Bool(Vec<bool>),
}

impl FieldBuffer {
    fn filled(n: usize, v: Value) -> Self {
        match v {
            Value::Float(x) => Self::Float(vec![x; n]),
            Value::Vec2(x) => Self::Vec2(vec![x; n]),
            Value::Color(x) => Self::Color(vec![x; n]),
            Value::Bool(x) => Self::Bool(vec![x; n]),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Vec2(v) => v.len(),
            Self::Color(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Whether the buffer has zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads one element as a `Value`.
    #[must_use]
    pub fn get(&self, i: usize) -> Value {
        match self {
            Self::Float(v) => Value::Float(v[i]),
            Self::Vec2(v) => Value::Vec2(v[i]),
            Self::Color(v) => Value::Color(v[i]),
            Self::Bool(v) => Value::Bool(v[i]),
        }
    }

    fn from_values(values: &[Value]) -> Self {
        match values.first() {
            Some(Value::Float(_)) => Self::Float(values.iter().map(Value::as_float).collect()),
            Some(Value::Vec2(_)) => Self::Vec2(values.iter().map(Value::as_vec2).collect()),
            Some(Value::Color(_)) => Self::Color(values.iter().map(Value::as_color).collect()),
            Some(Value::Bool(_)) => Self::Bool(values.iter().map(Value::as_bool).collect()),
            None => Self::Float(Vec::new()),
        }
    }

    fn map(&self, f: impl Fn(Value) -> Value) -> Self {
        let out: Vec<Value> = (0..self.len()).map(|i| f(self.get(i))).collect();
        Self::from_values(&out)
    }

    fn zip(a: &Self, b: &Self, f: impl Fn(Value, Value) -> Value) -> Self {
        let out: Vec<Value> = (0..a.len()).map(|i| f(a.get(i), b.get(i))).collect();
        Self::from_values(&out)
    }

    fn combine(bufs: &[Rc<Self>], mode: &CombineMode, population: usize) -> Self {
        let out: Vec<Value> = (0..population)
            .map(|i| {
                let values: Vec<Value> = bufs.iter().map(|b| b.get(i)).collect();
                combine_values(mode, &values, Value::default())
            })
            .collect();
        Self::from_values(&out)
    }
}

/// Reduces a materialized field down to a single signal value (spec.md
/// §3.1's field→signal reducers), by reusing the bus-combine math for the
/// matching commutative mode.
#[must_use]
pub fn reduce(buf: &FieldBuffer, reducer: ReducerKind) -> Value {
    let mode = match reducer {
        ReducerKind::Sum => CombineMode::Sum,
        ReducerKind::Avg => CombineMode::Average,
        ReducerKind::Min => CombineMode::Min,
        ReducerKind::Max => CombineMode::Max,
    };
    let values: Vec<Value> = (0..buf.len()).map(|i| buf.get(i)).collect();
    combine_values(&mode, &values, Value::default())
}

/// Per-frame memo of already-materialized field subtrees, keyed by
/// `FieldExprId`, so a term shared by two render sinks (or a reducer and a
/// render sink) is only walked once (spec.md §4.9 `FrameCache`). Cleared at
/// the start of every frame by the executor.
#[derive(Default)]
pub struct FieldCache {
    entries: HashMap<u32, Rc<FieldBuffer>>,
}

impl FieldCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every memoized entry, ready for the next frame.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Deterministic per-element hash in `[0,1)`, seeded by the patch seed.
/// Backed by `blake3` (already the anchor-hashing primitive elsewhere in
/// this crate) rather than a PRNG, so the same `(id, seed)` pair always
/// hashes identically across platforms.
fn hash01(id: u64, seed: u64) -> f64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(&id.to_le_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest.as_bytes()[0..8].try_into().expect("blake3 digests are at least 8 bytes");
    (u64::from_le_bytes(bytes) as f64) / (u64::MAX as f64 + 1.0)
}

/// Materializes a field expression over `domain`'s population, memoizing
/// subtrees in `cache` (spec.md §4.12). `domain` is the population context a
/// domain-less leaf (`Const`) inherits; domain-bearing nodes (`BroadcastSig`,
/// `Hash01ById`, `PosGrid`) carry and use their own, which well-formed IR
/// always agrees with.
pub fn eval(
    expr: FieldExprId,
    domain: DomainId,
    program: &CompiledProgram,
    values: &ValueStore,
    cache: &mut FieldCache,
) -> Rc<FieldBuffer> {
    if let Some(buf) = cache.entries.get(&expr.0) {
        return Rc::clone(buf);
    }

    let population = program.domains.population(domain) as usize;
    let buf = match program.fields.get(expr) {
        FieldExpr::Const(c) => {
            let v = Value::from_const(program.consts.get(*c));
            FieldBuffer::filled(population, v)
        }
        FieldExpr::BroadcastSig(slot, dom) => {
            let v = values.get(*slot);
            FieldBuffer::filled(program.domains.population(*dom) as usize, v)
        }
        FieldExpr::Hash01ById(dom, seed) => {
            let n = program.domains.population(*dom) as usize;
            FieldBuffer::Float((0..n as u64).map(|i| hash01(i, *seed)).collect())
        }
        FieldExpr::PosGrid { domain: dom, rows: _, cols, spacing, origin } => {
            let n = program.domains.population(*dom) as usize;
            let out = (0..n as u32)
                .map(|i| {
                    let row = f64::from(i / cols);
                    let col = f64::from(i % cols);
                    [origin[0] + col * spacing, origin[1] + row * spacing]
                })
                .collect();
            FieldBuffer::Vec2(out)
        }
        FieldExpr::Map(op, src) => {
            let s = eval(*src, domain, program, values, cache);
            let op = *op;
            s.map(|v| eval_map(op, v))
        }
        FieldExpr::Zip(op, a, b) => {
            let a = eval(*a, domain, program, values, cache);
            let b = eval(*b, domain, program, values, cache);
            let op = *op;
            FieldBuffer::zip(&a, &b, |x, y| eval_zip(op, x, y))
        }
        FieldExpr::Combine(mode, terms) => {
            let mode = mode.clone();
            let bufs: Vec<Rc<FieldBuffer>> = terms.iter().map(|&t| eval(t, domain, program, values, cache)).collect();
            FieldBuffer::combine(&bufs, &mode, population)
        }
        FieldExpr::Rotate2d(src, radians) => {
            let s = eval(*src, domain, program, values, cache);
            let radians = *radians;
            s.map(|v| Value::Vec2(rotate2d(v.as_vec2(), radians)))
        }
        FieldExpr::HueShiftColor(src, degrees) => {
            let s = eval(*src, domain, program, values, cache);
            let degrees = *degrees;
            s.map(|v| Value::Color(hue_shift_rgba(v.as_color(), degrees)))
        }
    };

    let rc = Rc::new(buf);
    cache.entries.insert(expr.0, Rc::clone(&rc));
    rc
}

/// A tightly packed `vec2`, little-endian `f32` pair — the physical layout
/// of `BufferFormat::Vec2F32`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vec2F32 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
}

/// Canonical `linear_premul_rgba8`: clamped to `[0,1]`, RGB premultiplied by
/// alpha, scaled and rounded to `u8` (spec.md §4.12). The single render color
/// encoding; any other encoding is out of scope.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Rgba8 {
    /// Red, premultiplied.
    pub r: u8,
    /// Green, premultiplied.
    pub g: u8,
    /// Blue, premultiplied.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

fn encode_premul_rgba8(c: [f64; 4]) -> Rgba8 {
    let [r, g, b, a] = c.map(|x| x.clamp(0.0, 1.0));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let channel = |x: f64| (x * a * 255.0).round() as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let alpha = (a * 255.0).round() as u8;
    Rgba8 { r: channel(r), g: channel(g), b: channel(b), a: alpha }
}

/// Encodes a materialized field directly into a pool-provided byte buffer,
/// so a materialize step never allocates beyond what the pool already gave
/// it (spec.md §4.12's scoped-acquisition pooling). `dest` must be exactly
/// `buf.len() * format.element_bytes()` long, which is how the executor
/// sizes every `acquire` call.
///
/// # Panics
/// Panics if `dest`'s length doesn't match, or on a shape/format mismatch:
/// pass 8 only ever requests a format the field's type checks against.
pub fn encode_into(buf: &FieldBuffer, format: BufferFormat, dest: &mut [u8]) {
    match (buf, format) {
        (FieldBuffer::Float(v), BufferFormat::F32) => {
            let dest: &mut [f32] = bytemuck::cast_slice_mut(dest);
            for (d, &x) in dest.iter_mut().zip(v) {
                *d = x as f32;
            }
        }
        (FieldBuffer::Bool(v), BufferFormat::F32) => {
            let dest: &mut [f32] = bytemuck::cast_slice_mut(dest);
            for (d, &b) in dest.iter_mut().zip(v) {
                *d = if b { 1.0 } else { 0.0 };
            }
        }
        (FieldBuffer::Vec2(v), BufferFormat::Vec2F32) => {
            let dest: &mut [Vec2F32] = bytemuck::cast_slice_mut(dest);
            #[allow(clippy::cast_possible_truncation)]
            for (d, &[x, y]) in dest.iter_mut().zip(v) {
                *d = Vec2F32 { x: x as f32, y: y as f32 };
            }
        }
        (FieldBuffer::Color(v), BufferFormat::Rgba8) => {
            let dest: &mut [Rgba8] = bytemuck::cast_slice_mut(dest);
            for (d, &c) in dest.iter_mut().zip(v) {
                *d = encode_premul_rgba8(c);
            }
        }
        _ => panic!("field buffer {buf:?} cannot encode to {format:?} (type checker should have rejected this)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premul_rgba8_scales_rgb_by_alpha() {
        let c = encode_premul_rgba8([1.0, 0.5, 0.0, 0.5]);
        assert_eq!(c, Rgba8 { r: 128, g: 64, b: 0, a: 128 });
    }

    #[test]
    fn hash01_is_deterministic_and_bounded() {
        let a = hash01(7, 42);
        let b = hash01(7, 42);
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn hash01_distinguishes_ids() {
        assert_ne!(hash01(1, 42), hash01(2, 42));
    }

    #[test]
    fn reduce_sum_matches_element_total() {
        let buf = FieldBuffer::Float(vec![1.0, 2.0, 3.0]);
        assert_eq!(reduce(&buf, ReducerKind::Sum).as_float(), 6.0);
    }

    #[test]
    fn encode_into_f32_buffer_round_trips_values() {
        let buf = FieldBuffer::Float(vec![1.0, -2.5]);
        let mut bytes = vec![0u8; 2 * BufferFormat::F32.element_bytes()];
        encode_into(&buf, BufferFormat::F32, &mut bytes);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats, &[1.0f32, -2.5f32]);
    }
}
