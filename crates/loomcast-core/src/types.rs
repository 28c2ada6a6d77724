// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The structural type universe (spec.md §3.1): world × domain, plus an
//! optional semantic tag that is carried for validation only.

/// The "shape" of a value: one constant, one-per-frame, one-per-element, or
/// a discrete trigger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum World {
    /// A compile-time constant.
    Scalar,
    /// One value per frame.
    Signal,
    /// N values per frame, one per element of a domain.
    Field,
    /// A discrete trigger.
    Event,
}

/// The concrete value domain carried by a port, slot, or value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Domain {
    /// IEEE-754 single-precision scalar.
    Float,
    /// Two-component vector.
    Vec2,
    /// Three-component vector.
    Vec3,
    /// Four-component vector.
    Vec4,
    /// RGBA color, components in `[0,1]` before encoding.
    Color,
    /// Float constrained to `[0,1)` by convention (wrap semantics).
    Phase,
    /// Boolean.
    Boolean,
    /// Duration in milliseconds.
    Duration,
    /// Absolute/model time in milliseconds.
    TimeMs,
    /// Opaque element-population handle.
    ElementDomain,
    /// Opaque render-tree handle (out of scope for buffer encoding).
    RenderTree,
    /// Opaque path handle (out of scope for buffer encoding).
    Path,
}

/// A fully-resolved type: world × domain, plus an optional human-readable
/// semantic tag (e.g. `"phase(0..1)"`) that does not change physical
/// encoding and is not considered by structural equality.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDesc {
    /// The value's cardinality per frame.
    pub world: World,
    /// The value's concrete domain.
    pub domain: Domain,
    /// Optional validation-only semantic tag.
    pub semantics: Option<String>,
}

impl TypeDesc {
    /// Builds a `TypeDesc` with no semantic tag.
    #[must_use]
    pub fn new(world: World, domain: Domain) -> Self {
        Self {
            world,
            domain,
            semantics: None,
        }
    }

    /// Builds a `TypeDesc` with a semantic tag attached.
    #[must_use]
    pub fn tagged(world: World, domain: Domain, semantics: impl Into<String>) -> Self {
        Self {
            world,
            domain,
            semantics: Some(semantics.into()),
        }
    }

    /// Structural equality: `(world, domain)` only. Semantic tags never
    /// affect compatibility.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.world == other.world && self.domain == other.domain
    }
}

/// A single automatic conversion edge in the adapter compatibility graph
/// (spec.md §3.1 / §4.1). `cost` feeds the shortest-chain search in pass 2.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Conversion {
    /// `scalar -> signal` via broadcast.
    ScalarToSignal,
    /// `signal -> field` via broadcast.
    SignalToField,
    /// `phase -> float`, unwraps the `[0,1)` constraint.
    PhaseToFloat,
    /// `float -> phase`, wraps into `[0,1)`.
    FloatToPhase,
    /// `number (float) -> durationMs`.
    NumberToDurationMs,
    /// `float -> vec2`, splats the scalar across both components.
    FloatToVec2Splat,
}

impl Conversion {
    /// Cost charged against the adapter-chain budget (pass 2). All built-in
    /// adapters cost 1 unless documented otherwise.
    #[must_use]
    pub const fn cost(self) -> u32 {
        1
    }

    /// The world/domain this conversion expects on its input side.
    #[must_use]
    pub fn source(self) -> (Option<World>, Option<Domain>) {
        match self {
            Self::ScalarToSignal => (Some(World::Scalar), None),
            Self::SignalToField => (Some(World::Signal), None),
            Self::PhaseToFloat => (None, Some(Domain::Phase)),
            Self::FloatToPhase => (None, Some(Domain::Float)),
            Self::NumberToDurationMs => (None, Some(Domain::Float)),
            Self::FloatToVec2Splat => (None, Some(Domain::Float)),
        }
    }

    /// The world/domain this conversion produces on its output side.
    #[must_use]
    pub fn target(self) -> (Option<World>, Option<Domain>) {
        match self {
            Self::ScalarToSignal => (Some(World::Signal), None),
            Self::SignalToField => (Some(World::Field), None),
            Self::PhaseToFloat => (None, Some(Domain::Float)),
            Self::FloatToPhase => (None, Some(Domain::Phase)),
            Self::NumberToDurationMs => (None, Some(Domain::Duration)),
            Self::FloatToVec2Splat => (None, Some(Domain::Vec2)),
        }
    }

    /// All conversions known to the adapter registry, in a stable lexical
    /// order used to break cost ties (spec.md §4.1).
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::FloatToPhase,
            Self::FloatToVec2Splat,
            Self::NumberToDurationMs,
            Self::PhaseToFloat,
            Self::ScalarToSignal,
            Self::SignalToField,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_eq_ignores_semantics() {
        let a = TypeDesc::tagged(World::Signal, Domain::Phase, "phase(0..1)");
        let b = TypeDesc::new(World::Signal, Domain::Phase);
        assert!(a.structurally_eq(&b));
        assert_ne!(a, b); // full derive(PartialEq) DOES consider semantics
    }

    #[test]
    fn conversions_are_lexically_stable() {
        let all = Conversion::all();
        let mut sorted = all.to_vec();
        sorted.sort_by_key(|c| format!("{c:?}"));
        assert_eq!(all, sorted.as_slice());
    }
}
