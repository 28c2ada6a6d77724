// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A deterministic patch compiler and scheduled runtime: compiles a
//! [`graph::RawPatch`] graph into a [`compiled_program::CompiledProgram`]
//! (IR + linear schedule), then executes that schedule per frame to
//! produce a [`executor::render::RenderFrameIR`].
#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::multiple_crate_versions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod compiled_program;
pub mod domain;
pub mod error;
pub mod executor;
pub mod graph;
pub mod ident;
pub mod ir;
pub mod ir_builder;
pub mod passes;
pub mod registry;
pub mod schedule;
pub mod types;

pub use compiled_program::CompiledProgram;
pub use error::{CompileError, CompileWarning, ExecError};
pub use graph::RawPatch;

/// Compiles a [`RawPatch`] into a [`CompiledProgram`] using the built-in
/// block and transform registries (spec.md §2 Phase A).
pub fn compile(patch: &RawPatch) -> Result<CompiledProgram, Vec<CompileError>> {
    let registry = registry::BlockRegistry::with_builtins();
    passes::compile_with_registry(patch, &registry)
}
