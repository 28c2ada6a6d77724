// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `loom`: compile a patch from JSON, inspect the resulting schedule/type
//! table, or run the executor for a frame or a frame range.
#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::multiple_crate_versions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod config;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use loomcast_core::executor::ScheduleExecutor;
use loomcast_core::graph::RawPatch;
use loomcast_core::schedule::Phase;
use loomcast_core::{compile, CompiledProgram};
use tracing::{info, warn};

use config::CompilerConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional JSON file overriding the patch's `settings` (seed,
    /// `adapter_cost_budget`, `param_chain_max_depth`, `trace_enabled`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a patch and report its outcome.
    Compile {
        /// Path to a JSON-encoded `RawPatch`.
        patch: PathBuf,
    },
    /// Compile a patch and print its type table, schedule, and state table.
    Inspect {
        /// Path to a JSON-encoded `RawPatch`.
        patch: PathBuf,
    },
    /// Compile a patch and run it for one frame or a frame range.
    Run {
        /// Path to a JSON-encoded `RawPatch`.
        patch: PathBuf,
        /// Absolute time of the first (or only) frame, in milliseconds.
        #[arg(long, default_value_t = 0.0)]
        from_ms: f64,
        /// Absolute time of the last frame, in milliseconds. Defaults to
        /// `from-ms`, i.e. a single frame.
        #[arg(long)]
        to_ms: Option<f64>,
        /// Spacing between frames, in milliseconds.
        #[arg(long, default_value_t = 1000.0 / 60.0)]
        step_ms: f64,
        /// Enable debug probe recording for the run.
        #[arg(long)]
        trace: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Compile { patch } => cmd_compile(&patch, cli.config.as_deref()),
        Command::Inspect { patch } => cmd_inspect(&patch, cli.config.as_deref()),
        Command::Run { patch, from_ms, to_ms, step_ms, trace } => {
            cmd_run(&patch, cli.config.as_deref(), from_ms, to_ms, step_ms, trace)
        }
    }
}

fn load_patch(path: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<RawPatch> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading patch file {}", path.display()))?;
    let mut patch: RawPatch = serde_json::from_str(&text).with_context(|| format!("parsing patch JSON {}", path.display()))?;

    if let Some(config_path) = config_path {
        let config_text = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading config file {}", config_path.display()))?;
        let config: CompilerConfig = serde_json::from_str(&config_text)
            .with_context(|| format!("parsing config JSON {}", config_path.display()))?;
        config.apply(&mut patch.settings);
    }

    Ok(patch)
}

fn compile_or_report(patch: &RawPatch) -> Result<CompiledProgram> {
    match compile(patch) {
        Ok(program) => {
            for w in &program.warnings {
                warn!(?w, "compile warning");
            }
            Ok(program)
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("error: {e}");
            }
            Err(anyhow!("compile failed with {} error(s)", errors.len()))
        }
    }
}

fn cmd_compile(patch_path: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<()> {
    let patch = load_patch(patch_path, config_path)?;
    let program = compile_or_report(&patch)?;
    info!(
        blocks = program.meta.source_block_count,
        edges = program.meta.source_edge_count,
        slots = program.types.len(),
        steps = program.schedule.steps.len(),
        "compiled"
    );
    println!("compiled {} block(s), {} edge(s) into {} slot(s), {} step(s), {} warning(s)",
        program.meta.source_block_count,
        program.meta.source_edge_count,
        program.types.len(),
        program.schedule.steps.len(),
        program.warnings.len());
    Ok(())
}

fn cmd_inspect(patch_path: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<()> {
    let patch = load_patch(patch_path, config_path)?;
    let program = compile_or_report(&patch)?;

    let mut types = Table::new();
    types.load_preset(UTF8_FULL).set_header(vec!["slot", "world", "domain"]);
    for i in 0..program.types.len() {
        let slot = loomcast_core::ir::ValueSlot(i as u32);
        let desc = program.types.type_of(slot);
        types.add_row(vec![i.to_string(), format!("{:?}", desc.world), format!("{:?}", desc.domain)]);
    }
    println!("{types}");

    let mut phases = Table::new();
    phases.load_preset(UTF8_FULL).set_header(vec!["phase", "steps"]);
    for phase in [Phase::Time, Phase::Signals, Phase::Buses, Phase::Fields, Phase::Render, Phase::Debug] {
        let count = program.schedule.steps_in(phase).count();
        phases.add_row(vec![format!("{phase:?}"), count.to_string()]);
    }
    println!("{phases}");

    let mut state = Table::new();
    state.load_preset(UTF8_FULL).set_header(vec!["state", "owner", "scrub policy"]);
    for slot in &program.state_table.slots {
        state.add_row(vec![format!("{:?}", slot.state), slot.owner_block.0.clone(), format!("{:?}", slot.scrub_policy)]);
    }
    println!("{state}");

    if !program.warnings.is_empty() {
        println!("{} warning(s):", program.warnings.len());
        for w in &program.warnings {
            println!("  {w:?}");
        }
    }

    Ok(())
}

fn cmd_run(
    patch_path: &std::path::Path,
    config_path: Option<&std::path::Path>,
    from_ms: f64,
    to_ms: Option<f64>,
    step_ms: f64,
    trace: bool,
) -> Result<()> {
    if step_ms <= 0.0 {
        return Err(anyhow!("--step-ms must be positive"));
    }
    let patch = load_patch(patch_path, config_path)?;
    let program = compile_or_report(&patch)?;
    let mut exec = ScheduleExecutor::new(program);
    exec.trace_mut().set_enabled(trace);

    let to_ms = to_ms.unwrap_or(from_ms);
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["frame", "t_abs_ms", "passes", "instances"]);

    let mut t = from_ms;
    while t <= to_ms {
        match exec.run_frame(t) {
            Ok(frame) => {
                let instances: u32 = frame.passes.iter().map(|p| p.instance_count).sum();
                table.add_row(vec![frame.frame_id.to_string(), format!("{t:.2}"), frame.passes.len().to_string(), instances.to_string()]);
            }
            Err(err) => {
                warn!(t_abs_ms = t, %err, "frame failed, re-presenting last successful frame");
                table.add_row(vec!["-".to_string(), format!("{t:.2}"), "ERR".to_string(), err.to_string()]);
            }
        }
        t += step_ms;
    }

    println!("{table}");
    Ok(())
}
