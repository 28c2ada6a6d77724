// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end coverage of the nine-pass compiler pipeline itself
//! (`loomcast_core::compile`), as opposed to `scenarios.rs`'s hand-built
//! `CompiledProgram`s. These patches are authored as `RawPatch` struct
//! literals rather than JSON, so they exercise registry lookup, default-source
//! materialization, type checking, dependency ordering, and lowering/linking
//! all at once, the way a real caller's patch would.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use loomcast_core::executor::ScheduleExecutor;
use loomcast_core::graph::{Block, BlockRole, Bus, CombineMode, Edge, EdgeRole, Endpoint, ParamValue, PatchSettings, RawPatch};
use loomcast_core::ident::{BlockId, BusId, EdgeId, PortId};
use loomcast_core::types::{Domain, TypeDesc, World};

fn block(id: &str, type_tag: &str, params: BTreeMap<String, ParamValue>) -> Block {
    Block { id: BlockId(id.to_string()), type_tag: type_tag.to_string(), params, inputs: vec![], outputs: vec![], role: BlockRole::User }
}

fn edge(id: &str, from_block: &str, from_port: &str, to_block: &str, to_port: &str, enabled: bool) -> Edge {
    Edge {
        id: EdgeId(id.to_string()),
        from: Endpoint::Port { block_id: BlockId(from_block.to_string()), port_id: PortId(from_port.to_string()) },
        to: Endpoint::Port { block_id: BlockId(to_block.to_string()), port_id: PortId(to_port.to_string()) },
        transforms: vec![],
        enabled,
        role: EdgeRole::User,
    }
}

/// A single-instance render patch: `PhaseClock` drives an `Oscillator` whose
/// value feeds the instance's `size`, while a disabled `ConstColor` edge
/// leaves `color` to fall back to its default-source white.
fn single_instance_patch() -> RawPatch {
    let blocks = vec![
        block("time", "InfiniteTimeRoot", BTreeMap::new()),
        block("clock", "PhaseClock", BTreeMap::from([("periodMs".to_string(), ParamValue::Float(1000.0))])),
        block("osc", "Oscillator", BTreeMap::new()),
        block("dom", "DomainN", BTreeMap::from([("n".to_string(), ParamValue::Int(1))])),
        block(
            "grid",
            "PositionMapGrid",
            BTreeMap::from([
                ("rows".to_string(), ParamValue::Int(1)),
                ("cols".to_string(), ParamValue::Int(1)),
                ("spacing".to_string(), ParamValue::Float(0.0)),
            ]),
        ),
        block(
            "red",
            "ConstColor",
            BTreeMap::from([
                ("r".to_string(), ParamValue::Float(1.0)),
                ("g".to_string(), ParamValue::Float(0.0)),
                ("b".to_string(), ParamValue::Float(0.0)),
                ("a".to_string(), ParamValue::Float(1.0)),
            ]),
        ),
        block("render", "RenderInstances2D", BTreeMap::new()),
    ];
    let edges = vec![
        edge("e-phase", "clock", "phase01", "osc", "phase01", true),
        edge("e-dom-grid", "dom", "domain", "grid", "domain", true),
        edge("e-dom-render", "dom", "domain", "render", "domain", true),
        edge("e-pos", "grid", "pos", "render", "pos", true),
        edge("e-size", "osc", "value", "render", "size", true),
        // Disabled: later passes must treat this as though it were absent,
        // leaving `color` to pick up its default-source white instead of red.
        edge("e-color", "red", "value", "render", "color", false),
    ];
    RawPatch { blocks, edges, buses: vec![], settings: PatchSettings::default() }
}

#[test]
fn full_pipeline_compiles_and_renders_oscillating_size_with_default_color() {
    let patch = single_instance_patch();
    let program = loomcast_core::compile(&patch).unwrap();
    assert!(program.warnings.is_empty());

    let mut exec = ScheduleExecutor::new(program);
    let frame = exec.run_frame(250.0).unwrap();
    assert_eq!(frame.passes.len(), 1);
    let pass = &frame.passes[0];
    assert_eq!(pass.instance_count, 1);

    let size_bytes = &pass.buffers.iter().find(|(name, _)| name == "size").unwrap().1;
    let size: &[f32] = bytemuck::cast_slice(size_bytes);
    // PhaseClock periodMs=1000 -> phase01 = frac(250/1000) = 0.25.
    // Oscillator's default "sine" shape -> sin(0.25 * TAU) = sin(pi/2) = 1.0.
    let expected = (0.25 * TAU).sin() as f32;
    assert!((size[0] - expected).abs() < 1e-6, "expected oscillator value {expected}, got {}", size[0]);

    let color_bytes = &pass.buffers.iter().find(|(name, _)| name == "color").unwrap().1;
    assert_eq!(color_bytes.as_slice(), &[255u8, 255, 255, 255], "disabled edge must not override the default-source white");
}

#[test]
fn edge_to_a_nonexistent_port_is_reported_as_a_dangling_endpoint() {
    let mut patch = single_instance_patch();
    patch.edges.push(edge("e-stray", "red", "value", "render", "nonexistentPort", true));
    let errors = loomcast_core::compile(&patch).unwrap_err();
    assert!(
        errors.iter().any(|e| format!("{e:?}").contains("DanglingEndpoint")),
        "expected a DanglingEndpoint error, got {errors:?}"
    );
}

/// A single-instance render patch whose `size` input listens on bus `mix`,
/// fed by two `ConstFloat` publishers: `pub_a` (1.0) and `pub_b` (2.0). The
/// publish edges' ids are deliberately assigned *against* block-id order
/// (`"aaa_pub_b"` publishes from `pub_b`, `"zzz_pub_a"` from `pub_a`) so a
/// regression back to sorting bus writers by edge id rather than by
/// `(fromBlockIdx, fromPortIdx, id)` (spec.md §3.2) would pick the wrong
/// winner under `Last`/`First` and this test would catch it.
fn bus_combine_patch(combine_mode: CombineMode) -> RawPatch {
    let blocks = vec![
        block("dom", "DomainN", BTreeMap::from([("n".to_string(), ParamValue::Int(1))])),
        block(
            "grid",
            "PositionMapGrid",
            BTreeMap::from([
                ("rows".to_string(), ParamValue::Int(1)),
                ("cols".to_string(), ParamValue::Int(1)),
                ("spacing".to_string(), ParamValue::Float(0.0)),
            ]),
        ),
        block("pub_a", "ConstFloat", BTreeMap::from([("value".to_string(), ParamValue::Float(1.0))])),
        block("pub_b", "ConstFloat", BTreeMap::from([("value".to_string(), ParamValue::Float(2.0))])),
        block("render", "RenderInstances2D", BTreeMap::new()),
    ];
    let edges = vec![
        edge("e-dom-grid", "dom", "domain", "grid", "domain", true),
        edge("e-dom-render", "dom", "domain", "render", "domain", true),
        edge("e-pos", "grid", "pos", "render", "pos", true),
        Edge {
            id: EdgeId("aaa_pub_b".to_string()),
            from: Endpoint::Port { block_id: BlockId("pub_b".to_string()), port_id: PortId("value".to_string()) },
            to: Endpoint::Bus { bus_id: BusId("mix".to_string()) },
            transforms: vec![],
            enabled: true,
            role: EdgeRole::User,
        },
        Edge {
            id: EdgeId("zzz_pub_a".to_string()),
            from: Endpoint::Port { block_id: BlockId("pub_a".to_string()), port_id: PortId("value".to_string()) },
            to: Endpoint::Bus { bus_id: BusId("mix".to_string()) },
            transforms: vec![],
            enabled: true,
            role: EdgeRole::User,
        },
        Edge {
            id: EdgeId("e-listen".to_string()),
            from: Endpoint::Bus { bus_id: BusId("mix".to_string()) },
            to: Endpoint::Port { block_id: BlockId("render".to_string()), port_id: PortId("size".to_string()) },
            transforms: vec![],
            enabled: true,
            role: EdgeRole::User,
        },
    ];
    let buses = vec![Bus {
        id: BusId("mix".to_string()),
        name: "mix".to_string(),
        r#type: TypeDesc::new(World::Signal, Domain::Float),
        combine_mode,
        default: None,
    }];
    RawPatch { blocks, edges, buses, settings: PatchSettings::default() }
}

fn compiled_bus_size(combine_mode: CombineMode) -> f32 {
    let patch = bus_combine_patch(combine_mode);
    let program = loomcast_core::compile(&patch).unwrap();
    let mut exec = ScheduleExecutor::new(program);
    let frame = exec.run_frame(0.0).unwrap();
    let size_bytes = &frame.passes[0].buffers.iter().find(|(name, _)| name == "size").unwrap().1;
    let size: &[f32] = bytemuck::cast_slice(size_bytes);
    size[0]
}

#[test]
fn bus_last_combine_picks_the_highest_sort_key_publisher_not_the_highest_edge_id() {
    assert!(
        (compiled_bus_size(CombineMode::Last) - 2.0).abs() < 1e-6,
        "Last must resolve by (fromBlockIdx, fromPortIdx, id): pub_b (block-index order, edge id \"aaa_pub_b\") should win over pub_a"
    );
}

#[test]
fn bus_first_combine_picks_the_lowest_sort_key_publisher_not_the_lowest_edge_id() {
    assert!(
        (compiled_bus_size(CombineMode::First) - 1.0).abs() < 1e-6,
        "First must resolve by (fromBlockIdx, fromPortIdx, id): pub_a (block-index order) should win over pub_b (edge id \"aaa_pub_b\" sorts first)"
    );
}

#[test]
fn unknown_block_type_is_reported_as_a_compile_error() {
    let mut patch = single_instance_patch();
    patch.blocks.push(block("mystery", "NotARealBlockType", BTreeMap::new()));
    let result = loomcast_core::compile(&patch);
    assert!(result.is_err(), "an unrecognized type_tag must surface as a compile error, not a panic");
}
