//! Layout persistence: a saved and reloaded layout compiles to the same system.

use std::path::PathBuf;
use std::sync::Arc;

use gatework::comps::defs;
use gatework::layout::Vec3;
use gatework::{
    compile, create_default_library, Comp, CompArgs, CompPort, CpuLayout, ElRef, ExeSystem,
    LayoutError, PortDir, WireGraph,
};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gatework_{}_{name}", std::process::id()))
}

fn build(layout: &CpuLayout) -> ExeSystem {
    compile(layout, Arc::new(create_default_library())).unwrap()
}

/// An accumulator: acc <- acc + step, with editor state filled in.
fn accumulator() -> CpuLayout {
    let w16 = CompArgs::new().with("width", 16);
    let mut layout = CpuLayout::new()
        .with_comp(
            Comp::new("c0", defs::INPUT)
                .with_name("step")
                .with_args(w16.clone().with("value", 3))
                .at(Vec3::new(0.0, 0.0, 0.0)),
        )
        .with_comp(
            Comp::new("c1", defs::ALU)
                .with_args(w16.clone())
                .with_port(CompPort::new("a", PortDir::IN | PortDir::DATA).with_id("lhs"))
                .at(Vec3::new(4.0, 0.0, 0.0)),
        )
        .with_comp(Comp::new("c2", defs::REG).with_args(w16).at(Vec3::new(8.0, 0.0, 0.0)))
        .with_comp(Comp::new("c3", defs::PROBE).at(Vec3::new(12.0, 0.0, 0.0)))
        .with_wire(WireGraph::connecting("w0", [("c0", "out"), ("c1", "b")]))
        .with_wire(WireGraph::connecting("w1", [("c1", "out"), ("c2", "in")]))
        .with_wire(WireGraph::connecting("w2", [("c2", "out"), ("c1", "lhs")]))
        .with_wire(WireGraph::connecting("w3", [("c3", "in")]).with_junction("w2"));
    layout.selected.push(ElRef::comp("c1"));
    layout.selected.push(ElRef::wire("w2", Some(0)));
    layout
}

fn assert_same_system(a: &ExeSystem, b: &ExeSystem) {
    assert_eq!(a.execution_steps, b.execution_steps);
    assert_eq!(a.latch_steps, b.latch_steps);
    assert_eq!(a.diagnostics, b.diagnostics);
    assert_eq!(a.nets.len(), b.nets.len());
    for (x, y) in a.nets.iter().zip(&b.nets) {
        assert_eq!(x.wire_ids, y.wire_ids);
        assert_eq!(x.width, y.width);
        assert_eq!(x.shape, y.shape);
    }
    for (x, y) in a.comps.iter().zip(&b.comps) {
        assert_eq!(x.comp.id, y.comp.id);
        assert_eq!(x.data, y.data);
        assert_eq!(x.ports, y.ports);
    }
}

#[test]
fn test_accumulator_runs() {
    let mut sys = build(&accumulator());
    assert!(sys.diagnostics.is_empty(), "{:?}", sys.diagnostics);
    sys.run(4);
    sys.settle();
    assert_eq!(sys.port_value("c3", "in"), Some(12));
}

#[test]
fn test_json_file_round_trip() {
    let layout = accumulator();
    let path = temp_path("acc.json");
    layout.to_file(&path).unwrap();
    let loaded = CpuLayout::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded, layout);
    assert_eq!(loaded.selected.len(), 2);
    assert_same_system(&build(&layout), &build(&loaded));
}

#[test]
fn test_yaml_file_round_trip() {
    let layout = accumulator();
    let path = temp_path("acc.yaml");
    layout.to_file(&path).unwrap();
    let loaded = CpuLayout::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded, layout);
    assert_same_system(&build(&layout), &build(&loaded));
}

#[test]
fn test_json_and_yaml_agree_after_running() {
    let layout = accumulator();
    let from_json = CpuLayout::from_json(&layout.to_json().unwrap()).unwrap();
    let from_yaml = CpuLayout::from_yaml(&layout.to_yaml().unwrap()).unwrap();

    let mut a = build(&from_json);
    let mut b = build(&from_yaml);
    for _ in 0..6 {
        a.tick();
        b.tick();
        assert_eq!(a.data("c2"), b.data("c2"));
    }
}

#[test]
fn test_id_counters_survive_round_trip() {
    let mut layout = accumulator();
    assert_eq!(layout.next_comp_id, 4);
    let json = layout.to_json().unwrap();
    let mut loaded = CpuLayout::from_json(&json).unwrap();
    assert_eq!(loaded.alloc_comp_id(), layout.alloc_comp_id());
    assert_eq!(loaded.alloc_wire_id(), "w4");
}

#[test]
fn test_hand_written_yaml() {
    let yaml = r#"
comps:
  - id: k
    def_id: const
    args: { width: 8, value: "0x2a" }
  - id: out
    def_id: probe
wires:
  - id: w
    nodes:
      - id: 0
        edges: [1]
        ref: { ty: CompNode, id: k, comp_node_id: out }
      - id: 1
        edges: [0]
        ref: { ty: CompNode, id: out, comp_node_id: in }
"#;
    let layout = CpuLayout::from_yaml(yaml).unwrap();
    let mut sys = build(&layout);
    assert!(sys.diagnostics.is_empty(), "{:?}", sys.diagnostics);
    sys.settle();
    assert_eq!(sys.port_value("out", "in"), Some(0x2a));
}

#[test]
fn test_duplicate_wire_rejected_on_load() {
    let json = r#"{ "wires": [ { "id": "w0" }, { "id": "w0" } ] }"#;
    assert!(matches!(
        CpuLayout::from_json(json),
        Err(LayoutError::DuplicateWire(id)) if id == "w0"
    ));
}
