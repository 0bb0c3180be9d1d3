//! Performance benchmarks for the gatework simulator.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench simulation_bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gatework::comps::defs;
use gatework::{
    compile, create_default_library, Command, Comp, CompArgs, CompLibrary, CpuLayout, ElRef,
    SimulationEngine, WireGraph,
};

// ============================================================================
// Benchmark Circuits
// ============================================================================

fn width(w: u64) -> CompArgs {
    CompArgs::new().with("width", w)
}

/// input -> not -> not -> ... -> probe, `depth` gates long
fn inverter_chain(depth: usize) -> CpuLayout {
    let mut layout = CpuLayout::new().with_comp(Comp::new("src", defs::INPUT).with_args(width(32)));
    let mut prev = "src".to_string();
    for i in 0..depth {
        let id = format!("n{i}");
        layout = layout
            .with_comp(Comp::new(id.clone(), defs::NOT).with_args(width(32)))
            .with_wire(WireGraph::connecting(
                format!("w{i}"),
                [(prev.as_str(), "out"), (id.as_str(), "in")],
            ));
        prev = id;
    }
    layout
        .with_comp(Comp::new("p", defs::PROBE))
        .with_wire(WireGraph::connecting("wp", [(prev.as_str(), "out"), ("p", "in")]))
}

/// A shift register of `stages` registers fed by a counter
fn shift_register(stages: usize) -> CpuLayout {
    let mut layout = CpuLayout::new()
        .with_comp(Comp::new("pc", defs::PC).with_args(width(16).with("step", 1)));
    let mut prev = "pc".to_string();
    for i in 0..stages {
        let id = format!("r{i}");
        layout = layout
            .with_comp(Comp::new(id.clone(), defs::REG).with_args(width(16)))
            .with_wire(WireGraph::connecting(
                format!("w{i}"),
                [(prev.as_str(), "out"), (id.as_str(), "in")],
            ));
        prev = id;
    }
    layout
}

/// `drivers` tristate buffers on one bus, all enabled by a one-bit counter
fn tristate_bus(drivers: usize) -> CpuLayout {
    let mut layout = CpuLayout::new()
        .with_comp(Comp::new("p", defs::PROBE))
        .with_comp(Comp::new("pc", defs::PC).with_args(width(1).with("step", 1)));
    let mut bus = WireGraph::connecting("bus", [("p", "in")]);
    for i in 0..drivers {
        let (src, buf) = (format!("k{i}"), format!("t{i}"));
        layout = layout
            .with_comp(Comp::new(src.clone(), defs::CONST).with_args(width(8).with("value", i as u64)))
            .with_comp(Comp::new(buf.clone(), defs::TRIBUF).with_args(width(8)))
            .with_wire(WireGraph::connecting(
                format!("d{i}"),
                [(src.as_str(), "out"), (buf.as_str(), "in")],
            ));
        bus.add_node(Some(ElRef::comp_node(buf, "out")));
    }
    // ticks alternate between contention and a floating bus
    let mut enable = WireGraph::connecting("en", [("pc", "out")]);
    for i in 0..drivers {
        enable.add_node(Some(ElRef::comp_node(format!("t{i}"), "en")));
    }
    layout.with_wire(bus).with_wire(enable)
}

fn library() -> Arc<CompLibrary> {
    Arc::new(create_default_library())
}

// ============================================================================
// Compiler Benchmarks
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let lib = library();

    for depth in [10, 100, 1000].iter() {
        let layout = inverter_chain(*depth);
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::new("inverter_chain", depth), &layout, |b, layout| {
            b.iter(|| black_box(compile(layout, Arc::clone(&lib)).unwrap()));
        });
    }

    group.finish();
}

fn bench_layout_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_parse");

    for depth in [10, 100, 1000].iter() {
        let json = inverter_chain(*depth).to_json().unwrap();
        group.throughput(Throughput::Bytes(json.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", depth), &json, |b, json| {
            b.iter(|| black_box(CpuLayout::from_json(json).unwrap()));
        });
    }

    group.finish();
}

// ============================================================================
// Executor Benchmarks
// ============================================================================

fn bench_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle");

    for depth in [10, 100, 1000].iter() {
        let mut sys = compile(&inverter_chain(*depth), library()).unwrap();
        group.throughput(Throughput::Elements(sys.execution_steps.len() as u64));
        group.bench_with_input(BenchmarkId::new("inverter_chain", depth), depth, |b, _| {
            let mut value = 0;
            b.iter(|| {
                value += 1;
                sys.set_input("src", value);
                sys.rewind();
                black_box(sys.settle());
            });
        });
    }

    group.finish();
}

fn bench_tick_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_throughput");

    for ticks in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*ticks as u64));
        group.bench_with_input(BenchmarkId::new("ticks", ticks), ticks, |b, &ticks| {
            let mut sys = compile(&shift_register(32), library()).unwrap();
            b.iter(|| black_box(sys.run(ticks)));
        });
    }

    group.finish();
}

fn bench_tristate_bus(c: &mut Criterion) {
    let mut group = c.benchmark_group("tristate_bus");

    for drivers in [2, 8, 32].iter() {
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::new("drivers", drivers), drivers, |b, &drivers| {
            let mut sys = compile(&tristate_bus(drivers), library()).unwrap();
            b.iter(|| black_box(sys.run(100)));
        });
    }

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_engine_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    group.bench_function("run_and_reset", |b| {
        let mut engine = SimulationEngine::new(shift_register(16), library()).unwrap();
        b.iter(|| {
            black_box(engine.execute(Command::Run(100)).unwrap());
            engine
                .execute(Command::Reset(Default::default()))
                .unwrap();
        });
    });

    group.bench_function("recompile", |b| {
        let mut engine = SimulationEngine::new(inverter_chain(100), library()).unwrap();
        b.iter(|| engine.recompile().unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_compile,
    bench_layout_parse,
    bench_settle,
    bench_tick_throughput,
    bench_tristate_bus,
    bench_engine_commands,
);

criterion_main!(benches);
