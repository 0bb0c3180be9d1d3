//! Shared tristate bus example.
//!
//! Three devices sit behind tristate buffers on one 8-bit bus, and an
//! arbiter schedule decides which buffers are enabled on each tick. With one
//! driver the bus carries its value; with none it floats; with two or more
//! the net floats and a bus contention diagnostic is raised. The engine's
//! command interface drives the run.

use std::sync::Arc;

use gatework::comps::defs;
use gatework::{
    create_default_library, Command, Comp, CompArgs, CpuLayout, DiagnosticKind, ElRef,
    SimulationEngine, WireGraph,
};

const BUS_WIDTH: u64 = 8;

/// (device id, value it drives)
const DEVICES: [(&str, u64); 3] = [("rom", 0x11), ("uart", 0x22), ("timer", 0x33)];

/// Enable pattern per tick, one bit per device.
const SCHEDULE: [u8; 6] = [0b001, 0b010, 0b000, 0b100, 0b011, 0b001];

fn bus_layout() -> CpuLayout {
    let w = |bits: u64| CompArgs::new().with("width", bits);
    let mut layout = CpuLayout::new().with_comp(Comp::new("mon", defs::PROBE));
    let mut bus = WireGraph::connecting("bus", [("mon", "in")]);

    for (device, value) in DEVICES {
        let buf = format!("{device}_buf");
        let en = format!("{device}_en");
        layout = layout
            .with_comp(Comp::new(device, defs::CONST).with_args(w(BUS_WIDTH).with("value", value)))
            .with_comp(Comp::new(en.clone(), defs::INPUT).with_args(w(1)))
            .with_comp(Comp::new(buf.clone(), defs::TRIBUF).with_args(w(BUS_WIDTH)))
            .with_wire(WireGraph::connecting(
                format!("{device}_data"),
                [(device, "out"), (buf.as_str(), "in")],
            ))
            .with_wire(WireGraph::connecting(
                format!("{device}_en_wire"),
                [(en.as_str(), "out"), (buf.as_str(), "en")],
            ));
        bus.add_node(Some(ElRef::comp_node(buf, "out")));
    }
    layout.with_wire(bus)
}

fn main() {
    gatework::init_logging("warn");

    println!("==== Tristate bus example ====");
    println!("Devices: {:?}\n", DEVICES);

    let mut engine = match SimulationEngine::new(bus_layout(), Arc::new(create_default_library())) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to build bus: {e}");
            return;
        }
    };

    for (tick, pattern) in SCHEDULE.iter().enumerate() {
        for (bit, (device, _)) in DEVICES.iter().enumerate() {
            let enabled = u64::from(pattern & (1 << bit) != 0);
            engine.system_mut().set_input(&format!("{device}_en"), enabled);
        }
        if let Err(e) = engine.execute(Command::Settle) {
            eprintln!("tick {tick}: {e}");
            return;
        }

        let sys = engine.system();
        let bus = sys.net_by_wire("bus");
        let drivers = bus.map_or(0, |net| net.enabled_count);
        let contended = sys
            .runtime_diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::BusContention);
        println!(
            "tick {tick}: enables {pattern:03b}  drivers {drivers}  bus {:#04x}{}",
            sys.net_value("bus").unwrap_or(0),
            if contended { "  CONTENTION" } else { "" },
        );

        if let Err(e) = engine.execute(Command::Latch) {
            eprintln!("tick {tick}: {e}");
            return;
        }
    }

    let stats = engine.export_stats();
    println!("\nContentions observed: {}", stats["system"]["exec"]["contentions"]);
}
