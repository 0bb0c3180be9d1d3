//! Statistics collection and export.
//!
//! [`ExecStats`] are the counters an execution system keeps while it runs.
//! [`SimulationStats`] aggregates a whole run (circuit shape, counters and
//! wall-clock timing) and exports it as JSON, CSV or a human summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::Tick;

/// Counters maintained by the executor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStats {
    /// Completed ticks (latch passes)
    pub ticks: u64,
    /// Execution steps run, nets and phases together
    pub steps_executed: u64,
    pub net_propagations: u64,
    pub phase_invocations: u64,
    pub latch_invocations: u64,
    /// Net resolutions that found more than one enabled driver
    pub contentions: u64,
    /// Phase functions that reported a fault
    pub faults: u64,
}

impl ExecStats {
    /// Adds another system's counters, for folding in sub-systems.
    pub fn merge(&mut self, other: &ExecStats) {
        self.steps_executed += other.steps_executed;
        self.net_propagations += other.net_propagations;
        self.phase_invocations += other.phase_invocations;
        self.latch_invocations += other.latch_invocations;
        self.contentions += other.contentions;
        self.faults += other.faults;
    }
}

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub metadata: SimulationMetadata,

    /// Shape of the compiled circuit
    pub circuit: CircuitStats,

    /// Executor counters at the end of the run
    pub exec: ExecStats,

    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// Crate version that produced the run
    pub version: String,

    /// Configuration file used (if any)
    pub config_file: Option<String>,
}

/// Size of the compiled circuit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CircuitStats {
    pub final_tick: Tick,
    pub comp_count: usize,
    pub net_count: usize,
    pub execution_steps: usize,
    pub latch_steps: usize,
    pub sub_systems: usize,
    /// Structural and topological diagnostics
    pub diagnostics: usize,
    /// Runtime diagnostics raised in the last tick
    pub runtime_diagnostics: usize,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    pub ticks_per_second: f64,

    pub steps_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..SimulationMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(timestamp_now());
    }

    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(timestamp_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.ticks_per_second = self.exec.ticks as f64 / seconds;
            self.timing.steps_per_second = self.exec.steps_executed as f64 / seconds;
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");

        csv.push_str(&format!("final_tick,{}\n", self.circuit.final_tick));
        csv.push_str(&format!("comp_count,{}\n", self.circuit.comp_count));
        csv.push_str(&format!("net_count,{}\n", self.circuit.net_count));
        csv.push_str(&format!("execution_steps,{}\n", self.circuit.execution_steps));
        csv.push_str(&format!("latch_steps,{}\n", self.circuit.latch_steps));
        csv.push_str(&format!("diagnostics,{}\n", self.circuit.diagnostics));

        csv.push_str(&format!("ticks,{}\n", self.exec.ticks));
        csv.push_str(&format!("steps_executed,{}\n", self.exec.steps_executed));
        csv.push_str(&format!("net_propagations,{}\n", self.exec.net_propagations));
        csv.push_str(&format!("phase_invocations,{}\n", self.exec.phase_invocations));
        csv.push_str(&format!("latch_invocations,{}\n", self.exec.latch_invocations));
        csv.push_str(&format!("contentions,{}\n", self.exec.contentions));
        csv.push_str(&format!("faults,{}\n", self.exec.faults));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("ticks_per_second,{:.2}\n", self.timing.ticks_per_second));

        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Circuit ---")?;
        writeln!(w, "Components: {}", self.circuit.comp_count)?;
        writeln!(w, "Nets: {}", self.circuit.net_count)?;
        writeln!(
            w,
            "Steps: {} execution, {} latch",
            self.circuit.execution_steps, self.circuit.latch_steps
        )?;
        writeln!(w, "Sub-systems: {}", self.circuit.sub_systems)?;
        writeln!(w, "Diagnostics: {}", self.circuit.diagnostics)?;
        writeln!(w)?;

        writeln!(w, "--- Execution ---")?;
        writeln!(w, "Final tick: {}", self.circuit.final_tick)?;
        writeln!(w, "Steps executed: {}", self.exec.steps_executed)?;
        writeln!(w, "Net propagations: {}", self.exec.net_propagations)?;
        writeln!(w, "Phase invocations: {}", self.exec.phase_invocations)?;
        writeln!(w, "Latch invocations: {}", self.exec.latch_invocations)?;
        writeln!(w, "Bus contentions: {}", self.exec.contentions)?;
        writeln!(w, "Phase faults: {}", self.exec.faults)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Ticks/sec: {:.2}", self.timing.ticks_per_second)?;
        writeln!(w, "Steps/sec: {:.2}", self.timing.steps_per_second)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        self.write_summary(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn timestamp_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Statistics collector that can be attached to an engine.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            stats: SimulationStats::new(),
            timer: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    pub fn set_config_file(&mut self, path: impl Into<String>) {
        self.stats.metadata.config_file = Some(path.into());
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.record_start();
    }

    /// Stops timing and computes final statistics.
    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(ref timer) = self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    /// Updates circuit and execution statistics from an `ExeSystem::export_stats` value.
    pub fn update_from_json(&mut self, json: &serde_json::Value) {
        let count = |key: &str| json[key].as_u64().unwrap_or(0) as usize;
        self.stats.circuit = CircuitStats {
            final_tick: json["tick"].as_u64().unwrap_or(0),
            comp_count: count("comp_count"),
            net_count: count("net_count"),
            execution_steps: count("execution_steps"),
            latch_steps: count("latch_steps"),
            sub_systems: count("sub_systems"),
            diagnostics: count("diagnostics"),
            runtime_diagnostics: count("runtime_diagnostics"),
        };
        if let Some(exec) = json.get("exec") {
            if let Ok(exec) = serde_json::from_value::<ExecStats>(exec.clone()) {
                self.stats.exec = exec;
            }
        }
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Consumes the collector and returns the statistics.
    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = SimulationStats::new().with_name("Test Simulation");

        assert_eq!(stats.metadata.name, "Test Simulation");
        assert!(!stats.metadata.version.is_empty());
    }

    #[test]
    fn test_stats_json_export() {
        let mut stats = SimulationStats::new();
        stats.circuit.final_tick = 1000;
        stats.exec.steps_executed = 123;

        let json = stats.to_json().unwrap();
        assert!(json.contains("1000"));
        assert!(json.contains("123"));
    }

    #[test]
    fn test_stats_csv_export() {
        let mut stats = SimulationStats::new();
        stats.circuit.final_tick = 1000;
        stats.exec.contentions = 3;

        let csv = stats.to_csv();
        assert!(csv.contains("final_tick,1000"));
        assert!(csv.contains("contentions,3"));
    }

    #[test]
    fn test_exec_stats_merge() {
        let mut a = ExecStats {
            ticks: 2,
            steps_executed: 10,
            ..ExecStats::default()
        };
        let b = ExecStats {
            ticks: 5,
            steps_executed: 4,
            faults: 1,
            ..ExecStats::default()
        };
        a.merge(&b);
        assert_eq!(a.ticks, 2);
        assert_eq!(a.steps_executed, 14);
        assert_eq!(a.faults, 1);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_stats_collector() {
        let mut collector = StatsCollector::new();
        collector.set_name("Test");
        collector.start();

        std::thread::sleep(std::time::Duration::from_millis(5));

        collector.stop();

        let stats = collector.stats();
        assert_eq!(stats.metadata.name, "Test");
        assert!(stats.timing.total_wall_time_ms >= 5.0);
    }

    #[test]
    fn test_stats_collector_from_json() {
        let mut collector = StatsCollector::new();

        let json = serde_json::json!({
            "tick": 12,
            "comp_count": 4,
            "net_count": 3,
            "execution_steps": 7,
            "latch_steps": 1,
            "sub_systems": 0,
            "diagnostics": 0,
            "runtime_diagnostics": 0,
            "exec": {
                "ticks": 12,
                "steps_executed": 84,
                "net_propagations": 36,
                "phase_invocations": 48,
                "latch_invocations": 12,
                "contentions": 0,
                "faults": 0
            }
        });

        collector.update_from_json(&json);

        let stats = collector.stats();
        assert_eq!(stats.circuit.final_tick, 12);
        assert_eq!(stats.circuit.execution_steps, 7);
        assert_eq!(stats.exec.steps_executed, 84);
        assert_eq!(stats.exec.latch_invocations, 12);
    }

    #[test]
    fn test_summary_output() {
        let mut stats = SimulationStats::new().with_name("Summary Test");
        stats.circuit.final_tick = 1000;
        stats.exec.steps_executed = 100;

        let summary = stats.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("1000"));
    }
}
