use sysinfo::System;
use tally_metrics::Metric;

use super::Collector;

/// Collects memory and CPU statistics of the host.
///
/// Emits the gauges `TotalMemory`, `FreeMemory` and `UsedMemory` in bytes, and one gauge
/// `CPUutilization{n}` per logical CPU, numbered from 1. CPU usage is measured since the previous
/// poll, so the first sample of every CPU reads as zero.
pub struct SystemCollector {
    system: System,
}

impl SystemCollector {
    /// Creates a new system collector.
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SystemCollector {
    fn name(&self) -> &'static str {
        "system"
    }

    fn collect(&mut self) -> Vec<Metric> {
        let mut batch = Vec::new();

        self.system.refresh_memory();
        // Zero total memory means the platform could not report it.
        if self.system.total_memory() > 0 {
            batch.extend([
                Metric::gauge("TotalMemory", self.system.total_memory() as f64),
                Metric::gauge("FreeMemory", self.system.free_memory() as f64),
                Metric::gauge("UsedMemory", self.system.used_memory() as f64),
            ]);
        }

        self.system.refresh_cpu_usage();
        for (index, cpu) in self.system.cpus().iter().enumerate() {
            batch.push(Metric::gauge(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }

        batch
    }
}
