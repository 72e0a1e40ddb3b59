use sysinfo::{Pid, ProcessesToUpdate, System};
use tally_metrics::Metric;

use super::Collector;

/// Collects statistics of the agent process itself.
///
/// Emits the gauges `ProcessMemory`, `ProcessVirtualMemory`, `ProcessCpuUsage`, `ProcessRunTime`,
/// `ProcessDiskRead` and `ProcessDiskWritten`, a `RandomValue` gauge in `[0, 1)` and a
/// `PollCount` counter that grows by one on every poll.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    /// Creates a collector for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(error) => {
                tally_log::warn!(error, "cannot determine process id, skipping process stats");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }

    fn process_stats(&mut self, batch: &mut Vec<Metric>) {
        let Some(pid) = self.pid else {
            return;
        };

        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let Some(process) = self.system.process(pid) else {
            return;
        };

        let disk = process.disk_usage();
        batch.extend([
            Metric::gauge("ProcessMemory", process.memory() as f64),
            Metric::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCpuUsage", f64::from(process.cpu_usage())),
            Metric::gauge("ProcessRunTime", process.run_time() as f64),
            Metric::gauge("ProcessDiskRead", disk.total_read_bytes as f64),
            Metric::gauge("ProcessDiskWritten", disk.total_written_bytes as f64),
        ]);
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn collect(&mut self) -> Vec<Metric> {
        let mut batch = Vec::with_capacity(8);
        self.process_stats(&mut batch);
        batch.push(Metric::gauge("RandomValue", rand::random::<f64>()));
        batch.push(Metric::counter("PollCount", 1));
        batch
    }
}

#[cfg(test)]
mod tests {
    use tally_metrics::MetricValue;

    use super::*;

    #[test]
    fn test_poll_count_and_random_value() {
        let mut collector = RuntimeCollector::new();
        let batch = collector.collect();

        let poll_count = batch.iter().find(|m| m.id == "PollCount").unwrap();
        assert_eq!(poll_count.value, MetricValue::Counter(1));

        let random = batch.iter().find(|m| m.id == "RandomValue").unwrap();
        match random.value {
            MetricValue::Gauge(value) => assert!((0.0..1.0).contains(&value), "{value}"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_process_stats() {
        let mut collector = RuntimeCollector::new();
        let batch = collector.collect();

        let memory = batch.iter().find(|m| m.id == "ProcessMemory").unwrap();
        assert!(matches!(memory.value, MetricValue::Gauge(v) if v > 0.0));
        assert!(batch.iter().any(|m| m.id == "ProcessRunTime"));
    }
}
