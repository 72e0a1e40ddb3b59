use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::Metric;

/// Accumulates metric samples into the current set of metrics.
///
/// Counters add up and gauges keep the last value, see [`MetricValue::merge`]. Every call to
/// [`merge`](Self::merge) applies its whole batch under a single lock, so concurrent merges never
/// interleave and [`snapshot`](Self::snapshot) never observes a partially applied batch.
///
/// The aggregator is never reset. Counters keep accumulating across deliveries, and a failed
/// delivery is simply repeated with the newer totals on the next report.
///
/// [`MetricValue::merge`]: crate::MetricValue::merge
#[derive(Debug, Default)]
pub struct Aggregator {
    metrics: Mutex<BTreeMap<String, Metric>>,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch of samples atomically.
    ///
    /// Gauge samples that are not finite are dropped, so the previous value of that gauge is kept.
    pub fn merge<I>(&self, batch: I)
    where
        I: IntoIterator<Item = Metric>,
    {
        let mut metrics = self.metrics.lock();
        for sample in batch {
            if !sample.value.is_finite() {
                continue;
            }

            match metrics.get_mut(&sample.id) {
                Some(existing) => existing.merge(&sample),
                None => {
                    metrics.insert(sample.id.clone(), sample);
                }
            }
        }
    }

    /// Returns a copy of all current metrics, ordered by id.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.metrics.lock().values().cloned().collect()
    }

    /// Returns the current value of a single metric.
    pub fn get(&self, id: &str) -> Option<Metric> {
        self.metrics.lock().get(id).cloned()
    }

    /// Returns the number of distinct metrics.
    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    /// Returns `true` if no sample has been merged yet.
    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::MetricValue;

    #[test]
    fn test_counter_accumulates() {
        let aggregator = Aggregator::new();
        aggregator.merge([Metric::counter("requests", 5)]);
        aggregator.merge([Metric::counter("requests", 3)]);
        assert_eq!(aggregator.get("requests"), Some(Metric::counter("requests", 8)));
    }

    #[test]
    fn test_gauge_overwrites() {
        let aggregator = Aggregator::new();
        aggregator.merge([Metric::gauge("cpu", 12.5)]);
        aggregator.merge([Metric::gauge("cpu", 9.1)]);
        assert_eq!(aggregator.get("cpu"), Some(Metric::gauge("cpu", 9.1)));
    }

    #[test]
    fn test_duplicate_ids_in_one_batch() {
        let aggregator = Aggregator::new();
        aggregator.merge([
            Metric::counter("PollCount", 1),
            Metric::counter("PollCount", 1),
            Metric::gauge("RandomValue", 0.1),
            Metric::gauge("RandomValue", 0.2),
        ]);

        assert_eq!(
            aggregator.snapshot(),
            vec![
                Metric::counter("PollCount", 2),
                Metric::gauge("RandomValue", 0.2),
            ]
        );
    }

    #[test]
    fn test_non_finite_gauges_are_dropped() {
        let aggregator = Aggregator::new();
        aggregator.merge([
            Metric::gauge("CPUutilization1", f64::NAN),
            Metric::gauge("ProcessCpuUsage", 3.5),
        ]);
        aggregator.merge([
            Metric::gauge("ProcessCpuUsage", f64::INFINITY),
            Metric::gauge("FreeMemory", f64::NEG_INFINITY),
            Metric::counter("PollCount", 1),
        ]);

        assert_eq!(
            aggregator.snapshot(),
            vec![
                Metric::counter("PollCount", 1),
                Metric::gauge("ProcessCpuUsage", 3.5),
            ]
        );

        let json = serde_json::to_string(&aggregator.snapshot()).unwrap();
        let decoded: Vec<Metric> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, aggregator.snapshot());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let aggregator = Aggregator::new();
        aggregator.merge([Metric::counter("c", 1)]);

        let snapshot = aggregator.snapshot();
        aggregator.merge([Metric::counter("c", 1)]);

        assert_eq!(snapshot, vec![Metric::counter("c", 1)]);
        assert_eq!(aggregator.snapshot(), vec![Metric::counter("c", 2)]);
    }

    #[test]
    fn test_concurrent_merges() {
        let aggregator = Arc::new(Aggregator::new());

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        aggregator.merge([Metric::counter("a", 1), Metric::counter("b", 1)]);
                    }
                })
            })
            .collect();

        let reader = {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let snapshot = aggregator.snapshot();
                    let values: Vec<_> = snapshot.iter().map(|m| m.value).collect();
                    // Both counters are merged in the same batch and must always agree.
                    if let [a, b] = values.as_slice() {
                        assert_eq!(a, b);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(aggregator.get("a").unwrap().value, MetricValue::Counter(8000));
        assert_eq!(aggregator.get("b").unwrap().value, MetricValue::Counter(8000));
        assert_eq!(aggregator.len(), 2);
    }
}
