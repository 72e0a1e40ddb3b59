//! Snapshot format of the file backend.
//!
//! A snapshot is a sequence of metrics in their JSON wire format, one per line. Blank lines are
//! ignored when reading.

use std::io::{self, BufRead, Write};

use tally_metrics::Metric;

use crate::repository::{Repository, StoreError};

/// An error reading or writing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot file could not be read or written.
    #[error("snapshot i/o failed")]
    Io(#[from] io::Error),

    /// A line of the snapshot is not a valid metric.
    #[error("invalid metric in line {line}")]
    Json {
        /// One-based line number.
        line: usize,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing a restored metric into the repository failed.
    #[error("failed to restore metric")]
    Store(#[source] Box<StoreError>),
}

/// Writes metrics as JSON lines.
pub fn dump<'a, W, I>(metrics: I, mut writer: W) -> Result<(), SnapshotError>
where
    W: Write,
    I: IntoIterator<Item = &'a Metric>,
{
    for metric in metrics {
        serde_json::to_writer(&mut writer, metric).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads metrics from JSON lines.
///
/// Invalid lines are reported through `on_error` and skipped. Returns the valid metrics in the
/// order they appear.
pub fn parse<R, F>(reader: R, mut on_error: F) -> Result<Vec<Metric>, SnapshotError>
where
    R: BufRead,
    F: FnMut(SnapshotError),
{
    let mut metrics = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(metric) => metrics.push(metric),
            Err(source) => on_error(SnapshotError::Json {
                line: index + 1,
                source,
            }),
        }
    }

    Ok(metrics)
}

/// Replays metrics from JSON lines into a repository.
///
/// Each metric goes through [`Repository::update`], so repeated ids are merged. Returns the number
/// of restored records.
pub async fn restore<R>(reader: R, repository: &dyn Repository) -> Result<usize, SnapshotError>
where
    R: BufRead,
{
    let metrics = parse(reader, |error| {
        tally_log::warn!(
            error = &error as &dyn std::error::Error,
            "skipping invalid snapshot record"
        );
    })?;

    let count = metrics.len();
    for metric in metrics {
        repository
            .update(metric)
            .await
            .map_err(|e| SnapshotError::Store(Box::new(e)))?;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::repository::IndexedRepository;

    #[test]
    fn test_dump_lines() {
        let metrics = [Metric::counter("PollCount", 5), Metric::gauge("Alloc", 1.5)];
        let mut out = Vec::new();
        dump(&metrics, &mut out).unwrap();

        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "{\"id\":\"PollCount\",\"type\":\"counter\",\"delta\":5}\n\
             {\"id\":\"Alloc\",\"type\":\"gauge\",\"value\":1.5}\n"
        );
    }

    #[test]
    fn test_parse_skips_invalid_lines() {
        let input = "{\"id\":\"a\",\"type\":\"counter\",\"delta\":1}\n\
                     \n\
                     not json\n\
                     {\"id\":\"b\",\"type\":\"gauge\",\"value\":2.0}\n";

        let mut errors = Vec::new();
        let metrics = parse(input.as_bytes(), |e| errors.push(e)).unwrap();

        assert_eq!(metrics, vec![Metric::counter("a", 1), Metric::gauge("b", 2.0)]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], SnapshotError::Json { line: 3, .. }));
    }

    #[tokio::test]
    async fn test_restore_merges_repeated_ids() {
        let input = "{\"id\":\"a\",\"type\":\"counter\",\"delta\":1}\n\
                     {\"id\":\"a\",\"type\":\"counter\",\"delta\":2}\n";

        let repository = IndexedRepository::new();
        let count = restore(input.as_bytes(), &repository).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            repository.get("a").await.unwrap(),
            Some(Metric::counter("a", 3))
        );
    }

    #[tokio::test]
    async fn test_restore_empty() {
        let repository = IndexedRepository::new();
        let count = restore(&b""[..], &repository).await.unwrap();
        assert_eq!(count, 0);
        assert!(repository.list().await.unwrap().is_empty());
    }
}
