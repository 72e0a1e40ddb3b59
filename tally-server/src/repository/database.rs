use std::time::Duration;

use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tally_metrics::{Metric, MetricType, MetricValue};

use crate::repository::{Repository, StoreError};

/// Maximum number of pooled database connections.
const MAX_CONNECTIONS: u32 = 10;

/// Time to wait for a free connection before the pool reports a timeout.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns `true` if the SQLSTATE code is a connection exception (class `08`).
pub fn is_transient_code(code: &str) -> bool {
    code.starts_with("08")
}

/// Returns `true` if the error means the database could not be reached.
///
/// Constraint violations and other query errors are never transient.
pub(crate) fn is_connection_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(error) => error.code().is_some_and(|code| is_transient_code(&code)),
        _ => false,
    }
}

/// A repository that stores metrics in a PostgreSQL table.
///
/// Updates are upserts, so the database resolves concurrent writes to the same id. Bulk updates
/// run in a single transaction.
#[derive(Debug, Clone)]
pub struct DatabaseRepository {
    db: PgPool,
}

impl DatabaseRepository {
    /// Creates a repository for the database at `dsn`.
    ///
    /// Connections are established lazily, use [`ping`](Repository::ping) to check that the
    /// database is reachable.
    pub fn connect(dsn: &str) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(dsn)
            .map_err(StoreError::Database)?;

        Ok(Self { db })
    }

    /// Creates the metrics table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for DatabaseRepository {
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError> {
        let row = build_upsert(&metric).fetch_one(&self.db).await?;
        metric_from_row(&row)
    }

    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        for metric in &metrics {
            build_upsert(metric).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError> {
        let row = build_get(id).fetch_optional(&self.db).await?;
        row.as_ref().map(metric_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Metric>, StoreError> {
        let rows = build_list().fetch_all(&self.db).await?;
        rows.iter().map(metric_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

fn metric_from_row(row: &PgRow) -> Result<Metric, StoreError> {
    let id: String = row.try_get("id")?;
    let ty: String = row.try_get("type")?;
    let delta: Option<i64> = row.try_get("delta")?;
    let value: Option<f64> = row.try_get("value")?;

    let value = match (ty.parse::<MetricType>(), delta, value) {
        (Ok(MetricType::Counter), Some(delta), _) => MetricValue::Counter(delta),
        (Ok(MetricType::Gauge), _, Some(value)) => MetricValue::Gauge(value),
        _ => return Err(StoreError::InvalidRecord(id)),
    };

    Ok(Metric { id, value })
}

/// Inserts a metric, or merges it into the stored row.
///
/// Counters of the same type add up, saturating at the bounds of `BIGINT` like the in-memory
/// backends. Any other update replaces type and value.
fn build_upsert(metric: &Metric) -> Query<'_, Postgres, PgArguments> {
    let (delta, value) = match metric.value {
        MetricValue::Counter(delta) => (Some(delta), None),
        MetricValue::Gauge(value) => (None, Some(value)),
    };

    sqlx::query(
        "INSERT INTO metrics (id, type, delta, value) VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            type = EXCLUDED.type,
            delta = CASE
                WHEN metrics.type = 'counter' AND EXCLUDED.type = 'counter'
                THEN LEAST(
                    GREATEST(
                        metrics.delta::NUMERIC + EXCLUDED.delta::NUMERIC,
                        -9223372036854775808
                    ),
                    9223372036854775807
                )::BIGINT
                ELSE EXCLUDED.delta
            END,
            value = EXCLUDED.value
        RETURNING id, type, delta, value;",
    )
    .bind(metric.id.as_str())
    .bind(metric.ty().as_str())
    .bind(delta)
    .bind(value)
}

fn build_get(id: &str) -> Query<'_, Postgres, PgArguments> {
    sqlx::query("SELECT id, type, delta, value FROM metrics WHERE id = $1;").bind(id)
}

fn build_list<'a>() -> Query<'a, Postgres, PgArguments> {
    sqlx::query("SELECT id, type, delta, value FROM metrics ORDER BY id;")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::repository::tests::{check_concurrent_updates, check_contract};

    #[test]
    fn test_transient_codes() {
        assert!(is_transient_code("08000"));
        assert!(is_transient_code("08006"));
        assert!(!is_transient_code("23505"));
        assert!(!is_transient_code("22003"));
    }

    #[test]
    fn test_connection_errors_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_transient());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
    }

    /// Runs against the database in `TALLY_TEST_DATABASE_URL`, if set.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_postgres_contract() {
        let Ok(dsn) = std::env::var("TALLY_TEST_DATABASE_URL") else {
            return;
        };

        let repository = DatabaseRepository::connect(&dsn).unwrap();
        repository.migrate().await.unwrap();

        sqlx::query("TRUNCATE metrics;")
            .execute(&repository.db)
            .await
            .unwrap();
        check_contract(Arc::new(repository.clone())).await;

        sqlx::query("TRUNCATE metrics;")
            .execute(&repository.db)
            .await
            .unwrap();
        check_concurrent_updates(Arc::new(repository)).await;
    }
}
