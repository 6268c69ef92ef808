use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ReviewError};
use crate::models::{DailyRecord, NewRecord, WeeklyAggregate};

/// Persistence contract for daily records.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Validates and persists a record; the store assigns `id` and `created_at`.
    /// Needs the `created_at` column: the legacy fallback only covers reads.
    async fn insert(&self, record: &NewRecord) -> Result<DailyRecord>;

    /// Records created within `[start, end]`, newest first. Falls back to
    /// every record (by id, descending) when the table has no timestamp.
    async fn query_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyRecord>>;

    async fn all_records(&self) -> Result<Vec<DailyRecord>>;

    /// Means over records created within `[now - days, now]`; `NoData` when empty.
    async fn aggregate_last_n_days(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<WeeklyAggregate>;
}

pub struct PgRecordStore {
    pool: PgPool,
}

const RECORD_COLUMNS: &str =
    "id, work, training, studies, mind, positive_notes, negative_notes";

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether `daily_review.records` still carries `created_at`. Tables
    /// created before the column existed are served through the fallback.
    pub async fn has_timestamp_column(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = 'daily_review'
                  AND table_name = 'records'
                  AND column_name = 'created_at'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Inserts with an optional idempotency key and an explicit timestamp.
    /// Returns `None` when a row with the same key already exists.
    pub async fn insert_keyed(
        &self,
        record: &NewRecord,
        source_key: Option<&str>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Option<DailyRecord>> {
        record.validate()?;

        let row = sqlx::query(
            r#"
            INSERT INTO daily_review.records
            (work, training, studies, mind, positive_notes, negative_notes, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()), $8)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING id, work, training, studies, mind, positive_notes, negative_notes, created_at
            "#,
        )
        .bind(record.work)
        .bind(record.training)
        .bind(record.studies)
        .bind(record.mind)
        .bind(record.positive_notes.trim())
        .bind(record.negative_notes.trim())
        .bind(created_at)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_record(&r)).transpose()
    }

    async fn fetch_all_by_id(&self) -> Result<Vec<DailyRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS}, NULL::timestamptz AS created_at \
             FROM daily_review.records ORDER BY id DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(map_record).collect()
    }
}

impl RecordStore for PgRecordStore {
    async fn insert(&self, record: &NewRecord) -> Result<DailyRecord> {
        let stored = self
            .insert_keyed(record, None, None)
            .await?
            .ok_or(ReviewError::Database(sqlx::Error::RowNotFound))?;
        info!(id = stored.id, "daily record stored");
        Ok(stored)
    }

    async fn query_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyRecord>> {
        if !self.has_timestamp_column().await? {
            warn!("records table has no created_at column, returning all records");
            return self.fetch_all_by_id().await;
        }

        let query = format!(
            "SELECT {RECORD_COLUMNS}, created_at FROM daily_review.records \
             WHERE created_at BETWEEN $1 AND $2 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), %start, %end, "window query");
        rows.iter().map(map_record).collect()
    }

    async fn all_records(&self) -> Result<Vec<DailyRecord>> {
        if !self.has_timestamp_column().await? {
            return self.fetch_all_by_id().await;
        }

        let query = format!(
            "SELECT {RECORD_COLUMNS}, created_at FROM daily_review.records \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(map_record).collect()
    }

    async fn aggregate_last_n_days(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<WeeklyAggregate> {
        let select = "SELECT AVG(work)::float8 AS avg_work, \
                      AVG(training)::float8 AS avg_training, \
                      AVG(studies)::float8 AS avg_studies, \
                      AVG(mind)::float8 AS avg_mind, \
                      COUNT(*) AS total_reviews \
                      FROM daily_review.records";

        let row = if self.has_timestamp_column().await? {
            let since = window_start(now, days)?;
            let windowed = format!("{select} WHERE created_at BETWEEN $1 AND $2");
            sqlx::query(&windowed)
                .bind(since)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
        } else {
            warn!("records table has no created_at column, aggregating all records");
            sqlx::query(select).fetch_one(&self.pool).await?
        };

        let total_reviews: i64 = row.try_get("total_reviews")?;
        if total_reviews == 0 {
            return Err(ReviewError::NoData);
        }

        let mut means = [0.0; 4];
        for (mean, column) in means
            .iter_mut()
            .zip(["avg_work", "avg_training", "avg_studies", "avg_mind"])
        {
            let value: Option<f64> = row.try_get(column)?;
            *mean = value.ok_or(ReviewError::NoData)?;
        }

        WeeklyAggregate::from_means(means, total_reviews)
    }
}

/// Start of the rolling window ending at `now`.
pub fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days.max(1))
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(ReviewError::WindowOutOfRange(days))
}

fn map_record(row: &PgRow) -> Result<DailyRecord> {
    Ok(DailyRecord {
        id: row.try_get("id")?,
        work: row.try_get("work")?,
        training: row.try_get("training")?,
        studies: row.try_get("studies")?,
        mind: row.try_get("mind")?,
        positive_notes: row.try_get("positive_notes")?,
        negative_notes: row.try_get("negative_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(store: &PgRecordStore, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let samples = [
        ("seed-001", [8, 7, 9, 8], "Closed the quarterly review", "Skipped lunch", 1),
        ("seed-002", [7, 8, 7, 6], "Long run before work", "Too much screen time", 3),
        ("seed-003", [9, 6, 8, 7], "Finished two course modules", "Missed the gym", 5),
    ];

    let mut inserted = 0usize;
    for (source_key, scores, positive, negative, days_ago) in samples {
        let record = NewRecord {
            work: scores[0],
            training: scores[1],
            studies: scores[2],
            mind: scores[3],
            positive_notes: positive.to_string(),
            negative_notes: negative.to_string(),
        };
        let created_at = now - Duration::days(days_ago);
        if store
            .insert_keyed(&record, Some(source_key), Some(created_at))
            .await?
            .is_some()
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    /// CSV line number and the validation messages for each rejected row.
    pub rejected: Vec<(usize, Vec<String>)>,
}

pub async fn import_csv(
    store: &PgRecordStore,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        work: i32,
        training: i32,
        studies: i32,
        mind: i32,
        positive_notes: String,
        negative_notes: String,
        created_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row on line {line}"))?;
        let record = NewRecord {
            work: row.work,
            training: row.training,
            studies: row.studies,
            mind: row.mind,
            positive_notes: row.positive_notes,
            negative_notes: row.negative_notes,
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        match store
            .insert_keyed(&record, Some(&source_key), row.created_at)
            .await
        {
            Ok(Some(_)) => summary.inserted += 1,
            Ok(None) => summary.duplicates += 1,
            Err(err @ ReviewError::Validation(_)) => {
                warn!(line, fields = ?err.violated_fields(), "rejected CSV row");
                summary.rejected.push((line, err.messages()));
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(summary)
}
