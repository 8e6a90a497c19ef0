//! Audit event storage.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::{Stream, StreamExt};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::connection::{ConnectionSettings, Provider};
use crate::eligibility::LookBack;
use crate::event::{Event, RecipientSet, Stage, Status, path_key, subject_key};
use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const SQLITE_SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        batch TEXT NOT NULL,
        stage TEXT NOT NULL,
        timestamp_utc TEXT NOT NULL,
        run_date TEXT NOT NULL,
        master_path TEXT NOT NULL DEFAULT '',
        file_path TEXT NOT NULL DEFAULT '',
        path_key TEXT NOT NULL DEFAULT '',
        method TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        error_text TEXT NOT NULL DEFAULT '',
        duration_s INTEGER,
        recipients_to TEXT NOT NULL DEFAULT '',
        recipients_key TEXT NOT NULL DEFAULT '',
        subject TEXT NOT NULL DEFAULT '',
        subject_key TEXT NOT NULL DEFAULT ''
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_events_refresh ON events(path_key, stage, status, run_date)",
    "CREATE INDEX IF NOT EXISTS idx_events_email ON events(stage, status, run_date, batch, recipients_key)",
    "CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, timestamp_utc)",
];

const MYSQL_SCHEMA: &[&str] = &[r"
    CREATE TABLE IF NOT EXISTS events (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        run_id VARCHAR(191) NOT NULL,
        batch VARCHAR(191) NOT NULL,
        stage VARCHAR(16) NOT NULL,
        timestamp_utc VARCHAR(32) NOT NULL,
        run_date VARCHAR(10) NOT NULL,
        master_path TEXT NOT NULL,
        file_path TEXT NOT NULL,
        path_key TEXT NOT NULL,
        method VARCHAR(64) NOT NULL DEFAULT '',
        status VARCHAR(8) NOT NULL,
        error_text TEXT NOT NULL,
        duration_s BIGINT NULL,
        recipients_to TEXT NOT NULL,
        recipients_key TEXT NOT NULL,
        subject TEXT NOT NULL,
        subject_key TEXT NOT NULL,
        INDEX idx_events_refresh (path_key(255), stage, status, run_date),
        INDEX idx_events_email (stage, status, run_date, batch, recipients_key(255)),
        INDEX idx_events_run (run_id, timestamp_utc)
    ) CHARACTER SET utf8mb4
    "];

/// Parameters of a duplicate-send lookup.
#[derive(Debug, Clone, Copy)]
pub struct SentLookup<'a> {
    /// Recipient set of the candidate.
    pub recipients: &'a RecipientSet,
    /// Subject line (matched case-insensitively).
    pub subject: &'a str,
    /// Run date the window is anchored on.
    pub run_date: NaiveDate,
    /// Batch label the match is scoped to.
    pub batch: &'a str,
    /// When set, the joined attachment list must match as well.
    pub source_paths: Option<&'a str>,
    /// Dates treated as the same run.
    pub window: LookBack,
}

/// Append/query access to the shared event log.
///
/// Every worker holds a connection from the same pool; events are only ever
/// inserted, never updated or deleted.
#[derive(Clone)]
pub struct AuditStore {
    pool: AnyPool,
    provider: Provider,
}

impl AuditStore {
    /// Connect to the store described by `settings`.
    ///
    /// Creates the event table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    pub async fn connect(settings: &ConnectionSettings, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let url = settings.to_url()?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&url)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        let store = Self {
            pool,
            provider: settings.provider,
        };
        store.initialize().await?;
        debug!(provider = ?settings.provider, database = %settings.database, "audit store ready");
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            pool,
            provider: Provider::Sqlite,
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        let statements = match self.provider {
            Provider::Sqlite => SQLITE_SCHEMA,
            Provider::MySql => MYSQL_SCHEMA,
        };
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Durably append one event and return its insertion sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteRejected`] if required fields are missing, or
    /// [`Error::StoreUnavailable`] if the store cannot be reached.
    pub async fn append(&self, event: &Event) -> Result<i64> {
        event.validate()?;

        let mut sql = String::from(
            r"
            INSERT INTO events
                (run_id, batch, stage, timestamp_utc, run_date, master_path, file_path, path_key,
                 method, status, error_text, duration_s, recipients_to, recipients_key, subject,
                 subject_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        );
        // The SQLite side of the Any driver reports no last insert id.
        if self.provider == Provider::Sqlite {
            sql.push_str(" RETURNING id");
        }

        let query = sqlx::query(&sql)
            .bind(&event.run_id)
            .bind(&event.batch)
            .bind(event.stage.as_str())
            .bind(event.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .bind(event.run_date.format(DATE_FORMAT).to_string())
            .bind(&event.master_path)
            .bind(&event.source_path)
            .bind(path_key(&event.source_path))
            .bind(&event.method)
            .bind(event.status.as_str())
            .bind(&event.error_text)
            .bind(event.duration_s)
            .bind(&event.recipients)
            .bind(RecipientSet::parse(&event.recipients).key())
            .bind(&event.subject)
            .bind(subject_key(&event.subject));

        match self.provider {
            Provider::Sqlite => {
                let row = query.fetch_one(&self.pool).await?;
                Ok(row.try_get::<i64, _>("id")?)
            }
            Provider::MySql => query
                .execute(&self.pool)
                .await?
                .last_insert_id()
                .ok_or_else(|| Error::WriteRejected("no insert id reported".to_string())),
        }
    }

    /// Most recent run date with a successful refresh of `source_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest_refresh_date(&self, source_path: &str) -> Result<Option<NaiveDate>> {
        let row = sqlx::query(
            r"
            SELECT run_date
            FROM events
            WHERE path_key = ? AND stage = 'Refresh' AND status = 'OK'
            ORDER BY run_date DESC, timestamp_utc DESC
            LIMIT 1
            ",
        )
        .bind(path_key(source_path))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| parse_date(&r.try_get::<String, _>("run_date")?))
            .transpose()
    }

    /// Whether `source_path` was refreshed successfully on exactly `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn refresh_ok_on(&self, source_path: &str, date: NaiveDate) -> Result<bool> {
        self.refresh_exists(source_path, date, date, false).await
    }

    /// Whether a successful refresh of `source_path` on `date` was delivered
    /// by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn refresh_method_email_on(
        &self,
        source_path: &str,
        date: NaiveDate,
    ) -> Result<bool> {
        self.refresh_exists(source_path, date, date, true).await
    }

    /// Whether `source_path` has a successful refresh on any date of the
    /// window ending at `run_date`, optionally only one delivered by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn refreshed_within(
        &self,
        source_path: &str,
        run_date: NaiveDate,
        window: LookBack,
        email_only: bool,
    ) -> Result<bool> {
        self.refresh_exists(source_path, window.earliest(run_date), run_date, email_only)
            .await
    }

    async fn refresh_exists(
        &self,
        source_path: &str,
        earliest: NaiveDate,
        latest: NaiveDate,
        email_only: bool,
    ) -> Result<bool> {
        let mut sql = String::from(
            r"
            SELECT 1 AS hit
            FROM events
            WHERE path_key = ? AND stage = 'Refresh' AND status = 'OK'
              AND run_date >= ? AND run_date <= ?
            ",
        );
        if email_only {
            sql.push_str(" AND LOWER(method) = 'email'");
        }
        sql.push_str(" LIMIT 1");

        let row = sqlx::query(&sql)
            .bind(path_key(source_path))
            .bind(earliest.format(DATE_FORMAT).to_string())
            .bind(latest.format(DATE_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Whether an Email/OK event already exists for this recipient set and
    /// subject inside the lookup's window and batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn already_sent_ok(&self, lookup: &SentLookup<'_>) -> Result<bool> {
        let mut sql = String::from(
            r"
            SELECT 1 AS hit
            FROM events
            WHERE stage = 'Email' AND status = 'OK'
              AND run_date >= ? AND run_date <= ?
              AND batch = ?
              AND recipients_key = ?
              AND subject_key = ?
            ",
        );
        if lookup.source_paths.is_some() {
            sql.push_str(" AND path_key = ?");
        }
        sql.push_str(" LIMIT 1");

        let mut query = sqlx::query(&sql)
            .bind(
                lookup
                    .window
                    .earliest(lookup.run_date)
                    .format(DATE_FORMAT)
                    .to_string(),
            )
            .bind(lookup.run_date.format(DATE_FORMAT).to_string())
            .bind(lookup.batch)
            .bind(lookup.recipients.key())
            .bind(subject_key(lookup.subject));
        if let Some(paths) = lookup.source_paths {
            query = query.bind(path_key(paths));
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    /// Lazily yields every event of `run_id`, ordered by timestamp then by
    /// insertion sequence.
    ///
    /// Calling this again re-runs the query and sees any events appended
    /// since.
    pub fn events_for_run<'a>(
        &'a self,
        run_id: &'a str,
    ) -> impl Stream<Item = Result<Event>> + Send + 'a {
        sqlx::query(
            r"
            SELECT id, run_id, batch, stage, timestamp_utc, run_date, master_path,
                   file_path, method, status, error_text, duration_s, recipients_to, subject
            FROM events
            WHERE run_id = ?
            ORDER BY timestamp_utc ASC, id ASC
            ",
        )
        .bind(run_id)
        .fetch(&self.pool)
        .map(|row| row.map_err(Error::from).and_then(|r| row_to_event(&r)))
    }

    /// Counts events recorded for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for_run(&self, run_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM events WHERE run_id = ?")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")?)
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| Error::InvalidValue(format!("run_date '{value}': {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::InvalidValue(format!("timestamp '{value}': {e}")))
}

fn row_to_event(row: &AnyRow) -> Result<Event> {
    Ok(Event {
        id: Some(row.try_get::<i64, _>("id")?),
        run_id: row.try_get("run_id")?,
        batch: row.try_get("batch")?,
        stage: Stage::parse(&row.try_get::<String, _>("stage")?)?,
        timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp_utc")?)?,
        run_date: parse_date(&row.try_get::<String, _>("run_date")?)?,
        master_path: row.try_get("master_path")?,
        source_path: row.try_get("file_path")?,
        method: row.try_get("method")?,
        status: Status::parse(&row.try_get::<String, _>("status")?)?,
        error_text: row.try_get("error_text")?,
        duration_s: row.try_get::<Option<i64>, _>("duration_s")?,
        recipients: row.try_get("recipients_to")?,
        subject: row.try_get("subject")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures_util::TryStreamExt;

    use crate::event::join_paths;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn refresh(path: &str, day: u32) -> Event {
        Event::refresh("refresh-run", "Refresh1", path, d(day), Status::Ok)
    }

    fn sent(to: &str, subject: &str, day: u32, batch: &str) -> Event {
        Event::email(
            format!("email-log_{}", d(day)),
            batch,
            d(day),
            &RecipientSet::parse(to),
            subject,
            Status::Ok,
        )
        .with_source_path("/r/a.csv")
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = AuditStore::in_memory().await.unwrap();
        let first = store.append(&refresh("/r/a.csv", 1)).await.unwrap();
        let second = store.append(&refresh("/r/b.csv", 1)).await.unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_append_rejects_missing_fields() {
        let store = AuditStore::in_memory().await.unwrap();
        let event = Event::refresh("run", "", "/r/a.csv", d(1), Status::Ok);
        assert!(matches!(store.append(&event).await, Err(Error::WriteRejected(_))));
    }

    #[tokio::test]
    async fn test_latest_refresh_date_ignores_failures() {
        let store = AuditStore::in_memory().await.unwrap();
        store.append(&refresh("/r/a.csv", 3)).await.unwrap();
        store.append(&refresh("/r/a.csv", 5)).await.unwrap();
        store
            .append(&Event::refresh("r", "b", "/r/a.csv", d(9), Status::Fail))
            .await
            .unwrap();

        assert_eq!(store.latest_refresh_date("/r/a.csv").await.unwrap(), Some(d(5)));
        assert_eq!(store.latest_refresh_date("/r/none.csv").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_paths_match_case_and_separator_insensitively() {
        let store = AuditStore::in_memory().await.unwrap();
        store.append(&refresh(r"C:\Reports\Stock.xlsx", 4)).await.unwrap();

        assert!(store.refresh_ok_on("c:/reports/stock.XLSX", d(4)).await.unwrap());
        assert!(!store.refresh_ok_on("c:/reports/stock.xlsx", d(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_method_email() {
        let store = AuditStore::in_memory().await.unwrap();
        store.append(&refresh("/r/a.csv", 4).with_method("EMAIL")).await.unwrap();
        store.append(&refresh("/r/b.csv", 4).with_method("Drive")).await.unwrap();

        assert!(store.refresh_method_email_on("/r/a.csv", d(4)).await.unwrap());
        assert!(!store.refresh_method_email_on("/r/b.csv", d(4)).await.unwrap());
    }

    #[tokio::test]
    async fn test_refreshed_within_single_query_over_window() {
        let store = AuditStore::in_memory().await.unwrap();
        let run_date = d(10);
        let long_ago = run_date - chrono::Days::new(100);
        store
            .append(&Event::refresh("r", "b", "/r/a.csv", long_ago, Status::Ok))
            .await
            .unwrap();
        store
            .append(&Event::refresh("r", "b", "/r/b.csv", d(11), Status::Ok).with_method("Email"))
            .await
            .unwrap();

        let year = LookBack::days(365);
        assert!(store.refreshed_within("/r/a.csv", run_date, year, false).await.unwrap());
        assert!(!store.refreshed_within("/r/a.csv", run_date, year, true).await.unwrap());
        let short = LookBack::days(99);
        assert!(!store.refreshed_within("/r/a.csv", run_date, short, false).await.unwrap());
        // Refreshes after the run date fall outside the window.
        assert!(!store.refreshed_within("/r/b.csv", run_date, year, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_already_sent_respects_window_and_batch() {
        let store = AuditStore::in_memory().await.unwrap();
        store
            .append(&sent("a@x.com, b@y.com", "Daily", 9, "EmailBatch1"))
            .await
            .unwrap();

        let recipients = RecipientSet::parse("B@Y.com; a@x.com");
        let lookup = SentLookup {
            recipients: &recipients,
            subject: "DAILY",
            run_date: d(10),
            batch: "EmailBatch1",
            source_paths: None,
            window: LookBack::LENIENT,
        };
        assert!(store.already_sent_ok(&lookup).await.unwrap());

        let strict = SentLookup { window: LookBack::STRICT, ..lookup };
        assert!(!store.already_sent_ok(&strict).await.unwrap());

        let other_batch = SentLookup { batch: "EmailBatch2", ..lookup };
        assert!(!store.already_sent_ok(&other_batch).await.unwrap());
    }

    #[tokio::test]
    async fn test_already_sent_scoped_to_attachments() {
        let store = AuditStore::in_memory().await.unwrap();
        store
            .append(&sent("ops@co.com", "Daily", 10, "EmailBatch1"))
            .await
            .unwrap();

        let recipients = RecipientSet::parse("ops@co.com");
        let same = SentLookup {
            recipients: &recipients,
            subject: "Daily",
            run_date: d(10),
            batch: "EmailBatch1",
            source_paths: Some(r"\R\A.csv"),
            window: LookBack::STRICT,
        };
        assert!(store.already_sent_ok(&same).await.unwrap());

        let different = SentLookup { source_paths: Some("/r/b.csv"), ..same };
        assert!(!store.already_sent_ok(&different).await.unwrap());
    }

    #[tokio::test]
    async fn test_already_sent_matches_non_ascii_subject_case() {
        let store = AuditStore::in_memory().await.unwrap();
        store
            .append(&sent("ops@co.com", "Ümsatz Daily", 10, "EmailBatch1"))
            .await
            .unwrap();

        let recipients = RecipientSet::parse("ops@co.com");
        let lookup = SentLookup {
            recipients: &recipients,
            subject: "ümsatz DAILY",
            run_date: d(10),
            batch: "EmailBatch1",
            source_paths: None,
            window: LookBack::STRICT,
        };
        assert!(store.already_sent_ok(&lookup).await.unwrap());
    }

    #[tokio::test]
    async fn test_already_sent_with_long_attachment_and_recipient_lists() {
        let store = AuditStore::in_memory().await.unwrap();
        let paths: Vec<String> = (0..10)
            .map(|i| {
                format!("//fileserver/finance/reports/monthly/region-{i:02}/stock-position-summary.xlsx")
            })
            .collect();
        let joined = join_paths(&paths);
        let to: Vec<String> = (0..40)
            .map(|i| format!("regional.manager.{i:02}@company.example.com"))
            .collect();
        let recipients = RecipientSet::parse(&to.join(", "));
        assert!(joined.len() > 700);
        assert!(recipients.key().len() > 1024);

        store
            .append(
                &Event::email("run", "EmailBatch1", d(10), &recipients, "Monthly", Status::Ok)
                    .with_source_path(&joined),
            )
            .await
            .unwrap();

        let lookup = SentLookup {
            recipients: &recipients,
            subject: "Monthly",
            run_date: d(10),
            batch: "EmailBatch1",
            source_paths: Some(&joined),
            window: LookBack::STRICT,
        };
        assert!(store.already_sent_ok(&lookup).await.unwrap());
    }

    #[tokio::test]
    async fn test_events_for_run_ordered_by_timestamp_then_id() {
        let store = AuditStore::in_memory().await.unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();

        let base = Event::refresh("run-1", "b", "/r/a.csv", d(10), Status::Ok);
        store.append(&base.clone().at(late).with_error("third")).await.unwrap();
        store.append(&base.clone().at(early).with_error("first")).await.unwrap();
        store.append(&base.clone().at(late).with_error("fourth")).await.unwrap();
        store.append(&base.clone().at(early).with_error("second")).await.unwrap();
        store
            .append(&Event::refresh("run-2", "b", "/r/a.csv", d(10), Status::Ok))
            .await
            .unwrap();

        let events: Vec<Event> = store.events_for_run("run-1").try_collect().await.unwrap();
        let order: Vec<&str> = events.iter().map(|e| e.error_text.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third", "fourth"]);
        assert_eq!(events[0].timestamp, early);

        // Restartable: a second pass sees the same rows plus new appends.
        store.append(&base.at(late).with_error("fifth")).await.unwrap();
        let again: Vec<Event> = store.events_for_run("run-1").try_collect().await.unwrap();
        assert_eq!(again.len(), 5);
        assert_eq!(store.count_for_run("run-1").await.unwrap(), 5);
    }
}
