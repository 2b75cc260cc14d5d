//! SQLite persistence: recipients, message templates, schedules, and the
//! delivery history archive.
//!
//! All identifiers and timestamps are stored as TEXT (UUID / RFC 3339) to
//! keep the rows greppable with the sqlite3 CLI. Writes are low-frequency
//! direct queries through the pool.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::delivery::{DeliveryOutcome, DeliveryRequest};
use crate::scheduler::Cadence;

/// A saved message recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    /// Recipient identifier.
    pub id: Uuid,
    /// Display name, substituted into templates.
    pub name: String,
    /// Phone number as entered (normalized at enqueue time).
    pub phone: String,
}

/// A reusable message template with `{name}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Template identifier.
    pub id: Uuid,
    /// Template name.
    pub name: String,
    /// Template body.
    pub content: String,
}

impl MessageTemplate {
    /// Render the body for a recipient, substituting `{name}`.
    pub fn render(&self, recipient_name: &str) -> String {
        self.content.replace("{name}", recipient_name)
    }
}

/// A recurring job definition: recipient + template + cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule identifier.
    pub id: Uuid,
    /// Recipient reference.
    pub recipient_id: Uuid,
    /// Template reference.
    pub template_id: Uuid,
    /// When the schedule fires.
    pub cadence: Cadence,
    /// Inactive schedules are skipped by the dispatcher.
    pub active: bool,
}

/// A schedule joined with its recipient and template, ready to dispatch.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// The schedule row.
    pub schedule: Schedule,
    /// Joined recipient.
    pub recipient: Recipient,
    /// Joined template.
    pub template: MessageTemplate,
}

/// An archived, resolved delivery request.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    /// Original request id.
    pub request_id: Uuid,
    /// Destination digits.
    pub destination: String,
    /// Message text.
    pub payload: String,
    /// Enqueue time.
    pub submitted_at: DateTime<Utc>,
    /// Final status (`succeeded` / `failed_after_retries`).
    pub status: String,
    /// Attempts consumed.
    pub attempts: u32,
    /// Request origin (`ad_hoc` / `scheduled`).
    pub source: String,
}

/// Handle to the SQLite store.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the store at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("failed to open sqlite store")?;
        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or migrated.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open in-memory store")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL REFERENCES recipients(id),
                template_id TEXT NOT NULL REFERENCES templates(id),
                cadence TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS history (
                request_id TEXT PRIMARY KEY,
                destination TEXT NOT NULL,
                payload TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                source TEXT NOT NULL
            )",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .context("failed to run store migration")?;
        }
        Ok(())
    }

    // ── Recipients ─────────────────────────────────────────────

    /// Insert a recipient, returning its generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_recipient(&self, name: &str, phone: &str) -> Result<Recipient> {
        let recipient = Recipient {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            phone: phone.to_owned(),
        };
        sqlx::query("INSERT INTO recipients (id, name, phone, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(recipient.id.to_string())
            .bind(&recipient.name)
            .bind(&recipient.phone)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("failed to insert recipient")?;
        debug!(id = %recipient.id, "recipient added");
        Ok(recipient)
    }

    /// All recipients.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, name, phone FROM recipients ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .context("failed to list recipients")?;
        rows.into_iter()
            .map(|(id, name, phone)| {
                Ok(Recipient {
                    id: parse_uuid(&id)?,
                    name,
                    phone,
                })
            })
            .collect()
    }

    /// One recipient by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_recipient(&self, id: Uuid) -> Result<Option<Recipient>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, name, phone FROM recipients WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .context("failed to fetch recipient")?;
        row.map(|(id, name, phone)| {
            Ok(Recipient {
                id: parse_uuid(&id)?,
                name,
                phone,
            })
        })
        .transpose()
    }

    // ── Templates ──────────────────────────────────────────────

    /// Insert a template, returning its generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_template(&self, name: &str, content: &str) -> Result<MessageTemplate> {
        let template = MessageTemplate {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            content: content.to_owned(),
        };
        sqlx::query("INSERT INTO templates (id, name, content, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(template.id.to_string())
            .bind(&template.name)
            .bind(&template.content)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("failed to insert template")?;
        debug!(id = %template.id, "template added");
        Ok(template)
    }

    /// All templates.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_templates(&self) -> Result<Vec<MessageTemplate>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, name, content FROM templates ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .context("failed to list templates")?;
        rows.into_iter()
            .map(|(id, name, content)| {
                Ok(MessageTemplate {
                    id: parse_uuid(&id)?,
                    name,
                    content,
                })
            })
            .collect()
    }

    /// One template by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_template(&self, id: Uuid) -> Result<Option<MessageTemplate>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, name, content FROM templates WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .context("failed to fetch template")?;
        row.map(|(id, name, content)| {
            Ok(MessageTemplate {
                id: parse_uuid(&id)?,
                name,
                content,
            })
        })
        .transpose()
    }

    // ── Schedules ──────────────────────────────────────────────

    /// Insert a schedule, returning its generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced recipient or template does not
    /// exist, or the insert fails.
    pub async fn add_schedule(
        &self,
        recipient_id: Uuid,
        template_id: Uuid,
        cadence: Cadence,
    ) -> Result<Schedule> {
        if self.get_recipient(recipient_id).await?.is_none() {
            anyhow::bail!("unknown recipient: {recipient_id}");
        }
        if self.get_template(template_id).await?.is_none() {
            anyhow::bail!("unknown template: {template_id}");
        }
        let schedule = Schedule {
            id: Uuid::new_v4(),
            recipient_id,
            template_id,
            cadence,
            active: true,
        };
        let cadence_json =
            serde_json::to_string(&schedule.cadence).context("failed to encode cadence")?;
        sqlx::query(
            "INSERT INTO schedules (id, recipient_id, template_id, cadence, active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        )
        .bind(schedule.id.to_string())
        .bind(recipient_id.to_string())
        .bind(template_id.to_string())
        .bind(cadence_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to insert schedule")?;
        debug!(id = %schedule.id, "schedule added");
        Ok(schedule)
    }

    /// All schedules.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let rows: Vec<(String, String, String, String, bool)> = sqlx::query_as(
            "SELECT id, recipient_id, template_id, cadence, active FROM schedules \
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list schedules")?;
        rows.into_iter().map(schedule_from_row).collect()
    }

    /// Active schedules joined with recipient and template. Rows whose
    /// recipient or template has been removed are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn active_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let rows: Vec<(String, String, String, String, bool, String, String, String, String)> =
            sqlx::query_as(
                "SELECT s.id, s.recipient_id, s.template_id, s.cadence, s.active, \
                        r.name, r.phone, t.name, t.content \
                 FROM schedules s \
                 JOIN recipients r ON r.id = s.recipient_id \
                 JOIN templates t ON t.id = s.template_id \
                 WHERE s.active = 1 \
                 ORDER BY s.created_at",
            )
            .fetch_all(&self.pool)
            .await
            .context("failed to load active jobs")?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id, rid, tid, cadence, active, r_name, r_phone, t_name, t_content) in rows {
            let schedule = schedule_from_row((id, rid, tid, cadence, active))?;
            jobs.push(ScheduledJob {
                recipient: Recipient {
                    id: schedule.recipient_id,
                    name: r_name,
                    phone: r_phone,
                },
                template: MessageTemplate {
                    id: schedule.template_id,
                    name: t_name,
                    content: t_content,
                },
                schedule,
            });
        }
        Ok(jobs)
    }

    /// Deactivate a schedule (used after a one-time schedule fires).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn deactivate_schedule(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE schedules SET active = 0 WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to deactivate schedule")?;
        debug!(%id, "schedule deactivated");
        Ok(())
    }

    // ── History ────────────────────────────────────────────────

    /// Archive a resolved request.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn append_history(
        &self,
        request: &DeliveryRequest,
        outcome: DeliveryOutcome,
        attempts: u32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO history \
             (request_id, destination, payload, submitted_at, status, attempts, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(request.id.to_string())
        .bind(request.destination.digits())
        .bind(&request.payload)
        .bind(request.submitted_at.to_rfc3339())
        .bind(outcome.as_str())
        .bind(i64::from(attempts))
        .bind(request.source.as_str())
        .execute(&self.pool)
        .await
        .context("failed to append history record")?;
        Ok(())
    }

    /// Most recent history records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryRecord>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT request_id, destination, payload, submitted_at, status, attempts, source \
             FROM history ORDER BY submitted_at DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("failed to load history")?;
        rows.into_iter().map(history_from_row).collect()
    }

    /// One archived request by its original request id.
    ///
    /// The status endpoint falls back to this once a resolved request has
    /// been pruned from the in-memory ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history_record(&self, request_id: Uuid) -> Result<Option<HistoryRecord>> {
        let row: Option<HistoryRow> = sqlx::query_as(
            "SELECT request_id, destination, payload, submitted_at, status, attempts, source \
             FROM history WHERE request_id = ?1",
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch history record")?;
        row.map(history_from_row).transpose()
    }
}

type HistoryRow = (String, String, String, String, String, i64, String);

fn history_from_row(row: HistoryRow) -> Result<HistoryRecord> {
    let (request_id, destination, payload, submitted_at, status, attempts, source) = row;
    Ok(HistoryRecord {
        request_id: parse_uuid(&request_id)?,
        destination,
        payload,
        submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
            .context("bad timestamp in history")?
            .with_timezone(&Utc),
        status,
        attempts: u32::try_from(attempts).unwrap_or(0),
        source,
    })
}

fn schedule_from_row(row: (String, String, String, String, bool)) -> Result<Schedule> {
    let (id, recipient_id, template_id, cadence, active) = row;
    Ok(Schedule {
        id: parse_uuid(&id)?,
        recipient_id: parse_uuid(&recipient_id)?,
        template_id: parse_uuid(&template_id)?,
        cadence: serde_json::from_str(&cadence).context("bad cadence JSON in store")?,
        active,
    })
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).context("bad uuid in store")
}
