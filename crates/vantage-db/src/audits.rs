//! Queries for the `audits` table.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Row, Sqlite};

/// A finalized audit as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UUID v4 assigned at finalize
    pub id: String,
    /// Primary URL that was audited
    pub url: String,
    /// Full report, screenshots replaced by public URLs
    pub report_data: JsonValue,
    /// Public URL of the first desktop screenshot
    pub screenshot_url: Option<String>,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}

/// Insert one audit record.
///
/// # Errors
/// Returns `DatabaseError::Sqlx` if the insert fails (including a duplicate id).
pub async fn insert_audit(pool: &Pool<Sqlite>, record: &AuditRecord) -> Result<()> {
    let report_json = serde_json::to_string(&record.report_data)?;

    sqlx::query(
        "INSERT INTO audits (id, url, report_data, screenshot_url, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.url)
    .bind(&report_json)
    .bind(record.screenshot_url.as_deref())
    .bind(record.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up an audit by id.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or the stored row is corrupt.
pub async fn get_audit(pool: &Pool<Sqlite>, id: &str) -> Result<Option<AuditRecord>> {
    let row = sqlx::query(
        "SELECT id, url, report_data, screenshot_url, created_at
         FROM audits
         WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| -> Result<AuditRecord> {
        let report_json: String = row.get("report_data");
        let created_at: String = row.get("created_at");

        Ok(AuditRecord {
            id: row.get("id"),
            url: row.get("url"),
            report_data: serde_json::from_str(&report_json)?,
            screenshot_url: row.get("screenshot_url"),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| DatabaseError::Decode(format!("created_at: {e}")))?
                .with_timezone(&Utc),
        })
    })
    .transpose()
}

/// Number of stored audits.
///
/// # Errors
/// Returns `DatabaseError::Sqlx` if the query fails.
pub async fn count_audits(pool: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audits")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
