use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{AuditLogEntry, Paginated};

pub fn append_audit(
  conn: &Connection,
  actor: Option<&str>,
  action: &str,
  entity_type: &str,
  entity_id: Option<&str>,
  company_id: Option<&str>,
  payload_json: String,
  details: Option<String>,
) -> Result<(), AppError> {
  let ts = Utc::now().to_rfc3339();
  conn.execute(
    "INSERT INTO audit_log (ts, actor, action, entity_type, entity_id, company_id, payload_json, details) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      ts,
      actor,
      action,
      entity_type,
      entity_id,
      company_id,
      payload_json,
      details
    ],
  )?;
  Ok(())
}

/// Serializes the payload stored with an audit row; unserializable input is
/// recorded as an empty object.
pub fn payload<T: Serialize>(value: &T) -> String {
  serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn list_audit_log(
  conn: &Connection,
  company_id: Option<&str>,
  page: i64,
  page_size: i64,
) -> Result<Paginated<AuditLogEntry>, AppError> {
  let page = if page < 1 { 1 } else { page };
  let page_size = if page_size < 1 { 100 } else { page_size };
  let offset = (page - 1) * page_size;

  let total: i64 = conn.query_row(
    "SELECT COUNT(*) FROM audit_log WHERE (?1 IS NULL OR company_id = ?1)",
    params![company_id],
    |row| row.get(0),
  )?;
  let mut stmt = conn.prepare(
    "SELECT id, ts, actor, action, entity_type, entity_id, company_id, payload_json, details
     FROM audit_log
     WHERE (?1 IS NULL OR company_id = ?1)
     ORDER BY id DESC
     LIMIT ?2 OFFSET ?3",
  )?;
  let rows = stmt.query_map(params![company_id, page_size, offset], |row| {
    Ok(AuditLogEntry {
      id: row.get(0)?,
      ts: row.get(1)?,
      actor: row.get(2)?,
      action: row.get(3)?,
      entity_type: row.get(4)?,
      entity_id: row.get(5)?,
      company_id: row.get(6)?,
      payload_json: row.get(7)?,
      details: row.get(8)?,
    })
  })?;

  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }

  Ok(Paginated { total, items })
}
