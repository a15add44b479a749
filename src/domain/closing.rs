use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::audit::log::{append_audit, payload};
use crate::domain::Competence;
use crate::error::AppError;
use crate::models::CompetenceStatus;

pub fn is_closed(conn: &Connection, company_id: &str, competence: Competence) -> Result<bool, AppError> {
  let closed: Option<i64> = conn
    .query_row(
      "SELECT is_closed FROM competence_closing WHERE company_id = ?1 AND year = ?2 AND month = ?3",
      params![company_id, competence.year, competence.month],
      |row| row.get(0),
    )
    .optional()?;
  Ok(closed == Some(1))
}

pub fn ensure_open(conn: &Connection, company_id: &str, competence: Competence) -> Result<(), AppError> {
  if is_closed(conn, company_id, competence)? {
    Err(AppError::new(
      "PERIOD_CLOSED",
      format!("Competencia {competence} esta fechada"),
    ))
  } else {
    Ok(())
  }
}

pub fn get_status(conn: &Connection, company_id: &str, competence: Competence) -> Result<CompetenceStatus, AppError> {
  let row = conn
    .query_row(
      "SELECT is_closed, closed_at, closed_by FROM competence_closing WHERE company_id = ?1 AND year = ?2 AND month = ?3",
      params![company_id, competence.year, competence.month],
      |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, Option<String>>(1)?,
          row.get::<_, Option<String>>(2)?,
        ))
      },
    )
    .optional()?;

  let (is_closed, closed_at, closed_by) = match row {
    Some((flag, at, by)) => (flag == 1, at, by),
    None => (false, None, None),
  };
  Ok(CompetenceStatus {
    company_id: company_id.to_string(),
    year: competence.year,
    month: competence.month,
    is_closed,
    closed_at,
    closed_by,
  })
}

pub fn set_closed(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  closed: bool,
  actor: Option<&str>,
) -> Result<(), AppError> {
  let now = Utc::now().to_rfc3339();
  conn.execute(
    "INSERT INTO competence_closing (company_id, year, month, is_closed, closed_at, closed_by)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(company_id, year, month) DO UPDATE SET is_closed = excluded.is_closed,
       closed_at = excluded.closed_at, closed_by = excluded.closed_by",
    params![
      company_id,
      competence.year,
      competence.month,
      if closed { 1 } else { 0 },
      if closed { Some(now) } else { None },
      if closed { actor } else { None }
    ],
  )?;
  let action = if closed { "CLOSE_COMPETENCE" } else { "OPEN_COMPETENCE" };
  append_audit(
    conn,
    actor,
    action,
    "COMPETENCE",
    Some(&competence.to_string()),
    Some(company_id),
    payload(&competence),
    None,
  )?;
  log::info!("event=competence_closing module=closing status=ok company_id={company_id} competence={competence} closed={closed}");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::audit::log::list_audit_log;
  use crate::models::{Anexo, TaxRegime};
  use crate::test_support;

  #[test]
  fn closing_and_reopening_are_audited() {
    let (conn, company) = test_support::setup(TaxRegime::SimplesNacional, Some(Anexo::I));
    let march = Competence::new(2025, 3).unwrap();

    set_closed(&conn, &company.id, march, true, Some("ana")).unwrap();
    assert!(is_closed(&conn, &company.id, march).unwrap());
    let status = get_status(&conn, &company.id, march).unwrap();
    assert_eq!(status.closed_by.as_deref(), Some("ana"));
    assert_eq!(ensure_open(&conn, &company.id, march).unwrap_err().code, "PERIOD_CLOSED");

    set_closed(&conn, &company.id, march, false, Some("ana")).unwrap();
    assert!(ensure_open(&conn, &company.id, march).is_ok());

    let log = list_audit_log(&conn, Some(company.id.as_str()), 1, 50).unwrap();
    let actions: Vec<&str> = log.items.iter().map(|entry| entry.action.as_str()).collect();
    assert!(actions.contains(&"CLOSE_COMPETENCE"));
    assert!(actions.contains(&"OPEN_COMPETENCE"));
    let reopened = log.items.iter().find(|entry| entry.action == "OPEN_COMPETENCE").unwrap();
    assert_eq!(reopened.entity_id.as_deref(), Some("2025-03"));
    assert_eq!(reopened.actor.as_deref(), Some("ana"));
  }
}
