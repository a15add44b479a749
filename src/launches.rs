//! Fiscal document launches (NF-e, NFS-e and manual entries).

use chrono::Datelike;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::{closing, round2, validation, Competence};
use crate::error::AppError;
use crate::models::{
  Company, Direction, Launch, LaunchFilter, LaunchInput, LaunchItem, LaunchKind, LaunchStatus, Paginated, Party,
  TaxAmounts,
};

const LAUNCH_COLUMNS: &str = "id, company_id, kind, direction, number, series, access_key, issue_date, year, month,
  emitente_document, emitente_name, destinatario_document, destinatario_name, service_code, total,
  icms, ipi, pis, cofins, iss, ret_ir, ret_inss, ret_csll, ret_pis, ret_cofins, status, items_json,
  document_path, created_at, updated_at";

pub const ACCESS_KEY_LEN: usize = 44;

fn map_launch(row: &Row<'_>) -> rusqlite::Result<Launch> {
  let kind: String = row.get(2)?;
  let direction: String = row.get(3)?;
  let status: String = row.get(26)?;
  let items_json: String = row.get(27)?;
  let destinatario_document: Option<String> = row.get(12)?;
  let destinatario_name: Option<String> = row.get(13)?;
  Ok(Launch {
    id: row.get(0)?,
    company_id: row.get(1)?,
    kind: LaunchKind::parse(&kind).unwrap_or(LaunchKind::Manual),
    direction: Direction::parse(&direction).unwrap_or(Direction::Entrada),
    number: row.get(4)?,
    series: row.get(5)?,
    access_key: row.get(6)?,
    issue_date: row.get(7)?,
    year: row.get(8)?,
    month: row.get(9)?,
    emitente: Party {
      document: row.get(10)?,
      name: row.get(11)?,
    },
    destinatario: destinatario_document.map(|document| Party {
      document,
      name: destinatario_name.unwrap_or_default(),
    }),
    service_code: row.get(14)?,
    total: row.get(15)?,
    taxes: TaxAmounts {
      icms: row.get(16)?,
      ipi: row.get(17)?,
      pis: row.get(18)?,
      cofins: row.get(19)?,
      iss: row.get(20)?,
      ret_ir: row.get(21)?,
      ret_inss: row.get(22)?,
      ret_csll: row.get(23)?,
      ret_pis: row.get(24)?,
      ret_cofins: row.get(25)?,
    },
    status: LaunchStatus::parse(&status).unwrap_or(LaunchStatus::Ativa),
    items: serde_json::from_str::<Vec<LaunchItem>>(&items_json).unwrap_or_default(),
    document_path: row.get(28)?,
    created_at: row.get(29)?,
    updated_at: row.get(30)?,
  })
}

fn ensure_taxes(taxes: &TaxAmounts) -> Result<(), AppError> {
  let fields = [
    (taxes.icms, "ICMS"),
    (taxes.ipi, "IPI"),
    (taxes.pis, "PIS"),
    (taxes.cofins, "COFINS"),
    (taxes.iss, "ISS"),
    (taxes.ret_ir, "IR retido"),
    (taxes.ret_inss, "INSS retido"),
    (taxes.ret_csll, "CSLL retida"),
    (taxes.ret_pis, "PIS retido"),
    (taxes.ret_cofins, "COFINS retida"),
  ];
  for (value, name) in fields {
    validation::ensure_non_negative(value, name)?;
  }
  Ok(())
}

/// Validates a launch against the company it is filed under. Outgoing
/// documents must be issued by the company, incoming ones addressed to it.
pub(crate) fn validate_launch(company: &Company, input: &LaunchInput) -> Result<LaunchInput, AppError> {
  let mut clean = input.clone();
  clean.number = validation::ensure_not_blank(&input.number, "Numero")?;
  validation::parse_date(&input.issue_date)?;
  validation::ensure_amount_positive(input.total)?;
  ensure_taxes(&input.taxes)?;

  clean.emitente = Party {
    document: validation::ensure_document(&input.emitente.document)?,
    name: validation::ensure_not_blank(&input.emitente.name, "Emitente")?,
  };
  clean.destinatario = match &input.destinatario {
    Some(party) if !party.document.trim().is_empty() => Some(Party {
      document: validation::ensure_document(&party.document)?,
      name: party.name.trim().to_string(),
    }),
    _ => None,
  };

  clean.access_key = match input.access_key.as_deref().map(validation::only_digits) {
    Some(key) if !key.is_empty() => {
      if key.len() != ACCESS_KEY_LEN {
        return Err(AppError::new("INVALID_ACCESS_KEY", "Chave de acesso deve ter 44 digitos"));
      }
      Some(key)
    }
    _ => None,
  };
  if input.kind == LaunchKind::Nfe && clean.access_key.is_none() {
    return Err(AppError::new("INVALID_ACCESS_KEY", "NF-e exige chave de acesso"));
  }

  match input.direction {
    Direction::Saida if clean.emitente.document != company.cnpj => {
      return Err(AppError::new(
        "FOREIGN_DOCUMENT",
        "Documento de saida deve ser emitido pela empresa",
      ));
    }
    Direction::Entrada => {
      if clean.emitente.document == company.cnpj && input.kind != LaunchKind::Manual {
        return Err(AppError::new(
          "FOREIGN_DOCUMENT",
          "Documento de entrada emitido pela propria empresa",
        ));
      }
      if let Some(dest) = &clean.destinatario {
        if dest.document != company.cnpj {
          return Err(AppError::new(
            "FOREIGN_DOCUMENT",
            "Destinatario do documento de entrada nao e a empresa",
          ));
        }
      }
    }
    _ => {}
  }

  clean.total = round2(input.total);
  Ok(clean)
}

pub fn find_by_access_key(conn: &Connection, company_id: &str, access_key: &str) -> Result<Option<String>, AppError> {
  Ok(
    conn
      .query_row(
        "SELECT id FROM launches WHERE company_id = ?1 AND access_key = ?2",
        params![company_id, access_key],
        |row| row.get(0),
      )
      .optional()?,
  )
}

/// Documents without an access key (NFS-e) are identified by issuer and number.
pub fn find_by_number(
  conn: &Connection,
  company_id: &str,
  kind: LaunchKind,
  emitente_document: &str,
  number: &str,
) -> Result<Option<String>, AppError> {
  Ok(
    conn
      .query_row(
        "SELECT id FROM launches WHERE company_id = ?1 AND kind = ?2 AND emitente_document = ?3 AND number = ?4",
        params![company_id, kind.as_str(), emitente_document, number],
        |row| row.get(0),
      )
      .optional()?,
  )
}

pub fn create_launch(
  conn: &Connection,
  company_id: &str,
  input: &LaunchInput,
  document_path: Option<&str>,
  actor: Option<&str>,
) -> Result<Launch, AppError> {
  let company = companies::get_company(conn, company_id)?;
  let clean = validate_launch(&company, input)?;
  let date = validation::parse_date(&clean.issue_date)?;
  let competence = Competence::of_date(date);
  closing::ensure_open(conn, company_id, competence)?;

  if let Some(key) = clean.access_key.as_deref() {
    if find_by_access_key(conn, company_id, key)?.is_some() {
      return Err(AppError::new("DUPLICATE_LAUNCH", format!("Documento {key} ja lancado")));
    }
  }

  let id = new_id();
  let ts = now();
  let taxes = &clean.taxes;
  conn.execute(
    "INSERT INTO launches (id, company_id, kind, direction, number, series, access_key, issue_date, year, month,
       emitente_document, emitente_name, destinatario_document, destinatario_name, service_code, total,
       icms, ipi, pis, cofins, iss, ret_ir, ret_inss, ret_csll, ret_pis, ret_cofins, status, items_json,
       document_path, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22,
       ?23, ?24, ?25, ?26, 'ATIVA', ?27, ?28, ?29, ?29)",
    params![
      id,
      company_id,
      clean.kind.as_str(),
      clean.direction.as_str(),
      clean.number,
      clean.series,
      clean.access_key,
      clean.issue_date,
      date.year(),
      date.month(),
      clean.emitente.document,
      clean.emitente.name,
      clean.destinatario.as_ref().map(|party| party.document.clone()),
      clean.destinatario.as_ref().map(|party| party.name.clone()),
      clean.service_code,
      clean.total,
      taxes.icms,
      taxes.ipi,
      taxes.pis,
      taxes.cofins,
      taxes.iss,
      taxes.ret_ir,
      taxes.ret_inss,
      taxes.ret_csll,
      taxes.ret_pis,
      taxes.ret_cofins,
      serde_json::to_string(&clean.items)?,
      document_path,
      ts
    ],
  )?;
  append_audit(conn, actor, "CREATE_LAUNCH", "LAUNCH", Some(&id), Some(company_id), payload(&clean), None)?;
  get_launch(conn, &id)
}

pub fn update_launch(conn: &Connection, id: &str, input: &LaunchInput, actor: Option<&str>) -> Result<Launch, AppError> {
  let current = get_launch(conn, id)?;
  if current.status == LaunchStatus::Cancelada {
    return Err(AppError::new("LAUNCH_CANCELLED", "Lancamento cancelado nao pode ser alterado"));
  }
  closing::ensure_open(conn, &current.company_id, Competence::new(current.year, current.month)?)?;

  let company = companies::get_company(conn, &current.company_id)?;
  let clean = validate_launch(&company, input)?;
  let date = validation::parse_date(&clean.issue_date)?;
  closing::ensure_open(conn, &current.company_id, Competence::of_date(date))?;

  if let Some(key) = clean.access_key.as_deref() {
    if let Some(other) = find_by_access_key(conn, &current.company_id, key)? {
      if other != id {
        return Err(AppError::new("DUPLICATE_LAUNCH", format!("Documento {key} ja lancado")));
      }
    }
  }

  let taxes = &clean.taxes;
  conn.execute(
    "UPDATE launches SET kind = ?2, direction = ?3, number = ?4, series = ?5, access_key = ?6, issue_date = ?7,
       year = ?8, month = ?9, emitente_document = ?10, emitente_name = ?11, destinatario_document = ?12,
       destinatario_name = ?13, service_code = ?14, total = ?15, icms = ?16, ipi = ?17, pis = ?18,
       cofins = ?19, iss = ?20, ret_ir = ?21, ret_inss = ?22, ret_csll = ?23, ret_pis = ?24,
       ret_cofins = ?25, items_json = ?26, updated_at = ?27
     WHERE id = ?1",
    params![
      id,
      clean.kind.as_str(),
      clean.direction.as_str(),
      clean.number,
      clean.series,
      clean.access_key,
      clean.issue_date,
      date.year(),
      date.month(),
      clean.emitente.document,
      clean.emitente.name,
      clean.destinatario.as_ref().map(|party| party.document.clone()),
      clean.destinatario.as_ref().map(|party| party.name.clone()),
      clean.service_code,
      clean.total,
      taxes.icms,
      taxes.ipi,
      taxes.pis,
      taxes.cofins,
      taxes.iss,
      taxes.ret_ir,
      taxes.ret_inss,
      taxes.ret_csll,
      taxes.ret_pis,
      taxes.ret_cofins,
      serde_json::to_string(&clean.items)?,
      now()
    ],
  )?;
  append_audit(
    conn,
    actor,
    "UPDATE_LAUNCH",
    "LAUNCH",
    Some(id),
    Some(&current.company_id),
    payload(&clean),
    None,
  )?;
  get_launch(conn, id)
}

pub fn cancel_launch(conn: &Connection, id: &str, reason: Option<&str>, actor: Option<&str>) -> Result<Launch, AppError> {
  let current = get_launch(conn, id)?;
  if current.status == LaunchStatus::Cancelada {
    return Err(AppError::new("LAUNCH_CANCELLED", "Lancamento ja cancelado"));
  }
  closing::ensure_open(conn, &current.company_id, Competence::new(current.year, current.month)?)?;
  conn.execute(
    "UPDATE launches SET status = 'CANCELADA', updated_at = ?2 WHERE id = ?1",
    params![id, now()],
  )?;
  append_audit(
    conn,
    actor,
    "CANCEL_LAUNCH",
    "LAUNCH",
    Some(id),
    Some(&current.company_id),
    "{\"action\":\"cancel\"}".to_string(),
    reason.map(str::to_string),
  )?;
  get_launch(conn, id)
}

pub fn delete_launch(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let current = get_launch(conn, id)?;
  closing::ensure_open(conn, &current.company_id, Competence::new(current.year, current.month)?)?;
  conn.execute("DELETE FROM launches WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_LAUNCH",
    "LAUNCH",
    Some(id),
    Some(&current.company_id),
    payload(&current),
    None,
  )?;
  Ok(())
}

pub fn get_launch(conn: &Connection, id: &str) -> Result<Launch, AppError> {
  conn
    .query_row(
      &format!("SELECT {LAUNCH_COLUMNS} FROM launches WHERE id = ?1"),
      params![id],
      map_launch,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Lancamento nao encontrado"))
}

pub fn list_launches(conn: &Connection, company_id: &str, filter: &LaunchFilter) -> Result<Paginated<Launch>, AppError> {
  let page = if filter.page < 1 { 1 } else { filter.page };
  let page_size = if filter.page_size < 1 { 50 } else { filter.page_size };
  let offset = (page - 1) * page_size;
  let search = filter
    .search
    .as_deref()
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(|value| format!("%{}%", value.to_lowercase()));

  let where_clause = "company_id = ?1
     AND (?2 IS NULL OR year = ?2)
     AND (?3 IS NULL OR month = ?3)
     AND (?4 IS NULL OR kind = ?4)
     AND (?5 IS NULL OR direction = ?5)
     AND (?6 IS NULL OR lower(number) LIKE ?6 OR lower(emitente_name) LIKE ?6
          OR lower(COALESCE(destinatario_name, '')) LIKE ?6 OR COALESCE(access_key, '') LIKE ?6)";

  let kind = filter.kind.map(|kind| kind.as_str());
  let direction = filter.direction.map(|direction| direction.as_str());

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM launches WHERE {where_clause}"),
    params![company_id, filter.year, filter.month, kind, direction, search],
    |row| row.get(0),
  )?;
  let mut stmt = conn.prepare(&format!(
    "SELECT {LAUNCH_COLUMNS} FROM launches WHERE {where_clause}
     ORDER BY issue_date DESC, number DESC
     LIMIT ?7 OFFSET ?8"
  ))?;
  let rows = stmt.query_map(
    params![company_id, filter.year, filter.month, kind, direction, search, page_size, offset],
    map_launch,
  )?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(Paginated { total, items })
}

/// Active launches of one competence, optionally restricted to a direction.
pub fn launches_for_competence(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  direction: Option<Direction>,
) -> Result<Vec<Launch>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {LAUNCH_COLUMNS} FROM launches
     WHERE company_id = ?1 AND year = ?2 AND month = ?3 AND status = 'ATIVA'
       AND (?4 IS NULL OR direction = ?4)
     ORDER BY issue_date, number"
  ))?;
  let rows = stmt.query_map(
    params![
      company_id,
      competence.year,
      competence.month,
      direction.map(|direction| direction.as_str())
    ],
    map_launch,
  )?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Gross revenue of a competence: active outgoing documents.
pub fn revenue_for_month(conn: &Connection, company_id: &str, competence: Competence) -> Result<f64, AppError> {
  let total: f64 = conn.query_row(
    "SELECT COALESCE(SUM(total), 0) FROM launches
     WHERE company_id = ?1 AND year = ?2 AND month = ?3 AND direction = 'SAIDA' AND status = 'ATIVA'",
    params![company_id, competence.year, competence.month],
    |row| row.get(0),
  )?;
  Ok(round2(total))
}

/// Revenue of the `months` competences before `competence`, oldest first.
pub fn revenue_series(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  months: usize,
) -> Result<Vec<(Competence, f64)>, AppError> {
  competence
    .preceding(months)
    .into_iter()
    .map(|month| Ok((month, revenue_for_month(conn, company_id, month)?)))
    .collect()
}
