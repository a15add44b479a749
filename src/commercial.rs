//! Quotes (orcamentos) and payment receipts (recibos).

use std::fmt::Write as _;

use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::extenso::{format_brl, valor_por_extenso};
use crate::domain::{round2, validation};
use crate::error::AppError;
use crate::models::{Orcamento, OrcamentoInput, QuoteItem, QuoteStatus, Recibo, ReciboInput};

const DEFAULT_VALID_DAYS: u32 = 30;

const QUOTE_COLUMNS: &str = "id, company_id, number, client_name, client_document, issue_date, valid_until, items_json,
  total, status, notes, created_at, updated_at";

const RECEIPT_COLUMNS: &str = "id, company_id, number, payer_name, payer_document, amount, amount_words, description,
  issue_date, city, orcamento_id, created_at";

fn map_quote(row: &Row<'_>) -> rusqlite::Result<Orcamento> {
  let items_json: String = row.get(7)?;
  let status: String = row.get(9)?;
  Ok(Orcamento {
    id: row.get(0)?,
    company_id: row.get(1)?,
    number: row.get(2)?,
    client_name: row.get(3)?,
    client_document: row.get(4)?,
    issue_date: row.get(5)?,
    valid_until: row.get(6)?,
    items: serde_json::from_str(&items_json).unwrap_or_default(),
    total: row.get(8)?,
    status: QuoteStatus::parse(&status).unwrap_or(QuoteStatus::Rascunho),
    notes: row.get(10)?,
    created_at: row.get(11)?,
    updated_at: row.get(12)?,
  })
}

fn map_receipt(row: &Row<'_>) -> rusqlite::Result<Recibo> {
  Ok(Recibo {
    id: row.get(0)?,
    company_id: row.get(1)?,
    number: row.get(2)?,
    payer_name: row.get(3)?,
    payer_document: row.get(4)?,
    amount: row.get(5)?,
    amount_words: row.get(6)?,
    description: row.get(7)?,
    issue_date: row.get(8)?,
    city: row.get(9)?,
    orcamento_id: row.get(10)?,
    created_at: row.get(11)?,
  })
}

fn optional_document(value: Option<&str>) -> Result<Option<String>, AppError> {
  match value.map(str::trim).filter(|value| !value.is_empty()) {
    Some(document) => Ok(Some(validation::ensure_document(document)?)),
    None => Ok(None),
  }
}

fn format_document(document: &str) -> String {
  if document.len() == 11 {
    validation::format_cpf(document)
  } else {
    validation::format_cnpj(document)
  }
}

fn quote_total(items: &[QuoteItem]) -> Result<f64, AppError> {
  if items.is_empty() {
    return Err(AppError::new("EMPTY_QUOTE", "Orcamento sem itens"));
  }
  let mut total = 0.0;
  for item in items {
    validation::ensure_not_blank(&item.description, "Descricao do item")?;
    validation::ensure_amount_positive(item.quantity)?;
    validation::ensure_non_negative(item.unit_price, "Preco unitario")?;
    total += round2(item.quantity * item.unit_price);
  }
  Ok(round2(total))
}

fn next_number(conn: &Connection, table: &str, company_id: &str) -> Result<i64, AppError> {
  let max: i64 = conn.query_row(
    &format!("SELECT COALESCE(MAX(number), 0) FROM {table} WHERE company_id = ?1"),
    params![company_id],
    |row| row.get(0),
  )?;
  Ok(max + 1)
}

struct CleanQuote {
  client_name: String,
  client_document: Option<String>,
  valid_until: String,
  items_json: String,
  total: f64,
  notes: Option<String>,
}

fn validate_quote(input: &OrcamentoInput) -> Result<CleanQuote, AppError> {
  let issue = validation::parse_date(&input.issue_date)?;
  let valid_days = input.valid_days.unwrap_or(DEFAULT_VALID_DAYS);
  Ok(CleanQuote {
    client_name: validation::ensure_not_blank(&input.client_name, "Cliente")?,
    client_document: optional_document(input.client_document.as_deref())?,
    valid_until: (issue + Duration::days(valid_days as i64)).format("%Y-%m-%d").to_string(),
    items_json: serde_json::to_string(&input.items)?,
    total: quote_total(&input.items)?,
    notes: input.notes.as_ref().map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty()),
  })
}

pub fn create_orcamento(
  conn: &Connection,
  company_id: &str,
  input: &OrcamentoInput,
  actor: Option<&str>,
) -> Result<Orcamento, AppError> {
  companies::get_company(conn, company_id)?;
  let clean = validate_quote(input)?;
  let id = new_id();
  let number = next_number(conn, "orcamentos", company_id)?;
  let ts = now();
  conn.execute(
    &format!(
      "INSERT INTO orcamentos ({QUOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"
    ),
    params![
      id,
      company_id,
      number,
      clean.client_name,
      clean.client_document,
      input.issue_date,
      clean.valid_until,
      clean.items_json,
      clean.total,
      QuoteStatus::Rascunho.as_str(),
      clean.notes,
      ts
    ],
  )?;
  append_audit(conn, actor, "CREATE_QUOTE", "QUOTE", Some(&id), Some(company_id), payload(input), None)?;
  get_orcamento(conn, &id)
}

pub fn update_orcamento(conn: &Connection, id: &str, input: &OrcamentoInput, actor: Option<&str>) -> Result<Orcamento, AppError> {
  let current = get_orcamento(conn, id)?;
  if matches!(current.status, QuoteStatus::Aprovado | QuoteStatus::Recusado) {
    return Err(AppError::new("QUOTE_LOCKED", "Orcamento finalizado nao pode ser alterado"));
  }
  let clean = validate_quote(input)?;
  conn.execute(
    "UPDATE orcamentos SET client_name = ?1, client_document = ?2, issue_date = ?3, valid_until = ?4,
       items_json = ?5, total = ?6, notes = ?7, updated_at = ?8
     WHERE id = ?9",
    params![
      clean.client_name,
      clean.client_document,
      input.issue_date,
      clean.valid_until,
      clean.items_json,
      clean.total,
      clean.notes,
      now(),
      id
    ],
  )?;
  append_audit(
    conn,
    actor,
    "UPDATE_QUOTE",
    "QUOTE",
    Some(id),
    Some(&current.company_id),
    payload(input),
    None,
  )?;
  get_orcamento(conn, id)
}

fn transition_allowed(from: QuoteStatus, to: QuoteStatus) -> bool {
  use QuoteStatus::*;
  matches!(
    (from, to),
    (Rascunho, Enviado) | (Rascunho, Aprovado) | (Rascunho, Recusado) | (Enviado, Aprovado) | (Enviado, Recusado)
  )
}

pub fn set_orcamento_status(
  conn: &Connection,
  id: &str,
  status: QuoteStatus,
  actor: Option<&str>,
) -> Result<Orcamento, AppError> {
  let current = get_orcamento(conn, id)?;
  if !transition_allowed(current.status, status) {
    return Err(AppError::new(
      "INVALID_TRANSITION",
      format!("Orcamento {} nao pode passar para {}", current.status, status),
    ));
  }
  conn.execute(
    "UPDATE orcamentos SET status = ?1, updated_at = ?2 WHERE id = ?3",
    params![status.as_str(), now(), id],
  )?;
  append_audit(
    conn,
    actor,
    "SET_QUOTE_STATUS",
    "QUOTE",
    Some(id),
    Some(&current.company_id),
    payload(&status),
    Some(format!("{} -> {}", current.status, status)),
  )?;
  get_orcamento(conn, id)
}

pub fn delete_orcamento(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let current = get_orcamento(conn, id)?;
  conn.execute("DELETE FROM orcamentos WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_QUOTE",
    "QUOTE",
    Some(id),
    Some(&current.company_id),
    payload(&current),
    None,
  )?;
  Ok(())
}

pub fn get_orcamento(conn: &Connection, id: &str) -> Result<Orcamento, AppError> {
  conn
    .query_row(
      &format!("SELECT {QUOTE_COLUMNS} FROM orcamentos WHERE id = ?1"),
      params![id],
      map_quote,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Orcamento nao encontrado"))
}

pub fn list_orcamentos(conn: &Connection, company_id: &str, status: Option<QuoteStatus>) -> Result<Vec<Orcamento>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {QUOTE_COLUMNS} FROM orcamentos WHERE company_id = ?1 AND (?2 IS NULL OR status = ?2)
     ORDER BY number DESC"
  ))?;
  let rows = stmt.query_map(params![company_id, status.map(|s| s.as_str())], map_quote)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

fn insert_receipt(
  conn: &Connection,
  company_id: &str,
  input: &ReciboInput,
  orcamento_id: Option<&str>,
) -> Result<String, AppError> {
  validation::ensure_amount_positive(input.amount)?;
  validation::parse_date(&input.issue_date)?;
  let payer_name = validation::ensure_not_blank(&input.payer_name, "Pagador")?;
  let description = validation::ensure_not_blank(&input.description, "Referente a")?;
  let payer_document = optional_document(input.payer_document.as_deref())?;
  let amount = round2(input.amount);

  let id = new_id();
  conn.execute(
    &format!("INSERT INTO recibos ({RECEIPT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
    params![
      id,
      company_id,
      next_number(conn, "recibos", company_id)?,
      payer_name,
      payer_document,
      amount,
      valor_por_extenso(amount),
      description,
      input.issue_date,
      input.city.as_deref().map(str::trim).filter(|city| !city.is_empty()),
      orcamento_id,
      now()
    ],
  )?;
  Ok(id)
}

pub fn create_recibo(conn: &Connection, company_id: &str, input: &ReciboInput, actor: Option<&str>) -> Result<Recibo, AppError> {
  companies::get_company(conn, company_id)?;
  let id = insert_receipt(conn, company_id, input, None)?;
  append_audit(conn, actor, "CREATE_RECEIPT", "RECEIPT", Some(&id), Some(company_id), payload(input), None)?;
  get_recibo(conn, &id)
}

/// Issues the receipt for an approved quote, once.
pub fn receipt_from_quote(
  conn: &Connection,
  orcamento_id: &str,
  issue_date: &str,
  actor: Option<&str>,
) -> Result<Recibo, AppError> {
  let quote = get_orcamento(conn, orcamento_id)?;
  if quote.status != QuoteStatus::Aprovado {
    return Err(AppError::new("QUOTE_NOT_APPROVED", "Somente orcamentos aprovados geram recibo"));
  }
  let existing: Option<i64> = conn
    .query_row(
      "SELECT number FROM recibos WHERE orcamento_id = ?1",
      params![orcamento_id],
      |row| row.get(0),
    )
    .optional()?;
  if let Some(number) = existing {
    return Err(AppError::new(
      "QUOTE_ALREADY_RECEIPTED",
      format!("Orcamento ja possui o recibo {number}"),
    ));
  }

  let company = companies::get_company(conn, &quote.company_id)?;
  let input = ReciboInput {
    payer_name: quote.client_name.clone(),
    payer_document: quote.client_document.clone(),
    amount: quote.total,
    description: format!("servicos do orcamento n. {:06}", quote.number),
    issue_date: issue_date.to_string(),
    city: company.address.municipio.clone(),
  };
  let id = insert_receipt(conn, &quote.company_id, &input, Some(orcamento_id))?;
  append_audit(
    conn,
    actor,
    "CREATE_RECEIPT",
    "RECEIPT",
    Some(&id),
    Some(&quote.company_id),
    payload(&input),
    Some(format!("orcamento={}", quote.number)),
  )?;
  get_recibo(conn, &id)
}

pub fn delete_recibo(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let current = get_recibo(conn, id)?;
  conn.execute("DELETE FROM recibos WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_RECEIPT",
    "RECEIPT",
    Some(id),
    Some(&current.company_id),
    payload(&current),
    None,
  )?;
  Ok(())
}

pub fn get_recibo(conn: &Connection, id: &str) -> Result<Recibo, AppError> {
  conn
    .query_row(
      &format!("SELECT {RECEIPT_COLUMNS} FROM recibos WHERE id = ?1"),
      params![id],
      map_receipt,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Recibo nao encontrado"))
}

pub fn list_recibos(conn: &Connection, company_id: &str) -> Result<Vec<Recibo>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RECEIPT_COLUMNS} FROM recibos WHERE company_id = ?1 ORDER BY number DESC"
  ))?;
  let rows = stmt.query_map(params![company_id], map_receipt)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Printable receipt text.
pub fn render_recibo_text(conn: &Connection, id: &str) -> Result<String, AppError> {
  let recibo = get_recibo(conn, id)?;
  let company = companies::get_company(conn, &recibo.company_id)?;
  let date = validation::parse_date(&recibo.issue_date)?;

  let payer = match recibo.payer_document.as_deref() {
    Some(document) => format!("{} ({})", recibo.payer_name, format_document(document)),
    None => recibo.payer_name.clone(),
  };

  let mut out = String::new();
  let _ = writeln!(out, "RECIBO N. {:06}    {}", recibo.number, format_brl(recibo.amount));
  let _ = writeln!(out);
  let _ = writeln!(
    out,
    "Recebemos de {payer} a importancia de {} ({}), referente a {}.",
    recibo.amount_words,
    format_brl(recibo.amount),
    recibo.description
  );
  let _ = writeln!(out);
  let _ = writeln!(out, "Para clareza firmamos o presente.");
  let _ = writeln!(out);
  let place = recibo.city.clone().unwrap_or_default();
  if place.is_empty() {
    let _ = writeln!(out, "{}", date.format("%d/%m/%Y"));
  } else {
    let _ = writeln!(out, "{place}, {}", date.format("%d/%m/%Y"));
  }
  let _ = writeln!(out);
  let _ = writeln!(out, "______________________________________");
  let _ = writeln!(out, "{}", company.razao_social);
  let _ = writeln!(out, "CNPJ: {}", validation::format_cnpj(&company.cnpj));
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxRegime;
  use crate::test_support::{setup, SUPPLIER_CNPJ};

  fn quote_input() -> OrcamentoInput {
    OrcamentoInput {
      client_name: "Cliente Grande SA".to_string(),
      client_document: Some(SUPPLIER_CNPJ.to_string()),
      issue_date: "2025-03-10".to_string(),
      valid_days: None,
      items: vec![
        QuoteItem {
          description: "Revisao completa".to_string(),
          quantity: 1.0,
          unit_price: 850.0,
        },
        QuoteItem {
          description: "Troca de oleo".to_string(),
          quantity: 2.0,
          unit_price: 120.25,
        },
      ],
      notes: None,
    }
  }

  #[test]
  fn quote_totals_items_and_sets_validity() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let quote = create_orcamento(&conn, &company.id, &quote_input(), None).unwrap();
    assert_eq!(quote.number, 1);
    assert_eq!(quote.total, 1090.5);
    assert_eq!(quote.valid_until, "2025-04-09");
    assert_eq!(quote.status, QuoteStatus::Rascunho);

    let second = create_orcamento(&conn, &company.id, &quote_input(), None).unwrap();
    assert_eq!(second.number, 2);
  }

  #[test]
  fn empty_quote_is_rejected() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let mut input = quote_input();
    input.items.clear();
    assert_eq!(create_orcamento(&conn, &company.id, &input, None).unwrap_err().code, "EMPTY_QUOTE");
  }

  #[test]
  fn receipt_requires_approved_quote_and_is_issued_once() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let quote = create_orcamento(&conn, &company.id, &quote_input(), None).unwrap();
    let err = receipt_from_quote(&conn, &quote.id, "2025-03-20", None).unwrap_err();
    assert_eq!(err.code, "QUOTE_NOT_APPROVED");

    set_orcamento_status(&conn, &quote.id, QuoteStatus::Enviado, None).unwrap();
    set_orcamento_status(&conn, &quote.id, QuoteStatus::Aprovado, None).unwrap();
    let recibo = receipt_from_quote(&conn, &quote.id, "2025-03-20", None).unwrap();
    assert_eq!(recibo.amount, 1090.5);
    assert_eq!(recibo.amount_words, "mil e noventa reais e cinquenta centavos");
    assert_eq!(recibo.city.as_deref(), Some("Belo Horizonte"));
    assert_eq!(
      receipt_from_quote(&conn, &quote.id, "2025-03-21", None).unwrap_err().code,
      "QUOTE_ALREADY_RECEIPTED"
    );
    assert_eq!(
      update_orcamento(&conn, &quote.id, &quote_input(), None).unwrap_err().code,
      "QUOTE_LOCKED"
    );
  }

  #[test]
  fn finished_quote_cannot_change_status() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let quote = create_orcamento(&conn, &company.id, &quote_input(), None).unwrap();
    set_orcamento_status(&conn, &quote.id, QuoteStatus::Recusado, None).unwrap();
    let err = set_orcamento_status(&conn, &quote.id, QuoteStatus::Aprovado, None).unwrap_err();
    assert_eq!(err.code, "INVALID_TRANSITION");
  }

  #[test]
  fn receipts_are_numbered_and_rendered() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let input = ReciboInput {
      payer_name: "Joao Pereira".to_string(),
      payer_document: Some("529.982.247-25".to_string()),
      amount: 1234.56,
      description: "conserto do veiculo placa ABC1D23".to_string(),
      issue_date: "2025-03-15".to_string(),
      city: Some("Belo Horizonte".to_string()),
    };
    create_recibo(&conn, &company.id, &input, None).unwrap();
    let second = create_recibo(&conn, &company.id, &input, None).unwrap();
    assert_eq!(second.number, 2);

    let text = render_recibo_text(&conn, &second.id).unwrap();
    assert!(text.starts_with("RECIBO N. 000002    R$ 1.234,56"));
    assert!(text.contains("Joao Pereira (529.982.247-25)"));
    assert!(text.contains("mil duzentos e trinta e quatro reais e cinquenta e seis centavos"));
    assert!(text.contains("Belo Horizonte, 15/03/2025"));
    assert!(text.contains("CNPJ: 11.222.333/0001-81"));
    assert_eq!(list_recibos(&conn, &company.id).unwrap().len(), 2);
  }
}
