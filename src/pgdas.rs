//! Monthly Simples Nacional apuracao (PGDAS-D).

use std::fmt::Write as _;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::extenso::format_brl;
use crate::domain::simples::{calculate_das, rbt12_for_new_company, DasInput};
use crate::domain::{closing, round2, validation, Competence};
use crate::error::AppError;
use crate::launches;
use crate::models::{Anexo, Company, PgdasApuracao, TaxRegime};
use crate::payroll;

const PGDAS_COLUMNS: &str =
  "id, company_id, year, month, rpa, rbt12, anexo, bracket, nominal_rate, deduction, effective_rate, das, fator_r, created_at";

fn map_apuracao(row: &Row<'_>) -> rusqlite::Result<PgdasApuracao> {
  let anexo: String = row.get(6)?;
  Ok(PgdasApuracao {
    id: row.get(0)?,
    company_id: row.get(1)?,
    year: row.get(2)?,
    month: row.get(3)?,
    rpa: row.get(4)?,
    rbt12: row.get(5)?,
    anexo: Anexo::parse(&anexo).unwrap_or(Anexo::I),
    bracket: row.get(7)?,
    nominal_rate: row.get(8)?,
    deduction: row.get(9)?,
    effective_rate: row.get(10)?,
    das: row.get(11)?,
    fator_r: row.get(12)?,
    created_at: row.get(13)?,
  })
}

/// RBT12 of `competence`. Companies with fewer than 12 months of activity
/// have the months they operated annualised.
fn rbt12(conn: &Connection, company: &Company, competence: Competence, rpa: f64) -> Result<f64, AppError> {
  let series = launches::revenue_series(conn, &company.id, competence, 12)?;
  let months_active = match company.activity_start.as_deref() {
    Some(start) => {
      let start = Competence::of_date(validation::parse_date(start)?);
      start.months_until(competence)
    }
    None => 12,
  };
  if months_active >= 12 {
    return Ok(round2(series.iter().map(|(_, revenue)| revenue).sum()));
  }
  if months_active < 0 {
    return Err(AppError::new(
      "BEFORE_ACTIVITY_START",
      "Competencia anterior ao inicio de atividade",
    ));
  }
  let months_before = months_active as u32;
  let revenue_before: f64 = series
    .iter()
    .rev()
    .take(months_before as usize)
    .map(|(_, revenue)| revenue)
    .sum();
  Ok(rbt12_for_new_company(revenue_before, months_before, rpa))
}

pub fn calculate_pgdas(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  actor: Option<&str>,
) -> Result<PgdasApuracao, AppError> {
  let company = companies::get_company(conn, company_id)?;
  if company.regime != TaxRegime::SimplesNacional {
    return Err(AppError::new("NOT_SIMPLES", "Empresa nao e optante pelo Simples Nacional"));
  }
  let activity_anexo = company
    .simples_anexo
    .ok_or_else(|| AppError::new("ANEXO_REQUIRED", "Empresa sem anexo do Simples Nacional"))?;
  closing::ensure_open(conn, company_id, competence)?;

  let rpa = launches::revenue_for_month(conn, company_id, competence)?;
  let rbt12 = rbt12(conn, &company, competence, rpa)?;
  let payroll_12m = match activity_anexo {
    Anexo::III | Anexo::V => Some(payroll::payroll_cost_12m(conn, company_id, competence)?),
    _ => None,
  };
  let calc = calculate_das(&DasInput {
    rpa,
    rbt12,
    activity_anexo,
    payroll_12m,
  })?;

  conn.execute(
    "INSERT INTO pgdas_apuracoes (id, company_id, year, month, rpa, rbt12, anexo, bracket, nominal_rate, deduction,
       effective_rate, das, fator_r, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
     ON CONFLICT(company_id, year, month) DO UPDATE SET
       rpa = excluded.rpa, rbt12 = excluded.rbt12, anexo = excluded.anexo, bracket = excluded.bracket,
       nominal_rate = excluded.nominal_rate, deduction = excluded.deduction,
       effective_rate = excluded.effective_rate, das = excluded.das, fator_r = excluded.fator_r,
       created_at = excluded.created_at",
    params![
      new_id(),
      company_id,
      competence.year,
      competence.month,
      calc.rpa,
      calc.rbt12,
      calc.anexo.as_str(),
      calc.bracket,
      calc.nominal_rate,
      calc.deduction,
      calc.effective_rate,
      calc.das,
      calc.fator_r,
      now()
    ],
  )?;

  let stored = get_pgdas(conn, company_id, competence)?
    .ok_or_else(|| AppError::new("DB_ERROR", "Apuracao nao gravada"))?;
  append_audit(
    conn,
    actor,
    "CALCULATE_PGDAS",
    "PGDAS",
    Some(&stored.id),
    Some(company_id),
    payload(&calc),
    Some(format!("competencia={competence}")),
  )?;
  log::info!(
    "event=pgdas_calculated module=pgdas status=ok company_id={company_id} competence={competence} anexo={} das={}",
    calc.anexo,
    calc.das
  );
  Ok(stored)
}

pub fn get_pgdas(conn: &Connection, company_id: &str, competence: Competence) -> Result<Option<PgdasApuracao>, AppError> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {PGDAS_COLUMNS} FROM pgdas_apuracoes WHERE company_id = ?1 AND year = ?2 AND month = ?3"),
        params![company_id, competence.year, competence.month],
        map_apuracao,
      )
      .optional()?,
  )
}

pub fn list_pgdas(conn: &Connection, company_id: &str, year: i32) -> Result<Vec<PgdasApuracao>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PGDAS_COLUMNS} FROM pgdas_apuracoes WHERE company_id = ?1 AND year = ?2 ORDER BY month"
  ))?;
  let rows = stmt.query_map(params![company_id, year], map_apuracao)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

fn percent(rate: f64) -> String {
  format!("{:.4}%", rate * 100.0).replace('.', ",")
}

/// Plain-text statement of a stored apuracao.
pub fn pgdas_report(conn: &Connection, company_id: &str, competence: Competence) -> Result<String, AppError> {
  let company = companies::get_company(conn, company_id)?;
  let apuracao = get_pgdas(conn, company_id, competence)?
    .ok_or_else(|| AppError::not_found(format!("Apuracao PGDAS de {competence} nao encontrada")))?;

  let mut out = String::new();
  let _ = writeln!(out, "APURACAO DO SIMPLES NACIONAL - PGDAS-D");
  let _ = writeln!(out, "Empresa: {}", company.razao_social);
  let _ = writeln!(out, "CNPJ: {}", validation::format_cnpj(&company.cnpj));
  let _ = writeln!(out, "Competencia: {:02}/{}", apuracao.month, apuracao.year);
  let _ = writeln!(out);
  let _ = writeln!(out, "Receita bruta do periodo (RPA): {}", format_brl(apuracao.rpa));
  let _ = writeln!(out, "Receita bruta 12 meses (RBT12): {}", format_brl(apuracao.rbt12));
  let _ = writeln!(out, "Anexo: {}", apuracao.anexo);
  let _ = writeln!(out, "Faixa: {}a", apuracao.bracket);
  let _ = writeln!(out, "Aliquota nominal: {}", percent(apuracao.nominal_rate));
  let _ = writeln!(out, "Parcela a deduzir: {}", format_brl(apuracao.deduction));
  let _ = writeln!(out, "Aliquota efetiva: {}", percent(apuracao.effective_rate));
  if let Some(ratio) = apuracao.fator_r {
    let _ = writeln!(out, "Fator R: {}", percent(ratio));
  }
  let _ = writeln!(out);
  let _ = writeln!(out, "Valor do DAS: {}", format_brl(apuracao.das));
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::companies::update_company;
  use crate::test_support::{add_employee, add_sale, company_input, setup};

  #[test]
  fn computes_das_from_revenue_history() {
    let (conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::I));
    for (n, month) in (1..=12).zip(["2024-03", "2024-04", "2024-05", "2024-06", "2024-07", "2024-08",
      "2024-09", "2024-10", "2024-11", "2024-12", "2025-01", "2025-02"])
    {
      add_sale(&conn, &company.id, &n.to_string(), &format!("{month}-10"), 25_000.0);
    }
    add_sale(&conn, &company.id, "13", "2025-03-05", 30_000.0);

    let march = Competence::new(2025, 3).unwrap();
    let apuracao = calculate_pgdas(&conn, &company.id, march, None).unwrap();
    assert_eq!(apuracao.rbt12, 300_000.0);
    assert_eq!(apuracao.rpa, 30_000.0);
    assert_eq!(apuracao.bracket, 2);
    // (300000 x 7,3% - 5940) / 300000 = 5,32%
    assert!((apuracao.effective_rate - 0.0532).abs() < 1e-9);
    assert_eq!(apuracao.das, 1596.0);
    assert_eq!(apuracao.fator_r, None);

    let again = calculate_pgdas(&conn, &company.id, march, None).unwrap();
    assert_eq!(again.id, apuracao.id);
    assert_eq!(list_pgdas(&conn, &company.id, 2025).unwrap().len(), 1);
  }

  #[test]
  fn new_company_revenue_is_annualised() {
    let (conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::I));
    let mut input = company_input(TaxRegime::SimplesNacional, Some(Anexo::I));
    input.activity_start = Some("2025-01-15".to_string());
    update_company(&conn, &company.id, &input, None).unwrap();
    add_sale(&conn, &company.id, "1", "2025-01-20", 10_000.0);
    add_sale(&conn, &company.id, "2", "2025-02-20", 20_000.0);
    add_sale(&conn, &company.id, "3", "2025-03-20", 5_000.0);

    let apuracao = calculate_pgdas(&conn, &company.id, Competence::new(2025, 3).unwrap(), None).unwrap();
    assert_eq!(apuracao.rbt12, 180_000.0);

    let first = calculate_pgdas(&conn, &company.id, Competence::new(2025, 1).unwrap(), None).unwrap();
    assert_eq!(first.rbt12, 120_000.0);
  }

  #[test]
  fn fator_r_moves_anexo_v_to_iii() {
    let (mut conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::V));
    add_employee(&conn, &company.id, "Joana", "52998224725", 6000.0, "2024-01-10");
    let feb = Competence::new(2025, 2).unwrap();
    payroll::run_payroll(&mut conn, &company.id, feb, &[], None).unwrap();
    add_sale(&conn, &company.id, "1", "2025-02-10", 20_000.0);
    add_sale(&conn, &company.id, "2", "2025-03-10", 20_000.0);

    let apuracao = calculate_pgdas(&conn, &company.id, Competence::new(2025, 3).unwrap(), None).unwrap();
    assert_eq!(apuracao.anexo, Anexo::III);
    assert!(apuracao.fator_r.unwrap() >= 0.28);
  }

  #[test]
  fn rejects_other_regimes() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let err = calculate_pgdas(&conn, &company.id, Competence::new(2025, 3).unwrap(), None).unwrap_err();
    assert_eq!(err.code, "NOT_SIMPLES");
  }

  #[test]
  fn report_lists_rates_and_das() {
    let (conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::III));
    add_sale(&conn, &company.id, "1", "2025-03-10", 10_000.0);
    let march = Competence::new(2025, 3).unwrap();
    assert_eq!(pgdas_report(&conn, &company.id, march).unwrap_err().code, "NOT_FOUND");

    calculate_pgdas(&conn, &company.id, march, None).unwrap();
    let report = pgdas_report(&conn, &company.id, march).unwrap();
    assert!(report.contains("CNPJ: 11.222.333/0001-81"));
    assert!(report.contains("Competencia: 03/2025"));
    assert!(report.contains("Anexo: III"));
    assert!(report.contains("Valor do DAS: R$ 600,00"));
  }
}
