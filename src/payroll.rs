//! Stored payroll records: monthly runs, pro-labore (RCI), vacation, 13th
//! salary and termination. Calculations come from `domain::payroll`.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::payroll::{
  calc_monthly_payroll, calc_pro_labore, calc_termination, calc_thirteenth, calc_vacation, calendar_twelfths,
  MonthlyPayrollInput, TerminationCalcInput, ThirteenthCalcInput, VacationCalcInput,
};
use crate::domain::{closing, round2, validation, Competence};
use crate::error::AppError;
use crate::models::{
  Employee, EmployeeStatus, Installment, Payroll, PayrollEntryInput, PayrollSummary, Rci, Termination,
  TerminationInput, TerminationReason, Thirteenth, ThirteenthInput, Vacation, VacationInput,
};
use crate::people;

const PAYROLL_SELECT: &str = "SELECT p.id, p.company_id, p.employee_id, e.name, p.year, p.month, p.base_salary,
  p.overtime, p.other_earnings, p.gross, p.inss, p.irrf, p.fgts, p.other_discounts, p.net, p.employer_cpp,
  p.employer_rat, p.employer_terceiros, p.created_at
  FROM payrolls p JOIN employees e ON e.id = p.employee_id";

fn map_payroll(row: &Row<'_>) -> rusqlite::Result<Payroll> {
  Ok(Payroll {
    id: row.get(0)?,
    company_id: row.get(1)?,
    employee_id: row.get(2)?,
    employee_name: row.get(3)?,
    year: row.get(4)?,
    month: row.get(5)?,
    base_salary: row.get(6)?,
    overtime: row.get(7)?,
    other_earnings: row.get(8)?,
    gross: row.get(9)?,
    inss: row.get(10)?,
    irrf: row.get(11)?,
    fgts: row.get(12)?,
    other_discounts: row.get(13)?,
    net: row.get(14)?,
    employer_cpp: row.get(15)?,
    employer_rat: row.get(16)?,
    employer_terceiros: row.get(17)?,
    created_at: row.get(18)?,
  })
}

fn ensure_employee_of(employee: &Employee, company_id: &str) -> Result<(), AppError> {
  if employee.company_id != company_id {
    return Err(AppError::not_found("Funcionario nao pertence a empresa"));
  }
  Ok(())
}

fn ensure_not_terminated(employee: &Employee) -> Result<(), AppError> {
  if employee.status == EmployeeStatus::Desligado {
    return Err(AppError::new("EMPLOYEE_TERMINATED", "Funcionario desligado"));
  }
  Ok(())
}

/// Salary due for the competence; admissions during the month are paid per
/// day of a 30-day commercial month.
fn salary_for_competence(employee: &Employee, admission: NaiveDate, competence: Competence) -> f64 {
  if Competence::of_date(admission) == competence && admission.day() > 1 {
    let days = 30 - admission.day().min(30) + 1;
    round2(employee.base_salary * days as f64 / 30.0)
  } else {
    employee.base_salary
  }
}

/// Computes the payroll of every active employee for `competence`, replacing
/// any previous run of the same competence.
pub fn run_payroll(
  conn: &mut Connection,
  company_id: &str,
  competence: Competence,
  entries: &[PayrollEntryInput],
  actor: Option<&str>,
) -> Result<Vec<Payroll>, AppError> {
  let company = companies::get_company(conn, company_id)?;
  closing::ensure_open(conn, company_id, competence)?;

  let employees: Vec<Employee> = people::list_employees(conn, company_id, false)?
    .into_iter()
    .filter(|employee| employee.status == EmployeeStatus::Ativo)
    .collect();

  let mut variable: HashMap<&str, &PayrollEntryInput> = HashMap::new();
  for entry in entries {
    validation::ensure_non_negative(entry.overtime, "Horas extras")?;
    validation::ensure_non_negative(entry.other_earnings, "Outros proventos")?;
    validation::ensure_non_negative(entry.other_discounts, "Outros descontos")?;
    if !employees.iter().any(|employee| employee.id == entry.employee_id) {
      return Err(AppError::not_found(format!(
        "Funcionario {} nao esta ativo na empresa",
        entry.employee_id
      )));
    }
    variable.insert(entry.employee_id.as_str(), entry);
  }

  let tx = conn.transaction()?;
  let transmitted: i64 = tx.query_row(
    "SELECT COUNT(*) FROM esocial_events
     WHERE company_id = ?1 AND event_type IN ('S-1200', 'S-1210')
       AND status IN ('ENVIADO', 'PROCESSADO')
       AND reference_id IN (SELECT id FROM payrolls WHERE company_id = ?1 AND year = ?2 AND month = ?3)",
    params![company_id, competence.year, competence.month],
    |row| row.get(0),
  )?;
  if transmitted > 0 {
    return Err(AppError::new(
      "PAYROLL_TRANSMITTED",
      format!("Folha de {competence} ja foi enviada ao eSocial"),
    ));
  }
  tx.execute(
    "DELETE FROM esocial_events
     WHERE company_id = ?1 AND event_type IN ('S-1200', 'S-1210') AND status = 'PENDENTE'
       AND reference_id IN (SELECT id FROM payrolls WHERE company_id = ?1 AND year = ?2 AND month = ?3)",
    params![company_id, competence.year, competence.month],
  )?;
  tx.execute(
    "DELETE FROM payrolls WHERE company_id = ?1 AND year = ?2 AND month = ?3",
    params![company_id, competence.year, competence.month],
  )?;

  let ts = now();
  let mut processed = 0;
  for employee in &employees {
    let admission = validation::parse_date(&employee.admission_date)?;
    if admission > competence.last_day() {
      continue;
    }
    let base_salary = salary_for_competence(employee, admission, competence);
    let entry = variable.get(employee.id.as_str());
    let input = MonthlyPayrollInput {
      competence,
      base_salary,
      overtime: entry.map(|e| e.overtime).unwrap_or(0.0),
      other_earnings: entry.map(|e| e.other_earnings).unwrap_or(0.0),
      other_discounts: entry.map(|e| e.other_discounts).unwrap_or(0.0),
      dependents: employee.dependents,
      contract_kind: employee.contract_kind,
      employer: company.employer_profile(),
    };
    let result = calc_monthly_payroll(&input)?;

    tx.execute(
      "INSERT INTO payrolls (id, company_id, employee_id, year, month, base_salary, overtime, other_earnings, gross,
         inss, irrf, fgts, other_discounts, net, employer_cpp, employer_rat, employer_terceiros, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
      params![
        new_id(),
        company_id,
        employee.id,
        competence.year,
        competence.month,
        base_salary,
        round2(input.overtime),
        round2(input.other_earnings),
        result.gross,
        result.inss,
        result.irrf,
        result.fgts,
        result.other_discounts,
        result.net,
        result.employer.cpp,
        result.employer.rat,
        result.employer.terceiros,
        ts
      ],
    )?;
    processed += 1;
  }

  append_audit(
    &tx,
    actor,
    "RUN_PAYROLL",
    "PAYROLL",
    None,
    Some(company_id),
    payload(&entries),
    Some(format!("competencia={competence} funcionarios={processed}")),
  )?;
  tx.commit()?;
  log::info!(
    "event=payroll_run module=payroll status=ok company_id={company_id} competence={competence} employees={processed}"
  );

  list_payrolls(conn, company_id, competence)
}

pub fn list_payrolls(conn: &Connection, company_id: &str, competence: Competence) -> Result<Vec<Payroll>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "{PAYROLL_SELECT} WHERE p.company_id = ?1 AND p.year = ?2 AND p.month = ?3 ORDER BY e.name COLLATE NOCASE"
  ))?;
  let rows = stmt.query_map(params![company_id, competence.year, competence.month], map_payroll)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

pub fn get_payroll_summary(conn: &Connection, company_id: &str, competence: Competence) -> Result<PayrollSummary, AppError> {
  let summary = conn.query_row(
    "SELECT COUNT(*), COALESCE(SUM(gross), 0), COALESCE(SUM(inss), 0), COALESCE(SUM(irrf), 0),
       COALESCE(SUM(fgts), 0), COALESCE(SUM(net), 0),
       COALESCE(SUM(employer_cpp + employer_rat + employer_terceiros), 0)
     FROM payrolls WHERE company_id = ?1 AND year = ?2 AND month = ?3",
    params![company_id, competence.year, competence.month],
    |row| {
      Ok(PayrollSummary {
        year: competence.year,
        month: competence.month,
        employees: row.get(0)?,
        gross: round2(row.get(1)?),
        inss: round2(row.get(2)?),
        irrf: round2(row.get(3)?),
        fgts: round2(row.get(4)?),
        net: round2(row.get(5)?),
        employer_charges: round2(row.get(6)?),
      })
    },
  )?;
  Ok(summary)
}

/// Payroll cost of the 12 competences before `competence`: salaries, FGTS,
/// employer contribution and pro-labore. Numerator of the Fator R.
pub fn payroll_cost_12m(conn: &Connection, company_id: &str, competence: Competence) -> Result<f64, AppError> {
  let start = competence.preceding(12)[0];
  let from = start.year * 100 + start.month as i32;
  let to = competence.year * 100 + competence.month as i32;
  let salaries: f64 = conn.query_row(
    "SELECT COALESCE(SUM(gross + fgts + employer_cpp), 0) FROM payrolls
     WHERE company_id = ?1 AND (year * 100 + month) >= ?2 AND (year * 100 + month) < ?3",
    params![company_id, from, to],
    |row| row.get(0),
  )?;
  let pro_labore: f64 = conn.query_row(
    "SELECT COALESCE(SUM(amount + employer_cpp), 0) FROM rcis
     WHERE company_id = ?1 AND (year * 100 + month) >= ?2 AND (year * 100 + month) < ?3",
    params![company_id, from, to],
    |row| row.get(0),
  )?;
  Ok(round2(salaries + pro_labore))
}

// Pro-labore (RCI)

fn map_rci(row: &Row<'_>) -> rusqlite::Result<Rci> {
  Ok(Rci {
    id: row.get(0)?,
    company_id: row.get(1)?,
    partner_id: row.get(2)?,
    partner_name: row.get(3)?,
    year: row.get(4)?,
    month: row.get(5)?,
    amount: row.get(6)?,
    inss: row.get(7)?,
    irrf: row.get(8)?,
    net: row.get(9)?,
    employer_cpp: row.get(10)?,
    created_at: row.get(11)?,
  })
}

const RCI_SELECT: &str = "SELECT r.id, r.company_id, r.partner_id, p.name, r.year, r.month, r.amount, r.inss, r.irrf,
  r.net, r.employer_cpp, r.created_at FROM rcis r JOIN partners p ON p.id = r.partner_id";

pub fn create_rci(
  conn: &Connection,
  company_id: &str,
  partner_id: &str,
  competence: Competence,
  amount: Option<f64>,
  actor: Option<&str>,
) -> Result<Rci, AppError> {
  let company = companies::get_company(conn, company_id)?;
  let partner = people::get_partner(conn, partner_id)?;
  if partner.company_id != company_id || !partner.is_active {
    return Err(AppError::not_found("Socio ativo nao encontrado na empresa"));
  }
  closing::ensure_open(conn, company_id, competence)?;

  let amount = amount.unwrap_or(partner.pro_labore);
  validation::ensure_amount_positive(amount)?;

  let existing: Option<String> = conn
    .query_row(
      "SELECT id FROM rcis WHERE partner_id = ?1 AND year = ?2 AND month = ?3",
      params![partner_id, competence.year, competence.month],
      |row| row.get(0),
    )
    .optional()?;
  if existing.is_some() {
    return Err(AppError::new("DUPLICATE_RCI", "Pro-labore ja lancado para esta competencia"));
  }

  let result = calc_pro_labore(amount, partner.dependents, competence, &company.employer_profile())?;
  let id = new_id();
  conn.execute(
    "INSERT INTO rcis (id, company_id, partner_id, year, month, amount, inss, irrf, net, employer_cpp, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    params![
      id,
      company_id,
      partner_id,
      competence.year,
      competence.month,
      result.amount,
      result.inss,
      result.irrf,
      result.net,
      result.employer_cpp,
      now()
    ],
  )?;
  append_audit(conn, actor, "CREATE_RCI", "RCI", Some(&id), Some(company_id), payload(&result), None)?;

  Ok(conn.query_row(&format!("{RCI_SELECT} WHERE r.id = ?1"), params![id], map_rci)?)
}

pub fn list_rcis(conn: &Connection, company_id: &str, competence: Competence) -> Result<Vec<Rci>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "{RCI_SELECT} WHERE r.company_id = ?1 AND r.year = ?2 AND r.month = ?3 ORDER BY p.name COLLATE NOCASE"
  ))?;
  let rows = stmt.query_map(params![company_id, competence.year, competence.month], map_rci)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

// Vacation

const VACATION_COLUMNS: &str = "id, company_id, employee_id, start_date, days, sold_days, year, month, vacation_pay,
  one_third, abono, abono_one_third, inss, irrf, fgts, net, created_at";

fn map_vacation(row: &Row<'_>) -> rusqlite::Result<Vacation> {
  Ok(Vacation {
    id: row.get(0)?,
    company_id: row.get(1)?,
    employee_id: row.get(2)?,
    start_date: row.get(3)?,
    days: row.get(4)?,
    sold_days: row.get(5)?,
    year: row.get(6)?,
    month: row.get(7)?,
    vacation_pay: row.get(8)?,
    one_third: row.get(9)?,
    abono: row.get(10)?,
    abono_one_third: row.get(11)?,
    inss: row.get(12)?,
    irrf: row.get(13)?,
    fgts: row.get(14)?,
    net: row.get(15)?,
    created_at: row.get(16)?,
  })
}

pub fn create_vacation(
  conn: &Connection,
  company_id: &str,
  input: &VacationInput,
  actor: Option<&str>,
) -> Result<Vacation, AppError> {
  let employee = people::get_employee(conn, &input.employee_id)?;
  ensure_employee_of(&employee, company_id)?;
  ensure_not_terminated(&employee)?;
  let start = validation::parse_date(&input.start_date)?;
  let admission = validation::parse_date(&employee.admission_date)?;
  if start < admission {
    return Err(AppError::new("INVALID_DATE", "Ferias antes da admissao"));
  }
  let competence = Competence::of_date(start);
  closing::ensure_open(conn, company_id, competence)?;

  let sold_days = input.sold_days.unwrap_or(0);
  let result = calc_vacation(&VacationCalcInput {
    competence,
    salary: employee.base_salary,
    days: input.days,
    sold_days,
    dependents: employee.dependents,
    contract_kind: employee.contract_kind,
  })?;

  let id = new_id();
  conn.execute(
    &format!("INSERT INTO vacations ({VACATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
    params![
      id,
      company_id,
      employee.id,
      input.start_date,
      input.days,
      sold_days,
      competence.year,
      competence.month,
      result.vacation_pay,
      result.one_third,
      result.abono,
      result.abono_one_third,
      result.inss,
      result.irrf,
      result.fgts,
      result.net,
      now()
    ],
  )?;
  append_audit(conn, actor, "CREATE_VACATION", "VACATION", Some(&id), Some(company_id), payload(input), None)?;

  Ok(conn.query_row(
    &format!("SELECT {VACATION_COLUMNS} FROM vacations WHERE id = ?1"),
    params![id],
    map_vacation,
  )?)
}

pub fn list_vacations(conn: &Connection, company_id: &str, employee_id: Option<&str>) -> Result<Vec<Vacation>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {VACATION_COLUMNS} FROM vacations
     WHERE company_id = ?1 AND (?2 IS NULL OR employee_id = ?2)
     ORDER BY start_date DESC"
  ))?;
  let rows = stmt.query_map(params![company_id, employee_id], map_vacation)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

// 13th salary

const THIRTEENTH_COLUMNS: &str =
  "id, company_id, employee_id, year, installment, months_worked, gross, advance, inss, irrf, fgts, net, created_at";

fn map_thirteenth(row: &Row<'_>) -> rusqlite::Result<Thirteenth> {
  let installment: String = row.get(4)?;
  Ok(Thirteenth {
    id: row.get(0)?,
    company_id: row.get(1)?,
    employee_id: row.get(2)?,
    year: row.get(3)?,
    installment: Installment::parse(&installment).unwrap_or(Installment::Primeira),
    months_worked: row.get(5)?,
    gross: row.get(6)?,
    advance: row.get(7)?,
    inss: row.get(8)?,
    irrf: row.get(9)?,
    fgts: row.get(10)?,
    net: row.get(11)?,
    created_at: row.get(12)?,
  })
}

/// Competence in which an installment is paid: November for the first,
/// December for the second.
pub fn thirteenth_competence(year: i32, installment: Installment) -> Result<Competence, AppError> {
  match installment {
    Installment::Primeira => Competence::new(year, 11),
    Installment::Segunda => Competence::new(year, 12),
  }
}

fn first_installment_paid(conn: &Connection, employee_id: &str, year: i32) -> Result<f64, AppError> {
  let paid: Option<f64> = conn
    .query_row(
      "SELECT gross FROM thirteenths WHERE employee_id = ?1 AND year = ?2 AND installment = 'PRIMEIRA'",
      params![employee_id, year],
      |row| row.get(0),
    )
    .optional()?;
  Ok(paid.unwrap_or(0.0))
}

pub fn create_thirteenth(
  conn: &Connection,
  company_id: &str,
  input: &ThirteenthInput,
  actor: Option<&str>,
) -> Result<Thirteenth, AppError> {
  let employee = people::get_employee(conn, &input.employee_id)?;
  ensure_employee_of(&employee, company_id)?;
  ensure_not_terminated(&employee)?;
  let competence = thirteenth_competence(input.year, input.installment)?;
  closing::ensure_open(conn, company_id, competence)?;

  let existing: Option<String> = conn
    .query_row(
      "SELECT id FROM thirteenths WHERE employee_id = ?1 AND year = ?2 AND installment = ?3",
      params![employee.id, input.year, input.installment.as_str()],
      |row| row.get(0),
    )
    .optional()?;
  if existing.is_some() {
    return Err(AppError::new("DUPLICATE_THIRTEENTH", "Parcela do 13o ja calculada"));
  }

  let admission = validation::parse_date(&employee.admission_date)?;
  let year_start = Competence::new(input.year, 1)?.first_day();
  let year_end = Competence::new(input.year, 12)?.last_day();
  let months_worked = calendar_twelfths(admission.max(year_start), year_end);

  let first_paid = match input.installment {
    Installment::Primeira => 0.0,
    Installment::Segunda => first_installment_paid(conn, &employee.id, input.year)?,
  };
  let result = calc_thirteenth(&ThirteenthCalcInput {
    competence,
    salary: employee.base_salary,
    months_worked,
    installment: input.installment,
    first_installment_paid: first_paid,
    dependents: employee.dependents,
    contract_kind: employee.contract_kind,
  })?;

  let id = new_id();
  conn.execute(
    &format!("INSERT INTO thirteenths ({THIRTEENTH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
    params![
      id,
      company_id,
      employee.id,
      input.year,
      input.installment.as_str(),
      months_worked,
      result.gross,
      result.advance,
      result.inss,
      result.irrf,
      result.fgts,
      result.net,
      now()
    ],
  )?;
  append_audit(conn, actor, "CREATE_THIRTEENTH", "THIRTEENTH", Some(&id), Some(company_id), payload(input), None)?;

  Ok(conn.query_row(
    &format!("SELECT {THIRTEENTH_COLUMNS} FROM thirteenths WHERE id = ?1"),
    params![id],
    map_thirteenth,
  )?)
}

pub fn list_thirteenths(conn: &Connection, company_id: &str, year: i32) -> Result<Vec<Thirteenth>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {THIRTEENTH_COLUMNS} FROM thirteenths WHERE company_id = ?1 AND year = ?2 ORDER BY employee_id, installment"
  ))?;
  let rows = stmt.query_map(params![company_id, year], map_thirteenth)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

// Termination

const TERMINATION_COLUMNS: &str = "id, company_id, employee_id, termination_date, reason, notice_days, saldo_salario,
  aviso_previo, ferias_vencidas, ferias_proporcionais, ferias_one_third, decimo_terceiro, fgts_deposit, fgts_fine,
  inss, irrf, gross, net, created_at";

fn map_termination(row: &Row<'_>) -> rusqlite::Result<Termination> {
  let reason: String = row.get(4)?;
  Ok(Termination {
    id: row.get(0)?,
    company_id: row.get(1)?,
    employee_id: row.get(2)?,
    termination_date: row.get(3)?,
    reason: TerminationReason::parse(&reason).unwrap_or(TerminationReason::SemJustaCausa),
    notice_days: row.get(5)?,
    saldo_salario: row.get(6)?,
    aviso_previo: row.get(7)?,
    ferias_vencidas: row.get(8)?,
    ferias_proporcionais: row.get(9)?,
    ferias_one_third: row.get(10)?,
    decimo_terceiro: row.get(11)?,
    fgts_deposit: row.get(12)?,
    fgts_fine: row.get(13)?,
    inss: row.get(14)?,
    irrf: row.get(15)?,
    gross: row.get(16)?,
    net: row.get(17)?,
    created_at: row.get(18)?,
  })
}

/// FGTS deposited for the employee through this application, used when no
/// statement balance is informed.
fn fgts_deposited(conn: &Connection, employee_id: &str) -> Result<f64, AppError> {
  let total: f64 = conn.query_row(
    "SELECT
       (SELECT COALESCE(SUM(fgts), 0) FROM payrolls WHERE employee_id = ?1)
     + (SELECT COALESCE(SUM(fgts), 0) FROM vacations WHERE employee_id = ?1)
     + (SELECT COALESCE(SUM(fgts), 0) FROM thirteenths WHERE employee_id = ?1)",
    params![employee_id],
    |row| row.get(0),
  )?;
  Ok(round2(total))
}

pub fn create_termination(
  conn: &mut Connection,
  company_id: &str,
  input: &TerminationInput,
  actor: Option<&str>,
) -> Result<Termination, AppError> {
  let employee = people::get_employee(conn, &input.employee_id)?;
  ensure_employee_of(&employee, company_id)?;
  ensure_not_terminated(&employee)?;
  let termination = validation::parse_date(&input.termination_date)?;
  let admission = validation::parse_date(&employee.admission_date)?;
  closing::ensure_open(conn, company_id, Competence::of_date(termination))?;

  let fgts_balance = match input.fgts_balance {
    Some(balance) => {
      validation::ensure_non_negative(balance, "Saldo FGTS")?;
      balance
    }
    None => fgts_deposited(conn, &employee.id)?,
  };
  let result = calc_termination(&TerminationCalcInput {
    salary: employee.base_salary,
    admission,
    termination,
    reason: input.reason,
    notice_worked: input.notice_worked.unwrap_or(false),
    vested_vacation_periods: input.vested_vacation_periods.unwrap_or(0),
    thirteenth_advance_paid: first_installment_paid(conn, &employee.id, termination.year())?,
    fgts_balance,
    dependents: employee.dependents,
    contract_kind: employee.contract_kind,
  })?;

  let id = new_id();
  let tx = conn.transaction()?;
  tx.execute(
    &format!(
      "INSERT INTO terminations ({TERMINATION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
    ),
    params![
      id,
      company_id,
      employee.id,
      input.termination_date,
      input.reason.as_str(),
      result.notice_days,
      result.saldo_salario,
      result.aviso_previo,
      result.ferias_vencidas,
      result.ferias_proporcionais,
      result.ferias_one_third,
      result.decimo_terceiro,
      result.fgts_deposit,
      result.fgts_fine,
      result.inss,
      result.irrf,
      result.gross,
      result.net,
      now()
    ],
  )?;
  people::mark_terminated(&tx, &employee.id, &input.termination_date)?;
  append_audit(
    &tx,
    actor,
    "CREATE_TERMINATION",
    "TERMINATION",
    Some(&id),
    Some(company_id),
    payload(input),
    Some(format!("funcionario={}", employee.name)),
  )?;
  tx.commit()?;
  log::info!(
    "event=termination module=payroll status=ok company_id={company_id} employee_id={} reason={}",
    employee.id,
    input.reason
  );

  Ok(conn.query_row(
    &format!("SELECT {TERMINATION_COLUMNS} FROM terminations WHERE id = ?1"),
    params![id],
    map_termination,
  )?)
}

pub fn list_terminations(conn: &Connection, company_id: &str) -> Result<Vec<Termination>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {TERMINATION_COLUMNS} FROM terminations WHERE company_id = ?1 ORDER BY termination_date DESC"
  ))?;
  let rows = stmt.query_map(params![company_id], map_termination)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Terminations whose date falls in `competence`.
pub fn terminations_in(conn: &Connection, company_id: &str, competence: Competence) -> Result<Vec<Termination>, AppError> {
  let prefix = format!("{competence}-%");
  let mut stmt = conn.prepare(&format!(
    "SELECT {TERMINATION_COLUMNS} FROM terminations WHERE company_id = ?1 AND termination_date LIKE ?2
     ORDER BY termination_date"
  ))?;
  let rows = stmt.query_map(params![company_id, prefix], map_termination)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}
