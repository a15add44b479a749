//! Partners (socios) and employees of a company.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::tax_tables::{earliest_minimum_wage, minimum_wage};
use crate::domain::{validation, Competence};
use crate::error::AppError;
use crate::models::{ContractKind, Employee, EmployeeInput, EmployeeStatus, Partner, PartnerInput};

const PARTNER_COLUMNS: &str =
  "id, company_id, name, cpf, share_percent, pro_labore, dependents, entry_date, is_active, created_at, updated_at";

const EMPLOYEE_COLUMNS: &str = "id, company_id, matricula, name, cpf, pis, birth_date, admission_date, cargo, cbo,
  base_salary, contract_kind, esocial_category, dependents, status, termination_date, created_at, updated_at";

/// eSocial worker categories: 101 employee, 103 apprentice.
const CATEGORY_EMPREGADO: u16 = 101;
const CATEGORY_APRENDIZ: u16 = 103;

fn map_partner(row: &Row<'_>) -> rusqlite::Result<Partner> {
  Ok(Partner {
    id: row.get(0)?,
    company_id: row.get(1)?,
    name: row.get(2)?,
    cpf: row.get(3)?,
    share_percent: row.get(4)?,
    pro_labore: row.get(5)?,
    dependents: row.get(6)?,
    entry_date: row.get(7)?,
    is_active: row.get::<_, i64>(8)? == 1,
    created_at: row.get(9)?,
    updated_at: row.get(10)?,
  })
}

fn map_employee(row: &Row<'_>) -> rusqlite::Result<Employee> {
  let kind: String = row.get(11)?;
  let status: String = row.get(14)?;
  Ok(Employee {
    id: row.get(0)?,
    company_id: row.get(1)?,
    matricula: row.get(2)?,
    name: row.get(3)?,
    cpf: row.get(4)?,
    pis: row.get(5)?,
    birth_date: row.get(6)?,
    admission_date: row.get(7)?,
    cargo: row.get(8)?,
    cbo: row.get(9)?,
    base_salary: row.get(10)?,
    contract_kind: ContractKind::parse(&kind).unwrap_or(ContractKind::Clt),
    esocial_category: row.get(12)?,
    dependents: row.get(13)?,
    status: EmployeeStatus::parse(&status).unwrap_or(EmployeeStatus::Ativo),
    termination_date: row.get(15)?,
    created_at: row.get(16)?,
    updated_at: row.get(17)?,
  })
}

// Partners

fn validate_partner(input: &PartnerInput) -> Result<PartnerInput, AppError> {
  let mut clean = input.clone();
  clean.name = validation::ensure_not_blank(&input.name, "Nome")?;
  clean.cpf = validation::ensure_cpf(&input.cpf)?;
  if !(input.share_percent > 0.0 && input.share_percent <= 100.0) {
    return Err(AppError::new("INVALID_SHARE", "Participacao deve estar entre 0 e 100 %"));
  }
  validation::ensure_non_negative(input.pro_labore, "Pro-labore")?;
  if let Some(date) = input.entry_date.as_deref() {
    validation::parse_date(date)?;
  }
  Ok(clean)
}

fn ensure_share_available(
  conn: &Connection,
  company_id: &str,
  share: f64,
  except_id: Option<&str>,
) -> Result<(), AppError> {
  let current: f64 = conn.query_row(
    "SELECT COALESCE(SUM(share_percent), 0) FROM partners
     WHERE company_id = ?1 AND is_active = 1 AND (?2 IS NULL OR id <> ?2)",
    params![company_id, except_id],
    |row| row.get(0),
  )?;
  if current + share > 100.0 + 1e-9 {
    return Err(AppError::new(
      "SHARE_EXCEEDED",
      format!("Soma das participacoes excede 100 % (atual {current:.2} %)"),
    ));
  }
  Ok(())
}

pub fn create_partner(
  conn: &Connection,
  company_id: &str,
  input: &PartnerInput,
  actor: Option<&str>,
) -> Result<Partner, AppError> {
  companies::get_company(conn, company_id)?;
  let clean = validate_partner(input)?;
  ensure_share_available(conn, company_id, clean.share_percent, None)?;

  let id = new_id();
  let ts = now();
  conn.execute(
    "INSERT INTO partners (id, company_id, name, cpf, share_percent, pro_labore, dependents, entry_date, is_active, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
    params![
      id,
      company_id,
      clean.name,
      clean.cpf,
      clean.share_percent,
      clean.pro_labore,
      clean.dependents.unwrap_or(0),
      clean.entry_date,
      ts
    ],
  )?;
  append_audit(conn, actor, "CREATE_PARTNER", "PARTNER", Some(&id), Some(company_id), payload(&clean), None)?;
  get_partner(conn, &id)
}

pub fn update_partner(conn: &Connection, id: &str, input: &PartnerInput, actor: Option<&str>) -> Result<Partner, AppError> {
  let current = get_partner(conn, id)?;
  let clean = validate_partner(input)?;
  if current.is_active {
    ensure_share_available(conn, &current.company_id, clean.share_percent, Some(id))?;
  }
  conn.execute(
    "UPDATE partners SET name = ?2, cpf = ?3, share_percent = ?4, pro_labore = ?5, dependents = ?6,
       entry_date = ?7, updated_at = ?8 WHERE id = ?1",
    params![
      id,
      clean.name,
      clean.cpf,
      clean.share_percent,
      clean.pro_labore,
      clean.dependents.unwrap_or(current.dependents),
      clean.entry_date,
      now()
    ],
  )?;
  append_audit(
    conn,
    actor,
    "UPDATE_PARTNER",
    "PARTNER",
    Some(id),
    Some(&current.company_id),
    payload(&clean),
    None,
  )?;
  get_partner(conn, id)
}

pub fn deactivate_partner(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let partner = get_partner(conn, id)?;
  conn.execute(
    "UPDATE partners SET is_active = 0, updated_at = ?2 WHERE id = ?1",
    params![id, now()],
  )?;
  append_audit(
    conn,
    actor,
    "DEACTIVATE_PARTNER",
    "PARTNER",
    Some(id),
    Some(&partner.company_id),
    "{\"action\":\"deactivate\"}".to_string(),
    None,
  )?;
  Ok(())
}

pub fn delete_partner(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let partner = get_partner(conn, id)?;
  conn.execute("DELETE FROM partners WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_PARTNER",
    "PARTNER",
    Some(id),
    Some(&partner.company_id),
    payload(&partner),
    None,
  )?;
  Ok(())
}

pub fn get_partner(conn: &Connection, id: &str) -> Result<Partner, AppError> {
  conn
    .query_row(
      &format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = ?1"),
      params![id],
      map_partner,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Socio nao encontrado"))
}

pub fn list_partners(conn: &Connection, company_id: &str, include_inactive: bool) -> Result<Vec<Partner>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PARTNER_COLUMNS} FROM partners
     WHERE company_id = ?1 AND (?2 = 1 OR is_active = 1)
     ORDER BY name COLLATE NOCASE"
  ))?;
  let rows = stmt.query_map(params![company_id, include_inactive as i64], map_partner)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

// Employees

fn validate_employee(input: &EmployeeInput) -> Result<EmployeeInput, AppError> {
  let mut clean = input.clone();
  clean.name = validation::ensure_not_blank(&input.name, "Nome")?;
  clean.cpf = validation::ensure_cpf(&input.cpf)?;
  clean.cargo = validation::ensure_not_blank(&input.cargo, "Cargo")?;
  clean.pis = match input.pis.as_deref().filter(|value| !value.trim().is_empty()) {
    Some(pis) => Some(validation::ensure_pis(pis)?),
    None => None,
  };
  if let Some(birth) = input.birth_date.as_deref() {
    validation::parse_date(birth)?;
  }
  let admission = validation::parse_date(&input.admission_date)?;
  validation::ensure_amount_positive(input.base_salary)?;

  if input.contract_kind == ContractKind::Clt {
    // admissions older than the tables are held to the oldest floor on file
    let floor = minimum_wage(Competence::of_date(admission)).unwrap_or_else(|_| earliest_minimum_wage());
    if input.base_salary < floor {
      return Err(AppError::new(
        "BELOW_MINIMUM_WAGE",
        format!("Salario abaixo do minimo vigente ({floor:.2})"),
      ));
    }
  }

  if let Some(cbo) = input.cbo.as_deref() {
    let digits = validation::only_digits(cbo);
    if digits.len() != 6 {
      return Err(AppError::new("INVALID_CBO", "CBO deve ter 6 digitos"));
    }
    clean.cbo = Some(digits);
  }
  Ok(clean)
}

fn default_category(kind: ContractKind) -> u16 {
  match kind {
    ContractKind::Clt => CATEGORY_EMPREGADO,
    ContractKind::Aprendiz => CATEGORY_APRENDIZ,
  }
}

fn next_matricula(conn: &Connection, company_id: &str) -> Result<String, AppError> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM employees WHERE company_id = ?1",
    params![company_id],
    |row| row.get(0),
  )?;
  let mut candidate = count + 1;
  loop {
    let matricula = format!("{candidate:06}");
    let taken: i64 = conn.query_row(
      "SELECT COUNT(*) FROM employees WHERE company_id = ?1 AND matricula = ?2",
      params![company_id, matricula],
      |row| row.get(0),
    )?;
    if taken == 0 {
      return Ok(matricula);
    }
    candidate += 1;
  }
}

pub fn create_employee(
  conn: &Connection,
  company_id: &str,
  input: &EmployeeInput,
  actor: Option<&str>,
) -> Result<Employee, AppError> {
  companies::get_company(conn, company_id)?;
  let clean = validate_employee(input)?;

  let duplicate: Option<String> = conn
    .query_row(
      "SELECT id FROM employees WHERE company_id = ?1 AND cpf = ?2",
      params![company_id, clean.cpf],
      |row| row.get(0),
    )
    .optional()?;
  if duplicate.is_some() {
    return Err(AppError::new("DUPLICATE_CPF", "Funcionario com este CPF ja cadastrado"));
  }

  let matricula = match clean.matricula.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
    Some(value) => value.to_string(),
    None => next_matricula(conn, company_id)?,
  };
  let id = new_id();
  let ts = now();
  conn.execute(
    "INSERT INTO employees (id, company_id, matricula, name, cpf, pis, birth_date, admission_date, cargo, cbo,
       base_salary, contract_kind, esocial_category, dependents, status, termination_date, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 'ATIVO', NULL, ?15, ?15)",
    params![
      id,
      company_id,
      matricula,
      clean.name,
      clean.cpf,
      clean.pis,
      clean.birth_date,
      clean.admission_date,
      clean.cargo,
      clean.cbo,
      clean.base_salary,
      clean.contract_kind.as_str(),
      clean.esocial_category.unwrap_or_else(|| default_category(clean.contract_kind)),
      clean.dependents.unwrap_or(0),
      ts
    ],
  )?;
  append_audit(conn, actor, "CREATE_EMPLOYEE", "EMPLOYEE", Some(&id), Some(company_id), payload(&clean), None)?;
  log::info!("event=employee_created module=people status=ok company_id={company_id} employee_id={id}");
  get_employee(conn, &id)
}

pub fn update_employee(conn: &Connection, id: &str, input: &EmployeeInput, actor: Option<&str>) -> Result<Employee, AppError> {
  let current = get_employee(conn, id)?;
  if current.status == EmployeeStatus::Desligado {
    return Err(AppError::new("EMPLOYEE_TERMINATED", "Funcionario desligado nao pode ser alterado"));
  }
  let clean = validate_employee(input)?;
  let matricula = clean
    .matricula
    .clone()
    .filter(|value| !value.trim().is_empty())
    .unwrap_or_else(|| current.matricula.clone());

  conn.execute(
    "UPDATE employees SET matricula = ?2, name = ?3, cpf = ?4, pis = ?5, birth_date = ?6, admission_date = ?7,
       cargo = ?8, cbo = ?9, base_salary = ?10, contract_kind = ?11, esocial_category = ?12, dependents = ?13,
       updated_at = ?14
     WHERE id = ?1",
    params![
      id,
      matricula,
      clean.name,
      clean.cpf,
      clean.pis,
      clean.birth_date,
      clean.admission_date,
      clean.cargo,
      clean.cbo,
      clean.base_salary,
      clean.contract_kind.as_str(),
      clean.esocial_category.unwrap_or(current.esocial_category),
      clean.dependents.unwrap_or(current.dependents),
      now()
    ],
  )?;
  append_audit(
    conn,
    actor,
    "UPDATE_EMPLOYEE",
    "EMPLOYEE",
    Some(id),
    Some(&current.company_id),
    payload(&clean),
    None,
  )?;
  get_employee(conn, id)
}

/// Switches between active and on leave. Terminations go through the
/// termination calculation instead.
pub fn set_employee_status(
  conn: &Connection,
  id: &str,
  status: EmployeeStatus,
  actor: Option<&str>,
) -> Result<Employee, AppError> {
  let current = get_employee(conn, id)?;
  if status == EmployeeStatus::Desligado {
    return Err(AppError::new(
      "USE_TERMINATION",
      "Use o calculo de rescisao para desligar o funcionario",
    ));
  }
  if current.status == EmployeeStatus::Desligado {
    return Err(AppError::new("EMPLOYEE_TERMINATED", "Funcionario ja desligado"));
  }
  conn.execute(
    "UPDATE employees SET status = ?2, updated_at = ?3 WHERE id = ?1",
    params![id, status.as_str(), now()],
  )?;
  append_audit(
    conn,
    actor,
    "SET_EMPLOYEE_STATUS",
    "EMPLOYEE",
    Some(id),
    Some(&current.company_id),
    format!("{{\"status\":\"{}\"}}", status.as_str()),
    None,
  )?;
  get_employee(conn, id)
}

pub(crate) fn mark_terminated(conn: &Connection, id: &str, termination_date: &str) -> Result<(), AppError> {
  conn.execute(
    "UPDATE employees SET status = 'DESLIGADO', termination_date = ?2, updated_at = ?3 WHERE id = ?1",
    params![id, termination_date, now()],
  )?;
  Ok(())
}

pub fn delete_employee(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let employee = get_employee(conn, id)?;
  let payrolls: i64 = conn.query_row(
    "SELECT COUNT(*) FROM payrolls WHERE employee_id = ?1",
    params![id],
    |row| row.get(0),
  )?;
  if payrolls > 0 {
    return Err(AppError::new(
      "EMPLOYEE_HAS_PAYROLL",
      "Funcionario possui folhas calculadas e nao pode ser excluido",
    ));
  }
  conn.execute("DELETE FROM employees WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_EMPLOYEE",
    "EMPLOYEE",
    Some(id),
    Some(&employee.company_id),
    payload(&employee),
    None,
  )?;
  Ok(())
}

pub fn get_employee(conn: &Connection, id: &str) -> Result<Employee, AppError> {
  conn
    .query_row(
      &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?1"),
      params![id],
      map_employee,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Funcionario nao encontrado"))
}

pub fn list_employees(conn: &Connection, company_id: &str, include_terminated: bool) -> Result<Vec<Employee>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {EMPLOYEE_COLUMNS} FROM employees
     WHERE company_id = ?1 AND (?2 = 1 OR status <> 'DESLIGADO')
     ORDER BY name COLLATE NOCASE"
  ))?;
  let rows = stmt.query_map(params![company_id, include_terminated as i64], map_employee)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::companies::create_company;
  use crate::models::{Accountant, Address, CompanyInput, TaxRegime};

  fn setup() -> (Connection, String) {
    let conn = crate::db::open_db_in_memory().unwrap();
    let company = create_company(
      &conn,
      &CompanyInput {
        cnpj: "11222333000181".to_string(),
        razao_social: "Oficina Boa Ltda".to_string(),
        nome_fantasia: None,
        regime: TaxRegime::LucroPresumido,
        simples_anexo: None,
        activity_start: None,
        address: Address {
          uf: "MG".to_string(),
          ..Address::default()
        },
        inscricao_estadual: None,
        inscricao_municipal: None,
        cnae: None,
        rat_rate: Some(2.0),
        accountant: Accountant::default(),
        email: None,
        telefone: None,
      },
      None,
    )
    .unwrap();
    (conn, company.id)
  }

  fn employee(salary: f64) -> EmployeeInput {
    EmployeeInput {
      matricula: None,
      name: "Joana Silva".to_string(),
      cpf: "529.982.247-25".to_string(),
      pis: None,
      birth_date: None,
      admission_date: "2025-02-01".to_string(),
      cargo: "Mecanica".to_string(),
      cbo: None,
      base_salary: salary,
      contract_kind: ContractKind::Clt,
      esocial_category: None,
      dependents: None,
    }
  }

  #[test]
  fn partner_shares_cannot_exceed_total() {
    let (conn, company_id) = setup();
    let first = PartnerInput {
      name: "Carlos".to_string(),
      cpf: "52998224725".to_string(),
      share_percent: 70.0,
      pro_labore: 3000.0,
      dependents: None,
      entry_date: None,
    };
    create_partner(&conn, &company_id, &first, None).unwrap();

    let second = PartnerInput {
      share_percent: 40.0,
      ..first.clone()
    };
    let err = create_partner(&conn, &company_id, &second, None).unwrap_err();
    assert_eq!(err.code, "SHARE_EXCEEDED");
  }

  #[test]
  fn employee_gets_sequential_matricula_and_default_category() {
    let (conn, company_id) = setup();
    let created = create_employee(&conn, &company_id, &employee(2500.0), None).unwrap();
    assert_eq!(created.matricula, "000001");
    assert_eq!(created.esocial_category, 101);
    assert_eq!(created.status, EmployeeStatus::Ativo);
    assert_eq!(created.cpf, "52998224725");
  }

  #[test]
  fn clt_salary_below_minimum_wage_is_rejected() {
    let (conn, company_id) = setup();
    let err = create_employee(&conn, &company_id, &employee(1000.0), None).unwrap_err();
    assert_eq!(err.code, "BELOW_MINIMUM_WAGE");
  }

  #[test]
  fn admission_before_first_table_uses_oldest_minimum_wage() {
    let (conn, company_id) = setup();
    let veteran = |salary: f64| EmployeeInput {
      admission_date: "2019-08-01".to_string(),
      ..employee(salary)
    };
    let err = create_employee(&conn, &company_id, &veteran(1000.0), None).unwrap_err();
    assert_eq!(err.code, "BELOW_MINIMUM_WAGE");
    assert!(err.message.contains("1320.00"));
    let created = create_employee(&conn, &company_id, &veteran(1400.0), None).unwrap();
    assert_eq!(created.admission_date, "2019-08-01");
  }

  #[test]
  fn status_change_cannot_terminate() {
    let (conn, company_id) = setup();
    let created = create_employee(&conn, &company_id, &employee(2500.0), None).unwrap();
    let err = set_employee_status(&conn, &created.id, EmployeeStatus::Desligado, None).unwrap_err();
    assert_eq!(err.code, "USE_TERMINATION");
    let on_leave = set_employee_status(&conn, &created.id, EmployeeStatus::Afastado, None).unwrap();
    assert_eq!(on_leave.status, EmployeeStatus::Afastado);
  }
}
