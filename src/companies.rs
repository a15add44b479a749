//! Company registry and the active-company switcher.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::db::{new_id, now};
use crate::domain::payroll::EmployerProfile;
use crate::domain::validation;
use crate::error::AppError;
use crate::models::{Accountant, Address, Anexo, CnpjLookupResult, Company, CompanyInput, TaxRegime};
use crate::settings;

const COMPANY_COLUMNS: &str = "id, cnpj, razao_social, nome_fantasia, regime, simples_anexo, activity_start,
  logradouro, numero, complemento, bairro, cep, municipio, uf, codigo_municipio,
  inscricao_estadual, inscricao_municipal, cnae, rat_rate, accountant_nome, accountant_cpf,
  accountant_crc, email, telefone, created_at, updated_at";

const DEFAULT_RAT_RATE: f64 = 1.0;

impl Company {
  pub fn employer_profile(&self) -> EmployerProfile {
    EmployerProfile {
      regime: self.regime,
      anexo: self.simples_anexo,
      rat_rate: self.rat_rate,
    }
  }

  /// First 8 digits of the CNPJ, used as the employer inscription.
  pub fn cnpj_root(&self) -> &str {
    self.cnpj.get(..8).unwrap_or(&self.cnpj)
  }
}

fn map_company(row: &Row<'_>) -> rusqlite::Result<Company> {
  let regime: String = row.get(4)?;
  let anexo: Option<String> = row.get(5)?;
  Ok(Company {
    id: row.get(0)?,
    cnpj: row.get(1)?,
    razao_social: row.get(2)?,
    nome_fantasia: row.get(3)?,
    regime: TaxRegime::parse(&regime).unwrap_or(TaxRegime::LucroPresumido),
    simples_anexo: anexo.and_then(|value| Anexo::parse(&value).ok()),
    activity_start: row.get(6)?,
    address: Address {
      logradouro: row.get(7)?,
      numero: row.get(8)?,
      complemento: row.get(9)?,
      bairro: row.get(10)?,
      cep: row.get(11)?,
      municipio: row.get(12)?,
      uf: row.get(13)?,
      codigo_municipio: row.get(14)?,
    },
    inscricao_estadual: row.get(15)?,
    inscricao_municipal: row.get(16)?,
    cnae: row.get(17)?,
    rat_rate: row.get(18)?,
    accountant: Accountant {
      nome: row.get(19)?,
      cpf: row.get(20)?,
      crc: row.get(21)?,
    },
    email: row.get(22)?,
    telefone: row.get(23)?,
    created_at: row.get(24)?,
    updated_at: row.get(25)?,
  })
}

/// Checks and normalizes a company form. Documents are stored as digits only.
fn validate_input(input: &CompanyInput) -> Result<CompanyInput, AppError> {
  let mut clean = input.clone();
  clean.cnpj = validation::ensure_cnpj(&input.cnpj)?;
  clean.razao_social = validation::ensure_not_blank(&input.razao_social, "Razao social")?;
  clean.address.uf = validation::ensure_uf(&input.address.uf)?;

  match (input.regime, input.simples_anexo) {
    (TaxRegime::SimplesNacional, None) => {
      return Err(AppError::new(
        "ANEXO_REQUIRED",
        "Empresas do Simples Nacional precisam do anexo de tributacao",
      ));
    }
    (TaxRegime::SimplesNacional, Some(_)) => {}
    _ => clean.simples_anexo = None,
  }

  if let Some(start) = input.activity_start.as_deref().filter(|value| !value.trim().is_empty()) {
    validation::parse_date(start)?;
  } else {
    clean.activity_start = None;
  }

  let rat = input.rat_rate.unwrap_or(DEFAULT_RAT_RATE);
  if !(1.0..=3.0).contains(&rat) {
    return Err(AppError::new("INVALID_RAT", "Aliquota RAT deve estar entre 1 e 3 %"));
  }
  clean.rat_rate = Some(rat);

  if let Some(code) = input.address.codigo_municipio.as_deref() {
    let digits = validation::only_digits(code);
    if digits.len() != 7 {
      return Err(AppError::new("INVALID_MUNICIPIO", "Codigo IBGE do municipio deve ter 7 digitos"));
    }
    clean.address.codigo_municipio = Some(digits);
  }
  if let Some(cep) = input.address.cep.as_deref() {
    let digits = validation::only_digits(cep);
    if digits.len() != 8 {
      return Err(AppError::new("INVALID_CEP", "CEP deve ter 8 digitos"));
    }
    clean.address.cep = Some(digits);
  }
  if let Some(cnae) = input.cnae.as_deref() {
    clean.cnae = Some(validation::only_digits(cnae)).filter(|digits| !digits.is_empty());
  }
  if let Some(email) = input.email.as_deref().filter(|value| !value.trim().is_empty()) {
    clean.email = Some(validation::ensure_email(email)?);
  } else {
    clean.email = None;
  }
  if let Some(cpf) = input.accountant.cpf.as_deref().filter(|value| !value.trim().is_empty()) {
    clean.accountant.cpf = Some(validation::ensure_cpf(cpf)?);
  }

  Ok(clean)
}

pub fn create_company(conn: &Connection, input: &CompanyInput, actor: Option<&str>) -> Result<Company, AppError> {
  let clean = validate_input(input)?;
  let exists: Option<String> = conn
    .query_row("SELECT id FROM companies WHERE cnpj = ?1", params![clean.cnpj], |row| row.get(0))
    .optional()?;
  if exists.is_some() {
    return Err(AppError::new("DUPLICATE_CNPJ", "Ja existe uma empresa com este CNPJ"));
  }

  let id = new_id();
  let ts = now();
  conn.execute(
    "INSERT INTO companies (id, cnpj, razao_social, nome_fantasia, regime, simples_anexo, activity_start,
       logradouro, numero, complemento, bairro, cep, municipio, uf, codigo_municipio,
       inscricao_estadual, inscricao_municipal, cnae, rat_rate, accountant_nome, accountant_cpf,
       accountant_crc, email, telefone, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?25)",
    params![
      id,
      clean.cnpj,
      clean.razao_social,
      clean.nome_fantasia,
      clean.regime.as_str(),
      clean.simples_anexo.map(|anexo| anexo.as_str()),
      clean.activity_start,
      clean.address.logradouro,
      clean.address.numero,
      clean.address.complemento,
      clean.address.bairro,
      clean.address.cep,
      clean.address.municipio,
      clean.address.uf,
      clean.address.codigo_municipio,
      clean.inscricao_estadual,
      clean.inscricao_municipal,
      clean.cnae,
      clean.rat_rate.unwrap_or(DEFAULT_RAT_RATE),
      clean.accountant.nome,
      clean.accountant.cpf,
      clean.accountant.crc,
      clean.email,
      clean.telefone,
      ts
    ],
  )?;
  append_audit(conn, actor, "CREATE_COMPANY", "COMPANY", Some(&id), Some(&id), payload(&clean), None)?;
  log::info!("event=company_created module=companies status=ok company_id={id}");

  if settings::active_company_id(conn)?.is_none() {
    settings::set_active_company_id(conn, Some(&id))?;
  }
  get_company(conn, &id)
}

pub fn update_company(
  conn: &Connection,
  id: &str,
  input: &CompanyInput,
  actor: Option<&str>,
) -> Result<Company, AppError> {
  let clean = validate_input(input)?;
  let current = get_company(conn, id)?;
  if current.cnpj != clean.cnpj {
    let other: Option<String> = conn
      .query_row(
        "SELECT id FROM companies WHERE cnpj = ?1 AND id <> ?2",
        params![clean.cnpj, id],
        |row| row.get(0),
      )
      .optional()?;
    if other.is_some() {
      return Err(AppError::new("DUPLICATE_CNPJ", "Ja existe uma empresa com este CNPJ"));
    }
  }

  conn.execute(
    "UPDATE companies SET cnpj = ?2, razao_social = ?3, nome_fantasia = ?4, regime = ?5, simples_anexo = ?6,
       activity_start = ?7, logradouro = ?8, numero = ?9, complemento = ?10, bairro = ?11, cep = ?12,
       municipio = ?13, uf = ?14, codigo_municipio = ?15, inscricao_estadual = ?16,
       inscricao_municipal = ?17, cnae = ?18, rat_rate = ?19, accountant_nome = ?20,
       accountant_cpf = ?21, accountant_crc = ?22, email = ?23, telefone = ?24, updated_at = ?25
     WHERE id = ?1",
    params![
      id,
      clean.cnpj,
      clean.razao_social,
      clean.nome_fantasia,
      clean.regime.as_str(),
      clean.simples_anexo.map(|anexo| anexo.as_str()),
      clean.activity_start,
      clean.address.logradouro,
      clean.address.numero,
      clean.address.complemento,
      clean.address.bairro,
      clean.address.cep,
      clean.address.municipio,
      clean.address.uf,
      clean.address.codigo_municipio,
      clean.inscricao_estadual,
      clean.inscricao_municipal,
      clean.cnae,
      clean.rat_rate.unwrap_or(DEFAULT_RAT_RATE),
      clean.accountant.nome,
      clean.accountant.cpf,
      clean.accountant.crc,
      clean.email,
      clean.telefone,
      now()
    ],
  )?;
  append_audit(conn, actor, "UPDATE_COMPANY", "COMPANY", Some(id), Some(id), payload(&clean), None)?;
  get_company(conn, id)
}

pub fn get_company(conn: &Connection, id: &str) -> Result<Company, AppError> {
  conn
    .query_row(
      &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"),
      params![id],
      map_company,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Empresa nao encontrada"))
}

pub fn find_by_cnpj(conn: &Connection, cnpj: &str) -> Result<Option<Company>, AppError> {
  let digits = validation::only_digits(cnpj);
  Ok(
    conn
      .query_row(
        &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE cnpj = ?1"),
        params![digits],
        map_company,
      )
      .optional()?,
  )
}

pub fn list_companies(conn: &Connection) -> Result<Vec<Company>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {COMPANY_COLUMNS} FROM companies ORDER BY razao_social COLLATE NOCASE"
  ))?;
  let rows = stmt.query_map([], map_company)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Removes the company and, through foreign keys, everything filed under it.
pub fn delete_company(conn: &mut Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let company = get_company(conn, id)?;
  let tx = conn.transaction()?;
  tx.execute("DELETE FROM companies WHERE id = ?1", params![id])?;
  if settings::active_company_id(&tx)?.as_deref() == Some(id) {
    settings::set_active_company_id(&tx, None)?;
  }
  append_audit(
    &tx,
    actor,
    "DELETE_COMPANY",
    "COMPANY",
    Some(id),
    None,
    payload(&company),
    Some(format!("CNPJ {}", validation::format_cnpj(&company.cnpj))),
  )?;
  tx.commit()?;
  log::info!("event=company_deleted module=companies status=ok company_id={id}");
  Ok(())
}

pub fn set_active_company(conn: &Connection, id: &str, actor: Option<&str>) -> Result<Company, AppError> {
  let company = get_company(conn, id)?;
  settings::set_active_company_id(conn, Some(id))?;
  append_audit(conn, actor, "SET_ACTIVE_COMPANY", "COMPANY", Some(id), Some(id), "{}".to_string(), None)?;
  Ok(company)
}

pub fn get_active_company(conn: &Connection) -> Result<Option<Company>, AppError> {
  match settings::active_company_id(conn)? {
    Some(id) => Ok(Some(get_company(conn, &id)?)),
    None => Ok(None),
  }
}

/// Company form prefilled from a registry lookup. Regime defaults to Simples
/// Nacional (Anexo III) when the registry reports the option, and to Lucro
/// Presumido otherwise.
pub fn company_from_lookup(result: &CnpjLookupResult) -> CompanyInput {
  let (regime, simples_anexo) = match result.opcao_simples {
    Some(true) => (TaxRegime::SimplesNacional, Some(Anexo::III)),
    _ => (TaxRegime::LucroPresumido, None),
  };
  CompanyInput {
    cnpj: result.cnpj.clone(),
    razao_social: result.razao_social.clone(),
    nome_fantasia: result.nome_fantasia.clone().filter(|name| !name.trim().is_empty()),
    regime,
    simples_anexo,
    activity_start: None,
    address: result.address.clone(),
    inscricao_estadual: None,
    inscricao_municipal: None,
    cnae: result.cnae.clone(),
    rat_rate: None,
    accountant: Accountant::default(),
    email: result.email.clone(),
    telefone: result.telefone.clone(),
  }
}
