//! Chart of accounts (plano de contas).

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::new_id;
use crate::domain::validation;
use crate::error::AppError;
use crate::models::{AccountKind, AccountNature, ContaContabil, ContaContabilInput};

use AccountKind::{Analitica as A, Sintetica as S};
use AccountNature::{Credora as C, Devedora as D};

const MAX_LEVELS: usize = 5;

const DEFAULT_CHART: &[(&str, &str, AccountKind, AccountNature)] = &[
  ("1", "Ativo", S, D),
  ("1.1", "Ativo Circulante", S, D),
  ("1.1.01", "Disponivel", S, D),
  ("1.1.01.001", "Caixa", A, D),
  ("1.1.01.002", "Bancos Conta Movimento", A, D),
  ("1.1.02", "Creditos", S, D),
  ("1.1.02.001", "Clientes", A, D),
  ("1.1.02.002", "Impostos a Recuperar", A, D),
  ("1.2", "Ativo Nao Circulante", S, D),
  ("1.2.01", "Imobilizado", S, D),
  ("1.2.01.001", "Maquinas e Equipamentos", A, D),
  ("1.2.01.002", "Moveis e Utensilios", A, D),
  ("2", "Passivo", S, C),
  ("2.1", "Passivo Circulante", S, C),
  ("2.1.01", "Fornecedores", S, C),
  ("2.1.01.001", "Fornecedores Nacionais", A, C),
  ("2.1.02", "Obrigacoes Trabalhistas", S, C),
  ("2.1.02.001", "Salarios a Pagar", A, C),
  ("2.1.02.002", "Pro-labore a Pagar", A, C),
  ("2.1.02.003", "INSS a Recolher", A, C),
  ("2.1.02.004", "FGTS a Recolher", A, C),
  ("2.1.03", "Obrigacoes Tributarias", S, C),
  ("2.1.03.001", "Simples Nacional a Recolher", A, C),
  ("2.1.03.002", "IRRF a Recolher", A, C),
  ("2.1.03.003", "PIS e COFINS a Recolher", A, C),
  ("2.3", "Patrimonio Liquido", S, C),
  ("2.3.01", "Capital Social", S, C),
  ("2.3.01.001", "Capital Subscrito", A, C),
  ("2.3.02", "Lucros ou Prejuizos Acumulados", S, C),
  ("2.3.02.001", "Lucros Acumulados", A, C),
  ("3", "Receitas", S, C),
  ("3.1", "Receita Operacional", S, C),
  ("3.1.01", "Receita Bruta", S, C),
  ("3.1.01.001", "Venda de Mercadorias", A, C),
  ("3.1.01.002", "Prestacao de Servicos", A, C),
  ("4", "Custos e Despesas", S, D),
  ("4.1", "Despesas Operacionais", S, D),
  ("4.1.01", "Despesas com Pessoal", S, D),
  ("4.1.01.001", "Salarios", A, D),
  ("4.1.01.002", "Pro-labore", A, D),
  ("4.1.01.003", "Encargos Sociais", A, D),
  ("4.1.02", "Despesas Tributarias", S, D),
  ("4.1.02.001", "Simples Nacional", A, D),
  ("4.1.02.002", "PIS e COFINS", A, D),
];

fn map_account(row: &Row<'_>) -> rusqlite::Result<ContaContabil> {
  let kind: String = row.get(4)?;
  let nature: String = row.get(5)?;
  let is_active: i64 = row.get(7)?;
  Ok(ContaContabil {
    id: row.get(0)?,
    company_id: row.get(1)?,
    code: row.get(2)?,
    name: row.get(3)?,
    kind: AccountKind::parse(&kind).unwrap_or(AccountKind::Analitica),
    nature: AccountNature::parse(&nature).unwrap_or(AccountNature::Devedora),
    parent_code: row.get(6)?,
    is_active: is_active != 0,
  })
}

const ACCOUNT_COLUMNS: &str = "id, company_id, code, name, kind, nature, parent_code, is_active";

/// `1.1.01.001` style: dot-separated numeric segments.
fn normalize_code(code: &str) -> Result<String, AppError> {
  let code = code.trim();
  let segments: Vec<&str> = code.split('.').collect();
  let valid = !code.is_empty()
    && segments.len() <= MAX_LEVELS
    && segments
      .iter()
      .all(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()));
  if !valid {
    return Err(AppError::new("INVALID_ACCOUNT_CODE", format!("Codigo de conta invalido: {code}")));
  }
  Ok(code.to_string())
}

fn parent_of(code: &str) -> Option<&str> {
  code.rsplit_once('.').map(|(parent, _)| parent)
}

fn find_by_code(conn: &Connection, company_id: &str, code: &str) -> Result<Option<ContaContabil>, AppError> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM contas_contabeis WHERE company_id = ?1 AND code = ?2"),
        params![company_id, code],
        map_account,
      )
      .optional()?,
  )
}

fn has_children(conn: &Connection, company_id: &str, code: &str) -> Result<bool, AppError> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM contas_contabeis WHERE company_id = ?1 AND parent_code = ?2",
    params![company_id, code],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

pub fn create_account(
  conn: &Connection,
  company_id: &str,
  input: &ContaContabilInput,
  actor: Option<&str>,
) -> Result<ContaContabil, AppError> {
  companies::get_company(conn, company_id)?;
  let code = normalize_code(&input.code)?;
  let name = validation::ensure_not_blank(&input.name, "Nome da conta")?;
  if find_by_code(conn, company_id, &code)?.is_some() {
    return Err(AppError::new("DUPLICATE_ACCOUNT", format!("Conta {code} ja cadastrada")));
  }

  let parent_code = parent_of(&code).map(str::to_string);
  if let Some(parent) = parent_code.as_deref() {
    let parent_account = find_by_code(conn, company_id, parent)?
      .ok_or_else(|| AppError::new("PARENT_NOT_FOUND", format!("Conta superior {parent} nao cadastrada")))?;
    if parent_account.kind == AccountKind::Analitica {
      return Err(AppError::new(
        "PARENT_NOT_SYNTHETIC",
        format!("Conta superior {parent} e analitica"),
      ));
    }
  }

  let id = new_id();
  conn.execute(
    "INSERT INTO contas_contabeis (id, company_id, code, name, kind, nature, parent_code, is_active)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
    params![
      id,
      company_id,
      code,
      name,
      input.kind.as_str(),
      input.nature.as_str(),
      parent_code
    ],
  )?;
  append_audit(conn, actor, "CREATE_ACCOUNT", "ACCOUNT", Some(&id), Some(company_id), payload(input), None)?;
  get_account(conn, &id)
}

/// Renames or reclassifies an account. The code is fixed once created.
pub fn update_account(
  conn: &Connection,
  id: &str,
  input: &ContaContabilInput,
  actor: Option<&str>,
) -> Result<ContaContabil, AppError> {
  let current = get_account(conn, id)?;
  if normalize_code(&input.code)? != current.code {
    return Err(AppError::new("ACCOUNT_CODE_LOCKED", "O codigo da conta nao pode ser alterado"));
  }
  let name = validation::ensure_not_blank(&input.name, "Nome da conta")?;
  if input.kind == AccountKind::Analitica && has_children(conn, &current.company_id, &current.code)? {
    return Err(AppError::new(
      "ACCOUNT_HAS_CHILDREN",
      "Conta com subcontas deve permanecer sintetica",
    ));
  }

  conn.execute(
    "UPDATE contas_contabeis SET name = ?1, kind = ?2, nature = ?3 WHERE id = ?4",
    params![name, input.kind.as_str(), input.nature.as_str(), id],
  )?;
  append_audit(
    conn,
    actor,
    "UPDATE_ACCOUNT",
    "ACCOUNT",
    Some(id),
    Some(&current.company_id),
    payload(input),
    None,
  )?;
  get_account(conn, id)
}

pub fn set_account_active(conn: &Connection, id: &str, active: bool, actor: Option<&str>) -> Result<ContaContabil, AppError> {
  let current = get_account(conn, id)?;
  conn.execute(
    "UPDATE contas_contabeis SET is_active = ?1 WHERE id = ?2",
    params![active as i64, id],
  )?;
  append_audit(
    conn,
    actor,
    if active { "ACTIVATE_ACCOUNT" } else { "DEACTIVATE_ACCOUNT" },
    "ACCOUNT",
    Some(id),
    Some(&current.company_id),
    "{}".to_string(),
    None,
  )?;
  get_account(conn, id)
}

pub fn delete_account(conn: &Connection, id: &str, actor: Option<&str>) -> Result<(), AppError> {
  let current = get_account(conn, id)?;
  if has_children(conn, &current.company_id, &current.code)? {
    return Err(AppError::new(
      "ACCOUNT_HAS_CHILDREN",
      format!("Conta {} possui subcontas", current.code),
    ));
  }
  conn.execute("DELETE FROM contas_contabeis WHERE id = ?1", params![id])?;
  append_audit(
    conn,
    actor,
    "DELETE_ACCOUNT",
    "ACCOUNT",
    Some(id),
    Some(&current.company_id),
    payload(&current),
    None,
  )?;
  Ok(())
}

pub fn get_account(conn: &Connection, id: &str) -> Result<ContaContabil, AppError> {
  conn
    .query_row(
      &format!("SELECT {ACCOUNT_COLUMNS} FROM contas_contabeis WHERE id = ?1"),
      params![id],
      map_account,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Conta contabil nao encontrada"))
}

pub fn list_accounts(conn: &Connection, company_id: &str) -> Result<Vec<ContaContabil>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ACCOUNT_COLUMNS} FROM contas_contabeis WHERE company_id = ?1 ORDER BY code"
  ))?;
  let rows = stmt.query_map(params![company_id], map_account)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Inserts the standard chart, skipping codes the company already has.
/// Returns how many accounts were created.
pub fn seed_default_chart(conn: &mut Connection, company_id: &str, actor: Option<&str>) -> Result<usize, AppError> {
  companies::get_company(conn, company_id)?;
  let tx = conn.transaction()?;
  let mut created = 0;
  for (code, name, kind, nature) in DEFAULT_CHART {
    let inserted = tx.execute(
      "INSERT OR IGNORE INTO contas_contabeis (id, company_id, code, name, kind, nature, parent_code, is_active)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
      params![
        new_id(),
        company_id,
        code,
        name,
        kind.as_str(),
        nature.as_str(),
        parent_of(code)
      ],
    )?;
    created += inserted;
  }
  append_audit(
    &tx,
    actor,
    "SEED_CHART",
    "ACCOUNT",
    None,
    Some(company_id),
    "{}".to_string(),
    Some(format!("criadas={created}")),
  )?;
  tx.commit()?;
  log::info!("event=chart_seeded module=accounts status=ok company_id={company_id} created={created}");
  Ok(created)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxRegime;
  use crate::test_support::setup;

  fn input(code: &str, kind: AccountKind) -> ContaContabilInput {
    ContaContabilInput {
      code: code.to_string(),
      name: format!("Conta {code}"),
      kind,
      nature: AccountNature::Devedora,
    }
  }

  #[test]
  fn default_chart_is_consistent() {
    for (code, _, _, _) in DEFAULT_CHART {
      if let Some(parent) = parent_of(code) {
        let parent_row = DEFAULT_CHART.iter().find(|(c, _, _, _)| *c == parent).unwrap();
        assert_eq!(parent_row.2, AccountKind::Sintetica, "parent of {code}");
      }
    }
  }

  #[test]
  fn seeding_twice_creates_nothing_new() {
    let (mut conn, company) = setup(TaxRegime::LucroPresumido, None);
    let created = seed_default_chart(&mut conn, &company.id, None).unwrap();
    assert_eq!(created, DEFAULT_CHART.len());
    assert_eq!(seed_default_chart(&mut conn, &company.id, None).unwrap(), 0);
    let caixa = list_accounts(&conn, &company.id)
      .unwrap()
      .into_iter()
      .find(|account| account.code == "1.1.01.001")
      .unwrap();
    assert_eq!(caixa.parent_code.as_deref(), Some("1.1.01"));
  }

  #[test]
  fn nested_code_requires_synthetic_parent() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let err = create_account(&conn, &company.id, &input("1.1", AccountKind::Sintetica), None).unwrap_err();
    assert_eq!(err.code, "PARENT_NOT_FOUND");

    create_account(&conn, &company.id, &input("1", AccountKind::Analitica), None).unwrap();
    let err = create_account(&conn, &company.id, &input("1.1", AccountKind::Sintetica), None).unwrap_err();
    assert_eq!(err.code, "PARENT_NOT_SYNTHETIC");
  }

  #[test]
  fn account_with_children_cannot_be_deleted() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let root = create_account(&conn, &company.id, &input("1", AccountKind::Sintetica), None).unwrap();
    let child = create_account(&conn, &company.id, &input("1.1", AccountKind::Analitica), None).unwrap();
    assert_eq!(delete_account(&conn, &root.id, None).unwrap_err().code, "ACCOUNT_HAS_CHILDREN");
    delete_account(&conn, &child.id, None).unwrap();
    delete_account(&conn, &root.id, None).unwrap();
    assert!(list_accounts(&conn, &company.id).unwrap().is_empty());
  }

  #[test]
  fn rejects_malformed_codes() {
    assert!(normalize_code("1..2").is_err());
    assert!(normalize_code("1.a").is_err());
    assert!(normalize_code("1.1.1.1.1.1").is_err());
    assert_eq!(normalize_code(" 2.1.01 ").unwrap(), "2.1.01");
  }
}
