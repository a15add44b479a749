use std::fs::File;
use std::io::Write;
use std::path::Path;

use rusqlite::Connection;

use crate::domain::Competence;
use crate::error::AppError;
use crate::launches;

/// Flat listing of the active launches of a competence, one row per document.
pub fn export_launches_csv(conn: &Connection, company_id: &str, competence: Competence, path: &Path) -> Result<usize, AppError> {
  let items = launches::launches_for_competence(conn, company_id, competence, None)?;
  let mut file = File::create(path)?;
  writeln!(
    file,
    "id,issue_date,kind,direction,number,series,access_key,emitente_document,emitente_name,destinatario_document,destinatario_name,service_code,total,icms,ipi,pis,cofins,iss,ret_ir,ret_inss,ret_csll,ret_pis,ret_cofins"
  )?;

  for launch in &items {
    let taxes = &launch.taxes;
    let destinatario = launch.destinatario.as_ref();
    writeln!(
      file,
      "{},{},{},{},{},{},{},{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
      escape_csv(&launch.id),
      escape_csv(&launch.issue_date),
      launch.kind,
      launch.direction,
      escape_csv(&launch.number),
      escape_csv(launch.series.as_deref().unwrap_or("")),
      escape_csv(launch.access_key.as_deref().unwrap_or("")),
      escape_csv(&launch.emitente.document),
      escape_csv(&launch.emitente.name),
      escape_csv(destinatario.map(|party| party.document.as_str()).unwrap_or("")),
      escape_csv(destinatario.map(|party| party.name.as_str()).unwrap_or("")),
      escape_csv(launch.service_code.as_deref().unwrap_or("")),
      launch.total,
      taxes.icms,
      taxes.ipi,
      taxes.pis,
      taxes.cofins,
      taxes.iss,
      taxes.ret_ir,
      taxes.ret_inss,
      taxes.ret_csll,
      taxes.ret_pis,
      taxes.ret_cofins
    )?;
  }

  log::info!(
    "event=csv_export module=export status=ok company_id={company_id} competence={competence} rows={}",
    items.len()
  );
  Ok(items.len())
}

fn escape_csv(value: &str) -> String {
  if value.contains(',') || value.contains('"') || value.contains('\n') {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxRegime;
  use crate::test_support::{add_sale, setup};

  #[test]
  fn quotes_fields_with_separators() {
    assert_eq!(escape_csv("Oficina, Boa"), "\"Oficina, Boa\"");
    assert_eq!(escape_csv("say \"oi\""), "\"say \"\"oi\"\"\"");
    assert_eq!(escape_csv("simples"), "simples");
  }

  #[test]
  fn writes_one_row_per_launch() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_sale(&conn, &company.id, "1", "2025-03-02", 1000.0);
    add_sale(&conn, &company.id, "2", "2025-03-20", 250.5);
    add_sale(&conn, &company.id, "3", "2025-04-01", 99.0);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notas.csv");

    let rows = export_launches_csv(&conn, &company.id, Competence::new(2025, 3).unwrap(), &path).unwrap();
    assert_eq!(rows, 2);
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[2].contains(",250.50,"));
    assert!(lines[1].contains("Cliente Grande SA"));
  }
}
