use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use rust_xlsxwriter::{Color, ExcelDateTime, Format, FormatAlign, Url, Workbook, Worksheet};

use crate::companies;
use crate::domain::{validation, Competence};
use crate::error::AppError;
use crate::launches;
use crate::models::{Direction, Launch};
use crate::payroll;

const EXPORT_DOCUMENTS_DIR: &str = "Documentos";

/// Copies the stored XML of exported launches next to the workbook so the
/// links keep working on another machine.
struct DocumentExport {
  documents_dir: PathBuf,
  copied: HashMap<String, String>,
}

impl DocumentExport {
  fn new(documents_dir: PathBuf) -> Result<Self, AppError> {
    fs::create_dir_all(&documents_dir)?;
    Ok(Self {
      documents_dir,
      copied: HashMap::new(),
    })
  }

  fn link_for(&mut self, document_path: &str, competence: Competence) -> Result<Option<(String, String)>, AppError> {
    let trimmed = document_path.trim();
    if trimmed.is_empty() {
      return Ok(None);
    }
    if let Some(existing) = self.copied.get(trimmed) {
      let display = Path::new(existing)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(existing)
        .to_string();
      return Ok(Some((format!("file:///{existing}"), display)));
    }

    let source = Path::new(trimmed);
    if !source.exists() {
      return Ok(None);
    }

    let file_name = source.file_name().and_then(|name| name.to_str()).unwrap_or("documento.xml");
    let month_dir = self
      .documents_dir
      .join(format!("{}", competence.year))
      .join(format!("{:02}", competence.month));
    fs::create_dir_all(&month_dir)?;
    let candidate = unique_path(&month_dir, file_name);
    fs::copy(source, &candidate)?;
    let relative = format!(
      "{}/{}/{:02}/{}",
      EXPORT_DOCUMENTS_DIR,
      competence.year,
      competence.month,
      candidate.file_name().and_then(|name| name.to_str()).unwrap_or(file_name)
    );
    let link = format!("file:///{relative}");
    self.copied.insert(trimmed.to_string(), relative);
    Ok(Some((link, file_name.to_string())))
  }
}

fn unique_path(base_dir: &Path, file_name: &str) -> PathBuf {
  let mut candidate = base_dir.join(file_name);
  if !candidate.exists() {
    return candidate;
  }
  let stem = Path::new(file_name)
    .file_stem()
    .and_then(|value| value.to_str())
    .unwrap_or("documento");
  let ext = Path::new(file_name).extension().and_then(|value| value.to_str()).unwrap_or("");
  let mut counter = 1;
  loop {
    let next_name = if ext.is_empty() {
      format!("{stem}_{counter}")
    } else {
      format!("{stem}_{counter}.{ext}")
    };
    candidate = base_dir.join(next_name);
    if !candidate.exists() {
      return candidate;
    }
    counter += 1;
  }
}

fn money() -> Format {
  Format::new().set_num_format("[$R$] #,##0.00")
}

fn header_format() -> Format {
  Format::new()
    .set_bold()
    .set_background_color(Color::RGB(0xE2E8F0))
    .set_align(FormatAlign::Center)
}

fn title_format() -> Format {
  Format::new().set_bold().set_font_size(14.0)
}

fn write_headers(sheet: &mut Worksheet, row: u32, headers: &[&str]) -> Result<(), AppError> {
  let header = header_format();
  for (idx, label) in headers.iter().enumerate() {
    sheet.write_string_with_format(row, idx as u16, *label, &header)?;
  }
  Ok(())
}

/// Payroll ledger (folha de pagamento) of a competence, with the pro-labore
/// withdrawals of the same month below it.
pub fn export_payroll_ledger(conn: &Connection, company_id: &str, competence: Competence, path: &Path) -> Result<(), AppError> {
  let company = companies::get_company(conn, company_id)?;
  let payrolls = payroll::list_payrolls(conn, company_id, competence)?;
  let rcis = payroll::list_rcis(conn, company_id, competence)?;
  if payrolls.is_empty() && rcis.is_empty() {
    return Err(AppError::new("NOTHING_TO_EXPORT", format!("Nenhuma folha calculada para {competence}")));
  }

  let mut workbook = Workbook::new();
  let sheet = workbook.add_worksheet();
  sheet
    .set_name(format!("FOLHA {:02}-{}", competence.month, competence.year))
    .map_err(|err| AppError::new("EXPORT", err.to_string()))?;

  let title = title_format();
  let bold = Format::new().set_bold();
  let money = money();
  let bold_money = money.clone().set_bold();

  sheet.write_string_with_format(
    0,
    0,
    &format!(
      "Folha de pagamento {:02}/{} - {} ({})",
      competence.month,
      competence.year,
      company.razao_social,
      validation::format_cnpj(&company.cnpj)
    ),
    &title,
  )?;

  let headers = [
    "Funcionario",
    "Salario base",
    "Horas extras",
    "Outros proventos",
    "Bruto",
    "INSS",
    "IRRF",
    "Outros descontos",
    "Liquido",
    "FGTS",
    "CPP",
    "RAT",
    "Terceiros",
  ];
  write_headers(sheet, 2, &headers)?;

  let mut row = 3;
  let mut totals = [0.0_f64; 12];
  for item in &payrolls {
    let values = [
      item.base_salary,
      item.overtime,
      item.other_earnings,
      item.gross,
      item.inss,
      item.irrf,
      item.other_discounts,
      item.net,
      item.fgts,
      item.employer_cpp,
      item.employer_rat,
      item.employer_terceiros,
    ];
    sheet.write_string(row, 0, &item.employee_name)?;
    for (idx, value) in values.iter().enumerate() {
      sheet.write_number_with_format(row, idx as u16 + 1, *value, &money)?;
      totals[idx] += value;
    }
    row += 1;
  }
  sheet.write_string_with_format(row, 0, "Total", &bold)?;
  for (idx, value) in totals.iter().enumerate() {
    sheet.write_number_with_format(row, idx as u16 + 1, *value, &bold_money)?;
  }

  if !rcis.is_empty() {
    row += 2;
    sheet.write_string_with_format(row, 0, "Pro-labore", &title)?;
    write_headers(sheet, row + 1, &["Socio", "Valor", "INSS", "IRRF", "Liquido", "CPP"])?;
    row += 2;
    for rci in &rcis {
      sheet.write_string(row, 0, &rci.partner_name)?;
      for (idx, value) in [rci.amount, rci.inss, rci.irrf, rci.net, rci.employer_cpp].iter().enumerate() {
        sheet.write_number_with_format(row, idx as u16 + 1, *value, &money)?;
      }
      row += 1;
    }
  }

  sheet.set_column_width(0, 32)?;
  for col in 1..=12 {
    sheet.set_column_width(col, 15)?;
  }
  sheet.set_freeze_panes(3, 1)?;

  workbook
    .save(path)
    .map_err(|err| AppError::new("EXPORT", err.to_string()))?;
  log::info!(
    "event=excel_export module=export kind=payroll status=ok company_id={company_id} competence={competence} rows={}",
    payrolls.len()
  );
  Ok(())
}

/// Launch listing of a competence: outgoing documents, then incoming ones.
/// With `documents_dir`, stored XML files are copied there and linked.
pub fn export_launches(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  path: &Path,
  documents_dir: Option<&Path>,
) -> Result<(), AppError> {
  companies::get_company(conn, company_id)?;
  let mut document_export = match documents_dir {
    Some(dir) => Some(DocumentExport::new(dir.to_path_buf())?),
    None => None,
  };

  let mut workbook = Workbook::new();
  let mut sheet = workbook.add_worksheet();
  sheet
    .set_name(format!("NOTAS {:02}-{}", competence.month, competence.year))
    .map_err(|err| AppError::new("EXPORT", err.to_string()))?;

  let title = title_format();
  sheet.write_string_with_format(0, 0, &format!("Saidas {:02}/{}", competence.month, competence.year), &title)?;

  let outgoing = launches::launches_for_competence(conn, company_id, competence, Some(Direction::Saida))?;
  let row = write_launch_block(&mut sheet, 1, &outgoing, competence, document_export.as_mut())?;

  let incoming_start = row + 1;
  sheet.write_string_with_format(incoming_start, 0, "Entradas", &title)?;
  let incoming = launches::launches_for_competence(conn, company_id, competence, Some(Direction::Entrada))?;
  write_launch_block(&mut sheet, incoming_start + 1, &incoming, competence, document_export.as_mut())?;

  let widths = [12, 8, 10, 6, 34, 20, 14, 12, 12, 12, 12, 14, 34];
  for (col, width) in widths.iter().enumerate() {
    sheet.set_column_width(col as u16, *width)?;
  }

  workbook
    .save(path)
    .map_err(|err| AppError::new("EXPORT", err.to_string()))?;
  log::info!(
    "event=excel_export module=export kind=launches status=ok company_id={company_id} competence={competence} rows={}",
    outgoing.len() + incoming.len()
  );
  Ok(())
}

fn write_launch_block(
  sheet: &mut Worksheet,
  header_row: u32,
  items: &[Launch],
  competence: Competence,
  mut document_export: Option<&mut DocumentExport>,
) -> Result<u32, AppError> {
  let headers = [
    "Data",
    "Tipo",
    "Numero",
    "Serie",
    "Participante",
    "CPF/CNPJ",
    "Total",
    "ICMS",
    "ISS",
    "PIS",
    "COFINS",
    "Retencoes",
    "Documento",
  ];
  write_headers(sheet, header_row, &headers)?;

  let money = money();
  let date_format = Format::new().set_num_format("dd/mm/yyyy");
  let mut row = header_row + 1;
  for launch in items {
    let participant = match launch.direction {
      Direction::Saida => launch.destinatario.clone(),
      Direction::Entrada => Some(launch.emitente.clone()),
    };
    let retained = launch.taxes.ret_ir
      + launch.taxes.ret_inss
      + launch.taxes.ret_csll
      + launch.taxes.ret_pis
      + launch.taxes.ret_cofins;

    write_date(sheet, row, 0, &launch.issue_date, &date_format)?;
    sheet.write_string(row, 1, launch.kind.as_str())?;
    sheet.write_string(row, 2, &launch.number)?;
    sheet.write_string(row, 3, launch.series.as_deref().unwrap_or(""))?;
    sheet.write_string(row, 4, participant.as_ref().map(|p| p.name.as_str()).unwrap_or(""))?;
    sheet.write_string(row, 5, participant.as_ref().map(|p| p.document.as_str()).unwrap_or(""))?;
    for (idx, value) in [
      launch.total,
      launch.taxes.icms,
      launch.taxes.iss,
      launch.taxes.pis,
      launch.taxes.cofins,
      retained,
    ]
    .iter()
    .enumerate()
    {
      sheet.write_number_with_format(row, idx as u16 + 6, *value, &money)?;
    }

    let mut document_written = false;
    if let Some(path) = launch.document_path.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
      if let Some(exporter) = document_export.as_deref_mut() {
        if let Some((link, text)) = exporter.link_for(path, competence)? {
          sheet.write_url_with_text(row, 12, Url::new(link), text)?;
          document_written = true;
        }
      } else {
        sheet.write_string(row, 12, path)?;
        document_written = true;
      }
    }
    if !document_written {
      sheet.write_string(row, 12, "sem arquivo")?;
    }
    row += 1;
  }

  if row > header_row + 1 {
    sheet.autofilter(header_row, 0, row - 1, 12)?;
  }
  Ok(row)
}

fn write_date(sheet: &mut Worksheet, row: u32, col: u16, date: &str, format: &Format) -> Result<(), AppError> {
  let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|_| AppError::new("INVALID_DATE", "Data invalida"))?;
  let year = u16::try_from(parsed.year()).map_err(|_| AppError::new("INVALID_DATE", "Data invalida"))?;
  let date = ExcelDateTime::from_ymd(year, parsed.month() as u8, parsed.day() as u8)
    .map_err(|err| AppError::new("EXPORT", err.to_string()))?;
  sheet.write_datetime_with_format(row, col, &date, format)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxRegime;
  use crate::test_support::{add_employee, add_sale, setup};

  #[test]
  fn writes_payroll_ledger_file() {
    let (mut conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_employee(&conn, &company.id, "Joana", "52998224725", 3000.0, "2024-01-10");
    let march = Competence::new(2025, 3).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folha.xlsx");

    let err = export_payroll_ledger(&conn, &company.id, march, &path).unwrap_err();
    assert_eq!(err.code, "NOTHING_TO_EXPORT");

    payroll::run_payroll(&mut conn, &company.id, march, &[], None).unwrap();
    export_payroll_ledger(&conn, &company.id, march, &path).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);
  }

  #[test]
  fn copies_linked_documents() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let dir = tempfile::tempdir().unwrap();
    let stored = dir.path().join("nota.xml");
    fs::write(&stored, "<nota/>").unwrap();
    let input = crate::test_support::sale_input("7", "2025-03-10", 500.0);
    launches::create_launch(&conn, &company.id, &input, Some(stored.to_str().unwrap()), None).unwrap();
    add_sale(&conn, &company.id, "8", "2025-03-11", 100.0);

    let out_dir = dir.path().join("export");
    let documents = out_dir.join(EXPORT_DOCUMENTS_DIR);
    export_launches(
      &conn,
      &company.id,
      Competence::new(2025, 3).unwrap(),
      &out_dir.join("notas.xlsx"),
      Some(&documents),
    )
    .unwrap();
    assert!(documents.join("2025").join("03").join("nota.xml").exists());
  }

  #[test]
  fn document_links_are_file_urls() {
    let dir = tempfile::tempdir().unwrap();
    let stored = dir.path().join("nota.xml");
    fs::write(&stored, "<nota/>").unwrap();
    let march = Competence::new(2025, 3).unwrap();
    let mut exporter = DocumentExport::new(dir.path().join(EXPORT_DOCUMENTS_DIR)).unwrap();

    let (link, text) = exporter.link_for(stored.to_str().unwrap(), march).unwrap().unwrap();
    assert_eq!(link, "file:///Documentos/2025/03/nota.xml");
    assert_eq!(text, "nota.xml");
    let (cached, _) = exporter.link_for(stored.to_str().unwrap(), march).unwrap().unwrap();
    assert_eq!(cached, link);
    assert!(exporter.link_for("  ", march).unwrap().is_none());
  }
}
