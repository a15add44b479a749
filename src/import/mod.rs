//! Import of NF-e and NFS-e XML files into launches.

pub mod nfe;
pub mod nfse;

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use walkdir::WalkDir;

use crate::companies;
use crate::domain::{round2, validation, Competence};
use crate::error::AppError;
use crate::files::documents;
use crate::launches;
use crate::models::{
  Company, Direction, ImportFileResult, ImportOutcome, ImportSummary, LaunchInput, LaunchItem, LaunchKind, Party,
  TaxAmounts,
};

pub use nfe::parse_nfe;
pub use nfse::parse_nfse;

const XML_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ImportError {
  #[error("XML invalido: {0}")]
  Malformed(#[from] quick_xml::DeError),
  #[error("arquivo nao e uma NF-e nem uma NFS-e")]
  Unsupported,
  #[error("campo obrigatorio ausente: {0}")]
  Missing(&'static str),
  #[error("valor invalido em {field}: {value}")]
  InvalidValue { field: &'static str, value: String },
}

impl From<ImportError> for AppError {
  fn from(err: ImportError) -> Self {
    match err {
      ImportError::Unsupported => AppError::new("XML_UNSUPPORTED", err.to_string()),
      _ => AppError::new("XML_INVALID", err.to_string()),
    }
  }
}

/// Fields shared by NF-e and NFS-e once read from XML.
#[derive(Debug, Clone)]
pub struct FiscalDocument {
  pub kind: LaunchKind,
  pub number: String,
  pub series: Option<String>,
  pub access_key: Option<String>,
  pub issue_date: String,
  pub emitente: Party,
  pub destinatario: Option<Party>,
  pub service_code: Option<String>,
  pub total: f64,
  pub taxes: TaxAmounts,
  pub items: Vec<LaunchItem>,
}

pub(crate) fn decimal(field: &'static str, value: Option<&str>) -> Result<f64, ImportError> {
  match value.map(str::trim).filter(|value| !value.is_empty()) {
    Some(text) => text
      .parse::<f64>()
      .ok()
      .filter(|number| number.is_finite())
      .ok_or_else(|| ImportError::InvalidValue {
        field,
        value: text.to_string(),
      }),
    None => Ok(0.0),
  }
}

/// `2025-03-10T09:15:00-03:00` or `2025-03-10` to `2025-03-10`.
pub(crate) fn issue_date(value: Option<&str>) -> Result<String, ImportError> {
  let text = value.map(str::trim).ok_or(ImportError::Missing("data de emissao"))?;
  let date = text.get(..10).unwrap_or(text);
  validation::parse_date(date).map_err(|_| ImportError::InvalidValue {
    field: "data de emissao",
    value: text.to_string(),
  })?;
  Ok(date.to_string())
}

pub(crate) fn party(
  role: &'static str,
  cnpj: Option<String>,
  cpf: Option<String>,
  name: Option<String>,
) -> Result<Option<Party>, ImportError> {
  let document = match cnpj.or(cpf).map(|doc| validation::only_digits(&doc)) {
    Some(doc) if !doc.is_empty() => doc,
    _ => return Ok(None),
  };
  if !validation::is_valid_document(&document) {
    return Err(ImportError::InvalidValue {
      field: role,
      value: document,
    });
  }
  Ok(Some(Party {
    document,
    name: name.map(|name| name.trim().to_string()).unwrap_or_default(),
  }))
}

pub fn parse_document(xml: &str) -> Result<FiscalDocument, ImportError> {
  if xml.contains("<infNFe") {
    parse_nfe(xml)
  } else if xml.contains("<CompNfse") || xml.contains("<InfNfse") {
    parse_nfse(xml)
  } else {
    Err(ImportError::Unsupported)
  }
}

/// Launch draft for `company`, or `None` when the company is neither the
/// issuer nor the recipient of the document.
pub fn to_launch_input(doc: &FiscalDocument, company: &Company) -> Option<LaunchInput> {
  let direction = if doc.emitente.document == company.cnpj {
    Direction::Saida
  } else if doc.destinatario.as_ref().map(|party| party.document.as_str()) == Some(company.cnpj.as_str()) {
    Direction::Entrada
  } else {
    return None;
  };

  Some(LaunchInput {
    kind: doc.kind,
    direction,
    number: doc.number.clone(),
    series: doc.series.clone(),
    access_key: doc.access_key.clone(),
    issue_date: doc.issue_date.clone(),
    emitente: doc.emitente.clone(),
    destinatario: doc.destinatario.clone(),
    service_code: doc.service_code.clone(),
    total: round2(doc.total),
    taxes: doc.taxes.clone(),
    items: doc.items.clone(),
  })
}

fn existing_launch(conn: &Connection, company_id: &str, doc: &FiscalDocument) -> Result<Option<String>, AppError> {
  match doc.access_key.as_deref() {
    Some(key) => launches::find_by_access_key(conn, company_id, key),
    None => launches::find_by_number(conn, company_id, doc.kind, &doc.emitente.document, &doc.number),
  }
}

/// Imports one XML document. Parse failures, documents of other companies
/// and duplicates are reported as outcomes, not errors.
pub fn import_xml(
  conn: &Connection,
  company: &Company,
  xml: &str,
  file_name: &str,
  documents_base: &Path,
  actor: Option<&str>,
) -> Result<ImportOutcome, AppError> {
  let doc = match parse_document(xml) {
    Ok(doc) => doc,
    Err(err) => {
      log::warn!("event=xml_import module=import status=invalid file={file_name} error={err}");
      return Ok(ImportOutcome::Invalid {
        message: err.to_string(),
      });
    }
  };

  let input = match to_launch_input(&doc, company) {
    Some(input) => input,
    None => return Ok(ImportOutcome::ForeignCompany),
  };

  if existing_launch(conn, &company.id, &doc)?.is_some() {
    let access_key = doc
      .access_key
      .clone()
      .unwrap_or_else(|| format!("{}-{}", doc.emitente.document, doc.number));
    return Ok(ImportOutcome::Duplicate { access_key });
  }

  let date = validation::parse_date(&input.issue_date)?;
  let stored = documents::store_document(
    documents_base,
    &company.cnpj,
    Competence::of_date(date),
    file_name,
    xml.as_bytes(),
  )?;

  match launches::create_launch(conn, &company.id, &input, Some(&stored), actor) {
    Ok(launch) => {
      log::info!(
        "event=xml_import module=import status=ok company_id={} launch_id={}",
        company.id,
        launch.id
      );
      Ok(ImportOutcome::Imported { launch_id: launch.id })
    }
    Err(err) if err.code == "DB_ERROR" || err.code == "LOCK_ERROR" => {
      let _ = fs::remove_file(&stored);
      Err(err)
    }
    Err(err) => {
      let _ = fs::remove_file(&stored);
      Ok(ImportOutcome::Invalid { message: err.message })
    }
  }
}

pub fn import_xml_file(
  conn: &Connection,
  company_id: &str,
  path: &Path,
  documents_base: &Path,
  actor: Option<&str>,
) -> Result<ImportFileResult, AppError> {
  let company = companies::get_company(conn, company_id)?;
  import_path(conn, &company, path, documents_base, actor)
}

fn import_path(
  conn: &Connection,
  company: &Company,
  path: &Path,
  documents_base: &Path,
  actor: Option<&str>,
) -> Result<ImportFileResult, AppError> {
  let file = path.to_string_lossy().to_string();
  if !path.is_file() {
    return Err(AppError::new("FILE_NOT_FOUND", format!("Arquivo nao encontrado: {file}")));
  }
  if fs::metadata(path)?.len() > XML_MAX_BYTES {
    return Ok(ImportFileResult {
      file,
      outcome: ImportOutcome::Invalid {
        message: "Arquivo muito grande para importacao".to_string(),
      },
    });
  }

  let outcome = match fs::read_to_string(path) {
    Ok(xml) => {
      let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("documento.xml");
      import_xml(conn, company, &xml, file_name, documents_base, actor)?
    }
    Err(err) => ImportOutcome::Invalid {
      message: format!("Arquivo ilegivel: {err}"),
    },
  };
  Ok(ImportFileResult { file, outcome })
}

/// Imports every `.xml` file below `dir`, in path order.
pub fn import_xml_directory(
  conn: &Connection,
  company_id: &str,
  dir: &Path,
  documents_base: &Path,
  actor: Option<&str>,
) -> Result<ImportSummary, AppError> {
  let company = companies::get_company(conn, company_id)?;
  if !dir.is_dir() {
    return Err(AppError::new("DIR_NOT_FOUND", "Pasta de importacao nao encontrada"));
  }

  let mut paths: Vec<_> = WalkDir::new(dir)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|entry| entry.file_type().is_file())
    .map(|entry| entry.into_path())
    .filter(|path| {
      path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
    })
    .collect();
  paths.sort();

  let mut summary = ImportSummary::default();
  for path in paths {
    let result = import_path(conn, &company, &path, documents_base, actor)?;
    match &result.outcome {
      ImportOutcome::Imported { .. } => summary.imported += 1,
      ImportOutcome::Duplicate { .. } => summary.duplicates += 1,
      ImportOutcome::ForeignCompany => summary.foreign += 1,
      ImportOutcome::Invalid { .. } => summary.invalid += 1,
    }
    summary.files.push(result);
  }

  log::info!(
    "event=xml_batch_import module=import status=ok company_id={company_id} imported={} duplicates={} foreign={} invalid={}",
    summary.imported,
    summary.duplicates,
    summary.foreign,
    summary.invalid
  );
  Ok(summary)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_document_type() {
    assert!(matches!(parse_document("<html/>"), Err(ImportError::Unsupported)));
    let nfe = parse_document(&nfe::tests::sample("11222333000181", "11444777000161")).unwrap();
    assert_eq!(nfe.kind, LaunchKind::Nfe);
    let nfse = parse_document(&nfse::tests::sample("11444777000161", "11222333000181")).unwrap();
    assert_eq!(nfse.kind, LaunchKind::Nfse);
  }

  #[test]
  fn decimal_defaults_missing_to_zero() {
    assert_eq!(decimal("v", None).unwrap(), 0.0);
    assert_eq!(decimal("v", Some(" 12.50 ")).unwrap(), 12.5);
    assert!(decimal("v", Some("12,50")).is_err());
  }

  #[test]
  fn invalid_issuer_document_is_rejected() {
    let err = party("emitente", Some("11222333000100".to_string()), None, None).unwrap_err();
    assert!(matches!(err, ImportError::InvalidValue { field: "emitente", .. }));
  }
}
