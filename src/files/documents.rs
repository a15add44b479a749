use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Serialize;

use crate::domain::Competence;
use crate::error::AppError;

const DOCUMENT_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct DocumentContent {
  pub data_base64: String,
  pub content_type: String,
}

pub fn ensure_documents_base(app_dir: &Path) -> Result<PathBuf, AppError> {
  let documents_dir = app_dir.join("Documentos");
  fs::create_dir_all(&documents_dir)?;
  Ok(documents_dir)
}

/// Stores a document under `<base>/<cnpj>/<year>/<month>/`, never overwriting
/// an existing file.
pub fn store_document(
  documents_base: &Path,
  company_cnpj: &str,
  competence: Competence,
  file_name: &str,
  contents: &[u8],
) -> Result<String, AppError> {
  let month_dir = documents_base
    .join(company_cnpj)
    .join(format!("{}", competence.year))
    .join(format!("{:02}", competence.month));
  fs::create_dir_all(&month_dir)?;

  let original = Path::new(file_name);
  let ext = original.extension().and_then(|v| v.to_str()).unwrap_or("xml");
  let stem = original
    .file_stem()
    .and_then(|v| v.to_str())
    .map(sanitize)
    .filter(|stem| !stem.is_empty())
    .unwrap_or_else(|| "documento".to_string());

  let mut candidate = month_dir.join(format!("{stem}.{ext}"));
  let mut counter = 1;
  while candidate.exists() {
    candidate = month_dir.join(format!("{stem}_{counter}.{ext}"));
    counter += 1;
  }

  fs::write(&candidate, contents)?;
  Ok(candidate.to_string_lossy().to_string())
}

fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
    .collect()
}

pub fn open_document(path: &str) -> Result<(), AppError> {
  if path.trim().is_empty() {
    return Err(AppError::new("DOCUMENT_PATH_EMPTY", "Caminho do documento nao informado"));
  }
  if !Path::new(path).exists() {
    return Err(AppError::new("DOCUMENT_NOT_FOUND", "Documento nao encontrado"));
  }
  open::that(path).map_err(|err| AppError::new("DOCUMENT_OPEN", err.to_string()))?;
  Ok(())
}

/// Reads a stored document for preview in the interface.
pub fn read_document(path: &str) -> Result<DocumentContent, AppError> {
  let file_path = PathBuf::from(path);
  if !file_path.exists() {
    return Err(AppError::new("DOCUMENT_NOT_FOUND", "Documento nao encontrado"));
  }
  let ext = file_path
    .extension()
    .and_then(|ext| ext.to_str())
    .unwrap_or("")
    .to_lowercase();
  let content_type = match ext.as_str() {
    "xml" => "application/xml",
    "pdf" => "application/pdf",
    "txt" => "text/plain",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    _ => return Err(AppError::new("DOCUMENT_TYPE", "Formato de arquivo nao suportado")),
  };
  let metadata = fs::metadata(&file_path)?;
  if metadata.len() > DOCUMENT_MAX_BYTES {
    return Err(AppError::new("DOCUMENT_SIZE", "Arquivo muito grande para visualizacao"));
  }
  let bytes = fs::read(&file_path)?;
  Ok(DocumentContent {
    data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    content_type: content_type.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stores_without_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    let competence = Competence::new(2025, 4).unwrap();
    let first = store_document(dir.path(), "11222333000181", competence, "nota fiscal.xml", b"<a/>").unwrap();
    let second = store_document(dir.path(), "11222333000181", competence, "nota fiscal.xml", b"<b/>").unwrap();
    assert!(first.ends_with("nota_fiscal.xml"));
    assert!(second.ends_with("nota_fiscal_1.xml"));
    assert!(first.contains("2025"));

    let content = read_document(&second).unwrap();
    assert_eq!(content.content_type, "application/xml");
    assert_eq!(content.data_base64, "PGIvPg==");
  }
}
