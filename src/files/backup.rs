use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::error::AppError;
use crate::models::Company;

const DB_ENTRY: &str = "db.sqlite";
const DOCUMENTS_ENTRY: &str = "documentos";
const COMPANY_ENTRY: &str = "backup.json";

/// Per-company tables that can be dumped, by collection name.
pub const COLLECTIONS: &[&str] = &[
  "partners",
  "employees",
  "launches",
  "payrolls",
  "rcis",
  "vacations",
  "thirteenths",
  "terminations",
  "esocial_events",
  "reinf_files",
  "pgdas_apuracoes",
  "contas_contabeis",
  "orcamentos",
  "recibos",
];

#[derive(Debug, Serialize)]
struct CompanyDump<'a> {
  company: &'a Company,
  generated_at: String,
  collections: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CompanyBackupResult {
  pub path: String,
  pub counts: BTreeMap<String, usize>,
}

/// Dumps the named collections of one company into a zipped JSON document.
/// An empty list dumps every collection.
pub fn backup_company_data(
  conn: &Connection,
  company_id: &str,
  collections: &[String],
  backup_dir: &Path,
  actor: Option<&str>,
) -> Result<CompanyBackupResult, AppError> {
  let company = companies::get_company(conn, company_id)?;
  let names: Vec<&str> = if collections.is_empty() {
    COLLECTIONS.to_vec()
  } else {
    let mut names = Vec::with_capacity(collections.len());
    for name in collections {
      let name = name.trim();
      let known = COLLECTIONS
        .iter()
        .find(|known| **known == name)
        .ok_or_else(|| AppError::new("UNKNOWN_COLLECTION", format!("Colecao desconhecida: {name}")))?;
      if !names.contains(known) {
        names.push(*known);
      }
    }
    names
  };

  let mut dump = CompanyDump {
    company: &company,
    generated_at: Utc::now().to_rfc3339(),
    collections: BTreeMap::new(),
  };
  let mut counts = BTreeMap::new();
  for name in names {
    let rows = dump_table(conn, name, company_id)?;
    counts.insert(name.to_string(), rows.len());
    dump.collections.insert(name.to_string(), rows);
  }

  fs::create_dir_all(backup_dir)?;
  let stamp = Utc::now().format("%Y%m%d_%H%M%S");
  let path = backup_dir.join(format!("empresa_{}_{stamp}.zip", company.cnpj));
  let file = File::create(&path)?;
  let mut zip = ZipWriter::new(file);
  let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
  zip.start_file(COMPANY_ENTRY, options)?;
  zip.write_all(serde_json::to_string_pretty(&dump)?.as_bytes())?;
  zip.finish()?;

  let result = CompanyBackupResult {
    path: path.to_string_lossy().to_string(),
    counts,
  };
  append_audit(
    conn,
    actor,
    "BACKUP_COMPANY",
    "COMPANY",
    Some(company_id),
    Some(company_id),
    payload(&result),
    None,
  )?;
  log::info!(
    "event=company_backup module=files status=ok company_id={company_id} path={}",
    result.path
  );
  Ok(result)
}

fn dump_table(conn: &Connection, table: &str, company_id: &str) -> Result<Vec<Value>, AppError> {
  let mut stmt = conn.prepare(&format!("SELECT * FROM {table} WHERE company_id = ?1 ORDER BY rowid"))?;
  let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
  let mut rows = stmt.query(params![company_id])?;
  let mut items = Vec::new();
  while let Some(row) = rows.next()? {
    let mut object = Map::new();
    for (idx, column) in columns.iter().enumerate() {
      let value = match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::from(value),
        ValueRef::Real(value) => Value::from(value),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).to_string()),
        ValueRef::Blob(bytes) => Value::String(base64::Engine::encode(
          &base64::engine::general_purpose::STANDARD,
          bytes,
        )),
      };
      object.insert(column.clone(), value);
    }
    items.push(Value::Object(object));
  }
  Ok(items)
}

pub fn create_backup(
  backup_dir: &Path,
  db_path: &Path,
  documents_base: &Path,
  include_documents: bool,
  output_path: Option<String>,
) -> Result<String, AppError> {
  fs::create_dir_all(backup_dir)?;

  let filename = output_path.unwrap_or_else(|| {
    let stamp = Utc::now().format("%Y%m%d_%H%M");
    backup_dir
      .join(format!("backup_{stamp}.zip"))
      .to_string_lossy()
      .to_string()
  });

  if let Some(parent) = Path::new(&filename).parent() {
    fs::create_dir_all(parent)?;
  }

  let file = File::create(&filename)?;
  let mut zip = ZipWriter::new(file);
  let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

  zip.start_file(DB_ENTRY, options)?;
  let mut db_file = File::open(db_path)?;
  let mut buffer = Vec::new();
  db_file.read_to_end(&mut buffer)?;
  zip.write_all(&buffer)?;

  let mut documents = 0;
  if include_documents && documents_base.exists() {
    for entry in WalkDir::new(documents_base).into_iter().filter_map(Result::ok) {
      if entry.file_type().is_file() {
        let path = entry.path();
        let rel = path.strip_prefix(documents_base).unwrap_or(path);
        let archive_name = Path::new(DOCUMENTS_ENTRY).join(rel).to_string_lossy().replace('\\', "/");
        zip.start_file(archive_name, options)?;
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        zip.write_all(&data)?;
        documents += 1;
      }
    }
  }

  zip.finish()?;
  log::info!("event=backup_created module=files status=ok path={filename} documents={documents}");
  Ok(filename)
}

/// Restores a full backup. The current database is kept next to it as `.bak`.
pub fn restore_backup(archive_path: &str, db_path: &Path, documents_base: &Path) -> Result<(), AppError> {
  let file = File::open(archive_path)?;
  let mut archive = ZipArchive::new(file)?;
  if archive.index_for_name(DB_ENTRY).is_none() {
    return Err(AppError::new("INVALID_BACKUP", "Arquivo de backup sem banco de dados"));
  }

  let temp_dir = std::env::temp_dir().join(format!("contabil_fiscal_restore_{}", Utc::now().timestamp_millis()));
  fs::create_dir_all(&temp_dir)?;

  for i in 0..archive.len() {
    let mut file = archive.by_index(i)?;
    let Some(name) = file.enclosed_name() else {
      log::warn!("event=restore_skip module=files status=error entry={}", file.name());
      continue;
    };
    let outpath = temp_dir.join(name);

    if file.is_dir() {
      fs::create_dir_all(&outpath)?;
    } else {
      if let Some(parent) = outpath.parent() {
        fs::create_dir_all(parent)?;
      }
      let mut outfile = File::create(&outpath)?;
      std::io::copy(&mut file, &mut outfile)?;
    }
  }

  let restored_db = temp_dir.join(DB_ENTRY);
  if db_path.exists() {
    fs::copy(db_path, db_path.with_extension("bak"))?;
  }
  fs::copy(restored_db, db_path)?;

  let restored_documents = temp_dir.join(DOCUMENTS_ENTRY);
  if restored_documents.exists() {
    fs::create_dir_all(documents_base)?;
    for entry in WalkDir::new(&restored_documents).into_iter().filter_map(Result::ok) {
      if entry.file_type().is_file() {
        let rel = entry.path().strip_prefix(&restored_documents).unwrap_or(entry.path());
        let target = documents_base.join(rel);
        if let Some(parent) = target.parent() {
          fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), target)?;
      }
    }
  }

  if let Err(err) = fs::remove_dir_all(&temp_dir) {
    log::warn!("event=restore_cleanup module=files status=error error={err}");
  }
  log::info!("event=backup_restored module=files status=ok archive={archive_path}");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxRegime;
  use crate::test_support::{add_employee, add_sale, setup};

  fn read_dump(path: &str) -> Value {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(COMPANY_ENTRY).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    serde_json::from_str(&content).unwrap()
  }

  #[test]
  fn dumps_requested_collections_only() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_sale(&conn, &company.id, "1", "2025-03-02", 1000.0);
    add_employee(&conn, &company.id, "Joana", "52998224725", 3000.0, "2024-01-10");
    let dir = tempfile::tempdir().unwrap();

    let result = backup_company_data(
      &conn,
      &company.id,
      &["launches".to_string(), "employees".to_string()],
      dir.path(),
      Some("tester"),
    )
    .unwrap();
    assert_eq!(result.counts.get("launches"), Some(&1));
    assert_eq!(result.counts.get("employees"), Some(&1));

    let dump = read_dump(&result.path);
    assert_eq!(dump["company"]["cnpj"], company.cnpj);
    assert_eq!(dump["collections"]["launches"][0]["number"], "1");
    assert!(dump["collections"].get("payrolls").is_none());
  }

  #[test]
  fn rejects_unknown_collection() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let dir = tempfile::tempdir().unwrap();
    let err = backup_company_data(&conn, &company.id, &["app_users".to_string()], dir.path(), None).unwrap_err();
    assert_eq!(err.code, "UNKNOWN_COLLECTION");
  }

  #[test]
  fn full_backup_restores_database_and_documents() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.sqlite");
    fs::write(&db_path, b"original").unwrap();
    let documents = dir.path().join("docs");
    fs::create_dir_all(documents.join("2025")).unwrap();
    fs::write(documents.join("2025").join("nota.xml"), "<nota/>").unwrap();

    let archive = create_backup(&dir.path().join("backups"), &db_path, &documents, true, None).unwrap();
    fs::write(&db_path, b"changed").unwrap();
    fs::remove_dir_all(&documents).unwrap();

    restore_backup(&archive, &db_path, &documents).unwrap();
    assert_eq!(fs::read(&db_path).unwrap(), b"original");
    assert_eq!(fs::read(db_path.with_extension("bak")).unwrap(), b"changed");
    assert!(documents.join("2025").join("nota.xml").exists());
  }
}
