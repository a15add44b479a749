use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::files::documents;
use crate::settings;

pub const PORTABLE_ENV: &str = "CONTABIL_PORTABLE";
const APP_DIR_NAME: &str = "ContabilFiscal";
const DB_FILE: &str = "contabil_fiscal.sqlite";

pub struct Db {
  pub conn: Mutex<Connection>,
  pub db_path: PathBuf,
}

pub fn resolve_app_dir() -> Result<PathBuf, AppError> {
  if let Some(portable) = resolve_portable_dir()? {
    return Ok(portable);
  }

  let base = dirs_next::data_local_dir()
    .ok_or_else(|| AppError::new("PATH", "Diretorio de dados do usuario nao encontrado"))?;
  Ok(base.join(APP_DIR_NAME))
}

pub fn db_file(app_dir: &Path) -> PathBuf {
  app_dir.join(DB_FILE)
}

pub fn init_db(app_dir: &Path) -> Result<(Db, PathBuf), AppError> {
  fs::create_dir_all(app_dir)?;
  let db_path = db_file(app_dir);
  let mut conn = open_file(&db_path)?;

  run_migrations(&mut conn)?;

  let documents_base = documents::ensure_documents_base(app_dir)?;
  let backup_dir = app_dir.join("backups");
  fs::create_dir_all(&backup_dir)?;
  settings::ensure_defaults(&conn, &documents_base, &backup_dir)?;

  log::info!(
    "event=db_init module=db status=ok path={}",
    db_path.to_string_lossy()
  );

  Ok((
    Db {
      conn: Mutex::new(conn),
      db_path,
    },
    documents_base,
  ))
}

/// Migrated connection without a backing file.
pub fn open_db_in_memory() -> Result<Connection, AppError> {
  let mut conn = Connection::open_in_memory()?;
  conn.execute_batch("PRAGMA foreign_keys = ON;")?;
  run_migrations(&mut conn)?;
  Ok(conn)
}

pub fn with_conn<T>(db: &Db, f: impl FnOnce(&mut Connection) -> Result<T, AppError>) -> Result<T, AppError> {
  let mut guard = db.conn.lock()?;
  f(&mut guard)
}

pub fn reload_connection(db: &Db) -> Result<(), AppError> {
  let mut guard = db.conn.lock()?;
  let mut conn = open_file(&db.db_path)?;
  run_migrations(&mut conn)?;
  *guard = conn;
  Ok(())
}

pub fn checkpoint(conn: &Connection) -> Result<(), AppError> {
  conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
  Ok(())
}

/// Fresh UUID v4 used as the primary key of every entity table.
pub fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

pub fn now() -> String {
  Utc::now().to_rfc3339()
}

fn open_file(path: &Path) -> Result<Connection, AppError> {
  let conn = Connection::open(path)?;
  conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
  conn.busy_timeout(Duration::from_secs(5))?;
  Ok(conn)
}

fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
  conn.execute_batch(
    "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
  )?;

  apply_migration(conn, "001_init", include_str!("../migrations/001_init.sql"))?;
  Ok(())
}

fn apply_migration(conn: &mut Connection, version: &str, sql: &str) -> Result<(), AppError> {
  let exists: i64 = conn.query_row(
    "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
    params![version],
    |row| row.get(0),
  )?;
  if exists > 0 {
    return Ok(());
  }

  let tx = conn.transaction()?;
  tx.execute_batch(sql)?;
  tx.execute(
    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
    params![version, now()],
  )?;
  tx.commit()?;
  log::info!("event=migration_applied module=db status=ok version={version}");
  Ok(())
}

fn resolve_portable_dir() -> Result<Option<PathBuf>, AppError> {
  let env_enabled = std::env::var(PORTABLE_ENV)
    .ok()
    .map(|value| {
      let value = value.to_ascii_lowercase();
      value == "1" || value == "true" || value == "yes"
    })
    .unwrap_or(false);

  let exe_dir = std::env::current_exe()
    .ok()
    .and_then(|path| path.parent().map(|parent| parent.to_path_buf()));

  if let Some(exe_dir) = exe_dir {
    let flag = exe_dir.join("portable.flag");
    let data_dir = exe_dir.join("data");
    if env_enabled || flag.exists() || data_dir.exists() {
      fs::create_dir_all(&data_dir)?;
      return Ok(Some(data_dir));
    }
  }

  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn migrations_are_idempotent() {
    let mut conn = open_db_in_memory().unwrap();
    run_migrations(&mut conn).unwrap();
    let applied: i64 = conn
      .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
      .unwrap();
    assert_eq!(applied, 1);
  }

  #[test]
  fn init_db_creates_file_and_default_settings() {
    let dir = tempfile::tempdir().unwrap();
    let (db, documents_base) = init_db(dir.path()).unwrap();
    assert!(db.db_path.exists());
    assert!(documents_base.exists());
    let settings = with_conn(&db, |conn| settings::get_settings(conn)).unwrap();
    assert_eq!(settings.esocial_environment, 2);
    assert_eq!(settings.documents_base_folder, documents_base.to_string_lossy());
  }
}
