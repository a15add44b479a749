use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::models::Settings;

pub const CNPJ_API_ENV: &str = "CONTABIL_CNPJ_API_URL";
pub const DEFAULT_CNPJ_API_URL: &str = "https://brasilapi.com.br/api";

const KEY_ACTIVE_COMPANY: &str = "active_company_id";
const KEY_ESOCIAL_ENV: &str = "esocial_environment";
const KEY_CNPJ_API: &str = "cnpj_api_url";
const KEY_DOCUMENTS_BASE: &str = "documents_base_folder";
const KEY_BACKUP_FOLDER: &str = "backup_folder";

/// 1 = producao, 2 = producao restrita.
const DEFAULT_ESOCIAL_ENV: u8 = 2;

pub fn ensure_defaults(conn: &Connection, documents_base: &Path, backup_folder: &Path) -> Result<(), AppError> {
  let defaults = [
    (KEY_ESOCIAL_ENV, DEFAULT_ESOCIAL_ENV.to_string()),
    (KEY_CNPJ_API, DEFAULT_CNPJ_API_URL.to_string()),
    (KEY_DOCUMENTS_BASE, documents_base.to_string_lossy().to_string()),
    (KEY_BACKUP_FOLDER, backup_folder.to_string_lossy().to_string()),
  ];
  for (key, value) in defaults {
    conn.execute(
      "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
      params![key, value],
    )?;
  }
  Ok(())
}

pub fn get_settings(conn: &Connection) -> Result<Settings, AppError> {
  let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
  let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

  let mut settings = Settings {
    active_company_id: None,
    esocial_environment: DEFAULT_ESOCIAL_ENV,
    cnpj_api_url: DEFAULT_CNPJ_API_URL.to_string(),
    documents_base_folder: String::new(),
    backup_folder: String::new(),
  };

  for row in rows {
    let (key, value) = row?;
    match key.as_str() {
      KEY_ACTIVE_COMPANY => {
        settings.active_company_id = Some(value).filter(|id| !id.is_empty());
      }
      KEY_ESOCIAL_ENV => {
        settings.esocial_environment = value.parse().unwrap_or(DEFAULT_ESOCIAL_ENV);
      }
      KEY_CNPJ_API => settings.cnpj_api_url = value,
      KEY_DOCUMENTS_BASE => settings.documents_base_folder = value,
      KEY_BACKUP_FOLDER => settings.backup_folder = value,
      _ => {}
    }
  }

  if let Ok(url) = std::env::var(CNPJ_API_ENV) {
    if !url.trim().is_empty() {
      settings.cnpj_api_url = url.trim().to_string();
    }
  }

  Ok(settings)
}

pub fn update_settings(conn: &Connection, settings: &Settings) -> Result<(), AppError> {
  if !matches!(settings.esocial_environment, 1 | 2) {
    return Err(AppError::new(
      "INVALID_SETTINGS",
      "Ambiente do eSocial deve ser 1 (producao) ou 2 (producao restrita)",
    ));
  }
  if !settings.cnpj_api_url.starts_with("http://") && !settings.cnpj_api_url.starts_with("https://") {
    return Err(AppError::new("INVALID_SETTINGS", "URL da consulta CNPJ invalida"));
  }

  set_value(conn, KEY_ESOCIAL_ENV, &settings.esocial_environment.to_string())?;
  set_value(conn, KEY_CNPJ_API, settings.cnpj_api_url.trim_end_matches('/'))?;
  set_value(conn, KEY_DOCUMENTS_BASE, &settings.documents_base_folder)?;
  set_value(conn, KEY_BACKUP_FOLDER, &settings.backup_folder)?;
  set_value(
    conn,
    KEY_ACTIVE_COMPANY,
    settings.active_company_id.as_deref().unwrap_or_default(),
  )?;
  Ok(())
}

pub fn active_company_id(conn: &Connection) -> Result<Option<String>, AppError> {
  let value: Option<String> = conn
    .query_row(
      "SELECT value FROM settings WHERE key = ?1",
      params![KEY_ACTIVE_COMPANY],
      |row| row.get(0),
    )
    .optional()?;
  Ok(value.filter(|id| !id.is_empty()))
}

pub fn set_active_company_id(conn: &Connection, company_id: Option<&str>) -> Result<(), AppError> {
  set_value(conn, KEY_ACTIVE_COMPANY, company_id.unwrap_or_default())
}

fn set_value(conn: &Connection, key: &str, value: &str) -> Result<(), AppError> {
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![key, value],
  )?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::open_db_in_memory;

  #[test]
  fn rejects_unknown_esocial_environment() {
    let conn = open_db_in_memory().unwrap();
    ensure_defaults(&conn, Path::new("/tmp/docs"), Path::new("/tmp/bkp")).unwrap();
    let mut settings = get_settings(&conn).unwrap();
    settings.esocial_environment = 3;
    let err = update_settings(&conn, &settings).unwrap_err();
    assert_eq!(err.code, "INVALID_SETTINGS");
  }

  #[test]
  fn active_company_round_trips_and_clears() {
    let conn = open_db_in_memory().unwrap();
    set_active_company_id(&conn, Some("abc")).unwrap();
    assert_eq!(active_company_id(&conn).unwrap().as_deref(), Some("abc"));
    set_active_company_id(&conn, None).unwrap();
    assert_eq!(active_company_id(&conn).unwrap(), None);
  }
}
