//! Local user accounts and admin approval.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::audit::log::{append_audit, payload};
use crate::db::{new_id, now};
use crate::domain::validation;
use crate::error::AppError;
use crate::models::{AppUser, UserRole, UserStatus};

const USER_COLUMNS: &str = "id, email, display_name, role, status, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<AppUser> {
  let role: String = row.get(3)?;
  let status: String = row.get(4)?;
  Ok(AppUser {
    id: row.get(0)?,
    email: row.get(1)?,
    display_name: row.get(2)?,
    role: UserRole::parse(&role).unwrap_or(UserRole::Usuario),
    status: UserStatus::parse(&status).unwrap_or(UserStatus::Pendente),
    created_at: row.get(5)?,
    updated_at: row.get(6)?,
  })
}

pub fn get_user(conn: &Connection, id: &str) -> Result<AppUser, AppError> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM app_users WHERE id = ?1"),
      params![id],
      map_user,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Usuario nao encontrado"))
}

fn require_admin(conn: &Connection, actor_id: &str) -> Result<AppUser, AppError> {
  let actor = get_user(conn, actor_id).map_err(|_| AppError::forbidden("Usuario sem permissao"))?;
  if actor.role != UserRole::Admin || actor.status != UserStatus::Aprovado {
    log::warn!("event=admin_required module=users status=denied actor_id={actor_id}");
    return Err(AppError::forbidden("Operacao restrita a administradores"));
  }
  Ok(actor)
}

/// The first account becomes an approved admin; later ones wait for approval.
pub fn register_user(conn: &Connection, email: &str, display_name: &str) -> Result<AppUser, AppError> {
  let email = validation::ensure_email(email)?.to_lowercase();
  let display_name = validation::ensure_not_blank(display_name, "Nome")?;
  let exists: Option<String> = conn
    .query_row("SELECT id FROM app_users WHERE email = ?1", params![email], |row| row.get(0))
    .optional()?;
  if exists.is_some() {
    return Err(AppError::new("DUPLICATE_EMAIL", "E-mail ja cadastrado"));
  }

  let count: i64 = conn.query_row("SELECT COUNT(*) FROM app_users", [], |row| row.get(0))?;
  let (role, status) = if count == 0 {
    (UserRole::Admin, UserStatus::Aprovado)
  } else {
    (UserRole::Usuario, UserStatus::Pendente)
  };

  let id = new_id();
  let ts = now();
  conn.execute(
    &format!("INSERT INTO app_users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)"),
    params![id, email, display_name, role.as_str(), status.as_str(), ts],
  )?;
  append_audit(
    conn,
    Some(&email),
    "REGISTER_USER",
    "USER",
    Some(&id),
    None,
    payload(&serde_json::json!({ "email": email, "role": role, "status": status })),
    None,
  )?;
  get_user(conn, &id)
}

pub fn list_users(conn: &Connection, actor_id: &str) -> Result<Vec<AppUser>, AppError> {
  require_admin(conn, actor_id)?;
  let mut stmt = conn.prepare(&format!(
    "SELECT {USER_COLUMNS} FROM app_users ORDER BY created_at, email"
  ))?;
  let rows = stmt.query_map([], map_user)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Approves or disables an account.
pub fn set_user_status(conn: &Connection, actor_id: &str, user_id: &str, status: UserStatus) -> Result<AppUser, AppError> {
  let actor = require_admin(conn, actor_id)?;
  if status == UserStatus::Pendente {
    return Err(AppError::new("INVALID_STATUS", "Status deve ser APROVADO ou DESATIVADO"));
  }
  if actor.id == user_id && status == UserStatus::Desativado {
    return Err(AppError::new("CANNOT_DISABLE_SELF", "Administrador nao pode desativar a propria conta"));
  }
  let user = get_user(conn, user_id)?;

  conn.execute(
    "UPDATE app_users SET status = ?1, updated_at = ?2 WHERE id = ?3",
    params![status.as_str(), now(), user_id],
  )?;
  append_audit(
    conn,
    Some(&actor.email),
    "SET_USER_STATUS",
    "USER",
    Some(user_id),
    None,
    payload(&status),
    Some(format!("{} -> {}", user.status, status)),
  )?;
  log::info!("event=user_status module=users status=ok user_id={user_id} new_status={status}");
  get_user(conn, user_id)
}

pub fn set_user_role(conn: &Connection, actor_id: &str, user_id: &str, role: UserRole) -> Result<AppUser, AppError> {
  let actor = require_admin(conn, actor_id)?;
  let user = get_user(conn, user_id)?;
  if user.role == UserRole::Admin && role == UserRole::Usuario {
    let admins: i64 = conn.query_row(
      "SELECT COUNT(*) FROM app_users WHERE role = 'ADMIN' AND status = 'APROVADO'",
      [],
      |row| row.get(0),
    )?;
    if admins <= 1 {
      return Err(AppError::new("LAST_ADMIN", "Deve existir ao menos um administrador"));
    }
  }

  conn.execute(
    "UPDATE app_users SET role = ?1, updated_at = ?2 WHERE id = ?3",
    params![role.as_str(), now(), user_id],
  )?;
  append_audit(
    conn,
    Some(&actor.email),
    "SET_USER_ROLE",
    "USER",
    Some(user_id),
    None,
    payload(&role),
    None,
  )?;
  get_user(conn, user_id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::open_db_in_memory;

  #[test]
  fn first_user_is_approved_admin() {
    let conn = open_db_in_memory().unwrap();
    let admin = register_user(&conn, "Ana@Escritorio.com.br", "Ana").unwrap();
    assert_eq!(admin.email, "ana@escritorio.com.br");
    assert_eq!(admin.role, UserRole::Admin);
    assert_eq!(admin.status, UserStatus::Aprovado);

    let other = register_user(&conn, "bruno@escritorio.com.br", "Bruno").unwrap();
    assert_eq!(other.role, UserRole::Usuario);
    assert_eq!(other.status, UserStatus::Pendente);
    assert_eq!(
      register_user(&conn, "ana@escritorio.com.br", "Ana 2").unwrap_err().code,
      "DUPLICATE_EMAIL"
    );
  }

  #[test]
  fn only_admins_list_and_change_users() {
    let conn = open_db_in_memory().unwrap();
    let admin = register_user(&conn, "ana@escritorio.com.br", "Ana").unwrap();
    let other = register_user(&conn, "bruno@escritorio.com.br", "Bruno").unwrap();

    assert_eq!(list_users(&conn, &other.id).unwrap_err().code, "FORBIDDEN");
    assert_eq!(list_users(&conn, &admin.id).unwrap().len(), 2);

    let approved = set_user_status(&conn, &admin.id, &other.id, UserStatus::Aprovado).unwrap();
    assert_eq!(approved.status, UserStatus::Aprovado);
    assert_eq!(
      set_user_status(&conn, &other.id, &admin.id, UserStatus::Desativado).unwrap_err().code,
      "FORBIDDEN"
    );
  }

  #[test]
  fn admin_cannot_disable_self_or_remove_last_admin() {
    let conn = open_db_in_memory().unwrap();
    let admin = register_user(&conn, "ana@escritorio.com.br", "Ana").unwrap();
    assert_eq!(
      set_user_status(&conn, &admin.id, &admin.id, UserStatus::Desativado).unwrap_err().code,
      "CANNOT_DISABLE_SELF"
    );
    assert_eq!(
      set_user_role(&conn, &admin.id, &admin.id, UserRole::Usuario).unwrap_err().code,
      "LAST_ADMIN"
    );
  }
}
