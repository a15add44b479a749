use serde::Serialize;
use rust_xlsxwriter::XlsxError;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AppError {
  pub code: String,
  pub message: String,
}

impl AppError {
  pub fn new(code: &str, message: impl Into<String>) -> Self {
    Self {
      code: code.to_string(),
      message: message.into(),
    }
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new("NOT_FOUND", message)
  }

  pub fn forbidden(message: impl Into<String>) -> Self {
    Self::new("FORBIDDEN", message)
  }
}

impl std::fmt::Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.code, self.message)
  }
}

impl std::error::Error for AppError {}

impl From<rusqlite::Error> for AppError {
  fn from(err: rusqlite::Error) -> Self {
    match err {
      rusqlite::Error::QueryReturnedNoRows => AppError::not_found("Registro nao encontrado"),
      rusqlite::Error::SqliteFailure(ref code, _)
        if code.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        AppError::new("CONSTRAINT", err.to_string())
      }
      other => AppError::new("DB_ERROR", other.to_string()),
    }
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::new("IO_ERROR", err.to_string())
  }
}

impl From<zip::result::ZipError> for AppError {
  fn from(err: zip::result::ZipError) -> Self {
    AppError::new("ZIP_ERROR", err.to_string())
  }
}

impl From<XlsxError> for AppError {
  fn from(err: XlsxError) -> Self {
    AppError::new("EXPORT", err.to_string())
  }
}

impl From<serde_json::Error> for AppError {
  fn from(err: serde_json::Error) -> Self {
    AppError::new("JSON_ERROR", err.to_string())
  }
}

impl From<quick_xml::Error> for AppError {
  fn from(err: quick_xml::Error) -> Self {
    AppError::new("XML_ERROR", err.to_string())
  }
}

impl From<quick_xml::DeError> for AppError {
  fn from(err: quick_xml::DeError) -> Self {
    AppError::new("XML_INVALID", err.to_string())
  }
}

impl From<reqwest::Error> for AppError {
  fn from(err: reqwest::Error) -> Self {
    AppError::new("CNPJ_LOOKUP", err.to_string())
  }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    AppError::new("LOCK_ERROR", "Falha ao bloquear o banco de dados")
  }
}
