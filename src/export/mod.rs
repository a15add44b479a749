pub mod csv;
pub mod efd_contribuicoes;
pub mod esocial;
pub mod excel;
pub mod reinf;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::AppError;
use crate::models::Company;

pub(crate) const SEQUENCE_LIMIT: u32 = 99_999;

/// Event id shared by eSocial and EFD-Reinf: `ID`, inscription type, the
/// CNPJ root padded to 14 digits, `AAAAMMDDHHMMSS` and a 5-digit sequence.
pub fn event_id(company: &Company, at: NaiveDateTime, sequence: u32) -> String {
  format!(
    "ID1{:0<14}{}{:05}",
    company.cnpj_root(),
    at.format("%Y%m%d%H%M%S"),
    sequence % (SEQUENCE_LIMIT + 1)
  )
}

/// Government XML amounts use a decimal point and two places.
pub(crate) fn amount(value: f64) -> String {
  format!("{value:.2}")
}

/// Serializes `event` as `<tag>` inside the namespaced root element.
pub(crate) fn xml_document<T: Serialize>(root: &str, namespace: &str, tag: &str, event: &T) -> Result<String, AppError> {
  let inner = quick_xml::se::to_string_with_root(tag, event)
    .map_err(|err| AppError::new("XML_ERROR", err.to_string()))?;
  Ok(format!("<{root} xmlns=\"{namespace}\">{inner}</{root}>"))
}
