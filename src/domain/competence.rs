use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Accounting period (month) a document or payroll belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Competence {
  pub year: i32,
  pub month: u32,
}

impl Competence {
  pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
    if !(1..=12).contains(&month) {
      return Err(AppError::new("INVALID_MONTH", "Mes deve estar entre 1 e 12"));
    }
    if !(1900..=2999).contains(&year) {
      return Err(AppError::new("INVALID_YEAR", "Ano invalido"));
    }
    Ok(Self { year, month })
  }

  /// Parses `YYYY-MM`.
  pub fn parse(value: &str) -> Result<Self, AppError> {
    let invalid = || AppError::new("INVALID_COMPETENCE", "Competencia deve ser AAAA-MM");
    let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
      return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    Self::new(year, month)
  }

  pub fn of_date(date: NaiveDate) -> Self {
    Self {
      year: date.year(),
      month: date.month(),
    }
  }

  pub fn first_day(&self) -> NaiveDate {
    NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
  }

  pub fn last_day(&self) -> NaiveDate {
    self
      .first_day()
      .checked_add_months(Months::new(1))
      .and_then(|next| next.pred_opt())
      .unwrap_or(NaiveDate::MAX)
  }

  pub fn previous(&self) -> Self {
    if self.month == 1 {
      Self {
        year: self.year - 1,
        month: 12,
      }
    } else {
      Self {
        year: self.year,
        month: self.month - 1,
      }
    }
  }

  /// The `count` competences immediately before this one, oldest first.
  pub fn preceding(&self, count: usize) -> Vec<Competence> {
    let mut items = Vec::with_capacity(count);
    let mut cursor = *self;
    for _ in 0..count {
      cursor = cursor.previous();
      items.push(cursor);
    }
    items.reverse();
    items
  }

  /// Number of whole months from `self` up to (excluding) `later`.
  pub fn months_until(&self, later: Competence) -> i32 {
    (later.year - self.year) * 12 + later.month as i32 - self.month as i32
  }
}

impl fmt::Display for Competence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_and_formats_competence() {
    let competence = Competence::parse("2025-03").unwrap();
    assert_eq!(competence, Competence { year: 2025, month: 3 });
    assert_eq!(competence.to_string(), "2025-03");
    assert!(Competence::parse("2025-13").is_err());
    assert!(Competence::parse("03/2025").is_err());
  }

  #[test]
  fn preceding_crosses_year_boundary() {
    let competence = Competence::parse("2025-02").unwrap();
    let previous = competence.preceding(3);
    assert_eq!(
      previous,
      vec![
        Competence { year: 2024, month: 11 },
        Competence { year: 2024, month: 12 },
        Competence { year: 2025, month: 1 },
      ]
    );
  }

  #[test]
  fn last_day_handles_february() {
    assert_eq!(
      Competence::parse("2024-02").unwrap().last_day(),
      NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
  }
}
