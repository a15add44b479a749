//! Published INSS, IRRF, FGTS and Simples Nacional tables.
//!
//! Each table carries the first competence it applies to; lookups pick the most
//! recent table not later than the requested competence.

use thiserror::Error;

use crate::domain::Competence;
use crate::error::AppError;
use crate::models::{Anexo, ContractKind};

pub const FGTS_RATE: f64 = 0.08;
pub const FGTS_RATE_APRENDIZ: f64 = 0.02;
pub const CONTRIBUINTE_INDIVIDUAL_RATE: f64 = 0.11;
pub const EMPLOYER_CPP_RATE: f64 = 0.20;
pub const EMPLOYER_TERCEIROS_RATE: f64 = 0.058;
pub const MEI_CPP_RATE: f64 = 0.03;
pub const SIMPLES_CEILING: f64 = 4_800_000.0;
pub const FATOR_R_THRESHOLD: f64 = 0.28;

pub const PIS_CUMULATIVE_RATE: f64 = 0.0065;
pub const COFINS_CUMULATIVE_RATE: f64 = 0.03;
pub const PIS_NON_CUMULATIVE_RATE: f64 = 0.0165;
pub const COFINS_NON_CUMULATIVE_RATE: f64 = 0.076;

#[derive(Debug, Error, PartialEq)]
pub enum TaxError {
  #[error("nenhuma tabela vigente para a competencia {0}")]
  NoTable(Competence),
  #[error("receita bruta de {0:.2} excede o limite do Simples Nacional")]
  AboveSimplesCeiling(f64),
}

impl From<TaxError> for AppError {
  fn from(err: TaxError) -> Self {
    match err {
      TaxError::NoTable(_) => AppError::new("TAX_TABLE", err.to_string()),
      TaxError::AboveSimplesCeiling(_) => AppError::new("SIMPLES_LIMIT", err.to_string()),
    }
  }
}

#[derive(Debug)]
pub struct InssBand {
  pub up_to: f64,
  pub rate: f64,
}

#[derive(Debug)]
pub struct InssTable {
  pub effective: Competence,
  pub minimum_wage: f64,
  pub bands: &'static [InssBand],
}

impl InssTable {
  pub fn ceiling(&self) -> f64 {
    self.bands.last().map(|band| band.up_to).unwrap_or(0.0)
  }
}

#[derive(Debug)]
pub struct IrrfBand {
  /// `None` for the open top band.
  pub up_to: Option<f64>,
  pub rate: f64,
  pub deduction: f64,
}

#[derive(Debug)]
pub struct IrrfTable {
  pub effective: Competence,
  pub bands: &'static [IrrfBand],
  pub dependent_deduction: f64,
  pub simplified_discount: f64,
}

#[derive(Debug)]
pub struct SimplesBracket {
  pub up_to: f64,
  pub nominal_rate: f64,
  pub deduction: f64,
}

static INSS_TABLES: [InssTable; 3] = [
  InssTable {
    effective: Competence { year: 2023, month: 5 },
    minimum_wage: 1320.00,
    bands: &[
      InssBand { up_to: 1320.00, rate: 0.075 },
      InssBand { up_to: 2571.29, rate: 0.09 },
      InssBand { up_to: 3856.94, rate: 0.12 },
      InssBand { up_to: 7507.49, rate: 0.14 },
    ],
  },
  InssTable {
    effective: Competence { year: 2024, month: 1 },
    minimum_wage: 1412.00,
    bands: &[
      InssBand { up_to: 1412.00, rate: 0.075 },
      InssBand { up_to: 2666.68, rate: 0.09 },
      InssBand { up_to: 4000.03, rate: 0.12 },
      InssBand { up_to: 7786.02, rate: 0.14 },
    ],
  },
  InssTable {
    effective: Competence { year: 2025, month: 1 },
    minimum_wage: 1518.00,
    bands: &[
      InssBand { up_to: 1518.00, rate: 0.075 },
      InssBand { up_to: 2793.88, rate: 0.09 },
      InssBand { up_to: 4190.83, rate: 0.12 },
      InssBand { up_to: 8157.41, rate: 0.14 },
    ],
  },
];

static IRRF_TABLES: [IrrfTable; 3] = [
  IrrfTable {
    effective: Competence { year: 2023, month: 5 },
    bands: &[
      IrrfBand { up_to: Some(2112.00), rate: 0.0, deduction: 0.0 },
      IrrfBand { up_to: Some(2826.65), rate: 0.075, deduction: 158.40 },
      IrrfBand { up_to: Some(3751.05), rate: 0.15, deduction: 370.40 },
      IrrfBand { up_to: Some(4664.68), rate: 0.225, deduction: 651.73 },
      IrrfBand { up_to: None, rate: 0.275, deduction: 884.96 },
    ],
    dependent_deduction: 189.59,
    simplified_discount: 528.00,
  },
  IrrfTable {
    effective: Competence { year: 2024, month: 2 },
    bands: &[
      IrrfBand { up_to: Some(2259.20), rate: 0.0, deduction: 0.0 },
      IrrfBand { up_to: Some(2826.65), rate: 0.075, deduction: 169.44 },
      IrrfBand { up_to: Some(3751.05), rate: 0.15, deduction: 381.44 },
      IrrfBand { up_to: Some(4664.68), rate: 0.225, deduction: 662.77 },
      IrrfBand { up_to: None, rate: 0.275, deduction: 896.00 },
    ],
    dependent_deduction: 189.59,
    simplified_discount: 564.80,
  },
  IrrfTable {
    effective: Competence { year: 2025, month: 5 },
    bands: &[
      IrrfBand { up_to: Some(2428.80), rate: 0.0, deduction: 0.0 },
      IrrfBand { up_to: Some(2826.65), rate: 0.075, deduction: 182.16 },
      IrrfBand { up_to: Some(3751.05), rate: 0.15, deduction: 394.16 },
      IrrfBand { up_to: Some(4664.68), rate: 0.225, deduction: 675.49 },
      IrrfBand { up_to: None, rate: 0.275, deduction: 908.73 },
    ],
    dependent_deduction: 189.59,
    simplified_discount: 607.20,
  },
];

static ANEXO_I: [SimplesBracket; 6] = [
  SimplesBracket { up_to: 180_000.0, nominal_rate: 0.04, deduction: 0.0 },
  SimplesBracket { up_to: 360_000.0, nominal_rate: 0.073, deduction: 5_940.0 },
  SimplesBracket { up_to: 720_000.0, nominal_rate: 0.095, deduction: 13_860.0 },
  SimplesBracket { up_to: 1_800_000.0, nominal_rate: 0.107, deduction: 22_500.0 },
  SimplesBracket { up_to: 3_600_000.0, nominal_rate: 0.143, deduction: 87_300.0 },
  SimplesBracket { up_to: 4_800_000.0, nominal_rate: 0.19, deduction: 378_000.0 },
];

static ANEXO_II: [SimplesBracket; 6] = [
  SimplesBracket { up_to: 180_000.0, nominal_rate: 0.045, deduction: 0.0 },
  SimplesBracket { up_to: 360_000.0, nominal_rate: 0.078, deduction: 5_940.0 },
  SimplesBracket { up_to: 720_000.0, nominal_rate: 0.10, deduction: 13_860.0 },
  SimplesBracket { up_to: 1_800_000.0, nominal_rate: 0.112, deduction: 22_500.0 },
  SimplesBracket { up_to: 3_600_000.0, nominal_rate: 0.147, deduction: 85_500.0 },
  SimplesBracket { up_to: 4_800_000.0, nominal_rate: 0.30, deduction: 720_000.0 },
];

static ANEXO_III: [SimplesBracket; 6] = [
  SimplesBracket { up_to: 180_000.0, nominal_rate: 0.06, deduction: 0.0 },
  SimplesBracket { up_to: 360_000.0, nominal_rate: 0.112, deduction: 9_360.0 },
  SimplesBracket { up_to: 720_000.0, nominal_rate: 0.135, deduction: 17_640.0 },
  SimplesBracket { up_to: 1_800_000.0, nominal_rate: 0.16, deduction: 35_640.0 },
  SimplesBracket { up_to: 3_600_000.0, nominal_rate: 0.21, deduction: 125_640.0 },
  SimplesBracket { up_to: 4_800_000.0, nominal_rate: 0.33, deduction: 648_000.0 },
];

static ANEXO_IV: [SimplesBracket; 6] = [
  SimplesBracket { up_to: 180_000.0, nominal_rate: 0.045, deduction: 0.0 },
  SimplesBracket { up_to: 360_000.0, nominal_rate: 0.09, deduction: 8_100.0 },
  SimplesBracket { up_to: 720_000.0, nominal_rate: 0.102, deduction: 12_420.0 },
  SimplesBracket { up_to: 1_800_000.0, nominal_rate: 0.14, deduction: 39_780.0 },
  SimplesBracket { up_to: 3_600_000.0, nominal_rate: 0.22, deduction: 183_780.0 },
  SimplesBracket { up_to: 4_800_000.0, nominal_rate: 0.33, deduction: 828_000.0 },
];

static ANEXO_V: [SimplesBracket; 6] = [
  SimplesBracket { up_to: 180_000.0, nominal_rate: 0.155, deduction: 0.0 },
  SimplesBracket { up_to: 360_000.0, nominal_rate: 0.18, deduction: 4_500.0 },
  SimplesBracket { up_to: 720_000.0, nominal_rate: 0.195, deduction: 9_900.0 },
  SimplesBracket { up_to: 1_800_000.0, nominal_rate: 0.205, deduction: 17_100.0 },
  SimplesBracket { up_to: 3_600_000.0, nominal_rate: 0.23, deduction: 62_100.0 },
  SimplesBracket { up_to: 4_800_000.0, nominal_rate: 0.305, deduction: 540_000.0 },
];

pub fn inss_table(competence: Competence) -> Result<&'static InssTable, TaxError> {
  INSS_TABLES
    .iter()
    .filter(|table| table.effective <= competence)
    .max_by_key(|table| table.effective)
    .ok_or(TaxError::NoTable(competence))
}

pub fn irrf_table(competence: Competence) -> Result<&'static IrrfTable, TaxError> {
  IRRF_TABLES
    .iter()
    .filter(|table| table.effective <= competence)
    .max_by_key(|table| table.effective)
    .ok_or(TaxError::NoTable(competence))
}

pub fn minimum_wage(competence: Competence) -> Result<f64, TaxError> {
  inss_table(competence).map(|table| table.minimum_wage)
}

/// Minimum wage of the oldest table on file.
pub fn earliest_minimum_wage() -> f64 {
  INSS_TABLES[0].minimum_wage
}

pub fn fgts_rate(kind: ContractKind) -> f64 {
  match kind {
    ContractKind::Clt => FGTS_RATE,
    ContractKind::Aprendiz => FGTS_RATE_APRENDIZ,
  }
}

pub fn simples_brackets(anexo: Anexo) -> &'static [SimplesBracket; 6] {
  match anexo {
    Anexo::I => &ANEXO_I,
    Anexo::II => &ANEXO_II,
    Anexo::III => &ANEXO_III,
    Anexo::IV => &ANEXO_IV,
    Anexo::V => &ANEXO_V,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn picks_latest_table_not_after_competence() {
    let march = Competence { year: 2025, month: 3 };
    assert_eq!(inss_table(march).unwrap().minimum_wage, 1518.00);
    assert_eq!(irrf_table(march).unwrap().simplified_discount, 564.80);

    let june = Competence { year: 2025, month: 6 };
    assert_eq!(irrf_table(june).unwrap().simplified_discount, 607.20);
  }

  #[test]
  fn rejects_competence_before_first_table() {
    let old = Competence { year: 2020, month: 1 };
    assert_eq!(inss_table(old).unwrap_err(), TaxError::NoTable(old));
  }

  #[test]
  fn brackets_end_at_simples_ceiling() {
    for anexo in [Anexo::I, Anexo::II, Anexo::III, Anexo::IV, Anexo::V] {
      assert_eq!(simples_brackets(anexo)[5].up_to, SIMPLES_CEILING);
    }
  }
}
