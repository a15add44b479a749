use serde::{Deserialize, Serialize};

use crate::domain::round2;
use crate::domain::tax_tables::{simples_brackets, SimplesBracket, TaxError, FATOR_R_THRESHOLD, SIMPLES_CEILING};
use crate::error::AppError;
use crate::models::Anexo;

#[derive(Debug, Clone)]
pub struct DasInput {
  /// Receita bruta do periodo de apuracao.
  pub rpa: f64,
  pub rbt12: f64,
  pub activity_anexo: Anexo,
  /// Payroll of the last 12 months, including pro-labore and FGTS. Only used
  /// for activities subject to the Fator R.
  pub payroll_12m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgdasCalculation {
  pub rpa: f64,
  pub rbt12: f64,
  pub anexo: Anexo,
  pub bracket: u32,
  pub nominal_rate: f64,
  pub deduction: f64,
  pub effective_rate: f64,
  pub das: f64,
  pub fator_r: Option<f64>,
}

/// Bracket (1-based position and row) that `rbt12` falls in.
pub fn nominal_bracket(anexo: Anexo, rbt12: f64) -> Result<(u32, &'static SimplesBracket), TaxError> {
  if rbt12 > SIMPLES_CEILING {
    return Err(TaxError::AboveSimplesCeiling(rbt12));
  }
  let brackets = simples_brackets(anexo);
  let position = brackets
    .iter()
    .position(|bracket| rbt12 <= bracket.up_to)
    .unwrap_or(brackets.len() - 1);
  Ok((position as u32 + 1, &brackets[position]))
}

/// `((RBT12 x nominal) - deduction) / RBT12`. Without revenue history the
/// first bracket's nominal rate applies.
pub fn effective_rate(anexo: Anexo, rbt12: f64) -> Result<f64, TaxError> {
  let (_, bracket) = nominal_bracket(anexo, rbt12)?;
  if rbt12 <= 0.0 {
    return Ok(simples_brackets(anexo)[0].nominal_rate);
  }
  Ok((rbt12 * bracket.nominal_rate - bracket.deduction) / rbt12)
}

/// RBT12 for a company with fewer than 12 months of activity: the average of
/// the months before the period, annualised. In the first month, RPA x 12.
pub fn rbt12_for_new_company(revenue_before: f64, months_before: u32, rpa: f64) -> f64 {
  if months_before == 0 {
    round2(rpa * 12.0)
  } else {
    round2(revenue_before / months_before as f64 * 12.0)
  }
}

pub fn fator_r(payroll_12m: f64, rbt12: f64) -> Option<f64> {
  if rbt12 <= 0.0 {
    None
  } else {
    Some(payroll_12m / rbt12)
  }
}

/// Anexo V activities are taxed under Anexo III when the Fator R reaches 28 %.
pub fn resolve_anexo(activity_anexo: Anexo, fator_r: Option<f64>) -> Anexo {
  match (activity_anexo, fator_r) {
    (Anexo::V, Some(ratio)) if ratio >= FATOR_R_THRESHOLD => Anexo::III,
    (anexo, _) => anexo,
  }
}

pub fn calculate_das(input: &DasInput) -> Result<PgdasCalculation, AppError> {
  if input.rpa < 0.0 || input.rbt12 < 0.0 {
    return Err(AppError::new("INVALID_AMOUNT", "Receita nao pode ser negativa"));
  }
  let fator_r = input
    .payroll_12m
    .and_then(|payroll| fator_r(payroll, input.rbt12));
  let anexo = resolve_anexo(input.activity_anexo, fator_r);
  let (bracket, row) = nominal_bracket(anexo, input.rbt12)?;
  let rate = effective_rate(anexo, input.rbt12)?;

  Ok(PgdasCalculation {
    rpa: round2(input.rpa),
    rbt12: round2(input.rbt12),
    anexo,
    bracket,
    nominal_rate: row.nominal_rate,
    deduction: row.deduction,
    effective_rate: rate,
    das: round2(input.rpa * rate),
    fator_r,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn effective_rate_in_first_bracket_equals_nominal() {
    assert!((effective_rate(Anexo::I, 100_000.0).unwrap() - 0.04).abs() < 1e-12);
  }

  #[test]
  fn effective_rate_applies_deduction() {
    // bracket 3: 13.5 % less 17 640.00
    let rate = effective_rate(Anexo::III, 500_000.0).unwrap();
    assert!((rate - 0.09972).abs() < 1e-9);
    assert_eq!(nominal_bracket(Anexo::III, 500_000.0).unwrap().0, 3);
  }

  #[test]
  fn zero_revenue_uses_first_bracket_nominal() {
    assert_eq!(effective_rate(Anexo::V, 0.0).unwrap(), 0.155);
  }

  #[test]
  fn revenue_above_ceiling_is_rejected() {
    assert_eq!(
      nominal_bracket(Anexo::I, 4_800_000.01).unwrap_err(),
      TaxError::AboveSimplesCeiling(4_800_000.01)
    );
  }

  #[test]
  fn bracket_boundary_is_inclusive() {
    assert_eq!(nominal_bracket(Anexo::I, 180_000.0).unwrap().0, 1);
    assert_eq!(nominal_bracket(Anexo::I, 180_000.01).unwrap().0, 2);
  }

  #[test]
  fn new_company_annualises_average_revenue() {
    assert_eq!(rbt12_for_new_company(0.0, 0, 10_000.0), 120_000.0);
    assert_eq!(rbt12_for_new_company(30_000.0, 3, 12_000.0), 120_000.0);
  }

  #[test]
  fn fator_r_moves_anexo_v_to_iii() {
    let input = DasInput {
      rpa: 50_000.0,
      rbt12: 500_000.0,
      activity_anexo: Anexo::V,
      payroll_12m: Some(150_000.0),
    };
    let calc = calculate_das(&input).unwrap();
    assert_eq!(calc.anexo, Anexo::III);
    assert_eq!(calc.bracket, 3);
    assert_eq!(calc.das, 4986.0);
    assert_eq!(calc.fator_r, Some(0.3));
  }

  #[test]
  fn low_fator_r_keeps_anexo_v() {
    let input = DasInput {
      rpa: 10_000.0,
      rbt12: 100_000.0,
      activity_anexo: Anexo::V,
      payroll_12m: Some(10_000.0),
    };
    let calc = calculate_das(&input).unwrap();
    assert_eq!(calc.anexo, Anexo::V);
    assert_eq!(calc.das, 1550.0);
  }
}
