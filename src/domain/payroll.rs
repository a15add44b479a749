//! Payroll arithmetic: monthly pay, pro-labore, vacation, 13th salary and
//! termination, all against the tables in `tax_tables`.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::tax_tables::{self, fgts_rate, InssTable, IrrfTable};
use crate::domain::{round2, Competence};
use crate::error::AppError;
use crate::models::{Anexo, ContractKind, Installment, TaxRegime, TerminationReason};

const NOTICE_BASE_DAYS: u32 = 30;
const NOTICE_DAYS_PER_YEAR: u32 = 3;
const NOTICE_MAX_DAYS: u32 = 90;
const MIN_VACATION_DAYS: u32 = 5;
const MAX_SOLD_DAYS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrfResult {
  pub base: f64,
  pub tax: f64,
  pub used_simplified: bool,
}

/// What the employer pays on top of the payroll, by tax regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmployerProfile {
  pub regime: TaxRegime,
  pub anexo: Option<Anexo>,
  /// RAT/GILRAT percentage, 1 to 3.
  pub rat_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EmployerCharges {
  pub cpp: f64,
  pub rat: f64,
  pub terceiros: f64,
}

impl EmployerCharges {
  pub fn total(&self) -> f64 {
    round2(self.cpp + self.rat + self.terceiros)
  }
}

#[derive(Debug, Clone)]
pub struct MonthlyPayrollInput {
  pub competence: Competence,
  pub base_salary: f64,
  pub overtime: f64,
  pub other_earnings: f64,
  pub other_discounts: f64,
  pub dependents: u32,
  pub contract_kind: ContractKind,
  pub employer: EmployerProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollBreakdown {
  pub gross: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub other_discounts: f64,
  pub net: f64,
  pub employer: EmployerCharges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProLaboreBreakdown {
  pub amount: f64,
  pub inss: f64,
  pub irrf: f64,
  pub net: f64,
  pub employer_cpp: f64,
}

#[derive(Debug, Clone)]
pub struct VacationCalcInput {
  pub competence: Competence,
  pub salary: f64,
  pub days: u32,
  pub sold_days: u32,
  pub dependents: u32,
  pub contract_kind: ContractKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VacationBreakdown {
  pub vacation_pay: f64,
  pub one_third: f64,
  pub abono: f64,
  pub abono_one_third: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub net: f64,
}

#[derive(Debug, Clone)]
pub struct ThirteenthCalcInput {
  pub competence: Competence,
  pub salary: f64,
  pub months_worked: u32,
  pub installment: Installment,
  pub first_installment_paid: f64,
  pub dependents: u32,
  pub contract_kind: ContractKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirteenthBreakdown {
  pub gross: f64,
  pub advance: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub net: f64,
}

#[derive(Debug, Clone)]
pub struct TerminationCalcInput {
  pub salary: f64,
  pub admission: NaiveDate,
  pub termination: NaiveDate,
  pub reason: TerminationReason,
  pub notice_worked: bool,
  pub vested_vacation_periods: u32,
  pub thirteenth_advance_paid: f64,
  pub fgts_balance: f64,
  pub dependents: u32,
  pub contract_kind: ContractKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminationBreakdown {
  pub notice_days: u32,
  pub projected_end: NaiveDate,
  pub saldo_days: u32,
  pub saldo_salario: f64,
  pub aviso_previo: f64,
  pub thirteenth_twelfths: u32,
  pub decimo_terceiro: f64,
  pub vacation_twelfths: u32,
  pub ferias_vencidas: f64,
  pub ferias_proporcionais: f64,
  pub ferias_one_third: f64,
  pub fgts_deposit: f64,
  pub fgts_fine: f64,
  pub inss: f64,
  pub irrf: f64,
  pub gross: f64,
  pub net: f64,
}

pub fn calc_inss(base: f64, competence: Competence) -> Result<f64, AppError> {
  let table = tax_tables::inss_table(competence)?;
  Ok(inss_with_table(base, table))
}

fn inss_with_table(base: f64, table: &InssTable) -> f64 {
  if base <= 0.0 {
    return 0.0;
  }
  let capped = base.min(table.ceiling());
  let mut lower = 0.0;
  let mut total = 0.0;
  for band in table.bands {
    if capped <= lower {
      break;
    }
    let upper = capped.min(band.up_to);
    total += (upper - lower) * band.rate;
    lower = band.up_to;
  }
  round2(total)
}

/// Withholding on `gross`, using whichever is larger of the legal deductions
/// (INSS, dependents, alimony) and the simplified monthly discount.
pub fn calc_irrf(
  gross: f64,
  inss: f64,
  dependents: u32,
  alimony: f64,
  competence: Competence,
) -> Result<IrrfResult, AppError> {
  let table = tax_tables::irrf_table(competence)?;
  Ok(irrf_with_table(gross, inss, dependents, alimony, table))
}

fn irrf_with_table(gross: f64, inss: f64, dependents: u32, alimony: f64, table: &IrrfTable) -> IrrfResult {
  let legal = inss + dependents as f64 * table.dependent_deduction + alimony;
  let used_simplified = table.simplified_discount > legal;
  let deduction = if used_simplified { table.simplified_discount } else { legal };
  let base = round2((gross - deduction).max(0.0));

  let band = table
    .bands
    .iter()
    .find(|band| band.up_to.map_or(true, |limit| base <= limit));
  let tax = match band {
    Some(band) => round2((base * band.rate - band.deduction).max(0.0)),
    None => 0.0,
  };

  IrrfResult {
    base,
    tax,
    used_simplified,
  }
}

pub fn calc_fgts(base: f64, kind: ContractKind) -> f64 {
  if base <= 0.0 {
    0.0
  } else {
    round2(base * fgts_rate(kind))
  }
}

pub fn employer_charges(base: f64, profile: &EmployerProfile) -> EmployerCharges {
  if base <= 0.0 {
    return EmployerCharges::default();
  }
  match profile.regime {
    TaxRegime::Mei => EmployerCharges {
      cpp: round2(base * tax_tables::MEI_CPP_RATE),
      rat: 0.0,
      terceiros: 0.0,
    },
    TaxRegime::SimplesNacional => {
      if profile.anexo == Some(Anexo::IV) {
        EmployerCharges {
          cpp: round2(base * tax_tables::EMPLOYER_CPP_RATE),
          rat: round2(base * profile.rat_rate / 100.0),
          terceiros: 0.0,
        }
      } else {
        EmployerCharges::default()
      }
    }
    TaxRegime::LucroPresumido | TaxRegime::LucroReal => EmployerCharges {
      cpp: round2(base * tax_tables::EMPLOYER_CPP_RATE),
      rat: round2(base * profile.rat_rate / 100.0),
      terceiros: round2(base * tax_tables::EMPLOYER_TERCEIROS_RATE),
    },
  }
}

pub fn calc_monthly_payroll(input: &MonthlyPayrollInput) -> Result<PayrollBreakdown, AppError> {
  let gross = round2(input.base_salary + input.overtime + input.other_earnings);
  let inss = calc_inss(gross, input.competence)?;
  let irrf = calc_irrf(gross, inss, input.dependents, 0.0, input.competence)?.tax;
  let fgts = calc_fgts(gross, input.contract_kind);
  let other_discounts = round2(input.other_discounts);
  let net = round2(gross - inss - irrf - other_discounts);

  Ok(PayrollBreakdown {
    gross,
    inss,
    irrf,
    fgts,
    other_discounts,
    net,
    employer: employer_charges(gross, &input.employer),
  })
}

/// Partner withdrawal (RCI): 11 % INSS up to the contribution ceiling, then IRRF.
pub fn calc_pro_labore(
  amount: f64,
  dependents: u32,
  competence: Competence,
  employer: &EmployerProfile,
) -> Result<ProLaboreBreakdown, AppError> {
  let table = tax_tables::inss_table(competence)?;
  let amount = round2(amount);
  let inss = round2(amount.min(table.ceiling()) * tax_tables::CONTRIBUINTE_INDIVIDUAL_RATE);
  let irrf = calc_irrf(amount, inss, dependents, 0.0, competence)?.tax;
  let charges = employer_charges(amount, employer);

  Ok(ProLaboreBreakdown {
    amount,
    inss,
    irrf,
    net: round2(amount - inss - irrf),
    employer_cpp: charges.cpp,
  })
}

pub fn calc_vacation(input: &VacationCalcInput) -> Result<VacationBreakdown, AppError> {
  if input.days < MIN_VACATION_DAYS {
    return Err(AppError::new("INVALID_VACATION", "Ferias devem ter ao menos 5 dias"));
  }
  if input.sold_days > MAX_SOLD_DAYS {
    return Err(AppError::new("INVALID_VACATION", "Abono pecuniario limitado a 10 dias"));
  }
  if input.days + input.sold_days > 30 {
    return Err(AppError::new("INVALID_VACATION", "Ferias e abono excedem 30 dias"));
  }

  let daily = input.salary / 30.0;
  let vacation_pay = round2(daily * input.days as f64);
  let one_third = round2(vacation_pay / 3.0);
  let abono = round2(daily * input.sold_days as f64);
  let abono_one_third = round2(abono / 3.0);

  let taxable = vacation_pay + one_third;
  let inss = calc_inss(taxable, input.competence)?;
  let irrf = calc_irrf(taxable, inss, input.dependents, 0.0, input.competence)?.tax;
  let fgts = calc_fgts(taxable, input.contract_kind);

  Ok(VacationBreakdown {
    vacation_pay,
    one_third,
    abono,
    abono_one_third,
    inss,
    irrf,
    fgts,
    net: round2(taxable + abono + abono_one_third - inss - irrf),
  })
}

pub fn calc_thirteenth(input: &ThirteenthCalcInput) -> Result<ThirteenthBreakdown, AppError> {
  if input.months_worked == 0 || input.months_worked > 12 {
    return Err(AppError::new("INVALID_MONTHS", "Meses trabalhados devem estar entre 1 e 12"));
  }
  let full = round2(input.salary * input.months_worked as f64 / 12.0);

  match input.installment {
    Installment::Primeira => {
      let gross = round2(full / 2.0);
      Ok(ThirteenthBreakdown {
        gross,
        advance: 0.0,
        inss: 0.0,
        irrf: 0.0,
        fgts: calc_fgts(gross, input.contract_kind),
        net: gross,
      })
    }
    Installment::Segunda => {
      let advance = round2(input.first_installment_paid.max(0.0));
      let inss = calc_inss(full, input.competence)?;
      let irrf = calc_irrf(full, inss, input.dependents, 0.0, input.competence)?.tax;
      let fgts = calc_fgts(full - advance, input.contract_kind);
      Ok(ThirteenthBreakdown {
        gross: full,
        advance,
        inss,
        irrf,
        fgts,
        net: round2(full - advance - inss - irrf),
      })
    }
  }
}

pub fn notice_days(admission: NaiveDate, termination: NaiveDate) -> u32 {
  let years = full_years_between(admission, termination);
  (NOTICE_BASE_DAYS + NOTICE_DAYS_PER_YEAR * years).min(NOTICE_MAX_DAYS)
}

pub fn calc_termination(input: &TerminationCalcInput) -> Result<TerminationBreakdown, AppError> {
  if input.termination < input.admission {
    return Err(AppError::new("INVALID_DATE", "Data de desligamento anterior a admissao"));
  }

  let competence = Competence::of_date(input.termination);
  let daily = input.salary / 30.0;
  let monthly_twelfth = input.salary / 12.0;

  let saldo_days = input.termination.day().min(30);
  let saldo_salario = round2(daily * saldo_days as f64);

  let indemnified_notice = !input.notice_worked
    && matches!(input.reason, TerminationReason::SemJustaCausa | TerminationReason::Acordo);
  let notice_days = if indemnified_notice {
    notice_days(input.admission, input.termination)
  } else {
    0
  };
  let notice_factor = if input.reason == TerminationReason::Acordo { 0.5 } else { 1.0 };
  let aviso_previo = round2(daily * notice_days as f64 * notice_factor);
  let projected_end = input.termination + Duration::days(notice_days as i64);

  let keeps_proportionals = input.reason != TerminationReason::JustaCausa;

  let thirteenth_twelfths = if keeps_proportionals {
    let year_start = NaiveDate::from_ymd_opt(projected_end.year(), 1, 1).unwrap_or(input.admission);
    calendar_twelfths(input.admission.max(year_start), projected_end)
  } else {
    0
  };
  let decimo_terceiro = round2(monthly_twelfth * thirteenth_twelfths as f64);

  let vacation_twelfths = if keeps_proportionals {
    let period_start = current_acquisition_start(input.admission, projected_end);
    period_twelfths(period_start, projected_end)
  } else {
    0
  };
  let ferias_proporcionais = round2(monthly_twelfth * vacation_twelfths as f64);
  let ferias_vencidas = round2(input.salary * input.vested_vacation_periods as f64);
  let ferias_one_third = round2((ferias_vencidas + ferias_proporcionais) / 3.0);

  let fgts_deposit = calc_fgts(saldo_salario + aviso_previo + decimo_terceiro, input.contract_kind);
  let fine_rate = match input.reason {
    TerminationReason::SemJustaCausa => 0.40,
    TerminationReason::Acordo => 0.20,
    _ => 0.0,
  };
  let fgts_fine = round2((input.fgts_balance.max(0.0) + fgts_deposit) * fine_rate);

  let inss_saldo = calc_inss(saldo_salario, competence)?;
  let irrf_saldo = calc_irrf(saldo_salario, inss_saldo, input.dependents, 0.0, competence)?.tax;
  let inss_13 = calc_inss(decimo_terceiro, competence)?;
  let irrf_13 = calc_irrf(decimo_terceiro, inss_13, input.dependents, 0.0, competence)?.tax;

  let inss = round2(inss_saldo + inss_13);
  let irrf = round2(irrf_saldo + irrf_13);
  let gross = round2(
    saldo_salario + aviso_previo + decimo_terceiro + ferias_vencidas + ferias_proporcionais + ferias_one_third,
  );
  let advance = if keeps_proportionals { input.thirteenth_advance_paid.max(0.0) } else { 0.0 };
  let net = round2(gross - inss - irrf - advance);

  Ok(TerminationBreakdown {
    notice_days,
    projected_end,
    saldo_days,
    saldo_salario,
    aviso_previo,
    thirteenth_twelfths,
    decimo_terceiro,
    vacation_twelfths,
    ferias_vencidas,
    ferias_proporcionais,
    ferias_one_third,
    fgts_deposit,
    fgts_fine,
    inss,
    irrf,
    gross,
    net,
  })
}

/// Calendar months between `start` and `end` (inclusive) with at least 15 days
/// worked. Used for the 13th salary, which accrues per calendar month.
pub fn calendar_twelfths(start: NaiveDate, end: NaiveDate) -> u32 {
  if end < start {
    return 0;
  }
  let mut count = 0;
  let mut cursor = Competence::of_date(start);
  let last = Competence::of_date(end);
  while cursor <= last {
    let from = cursor.first_day().max(start);
    let to = cursor.last_day().min(end);
    if (to - from).num_days() + 1 >= 15 {
      count += 1;
    }
    cursor = if cursor.month == 12 {
      Competence { year: cursor.year + 1, month: 1 }
    } else {
      Competence { year: cursor.year, month: cursor.month + 1 }
    };
  }
  count
}

/// Twelfths of an acquisition period starting at `start`: whole months, plus
/// one more for a trailing fraction of 15 days or more. Capped at 12.
pub fn period_twelfths(start: NaiveDate, end: NaiveDate) -> u32 {
  if end < start {
    return 0;
  }
  let mut whole = 0u32;
  while whole < 12 {
    match start.checked_add_months(Months::new(whole + 1)) {
      Some(next) if next <= end + Duration::days(1) => whole += 1,
      _ => break,
    }
  }
  if whole >= 12 {
    return 12;
  }
  let fraction_start = start.checked_add_months(Months::new(whole)).unwrap_or(start);
  let fraction_days = (end - fraction_start).num_days() + 1;
  if fraction_days >= 15 {
    whole + 1
  } else {
    whole
  }
}

pub fn full_years_between(start: NaiveDate, end: NaiveDate) -> u32 {
  let mut years = 0u32;
  while let Some(next) = start.checked_add_months(Months::new(12 * (years + 1))) {
    if next > end {
      break;
    }
    years += 1;
  }
  years
}

fn current_acquisition_start(admission: NaiveDate, end: NaiveDate) -> NaiveDate {
  let years = full_years_between(admission, end);
  admission
    .checked_add_months(Months::new(12 * years))
    .unwrap_or(admission)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn comp(year: i32, month: u32) -> Competence {
    Competence { year, month }
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn presumido() -> EmployerProfile {
    EmployerProfile {
      regime: TaxRegime::LucroPresumido,
      anexo: None,
      rat_rate: 2.0,
    }
  }

  #[test]
  fn inss_is_progressive_per_band() {
    assert_eq!(calc_inss(3000.0, comp(2025, 3)).unwrap(), 253.41);
    assert_eq!(calc_inss(1518.0, comp(2025, 3)).unwrap(), 113.85);
  }

  #[test]
  fn inss_is_capped_at_ceiling() {
    let at_ceiling = calc_inss(8157.41, comp(2025, 3)).unwrap();
    assert_eq!(at_ceiling, 951.63);
    assert_eq!(calc_inss(20_000.0, comp(2025, 3)).unwrap(), at_ceiling);
  }

  #[test]
  fn irrf_prefers_simplified_discount_when_larger() {
    let result = calc_irrf(5000.0, 509.60, 0, 0.0, comp(2025, 6)).unwrap();
    assert!(result.used_simplified);
    assert_eq!(result.base, 4392.80);
    assert_eq!(result.tax, 312.89);
  }

  #[test]
  fn irrf_uses_previous_table_before_may_2025() {
    let result = calc_irrf(5000.0, 509.60, 0, 0.0, comp(2025, 3)).unwrap();
    assert_eq!(result.base, 4435.20);
    assert_eq!(result.tax, 335.15);
  }

  #[test]
  fn irrf_uses_legal_deductions_with_dependents() {
    let result = calc_irrf(5000.0, 509.60, 2, 0.0, comp(2025, 6)).unwrap();
    assert!(!result.used_simplified);
    assert_eq!(result.base, 4111.22);
  }

  #[test]
  fn irrf_is_zero_in_exempt_band() {
    let result = calc_irrf(3000.0, 253.41, 0, 0.0, comp(2025, 6)).unwrap();
    assert_eq!(result.tax, 0.0);
  }

  #[test]
  fn monthly_payroll_adds_employer_charges_outside_simples() {
    let input = MonthlyPayrollInput {
      competence: comp(2025, 6),
      base_salary: 3000.0,
      overtime: 0.0,
      other_earnings: 0.0,
      other_discounts: 100.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
      employer: presumido(),
    };
    let breakdown = calc_monthly_payroll(&input).unwrap();
    assert_eq!(breakdown.gross, 3000.0);
    assert_eq!(breakdown.inss, 253.41);
    assert_eq!(breakdown.irrf, 0.0);
    assert_eq!(breakdown.fgts, 240.0);
    assert_eq!(breakdown.net, 2646.59);
    assert_eq!(breakdown.employer.cpp, 600.0);
    assert_eq!(breakdown.employer.rat, 60.0);
    assert_eq!(breakdown.employer.terceiros, 174.0);
  }

  #[test]
  fn simples_outside_anexo_iv_has_no_employer_cpp() {
    let profile = EmployerProfile {
      regime: TaxRegime::SimplesNacional,
      anexo: Some(Anexo::III),
      rat_rate: 1.0,
    };
    assert_eq!(employer_charges(3000.0, &profile), EmployerCharges::default());
  }

  #[test]
  fn apprentice_fgts_is_two_percent() {
    assert_eq!(calc_fgts(1518.0, ContractKind::Aprendiz), 30.36);
  }

  #[test]
  fn pro_labore_caps_inss_at_ceiling() {
    let breakdown = calc_pro_labore(10_000.0, 0, comp(2025, 6), &presumido()).unwrap();
    assert_eq!(breakdown.inss, 897.32);
    assert_eq!(breakdown.employer_cpp, 2000.0);
  }

  #[test]
  fn vacation_adds_one_third_and_untaxed_abono() {
    let input = VacationCalcInput {
      competence: comp(2025, 6),
      salary: 3000.0,
      days: 20,
      sold_days: 10,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_vacation(&input).unwrap();
    assert_eq!(breakdown.vacation_pay, 2000.0);
    assert_eq!(breakdown.one_third, 666.67);
    assert_eq!(breakdown.abono, 1000.0);
    assert_eq!(breakdown.abono_one_third, 333.33);
    assert_eq!(breakdown.fgts, 213.33);
  }

  #[test]
  fn vacation_rejects_too_many_days() {
    let input = VacationCalcInput {
      competence: comp(2025, 6),
      salary: 3000.0,
      days: 25,
      sold_days: 10,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    assert_eq!(calc_vacation(&input).unwrap_err().code, "INVALID_VACATION");
  }

  #[test]
  fn thirteenth_first_installment_has_no_discounts() {
    let input = ThirteenthCalcInput {
      competence: comp(2025, 11),
      salary: 3000.0,
      months_worked: 12,
      installment: Installment::Primeira,
      first_installment_paid: 0.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_thirteenth(&input).unwrap();
    assert_eq!(breakdown.gross, 1500.0);
    assert_eq!(breakdown.net, 1500.0);
    assert_eq!(breakdown.fgts, 120.0);
  }

  #[test]
  fn thirteenth_second_installment_discounts_advance() {
    let input = ThirteenthCalcInput {
      competence: comp(2025, 12),
      salary: 3000.0,
      months_worked: 12,
      installment: Installment::Segunda,
      first_installment_paid: 1500.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_thirteenth(&input).unwrap();
    assert_eq!(breakdown.gross, 3000.0);
    assert_eq!(breakdown.inss, 253.41);
    assert_eq!(breakdown.net, 1246.59);
    assert_eq!(breakdown.fgts, 120.0);
  }

  #[test]
  fn twelfths_count_months_with_fifteen_days() {
    assert_eq!(calendar_twelfths(date(2025, 1, 1), date(2025, 3, 14)), 2);
    assert_eq!(calendar_twelfths(date(2025, 1, 18), date(2025, 3, 15)), 2);
    assert_eq!(period_twelfths(date(2024, 3, 10), date(2024, 9, 9)), 6);
    assert_eq!(period_twelfths(date(2024, 3, 10), date(2024, 9, 24)), 7);
  }

  #[test]
  fn notice_grows_three_days_per_year_up_to_ninety() {
    assert_eq!(notice_days(date(2020, 1, 10), date(2025, 1, 10)), 45);
    assert_eq!(notice_days(date(2000, 1, 1), date(2025, 1, 1)), 90);
    assert_eq!(notice_days(date(2025, 1, 1), date(2025, 6, 1)), 30);
  }

  #[test]
  fn termination_without_cause_projects_notice() {
    let input = TerminationCalcInput {
      salary: 3000.0,
      admission: date(2023, 3, 1),
      termination: date(2025, 6, 10),
      reason: TerminationReason::SemJustaCausa,
      notice_worked: false,
      vested_vacation_periods: 0,
      thirteenth_advance_paid: 0.0,
      fgts_balance: 5000.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_termination(&input).unwrap();
    assert_eq!(breakdown.notice_days, 36);
    assert_eq!(breakdown.projected_end, date(2025, 7, 16));
    assert_eq!(breakdown.saldo_salario, 1000.0);
    assert_eq!(breakdown.aviso_previo, 3600.0);
    assert_eq!(breakdown.thirteenth_twelfths, 7);
    assert_eq!(breakdown.decimo_terceiro, 1750.0);
    assert_eq!(breakdown.vacation_twelfths, 5);
    assert_eq!(breakdown.ferias_proporcionais, 1250.0);
    assert_eq!(breakdown.fgts_deposit, 508.0);
    assert_eq!(breakdown.fgts_fine, 2203.2);
  }

  #[test]
  fn termination_for_cause_keeps_only_salary_and_vested_vacation() {
    let input = TerminationCalcInput {
      salary: 3000.0,
      admission: date(2023, 3, 1),
      termination: date(2025, 6, 10),
      reason: TerminationReason::JustaCausa,
      notice_worked: false,
      vested_vacation_periods: 1,
      thirteenth_advance_paid: 0.0,
      fgts_balance: 5000.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_termination(&input).unwrap();
    assert_eq!(breakdown.notice_days, 0);
    assert_eq!(breakdown.aviso_previo, 0.0);
    assert_eq!(breakdown.decimo_terceiro, 0.0);
    assert_eq!(breakdown.ferias_proporcionais, 0.0);
    assert_eq!(breakdown.ferias_vencidas, 3000.0);
    assert_eq!(breakdown.ferias_one_third, 1000.0);
    assert_eq!(breakdown.fgts_fine, 0.0);
  }

  #[test]
  fn agreement_halves_notice_and_fine() {
    let input = TerminationCalcInput {
      salary: 3000.0,
      admission: date(2024, 1, 1),
      termination: date(2025, 1, 31),
      reason: TerminationReason::Acordo,
      notice_worked: false,
      vested_vacation_periods: 0,
      thirteenth_advance_paid: 0.0,
      fgts_balance: 0.0,
      dependents: 0,
      contract_kind: ContractKind::Clt,
    };
    let breakdown = calc_termination(&input).unwrap();
    assert_eq!(breakdown.notice_days, 33);
    assert_eq!(breakdown.aviso_previo, 1650.0);
  }
}
