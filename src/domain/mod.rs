pub mod closing;
pub mod competence;
pub mod extenso;
pub mod payroll;
pub mod simples;
pub mod tax_tables;
pub mod validation;

pub use competence::Competence;

/// Rounds a monetary value to cents, half away from zero.
pub fn round2(value: f64) -> f64 {
  let rounded = (value * 100.0).round() / 100.0;
  if rounded == 0.0 {
    0.0
  } else {
    rounded
  }
}
