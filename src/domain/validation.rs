use chrono::NaiveDate;

use crate::error::AppError;

const UFS: [&str; 27] = [
  "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
  "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

pub fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
  NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
    .map_err(|_| AppError::new("INVALID_DATE", "Data deve estar no formato AAAA-MM-DD"))
}

pub fn only_digits(value: &str) -> String {
  value.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn is_valid_cpf(value: &str) -> bool {
  let digits = digit_values(value);
  if digits.len() != 11 || all_equal(&digits) {
    return false;
  }
  let first = cpf_check_digit(&digits[..9]);
  let second = cpf_check_digit(&digits[..10]);
  digits[9] == first && digits[10] == second
}

pub fn is_valid_cnpj(value: &str) -> bool {
  let digits = digit_values(value);
  if digits.len() != 14 || all_equal(&digits) {
    return false;
  }
  const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
  const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
  let first = mod11_digit(&digits[..12], &FIRST_WEIGHTS);
  let second = mod11_digit(&digits[..13], &SECOND_WEIGHTS);
  digits[12] == first && digits[13] == second
}

/// Accepts either a CPF or a CNPJ, by digit count.
pub fn is_valid_document(value: &str) -> bool {
  match only_digits(value).len() {
    11 => is_valid_cpf(value),
    14 => is_valid_cnpj(value),
    _ => false,
  }
}

pub fn format_cpf(value: &str) -> String {
  let d = only_digits(value);
  if d.len() != 11 {
    return value.to_string();
  }
  format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
}

pub fn format_cnpj(value: &str) -> String {
  let d = only_digits(value);
  if d.len() != 14 {
    return value.to_string();
  }
  format!("{}.{}.{}/{}-{}", &d[0..2], &d[2..5], &d[5..8], &d[8..12], &d[12..14])
}

pub fn ensure_cpf(value: &str) -> Result<String, AppError> {
  if is_valid_cpf(value) {
    Ok(only_digits(value))
  } else {
    Err(AppError::new("INVALID_CPF", "CPF invalido"))
  }
}

pub fn ensure_cnpj(value: &str) -> Result<String, AppError> {
  if is_valid_cnpj(value) {
    Ok(only_digits(value))
  } else {
    Err(AppError::new("INVALID_CNPJ", "CNPJ invalido"))
  }
}

pub fn ensure_document(value: &str) -> Result<String, AppError> {
  if is_valid_document(value) {
    Ok(only_digits(value))
  } else {
    Err(AppError::new("INVALID_DOCUMENT", "CPF/CNPJ invalido"))
  }
}

/// PIS/PASEP/NIT: 11 digits with a weighted mod-11 check digit.
pub fn ensure_pis(value: &str) -> Result<String, AppError> {
  const WEIGHTS: [u32; 10] = [3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
  let digits = digit_values(value);
  let valid = digits.len() == 11 && !all_equal(&digits) && {
    let sum: u32 = digits[..10].iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    let rest = 11 - (sum % 11);
    let check = if rest >= 10 { 0 } else { rest };
    digits[10] == check
  };
  if valid {
    Ok(only_digits(value))
  } else {
    Err(AppError::new("INVALID_PIS", "PIS/NIT invalido"))
  }
}

pub fn ensure_amount_positive(amount: f64) -> Result<(), AppError> {
  if amount.is_finite() && amount > 0.0 {
    Ok(())
  } else {
    Err(AppError::new("INVALID_AMOUNT", "Valor deve ser maior que zero"))
  }
}

pub fn ensure_non_negative(amount: f64, field: &str) -> Result<(), AppError> {
  if amount.is_finite() && amount >= 0.0 {
    Ok(())
  } else {
    Err(AppError::new("INVALID_AMOUNT", format!("{field} nao pode ser negativo")))
  }
}

pub fn ensure_not_blank(value: &str, field: &str) -> Result<String, AppError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    Err(AppError::new("REQUIRED", format!("{field} e obrigatorio")))
  } else {
    Ok(trimmed.to_string())
  }
}

pub fn ensure_email(value: &str) -> Result<String, AppError> {
  let trimmed = value.trim().to_lowercase();
  let valid = match trimmed.split_once('@') {
    Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
    None => false,
  };
  if valid && !trimmed.contains(char::is_whitespace) {
    Ok(trimmed)
  } else {
    Err(AppError::new("INVALID_EMAIL", "E-mail invalido"))
  }
}

pub fn ensure_uf(value: &str) -> Result<String, AppError> {
  let upper = value.trim().to_uppercase();
  if UFS.contains(&upper.as_str()) {
    Ok(upper)
  } else {
    Err(AppError::new("INVALID_UF", "UF invalida"))
  }
}

pub fn ensure_month(month: i32) -> Result<(), AppError> {
  if !(1..=12).contains(&month) {
    Err(AppError::new("INVALID_MONTH", "Mes deve estar entre 1 e 12"))
  } else {
    Ok(())
  }
}

fn digit_values(value: &str) -> Vec<u32> {
  value.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_equal(digits: &[u32]) -> bool {
  digits.windows(2).all(|pair| pair[0] == pair[1])
}

fn cpf_check_digit(digits: &[u32]) -> u32 {
  let start = digits.len() as u32 + 1;
  let sum: u32 = digits
    .iter()
    .enumerate()
    .map(|(i, d)| d * (start - i as u32))
    .sum();
  let rest = (sum * 10) % 11;
  if rest == 10 {
    0
  } else {
    rest
  }
}

fn mod11_digit(digits: &[u32], weights: &[u32]) -> u32 {
  let sum: u32 = digits.iter().zip(weights.iter()).map(|(d, w)| d * w).sum();
  let rest = sum % 11;
  if rest < 2 {
    0
  } else {
    11 - rest
  }
}
