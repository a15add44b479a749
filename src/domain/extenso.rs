//! Amounts in words (pt-BR) for receipts, and BRL display formatting.

const UNITS: [&str; 20] = [
  "zero", "um", "dois", "três", "quatro", "cinco", "seis", "sete", "oito", "nove", "dez", "onze",
  "doze", "treze", "quatorze", "quinze", "dezesseis", "dezessete", "dezoito", "dezenove",
];
const TENS: [&str; 10] = [
  "", "", "vinte", "trinta", "quarenta", "cinquenta", "sessenta", "setenta", "oitenta", "noventa",
];
const HUNDREDS: [&str; 10] = [
  "", "cento", "duzentos", "trezentos", "quatrocentos", "quinhentos", "seiscentos", "setecentos",
  "oitocentos", "novecentos",
];

/// Writes a value in reais and centavos, e.g. `1234.56` ->
/// "mil duzentos e trinta e quatro reais e cinquenta e seis centavos".
pub fn valor_por_extenso(value: f64) -> String {
  let total_cents = (value.abs() * 100.0).round() as u64;
  let reais = total_cents / 100;
  let centavos = total_cents % 100;

  let mut parts = Vec::new();
  if reais > 0 {
    let unit = if reais == 1 { "real" } else { "reais" };
    let words = integer_words(reais);
    // "um milhão de reais", "dois bilhões de reais"
    let connector = if reais >= 1_000_000 && reais % 1_000_000 == 0 { " de " } else { " " };
    parts.push(format!("{words}{connector}{unit}"));
  }
  if centavos > 0 {
    let unit = if centavos == 1 { "centavo" } else { "centavos" };
    parts.push(format!("{} {unit}", integer_words(centavos)));
  }
  if parts.is_empty() {
    return "zero reais".to_string();
  }
  let text = parts.join(" e ");
  if value < 0.0 {
    format!("menos {text}")
  } else {
    text
  }
}

pub fn integer_words(value: u64) -> String {
  if value == 0 {
    return UNITS[0].to_string();
  }

  const SCALES: [(&str, &str); 4] = [("", ""), ("mil", "mil"), ("milhão", "milhões"), ("bilhão", "bilhões")];

  let mut groups = Vec::new();
  let mut rest = value;
  while rest > 0 {
    groups.push(rest % 1000);
    rest /= 1000;
  }

  let mut chunks: Vec<(u64, String)> = Vec::new();
  for (index, group) in groups.iter().enumerate().rev() {
    if *group == 0 {
      continue;
    }
    let (singular, plural) = SCALES.get(index).copied().unwrap_or(("", ""));
    let text = match index {
      0 => hundreds_words(*group),
      1 if *group == 1 => singular.to_string(),
      _ => {
        let scale = if *group == 1 { singular } else { plural };
        format!("{} {scale}", hundreds_words(*group))
      }
    };
    chunks.push((*group, text));
  }

  let mut out = String::new();
  for (position, (group, text)) in chunks.iter().enumerate() {
    if position > 0 {
      let is_last = position == chunks.len() - 1;
      if is_last && (*group < 100 || group % 100 == 0) {
        out.push_str(" e ");
      } else {
        out.push(' ');
      }
    }
    out.push_str(text);
  }
  out
}

fn hundreds_words(value: u64) -> String {
  if value == 100 {
    return "cem".to_string();
  }
  let hundreds = (value / 100) as usize;
  let remainder = value % 100;

  let mut parts: Vec<String> = Vec::new();
  if hundreds > 0 {
    parts.push(HUNDREDS[hundreds].to_string());
  }
  if remainder > 0 {
    if remainder < 20 {
      parts.push(UNITS[remainder as usize].to_string());
    } else {
      let tens = TENS[(remainder / 10) as usize];
      let units = remainder % 10;
      if units == 0 {
        parts.push(tens.to_string());
      } else {
        parts.push(format!("{tens} e {}", UNITS[units as usize]));
      }
    }
  }
  parts.join(" e ")
}

/// `1234.5` -> `R$ 1.234,50`.
pub fn format_brl(value: f64) -> String {
  let total_cents = (value.abs() * 100.0).round() as u64;
  let reais = (total_cents / 100).to_string();
  let cents = total_cents % 100;

  let mut grouped = String::new();
  for (i, ch) in reais.chars().enumerate() {
    if i > 0 && (reais.len() - i) % 3 == 0 {
      grouped.push('.');
    }
    grouped.push(ch);
  }
  let sign = if value < 0.0 && total_cents > 0 { "-" } else { "" };
  format!("{sign}R$ {grouped},{cents:02}")
}
