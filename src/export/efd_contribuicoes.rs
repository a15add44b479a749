//! EFD-Contribuicoes (PIS/COFINS) pipe-delimited file for one competence.
//!
//! Blocks are written in the official order 0, A, C, D, F, I, M, P, 1, 9. Every
//! block ends with its `X990` line count and block 9 carries the per-register
//! totals.

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::domain::tax_tables::{
  COFINS_CUMULATIVE_RATE, COFINS_NON_CUMULATIVE_RATE, PIS_CUMULATIVE_RATE, PIS_NON_CUMULATIVE_RATE,
};
use crate::domain::{round2, validation, Competence};
use crate::error::AppError;
use crate::launches;
use crate::models::{Company, Direction, Launch, LaunchKind, Party, TaxRegime};

const LAYOUT_VERSION: &str = "006";
const COUNTRY_BRAZIL: &str = "01058";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Incidence {
  Cumulative,
  NonCumulative,
}

impl Incidence {
  fn of(regime: TaxRegime) -> Result<Self, AppError> {
    match regime {
      TaxRegime::LucroPresumido => Ok(Incidence::Cumulative),
      TaxRegime::LucroReal => Ok(Incidence::NonCumulative),
      TaxRegime::SimplesNacional | TaxRegime::Mei => Err(AppError::new(
        "REGIME_NOT_SUPPORTED",
        "Empresas do Simples Nacional e MEI nao entregam EFD-Contribuicoes",
      )),
    }
  }

  fn rates(&self) -> (f64, f64) {
    match self {
      Incidence::Cumulative => (PIS_CUMULATIVE_RATE, COFINS_CUMULATIVE_RATE),
      Incidence::NonCumulative => (PIS_NON_CUMULATIVE_RATE, COFINS_NON_CUMULATIVE_RATE),
    }
  }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EfdContribuicoes {
  pub file_name: String,
  pub content: String,
  pub line_count: usize,
  pub revenue: f64,
  pub pis_due: f64,
  pub cofins_due: f64,
  pub saved_path: Option<String>,
}

/// Contribution totals of one tax (PIS or COFINS), as reported in M200/M600.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Contribution {
  period: f64,
  credits: f64,
  retained: f64,
  due: f64,
}

impl Contribution {
  fn compute(base: f64, credit_base: f64, retained: f64, rate: f64, incidence: Incidence) -> Self {
    let period = round2(base * rate);
    let credits = match incidence {
      Incidence::NonCumulative => round2(credit_base * rate).min(period),
      Incidence::Cumulative => 0.0,
    };
    let after_credits = round2(period - credits);
    let retained = round2(retained.min(after_credits));
    Self {
      period,
      credits,
      retained,
      due: round2(after_credits - retained),
    }
  }

  fn fields(&self, incidence: Incidence) -> Vec<String> {
    let zero = decimal(0.0);
    match incidence {
      Incidence::NonCumulative => vec![
        decimal(self.period),
        decimal(self.credits),
        zero.clone(),
        decimal(round2(self.period - self.credits)),
        decimal(self.retained),
        zero.clone(),
        decimal(self.due),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        zero,
        decimal(self.due),
      ],
      Incidence::Cumulative => vec![
        zero.clone(),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        decimal(self.period),
        decimal(self.retained),
        zero,
        decimal(self.due),
        decimal(self.due),
      ],
    }
  }
}

/// Accumulates register lines and the counters needed by the X990 and 9900 lines.
struct SpedWriter {
  lines: Vec<String>,
  counts: Vec<(String, usize)>,
  block_start: usize,
}

impl SpedWriter {
  fn new() -> Self {
    Self {
      lines: Vec::new(),
      counts: Vec::new(),
      block_start: 0,
    }
  }

  fn push(&mut self, register: &str, fields: &[&str]) {
    let mut line = format!("|{register}|");
    for value in fields {
      line.push_str(&clean(value));
      line.push('|');
    }
    self.lines.push(line);
    match self.counts.iter_mut().find(|(name, _)| name == register) {
      Some((_, count)) => *count += 1,
      None => self.counts.push((register.to_string(), 1)),
    }
  }

  fn push_values(&mut self, register: &str, fields: &[String]) {
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    self.push(register, &refs);
  }

  fn open_block(&mut self, block: &str, has_data: bool) {
    self.block_start = self.lines.len();
    self.push(&format!("{block}001"), &[if has_data { "0" } else { "1" }]);
  }

  fn close_block(&mut self, block: &str) {
    let qty = self.lines.len() - self.block_start + 1;
    self.push(&format!("{block}990"), &[qty.to_string().as_str()]);
  }

  fn empty_block(&mut self, block: &str) {
    self.open_block(block, false);
    self.close_block(block);
  }

  fn finish(mut self) -> (String, usize) {
    self.block_start = self.lines.len();
    self.push("9001", &["0"]);

    let mut registers = self.counts.clone();
    for closing in ["9900", "9990", "9999"] {
      registers.push((closing.to_string(), 1));
    }
    let distinct = registers.len();
    for (register, count) in &registers {
      let count = if register == "9900" { distinct } else { *count };
      self.lines.push(format!("|9900|{register}|{count}|"));
    }
    self.lines.push(format!("|9990|{}|", distinct + 3));
    let total = self.lines.len() + 1;
    self.lines.push(format!("|9999|{total}|"));

    let mut content = self.lines.join("\r\n");
    content.push_str("\r\n");
    (content, total)
  }
}

fn clean(value: &str) -> String {
  value.replace(['|', '\r', '\n'], " ").trim().to_string()
}

fn decimal(value: f64) -> String {
  format!("{:.2}", round2(value)).replace('.', ",")
}

fn sped_date(value: &str) -> Result<String, AppError> {
  Ok(validation::parse_date(value)?.format("%d%m%Y").to_string())
}

fn counterpart(launch: &Launch) -> Option<&Party> {
  match launch.direction {
    Direction::Saida => launch.destinatario.as_ref(),
    Direction::Entrada => Some(&launch.emitente),
  }
}

fn operation_flags(launch: &Launch) -> (&'static str, &'static str) {
  match launch.direction {
    Direction::Entrada => ("0", "1"),
    Direction::Saida => ("1", "0"),
  }
}

/// Builds the file from already loaded launches of the competence.
pub fn build_efd_contribuicoes(
  company: &Company,
  competence: Competence,
  items: &[Launch],
) -> Result<EfdContribuicoes, AppError> {
  let incidence = Incidence::of(company.regime)?;
  let accountant_name = company.accountant.nome.as_deref().unwrap_or("").trim();
  let accountant_cpf = company.accountant.cpf.as_deref().unwrap_or("").trim();
  if accountant_name.is_empty() || accountant_cpf.is_empty() {
    return Err(AppError::new(
      "ACCOUNTANT_REQUIRED",
      "Informe nome e CPF do contador responsavel",
    ));
  }

  let (pis_rate, cofins_rate) = incidence.rates();
  let active: Vec<&Launch> = items.iter().filter(|launch| launch.total > 0.0).collect();
  let services: Vec<&Launch> = active.iter().copied().filter(|launch| launch.kind != LaunchKind::Nfe).collect();
  let goods: Vec<&Launch> = active.iter().copied().filter(|launch| launch.kind == LaunchKind::Nfe).collect();

  let start = competence.first_day().format("%d%m%Y").to_string();
  let end = competence.last_day().format("%d%m%Y").to_string();
  let activity = if goods.iter().any(|launch| launch.direction == Direction::Saida) {
    "2"
  } else {
    "1"
  };
  let municipality = company.address.codigo_municipio.clone().unwrap_or_default();

  let mut writer = SpedWriter::new();

  writer.push(
    "0000",
    &[
      LAYOUT_VERSION,
      "0",
      "",
      "",
      &start,
      &end,
      &company.razao_social,
      &company.cnpj,
      &company.address.uf,
      &municipality,
      "",
      "00",
      activity,
    ],
  );
  writer.push("0001", &["0"]);
  writer.push(
    "0100",
    &[
      accountant_name,
      accountant_cpf,
      company.accountant.crc.as_deref().unwrap_or(""),
      "",
      company.address.cep.as_deref().unwrap_or(""),
      company.address.logradouro.as_deref().unwrap_or(""),
      company.address.numero.as_deref().unwrap_or(""),
      company.address.complemento.as_deref().unwrap_or(""),
      company.address.bairro.as_deref().unwrap_or(""),
      company.telefone.as_deref().unwrap_or(""),
      "",
      company.email.as_deref().unwrap_or(""),
      &municipality,
    ],
  );
  match incidence {
    Incidence::Cumulative => writer.push("0110", &["2", "1", "1", "9"]),
    Incidence::NonCumulative => writer.push("0110", &["1", "1", "1", ""]),
  }
  writer.push(
    "0140",
    &[
      "",
      company.razao_social.as_str(),
      company.cnpj.as_str(),
      company.address.uf.as_str(),
      company.inscricao_estadual.as_deref().unwrap_or(""),
      municipality.as_str(),
      company.inscricao_municipal.as_deref().unwrap_or(""),
      "",
    ],
  );
  let mut participants: Vec<&Party> = Vec::new();
  for party in active.iter().filter_map(|launch| counterpart(launch)) {
    if party.document != company.cnpj && !participants.iter().any(|known| known.document == party.document) {
      participants.push(party);
    }
  }
  for party in &participants {
    let (cnpj, cpf) = if party.document.len() == 14 {
      (party.document.as_str(), "")
    } else {
      ("", party.document.as_str())
    };
    writer.push(
      "0150",
      &[
        party.document.as_str(),
        party.name.as_str(),
        COUNTRY_BRAZIL,
        cnpj,
        cpf,
        "",
        "",
        "",
        "",
        "",
        "",
        "",
      ],
    );
  }
  writer.close_block("0");

  writer.open_block("A", !services.is_empty());
  if !services.is_empty() {
    writer.push("A010", &[company.cnpj.as_str()]);
    for launch in &services {
      let (ind_oper, ind_emit) = operation_flags(launch);
      let (base, pis, cofins) = contribution_fields(launch, incidence, pis_rate, cofins_rate);
      writer.push_values(
        "A100",
        &[
          ind_oper.to_string(),
          ind_emit.to_string(),
          counterpart(launch).map(|party| party.document.clone()).unwrap_or_default(),
          "00".to_string(),
          launch.series.clone().unwrap_or_default(),
          String::new(),
          launch.number.clone(),
          launch.access_key.clone().unwrap_or_default(),
          sped_date(&launch.issue_date)?,
          sped_date(&launch.issue_date)?,
          decimal(launch.total),
          "1".to_string(),
          decimal(0.0),
          base.clone(),
          pis,
          base,
          cofins,
          decimal(launch.taxes.ret_pis),
          decimal(launch.taxes.ret_cofins),
          decimal(launch.taxes.iss),
        ],
      );
    }
  }
  writer.close_block("A");

  writer.open_block("C", !goods.is_empty());
  if !goods.is_empty() {
    writer.push("C010", &[company.cnpj.as_str(), "2"]);
    for launch in &goods {
      let (ind_oper, ind_emit) = operation_flags(launch);
      let (_, pis, cofins) = contribution_fields(launch, incidence, pis_rate, cofins_rate);
      let icms_base = if launch.taxes.icms > 0.0 { launch.total } else { 0.0 };
      writer.push_values(
        "C100",
        &[
          ind_oper.to_string(),
          ind_emit.to_string(),
          counterpart(launch).map(|party| party.document.clone()).unwrap_or_default(),
          "55".to_string(),
          "00".to_string(),
          launch.series.clone().unwrap_or_default(),
          launch.number.clone(),
          launch.access_key.clone().unwrap_or_default(),
          sped_date(&launch.issue_date)?,
          sped_date(&launch.issue_date)?,
          decimal(launch.total),
          "1".to_string(),
          decimal(0.0),
          decimal(0.0),
          decimal(launch.total),
          "9".to_string(),
          decimal(0.0),
          decimal(0.0),
          decimal(0.0),
          decimal(icms_base),
          decimal(launch.taxes.icms),
          decimal(0.0),
          decimal(0.0),
          decimal(launch.taxes.ipi),
          pis,
          cofins,
          decimal(0.0),
          decimal(0.0),
        ],
      );
    }
  }
  writer.close_block("C");

  writer.empty_block("D");
  writer.empty_block("F");
  writer.empty_block("I");

  let revenue = round2(
    active
      .iter()
      .filter(|launch| launch.direction == Direction::Saida)
      .map(|launch| launch.total)
      .sum(),
  );
  let purchases = round2(
    active
      .iter()
      .filter(|launch| launch.direction == Direction::Entrada)
      .map(|launch| launch.total)
      .sum(),
  );
  let retained_pis: f64 = active
    .iter()
    .filter(|launch| launch.direction == Direction::Saida)
    .map(|launch| launch.taxes.ret_pis)
    .sum();
  let retained_cofins: f64 = active
    .iter()
    .filter(|launch| launch.direction == Direction::Saida)
    .map(|launch| launch.taxes.ret_cofins)
    .sum();
  let pis = Contribution::compute(revenue, purchases, retained_pis, pis_rate, incidence);
  let cofins = Contribution::compute(revenue, purchases, retained_cofins, cofins_rate, incidence);

  writer.open_block("M", true);
  writer.push_values("M200", &pis.fields(incidence));
  writer.push_values("M600", &cofins.fields(incidence));
  writer.close_block("M");

  writer.empty_block("P");
  writer.empty_block("1");

  let (content, line_count) = writer.finish();
  Ok(EfdContribuicoes {
    file_name: format!(
      "EFD_CONTRIBUICOES_{}_{}{:02}.txt",
      company.cnpj, competence.year, competence.month
    ),
    content,
    line_count,
    revenue,
    pis_due: pis.due,
    cofins_due: cofins.due,
    saved_path: None,
  })
}

/// Base, PIS and COFINS columns of a document line. Incoming documents only
/// carry values when they generate credits.
fn contribution_fields(launch: &Launch, incidence: Incidence, pis_rate: f64, cofins_rate: f64) -> (String, String, String) {
  let taxed = launch.direction == Direction::Saida || incidence == Incidence::NonCumulative;
  if !taxed {
    return (decimal(0.0), decimal(0.0), decimal(0.0));
  }
  (
    decimal(launch.total),
    decimal(launch.total * pis_rate),
    decimal(launch.total * cofins_rate),
  )
}

pub fn generate_efd_contribuicoes(conn: &Connection, company_id: &str, competence: Competence) -> Result<EfdContribuicoes, AppError> {
  let company = companies::get_company(conn, company_id)?;
  let items = launches::launches_for_competence(conn, company_id, competence, None)?;
  let file = build_efd_contribuicoes(&company, competence, &items)?;
  log::info!(
    "event=efd_generated module=export status=ok company_id={company_id} competence={competence} lines={} pis={:.2} cofins={:.2}",
    file.line_count,
    file.pis_due,
    file.cofins_due
  );
  Ok(file)
}

/// Generates the file and writes it into `output_dir`.
pub fn save_efd_contribuicoes(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  output_dir: &Path,
  actor: Option<&str>,
) -> Result<EfdContribuicoes, AppError> {
  let mut file = generate_efd_contribuicoes(conn, company_id, competence)?;
  fs::create_dir_all(output_dir)?;
  let path = output_dir.join(&file.file_name);
  fs::write(&path, file.content.as_bytes())?;
  file.saved_path = Some(path.to_string_lossy().to_string());
  append_audit(
    conn,
    actor,
    "GENERATE_EFD_CONTRIBUICOES",
    "COMPANY",
    Some(company_id),
    Some(company_id),
    payload(&serde_json::json!({
      "competence": competence.to_string(),
      "file": file.saved_path,
      "lines": file.line_count,
      "pis": file.pis_due,
      "cofins": file.cofins_due,
    })),
    None,
  )?;
  Ok(file)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxAmounts;
  use crate::test_support::{add_sale, add_service_taken, setup};

  fn lines(file: &EfdContribuicoes) -> Vec<&str> {
    file.content.split("\r\n").filter(|line| !line.is_empty()).collect()
  }

  fn find<'a>(lines: &[&'a str], register: &str) -> Vec<&'a str> {
    let prefix = format!("|{register}|");
    lines.iter().copied().filter(|line| line.starts_with(&prefix)).collect()
  }

  #[test]
  fn cumulative_file_has_balanced_blocks() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_sale(&conn, &company.id, "1", "2025-03-05", 10_000.0);
    add_service_taken(&conn, &company.id, "55", "2025-03-06", 2_000.0, TaxAmounts::default());

    let file = generate_efd_contribuicoes(&conn, &company.id, Competence::new(2025, 3).unwrap()).unwrap();
    let lines = lines(&file);

    assert!(lines[0].starts_with("|0000|006|0|||01032025|31032025|Oficina Boa Ltda|11222333000181|MG|3106200|"));
    assert_eq!(find(&lines, "0110"), vec!["|0110|2|1|1|9|"]);
    assert_eq!(find(&lines, "0150").len(), 1);
    assert_eq!(find(&lines, "A100").len(), 2);
    assert_eq!(find(&lines, "C001"), vec!["|C001|1|"]);
    assert_eq!(find(&lines, "D990"), vec!["|D990|2|"]);

    // 0000, 0001, 0100, 0110, 0140, 0150, 0990
    assert_eq!(find(&lines, "0990"), vec!["|0990|7|"]);
    // 10 000 x 0,65 % and 3 %
    assert_eq!(file.pis_due, 65.0);
    assert_eq!(file.cofins_due, 300.0);
    assert!(find(&lines, "M200")[0].ends_with("|65,00|0,00|0,00|65,00|65,00|"));

    assert_eq!(file.line_count, lines.len());
    assert_eq!(*lines.last().unwrap(), format!("|9999|{}|", lines.len()));
    assert_eq!(find(&lines, "9900").len() + 3, {
      let block9 = find(&lines, "9990")[0];
      block9.trim_matches('|').split('|').nth(1).unwrap().parse::<usize>().unwrap()
    });
    assert!(find(&lines, "9900").contains(&"|9900|A100|2|"));
  }

  #[test]
  fn non_cumulative_takes_credits_and_retentions() {
    let (conn, company) = setup(TaxRegime::LucroReal, None);
    let mut sale = crate::test_support::sale_input("9", "2025-03-10", 10_000.0);
    sale.taxes.ret_pis = 65.0;
    crate::launches::create_launch(&conn, &company.id, &sale, None, None).unwrap();
    add_service_taken(&conn, &company.id, "77", "2025-03-11", 4_000.0, TaxAmounts::default());

    let file = generate_efd_contribuicoes(&conn, &company.id, Competence::new(2025, 3).unwrap()).unwrap();
    let lines = lines(&file);
    assert_eq!(find(&lines, "0110"), vec!["|0110|1|1|1||"]);
    // PIS 165,00 - credits 66,00 - retained 65,00
    assert_eq!(file.pis_due, 34.0);
    // COFINS 760,00 - credits 304,00
    assert_eq!(file.cofins_due, 456.0);
    assert_eq!(
      find(&lines, "M200"),
      vec!["|M200|165,00|66,00|0,00|99,00|65,00|0,00|34,00|0,00|0,00|0,00|0,00|34,00|"]
    );
  }

  #[test]
  fn simples_companies_are_rejected() {
    let (conn, company) = setup(TaxRegime::SimplesNacional, Some(crate::models::Anexo::III));
    let err = generate_efd_contribuicoes(&conn, &company.id, Competence::new(2025, 3).unwrap()).unwrap_err();
    assert_eq!(err.code, "REGIME_NOT_SUPPORTED");
  }

  #[test]
  fn pipes_in_names_do_not_break_fields() {
    assert_eq!(clean("Loja | Filial\n"), "Loja   Filial");
    assert_eq!(decimal(1234.5), "1234,50");
  }

  #[test]
  fn saves_file_with_crlf() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_sale(&conn, &company.id, "1", "2025-03-05", 500.0);
    let dir = tempfile::tempdir().unwrap();
    let file = save_efd_contribuicoes(&conn, &company.id, Competence::new(2025, 3).unwrap(), dir.path(), None).unwrap();
    let written = fs::read_to_string(file.saved_path.unwrap()).unwrap();
    assert!(written.contains("|0001|0|\r\n"));
    assert!(file.file_name.ends_with("_202503.txt"));
  }
}
