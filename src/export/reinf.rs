//! EFD-Reinf (layout 2.1.2): retentions on services taken.
//!
//! R-2010 reports INSS retained from service providers, R-4020 the IR and
//! CSRF (CSLL, PIS, COFINS) retained from payments to legal entities. Each
//! competence closes both series with R-2099 and R-4099.

use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{amount, event_id, xml_document};
use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::{closing, round2, Competence};
use crate::error::AppError;
use crate::launches;
use crate::models::{Anexo, Company, Direction, Launch, ReinfEventPayload, ReinfFile, TaxRegime};
use crate::settings;

const LAYOUT: &str = "v2_01_02";
const VER_PROC: &str = concat!("contabil-fiscal_", env!("CARGO_PKG_VERSION"));
const SERVICE_TYPE: &str = "100000003";
const NAT_REND_SERVICES: &str = "17099";

const REINF_COLUMNS: &str =
  "id, company_id, year, month, events_json, total_retained_inss, total_retained_ir, created_at";

fn map_reinf(row: &Row<'_>) -> rusqlite::Result<ReinfFile> {
  let events_json: String = row.get(4)?;
  Ok(ReinfFile {
    id: row.get(0)?,
    company_id: row.get(1)?,
    year: row.get(2)?,
    month: row.get(3)?,
    events: serde_json::from_str(&events_json).unwrap_or_default(),
    total_retained_inss: row.get(5)?,
    total_retained_ir: row.get(6)?,
    created_at: row.get(7)?,
  })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEvento {
  #[serde(skip_serializing_if = "Option::is_none")]
  ind_retif: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  per_apur: Option<String>,
  tp_amb: u8,
  proc_emi: u8,
  ver_proc: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeContri {
  tp_insc: u8,
  nr_insc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtInfoContri {
  #[serde(rename = "@id")]
  id: String,
  ide_evento: IdeEvento,
  ide_contri: IdeContri,
  info_contri: InfoContri,
}

#[derive(Debug, Serialize)]
struct InfoContri {
  inclusao: Inclusao,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Inclusao {
  ide_periodo: IdePeriodo,
  info_cadastro: InfoCadastro,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdePeriodo {
  ini_valid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoCadastro {
  class_trib: &'static str,
  ind_escrituracao: u8,
  ind_desoneracao: u8,
  ind_acordo_isen_multa: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtServTom {
  #[serde(rename = "@id")]
  id: String,
  ide_evento: IdeEvento,
  ide_contri: IdeContri,
  info_serv_tom: InfoServTom,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoServTom {
  ide_estab_obra: IdeEstabObra,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEstabObra {
  tp_insc_estab: u8,
  nr_insc_estab: String,
  ind_obra: u8,
  ide_prest_serv: IdePrestServ,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdePrestServ {
  cnpj_prestador: String,
  vlr_total_bruto: String,
  vlr_total_base_ret: String,
  vlr_total_ret_princ: String,
  #[serde(rename = "indCPRB")]
  ind_cprb: u8,
  nfs: Vec<Nfs>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Nfs {
  serie: String,
  num_docto: String,
  #[serde(rename = "dtEmissaoNF")]
  dt_emissao_nf: String,
  vlr_bruto: String,
  info_tp_serv: InfoTpServ,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoTpServ {
  tp_servico: &'static str,
  vlr_base_ret: String,
  vlr_retencao: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtRetPj {
  #[serde(rename = "@id")]
  id: String,
  ide_evento: IdeEvento,
  ide_contri: IdeContri,
  ide_estab: IdeEstab,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEstab {
  tp_insc_estab: u8,
  nr_insc_estab: String,
  ide_benef: IdeBenef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeBenef {
  cnpj_benef: String,
  nm_benef: String,
  ide_pgto: IdePgto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdePgto {
  nat_rend: &'static str,
  info_pgto: Vec<InfoPgto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoPgto {
  #[serde(rename = "dtFG")]
  dt_fg: String,
  vlr_bruto: String,
  retencoes: Retencoes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Retencoes {
  #[serde(rename = "vlrBaseIR")]
  vlr_base_ir: String,
  #[serde(rename = "vlrIR")]
  vlr_ir: String,
  vlr_base_agreg: String,
  vlr_agreg: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtFechaEvPer {
  #[serde(rename = "@id")]
  id: String,
  ide_evento: IdeEvento,
  ide_contri: IdeContri,
  #[serde(skip_serializing_if = "Option::is_none")]
  ide_resp_inf: Option<IdeRespInf>,
  info_fech: InfoFechSerie2000,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeRespInf {
  nm_resp: String,
  cpf_resp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoFechSerie2000 {
  evt_serv_tm: &'static str,
  evt_serv_pr: &'static str,
  evt_ass_desp_rec: &'static str,
  evt_ass_desp_rep: &'static str,
  evt_com_prod: &'static str,
  #[serde(rename = "evtCPRB")]
  evt_cprb: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtFech {
  #[serde(rename = "@id")]
  id: String,
  ide_evento: IdeEvento,
  ide_contri: IdeContri,
  #[serde(skip_serializing_if = "Option::is_none")]
  ide_resp_inf: Option<IdeRespInf>,
  info_fech: InfoFechSerie4000,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoFechSerie4000 {
  fech_ret: u8,
}

/// Incoming documents of one provider with retentions in the competence.
#[derive(Debug)]
pub struct Provider<'a> {
  pub cnpj: String,
  pub name: String,
  pub documents: Vec<&'a Launch>,
}

impl Provider<'_> {
  fn retained_inss(&self) -> f64 {
    round2(self.documents.iter().map(|launch| launch.taxes.ret_inss).sum())
  }

  fn retained_ir(&self) -> f64 {
    round2(self.documents.iter().map(|launch| launch.taxes.ret_ir).sum())
  }

  fn retained_federal(&self) -> f64 {
    round2(
      self
        .documents
        .iter()
        .map(|launch| launch.taxes.ret_ir + csrf(launch))
        .sum(),
    )
  }
}

fn csrf(launch: &Launch) -> f64 {
  launch.taxes.ret_csll + launch.taxes.ret_pis + launch.taxes.ret_cofins
}

/// Groups incoming documents issued by legal entities, in order of first appearance.
pub fn providers(items: &[Launch]) -> Vec<Provider<'_>> {
  let mut grouped: Vec<Provider<'_>> = Vec::new();
  for launch in items {
    if launch.direction != Direction::Entrada || launch.emitente.document.len() != 14 {
      continue;
    }
    match grouped.iter_mut().find(|provider| provider.cnpj == launch.emitente.document) {
      Some(provider) => provider.documents.push(launch),
      None => grouped.push(Provider {
        cnpj: launch.emitente.document.clone(),
        name: launch.emitente.name.clone(),
        documents: vec![launch],
      }),
    }
  }
  grouped
}

pub struct ReinfContext<'a> {
  pub company: &'a Company,
  pub environment: u8,
  pub event_id: String,
}

impl ReinfContext<'_> {
  fn ide_contri(&self) -> IdeContri {
    IdeContri {
      tp_insc: 1,
      nr_insc: self.company.cnpj_root().to_string(),
    }
  }

  fn ide_evento(&self, per_apur: Option<Competence>) -> IdeEvento {
    IdeEvento {
      ind_retif: per_apur.map(|_| 1),
      per_apur: per_apur.map(|competence| competence.to_string()),
      tp_amb: self.environment,
      proc_emi: 1,
      ver_proc: VER_PROC,
    }
  }

  fn ide_resp_inf(&self) -> Option<IdeRespInf> {
    let accountant = &self.company.accountant;
    match (accountant.nome.as_deref(), accountant.cpf.as_deref()) {
      (Some(nome), Some(cpf)) if !nome.trim().is_empty() && !cpf.trim().is_empty() => Some(IdeRespInf {
        nm_resp: nome.trim().to_string(),
        cpf_resp: cpf.trim().to_string(),
      }),
      _ => None,
    }
  }
}

fn envelope<T: Serialize>(schema: &str, tag: &str, event: &T) -> Result<String, AppError> {
  xml_document(
    "Reinf",
    &format!("http://www.reinf.esocial.gov.br/schemas/{schema}/{LAYOUT}"),
    tag,
    event,
  )
}

fn class_trib(company: &Company) -> &'static str {
  match (company.regime, company.simples_anexo) {
    (TaxRegime::SimplesNacional, Some(Anexo::IV)) => "02",
    (TaxRegime::SimplesNacional, _) => "01",
    (TaxRegime::Mei, _) => "04",
    _ => "99",
  }
}

fn xml_date(value: &str) -> String {
  value.get(..10).unwrap_or(value).to_string()
}

/// R-1000: taxpayer registration.
pub fn build_r1000(ctx: &ReinfContext<'_>, competence: Competence) -> Result<String, AppError> {
  let event = EvtInfoContri {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(None),
    ide_contri: ctx.ide_contri(),
    info_contri: InfoContri {
      inclusao: Inclusao {
        ide_periodo: IdePeriodo {
          ini_valid: competence.to_string(),
        },
        info_cadastro: InfoCadastro {
          class_trib: class_trib(ctx.company),
          ind_escrituracao: 0,
          ind_desoneracao: 0,
          ind_acordo_isen_multa: 0,
        },
      },
    },
  };
  envelope("evtInfoContribuinte", "evtInfoContri", &event)
}

/// R-2010: INSS retained by the company on services taken from one provider.
pub fn build_r2010(ctx: &ReinfContext<'_>, competence: Competence, provider: &Provider<'_>) -> Result<String, AppError> {
  let documents: Vec<&Launch> = provider
    .documents
    .iter()
    .copied()
    .filter(|launch| launch.taxes.ret_inss > 0.0)
    .collect();
  let gross = round2(documents.iter().map(|launch| launch.total).sum());
  let nfs = documents
    .iter()
    .map(|launch| Nfs {
      serie: launch.series.clone().unwrap_or_else(|| "0".to_string()),
      num_docto: launch.number.clone(),
      dt_emissao_nf: xml_date(&launch.issue_date),
      vlr_bruto: amount(launch.total),
      info_tp_serv: InfoTpServ {
        tp_servico: SERVICE_TYPE,
        vlr_base_ret: amount(launch.total),
        vlr_retencao: amount(launch.taxes.ret_inss),
      },
    })
    .collect();
  let event = EvtServTom {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(Some(competence)),
    ide_contri: ctx.ide_contri(),
    info_serv_tom: InfoServTom {
      ide_estab_obra: IdeEstabObra {
        tp_insc_estab: 1,
        nr_insc_estab: ctx.company.cnpj.clone(),
        ind_obra: 0,
        ide_prest_serv: IdePrestServ {
          cnpj_prestador: provider.cnpj.clone(),
          vlr_total_bruto: amount(gross),
          vlr_total_base_ret: amount(gross),
          vlr_total_ret_princ: amount(provider.retained_inss()),
          ind_cprb: 0,
          nfs,
        },
      },
    },
  };
  envelope("evtTomadorServicos", "evtServTom", &event)
}

/// R-4020: IR and aggregated CSRF retained on payments to one provider.
pub fn build_r4020(ctx: &ReinfContext<'_>, competence: Competence, provider: &Provider<'_>) -> Result<String, AppError> {
  let info_pgto = provider
    .documents
    .iter()
    .filter(|launch| launch.taxes.ret_ir + csrf(launch) > 0.0)
    .map(|launch| {
      let aggregated = round2(csrf(launch));
      InfoPgto {
        dt_fg: xml_date(&launch.issue_date),
        vlr_bruto: amount(launch.total),
        retencoes: Retencoes {
          vlr_base_ir: amount(if launch.taxes.ret_ir > 0.0 { launch.total } else { 0.0 }),
          vlr_ir: amount(launch.taxes.ret_ir),
          vlr_base_agreg: amount(if aggregated > 0.0 { launch.total } else { 0.0 }),
          vlr_agreg: amount(aggregated),
        },
      }
    })
    .collect();
  let event = EvtRetPj {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(Some(competence)),
    ide_contri: ctx.ide_contri(),
    ide_estab: IdeEstab {
      tp_insc_estab: 1,
      nr_insc_estab: ctx.company.cnpj.clone(),
      ide_benef: IdeBenef {
        cnpj_benef: provider.cnpj.clone(),
        nm_benef: provider.name.clone(),
        ide_pgto: IdePgto {
          nat_rend: NAT_REND_SERVICES,
          info_pgto,
        },
      },
    },
  };
  envelope("evt4020PagtoBeneficiarioPJ", "evtRetPJ", &event)
}

/// R-2099: closes the 2000 series of the competence.
pub fn build_r2099(ctx: &ReinfContext<'_>, competence: Competence, has_services_taken: bool) -> Result<String, AppError> {
  let event = EvtFechaEvPer {
    id: ctx.event_id.clone(),
    ide_evento: IdeEvento {
      ind_retif: None,
      ..ctx.ide_evento(Some(competence))
    },
    ide_contri: ctx.ide_contri(),
    ide_resp_inf: ctx.ide_resp_inf(),
    info_fech: InfoFechSerie2000 {
      evt_serv_tm: if has_services_taken { "S" } else { "N" },
      evt_serv_pr: "N",
      evt_ass_desp_rec: "N",
      evt_ass_desp_rep: "N",
      evt_com_prod: "N",
      evt_cprb: "N",
    },
  };
  envelope("evtFechamento", "evtFechaEvPer", &event)
}

/// R-4099: closes the 4000 series of the competence.
pub fn build_r4099(ctx: &ReinfContext<'_>, competence: Competence) -> Result<String, AppError> {
  let event = EvtFech {
    id: ctx.event_id.clone(),
    ide_evento: IdeEvento {
      ind_retif: None,
      ..ctx.ide_evento(Some(competence))
    },
    ide_contri: ctx.ide_contri(),
    ide_resp_inf: ctx.ide_resp_inf(),
    info_fech: InfoFechSerie4000 { fech_ret: 0 },
  };
  envelope("evt4099FechamentoDirf", "evtFech", &event)
}

fn push_event(
  events: &mut Vec<ReinfEventPayload>,
  company: &Company,
  environment: u8,
  at: NaiveDateTime,
  event_type: &str,
  build: impl FnOnce(&ReinfContext<'_>) -> Result<String, AppError>,
) -> Result<(), AppError> {
  let ctx = ReinfContext {
    company,
    environment,
    event_id: event_id(company, at, events.len() as u32 + 1),
  };
  let xml = build(&ctx)?;
  events.push(ReinfEventPayload {
    event_type: event_type.to_string(),
    event_id: ctx.event_id,
    xml,
  });
  Ok(())
}

/// Builds every event of the competence from the loaded launches.
pub fn build_reinf_events(
  company: &Company,
  competence: Competence,
  items: &[Launch],
  environment: u8,
  include_registration: bool,
  at: NaiveDateTime,
) -> Result<Vec<ReinfEventPayload>, AppError> {
  let mut events = Vec::new();
  if include_registration {
    push_event(&mut events, company, environment, at, "R-1000", |ctx| build_r1000(ctx, competence))?;
  }
  let grouped = providers(items);
  let mut has_services_taken = false;
  for provider in grouped.iter().filter(|provider| provider.retained_inss() > 0.0) {
    has_services_taken = true;
    push_event(&mut events, company, environment, at, "R-2010", |ctx| {
      build_r2010(ctx, competence, provider)
    })?;
  }
  for provider in grouped.iter().filter(|provider| provider.retained_federal() > 0.0) {
    push_event(&mut events, company, environment, at, "R-4020", |ctx| {
      build_r4020(ctx, competence, provider)
    })?;
  }
  push_event(&mut events, company, environment, at, "R-2099", |ctx| {
    build_r2099(ctx, competence, has_services_taken)
  })?;
  push_event(&mut events, company, environment, at, "R-4099", |ctx| build_r4099(ctx, competence))?;
  Ok(events)
}

/// Generates and stores the EFD-Reinf events of a competence, replacing a
/// previous file of the same competence.
pub fn generate_reinf_file(
  conn: &Connection,
  company_id: &str,
  competence: Competence,
  actor: Option<&str>,
) -> Result<ReinfFile, AppError> {
  closing::ensure_open(conn, company_id, competence)?;
  let company = companies::get_company(conn, company_id)?;
  let environment = settings::get_settings(conn)?.esocial_environment;
  let items = launches::launches_for_competence(conn, company_id, competence, Some(Direction::Entrada))?;
  let earlier: i64 = conn.query_row(
    "SELECT COUNT(*) FROM reinf_files WHERE company_id = ?1 AND (year * 100 + month) < ?2",
    params![company_id, competence.year * 100 + competence.month as i32],
    |row| row.get(0),
  )?;

  let events = build_reinf_events(
    &company,
    competence,
    &items,
    environment,
    earlier == 0,
    Local::now().naive_local(),
  )?;
  let grouped = providers(&items);
  let total_inss = round2(grouped.iter().map(|provider| provider.retained_inss()).sum());
  let total_ir = round2(grouped.iter().map(|provider| provider.retained_ir()).sum());

  conn.execute(
    &format!(
      "INSERT INTO reinf_files ({REINF_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
       ON CONFLICT(company_id, year, month) DO UPDATE SET
         events_json = excluded.events_json,
         total_retained_inss = excluded.total_retained_inss,
         total_retained_ir = excluded.total_retained_ir,
         created_at = excluded.created_at"
    ),
    params![
      new_id(),
      company_id,
      competence.year,
      competence.month,
      serde_json::to_string(&events)?,
      total_inss,
      total_ir,
      now()
    ],
  )?;
  let file = get_reinf_file(conn, company_id, competence)?.ok_or_else(|| AppError::not_found("Arquivo Reinf nao encontrado"))?;

  let types: Vec<&str> = file.events.iter().map(|event| event.event_type.as_str()).collect();
  append_audit(
    conn,
    actor,
    "GENERATE_REINF",
    "REINF_FILE",
    Some(&file.id),
    Some(company_id),
    payload(&serde_json::json!({
      "competence": competence.to_string(),
      "events": types,
      "total_retained_inss": total_inss,
      "total_retained_ir": total_ir,
    })),
    None,
  )?;
  log::info!(
    "event=reinf_generated module=export status=ok company_id={company_id} competence={competence} events={} inss={total_inss:.2} ir={total_ir:.2}",
    file.events.len()
  );
  Ok(file)
}

pub fn get_reinf_file(conn: &Connection, company_id: &str, competence: Competence) -> Result<Option<ReinfFile>, AppError> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {REINF_COLUMNS} FROM reinf_files WHERE company_id = ?1 AND year = ?2 AND month = ?3"),
        params![company_id, competence.year, competence.month],
        map_reinf,
      )
      .optional()?,
  )
}

pub fn list_reinf_files(conn: &Connection, company_id: &str, year: Option<i32>) -> Result<Vec<ReinfFile>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {REINF_COLUMNS} FROM reinf_files WHERE company_id = ?1 AND (?2 IS NULL OR year = ?2)
     ORDER BY year DESC, month DESC"
  ))?;
  let rows = stmt.query_map(params![company_id, year], map_reinf)?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

/// Writes each event of a stored file as `<tipo>_<id>.xml` into `output_dir`.
pub fn save_reinf_xml(conn: &Connection, company_id: &str, competence: Competence, output_dir: &Path) -> Result<Vec<String>, AppError> {
  let file = get_reinf_file(conn, company_id, competence)?
    .ok_or_else(|| AppError::not_found(format!("Nenhum arquivo Reinf gerado para {competence}")))?;
  fs::create_dir_all(output_dir)?;
  let mut written = Vec::with_capacity(file.events.len());
  for event in &file.events {
    let path = output_dir.join(format!("{}_{}.xml", event.event_type, event.event_id));
    fs::write(&path, event.xml.as_bytes())?;
    written.push(path.to_string_lossy().to_string());
  }
  log::info!(
    "event=reinf_saved module=export status=ok company_id={company_id} competence={competence} files={}",
    written.len()
  );
  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::TaxAmounts;
  use crate::test_support::{add_sale, add_service_taken, setup};

  fn march() -> Competence {
    Competence::new(2025, 3).unwrap()
  }

  fn retained() -> TaxAmounts {
    TaxAmounts {
      ret_inss: 110.0,
      ret_ir: 15.0,
      ret_csll: 10.0,
      ret_pis: 6.5,
      ret_cofins: 30.0,
      ..TaxAmounts::default()
    }
  }

  #[test]
  fn groups_retentions_per_provider() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_service_taken(&conn, &company.id, "10", "2025-03-05", 1000.0, retained());
    add_service_taken(&conn, &company.id, "11", "2025-03-20", 1000.0, retained());
    add_service_taken(&conn, &company.id, "12", "2025-03-21", 500.0, TaxAmounts::default());
    add_sale(&conn, &company.id, "1", "2025-03-02", 9000.0);

    let file = generate_reinf_file(&conn, &company.id, march(), None).unwrap();
    let types: Vec<&str> = file.events.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(types, vec!["R-1000", "R-2010", "R-4020", "R-2099", "R-4099"]);
    assert_eq!(file.total_retained_inss, 220.0);
    assert_eq!(file.total_retained_ir, 30.0);

    let r2010 = &file.events[1].xml;
    assert!(r2010.starts_with("<Reinf xmlns=\"http://www.reinf.esocial.gov.br/schemas/evtTomadorServicos/v2_01_02\">"));
    assert!(r2010.contains("<cnpjPrestador>11444777000161</cnpjPrestador>"));
    assert!(r2010.contains("<vlrTotalBruto>2000.00</vlrTotalBruto>"));
    assert!(r2010.contains("<vlrTotalRetPrinc>220.00</vlrTotalRetPrinc>"));
    assert_eq!(r2010.matches("<nfs>").count(), 2);

    let r4020 = &file.events[2].xml;
    assert!(r4020.contains("<vlrIR>15.00</vlrIR>"));
    assert!(r4020.contains("<vlrAgreg>46.50</vlrAgreg>"));
    assert!(file.events[3].xml.contains("<evtServTm>S</evtServTm>"));
    assert!(file.events[3].xml.contains("<cpfResp>39053344705</cpfResp>"));
  }

  #[test]
  fn regeneration_replaces_file_and_skips_registration_later() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let first = generate_reinf_file(&conn, &company.id, march(), None).unwrap();
    let types: Vec<&str> = first.events.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(types, vec!["R-1000", "R-2099", "R-4099"]);
    assert!(first.events[1].xml.contains("<evtServTm>N</evtServTm>"));

    let again = generate_reinf_file(&conn, &company.id, march(), None).unwrap();
    assert_eq!(again.id, first.id);

    let april = generate_reinf_file(&conn, &company.id, Competence::new(2025, 4).unwrap(), None).unwrap();
    assert_eq!(april.events.len(), 2);
    assert_eq!(list_reinf_files(&conn, &company.id, Some(2025)).unwrap().len(), 2);
  }

  #[test]
  fn writes_one_xml_per_event() {
    let (conn, company) = setup(TaxRegime::LucroPresumido, None);
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
      save_reinf_xml(&conn, &company.id, march(), dir.path()).unwrap_err().code,
      "NOT_FOUND"
    );
    generate_reinf_file(&conn, &company.id, march(), None).unwrap();
    let written = save_reinf_xml(&conn, &company.id, march(), dir.path()).unwrap();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|path| Path::new(path).exists()));
  }
}
