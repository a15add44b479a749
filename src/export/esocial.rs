//! eSocial events (layout S-1.2): XML builders, local storage and the
//! simulated transmission workflow PENDENTE -> ENVIADO -> PROCESSADO/REJEITADO.

use chrono::{Local, NaiveDateTime};
use rand::{Rng, RngCore};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{amount, event_id, xml_document, SEQUENCE_LIMIT};
use crate::audit::log::{append_audit, payload};
use crate::companies;
use crate::db::{new_id, now};
use crate::domain::{closing, validation, Competence};
use crate::error::AppError;
use crate::models::{
  Anexo, Company, Employee, EsocialEvent, EsocialEventType, EventStatus, Payroll, TaxRegime, Termination,
  TerminationReason,
};
use crate::payroll;
use crate::people;
use crate::settings;

const LAYOUT: &str = "v_S_01_02_00";
const VER_PROC: &str = concat!("contabil-fiscal_", env!("CARGO_PKG_VERSION"));
const LOTACAO: &str = "LOT01";
const RUBRIC_TABLE: &str = "RUBR";

/// Share of polled events that come back processed.
const SUCCESS_PROBABILITY: f64 = 0.9;

const REJECTIONS: &[&str] = &[
  "MS0030: CPF do trabalhador nao consta no cadastro do empregador",
  "MS0052: Evento enviado fora do prazo de transmissao",
  "MS0181: Rubrica nao cadastrada na tabela do empregador",
  "MS0315: Periodo de apuracao ja encerrado",
];

const EVENT_COLUMNS: &str = "id, company_id, event_type, reference_id, year, month, event_id, xml, status,
  protocol, receipt_number, message, created_at, updated_at";

fn map_event(row: &Row<'_>) -> rusqlite::Result<EsocialEvent> {
  let event_type: String = row.get(2)?;
  let status: String = row.get(8)?;
  Ok(EsocialEvent {
    id: row.get(0)?,
    company_id: row.get(1)?,
    event_type: EsocialEventType::parse(&event_type).unwrap_or(EsocialEventType::S1000),
    reference_id: row.get(3)?,
    year: row.get(4)?,
    month: row.get(5)?,
    event_id: row.get(6)?,
    xml: row.get(7)?,
    status: EventStatus::parse(&status).unwrap_or(EventStatus::Pendente),
    protocol: row.get(9)?,
    receipt_number: row.get(10)?,
    message: row.get(11)?,
    created_at: row.get(12)?,
    updated_at: row.get(13)?,
  })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEvento {
  #[serde(skip_serializing_if = "Option::is_none")]
  ind_retif: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  ind_apuracao: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  per_apur: Option<String>,
  tp_amb: u8,
  proc_emi: u8,
  ver_proc: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEmpregador {
  tp_insc: u8,
  nr_insc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtInfoEmpregador {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  info_empregador: InfoEmpregador,
}

#[derive(Debug, Serialize)]
struct InfoEmpregador {
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
  ind_coop: u8,
  ind_constr: u8,
  ind_des_folha: u8,
  ind_opt_reg_eletron: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtAdmissao {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  trabalhador: Trabalhador,
  vinculo: Vinculo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Trabalhador {
  cpf_trab: String,
  nm_trab: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  nascimento: Option<Nascimento>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Nascimento {
  dt_nascto: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Vinculo {
  matricula: String,
  tp_reg_trab: u8,
  tp_reg_prev: u8,
  info_regime_trab: InfoRegimeTrab,
  info_contrato: InfoContrato,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoRegimeTrab {
  info_celetista: InfoCeletista,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoCeletista {
  dt_adm: String,
  tp_admissao: u8,
  ind_admissao: u8,
  tp_reg_jor: u8,
  nat_atividade: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoContrato {
  nm_cargo: String,
  #[serde(rename = "CBOCargo", skip_serializing_if = "Option::is_none")]
  cbo_cargo: Option<String>,
  cod_categ: u16,
  remuneracao: Remuneracao,
  duracao: Duracao,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Remuneracao {
  vr_sal_fx: String,
  und_sal_fixo: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Duracao {
  tp_contr: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtRemun {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  ide_trabalhador: IdeTrabalhador,
  dm_dev: DmDev,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeTrabalhador {
  cpf_trab: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DmDev {
  ide_dm_dev: String,
  cod_categ: u16,
  info_per_apur: InfoPerApur,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoPerApur {
  ide_estab_lot: IdeEstabLot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeEstabLot {
  tp_insc: u8,
  nr_insc: String,
  cod_lotacao: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  remun_per_apur: Option<RemunPerApur>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  det_verbas: Vec<ItemRubrica>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemunPerApur {
  matricula: String,
  itens_remun: Vec<ItemRubrica>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemRubrica {
  cod_rubr: &'static str,
  ide_tab_rubr: &'static str,
  vr_rubr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtPgtos {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  ide_benef: IdeBenef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeBenef {
  cpf_benef: String,
  info_pgto: InfoPgto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoPgto {
  dt_pgto: String,
  tp_pgto: u8,
  per_ref: String,
  ide_dm_dev: String,
  vr_liq: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtDeslig {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  ide_vinculo: IdeVinculo,
  info_deslig: InfoDeslig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdeVinculo {
  cpf_trab: String,
  matricula: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoDeslig {
  mtv_deslig: &'static str,
  dt_deslig: String,
  #[serde(rename = "indPagtoAPI")]
  ind_pagto_api: &'static str,
  pens_alim: u8,
  verbas_resc: VerbasResc,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerbasResc {
  dm_dev: DmDev,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvtFechaEvPer {
  #[serde(rename = "@Id")]
  id: String,
  ide_evento: IdeEvento,
  ide_empregador: IdeEmpregador,
  info_fech: InfoFech,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoFech {
  evt_remun: &'static str,
  evt_pgtos: &'static str,
  evt_com_prod: &'static str,
  #[serde(rename = "evtContratAvNP")]
  evt_contrat_av_np: &'static str,
  evt_info_compl_per: &'static str,
}

/// What every builder needs: the employer, the environment and the event id.
pub struct EventContext<'a> {
  pub company: &'a Company,
  pub environment: u8,
  pub event_id: String,
}

impl EventContext<'_> {
  fn ide_empregador(&self) -> IdeEmpregador {
    IdeEmpregador {
      tp_insc: 1,
      nr_insc: self.company.cnpj_root().to_string(),
    }
  }

  fn ide_evento(&self, per_apur: Option<Competence>) -> IdeEvento {
    IdeEvento {
      ind_retif: Some(1),
      ind_apuracao: per_apur.map(|_| 1),
      per_apur: per_apur.map(|competence| competence.to_string()),
      tp_amb: self.environment,
      proc_emi: 1,
      ver_proc: VER_PROC,
    }
  }
}

fn envelope<T: Serialize>(schema: &str, tag: &str, event: &T) -> Result<String, AppError> {
  xml_document(
    "eSocial",
    &format!("http://www.esocial.gov.br/schema/evt/{schema}/{LAYOUT}"),
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

fn mtv_deslig(reason: TerminationReason) -> &'static str {
  match reason {
    TerminationReason::JustaCausa => "01",
    TerminationReason::SemJustaCausa => "02",
    TerminationReason::TerminoContrato => "06",
    TerminationReason::PedidoDemissao => "07",
    TerminationReason::Acordo => "33",
  }
}

fn rubrics(values: &[(&'static str, f64)]) -> Vec<ItemRubrica> {
  values
    .iter()
    .filter(|(_, value)| *value > 0.0)
    .map(|(code, value)| ItemRubrica {
      cod_rubr: *code,
      ide_tab_rubr: RUBRIC_TABLE,
      vr_rubr: amount(*value),
    })
    .collect()
}

/// Demonstrative id shared by S-1200 and S-1210 of the same payroll.
fn dm_dev_id(competence: Competence, employee: &Employee) -> String {
  format!("FP{}{:02}{}", competence.year, competence.month, employee.matricula)
}

/// S-1000: employer registration, valid from `competence`.
pub fn build_s1000(ctx: &EventContext<'_>, competence: Competence) -> Result<String, AppError> {
  let event = EvtInfoEmpregador {
    id: ctx.event_id.clone(),
    ide_evento: IdeEvento {
      ind_retif: None,
      ..ctx.ide_evento(None)
    },
    ide_empregador: ctx.ide_empregador(),
    info_empregador: InfoEmpregador {
      inclusao: Inclusao {
        ide_periodo: IdePeriodo {
          ini_valid: competence.to_string(),
        },
        info_cadastro: InfoCadastro {
          class_trib: class_trib(ctx.company),
          ind_coop: 0,
          ind_constr: 0,
          ind_des_folha: 0,
          ind_opt_reg_eletron: 0,
        },
      },
    },
  };
  envelope("evtInfoEmpregador", "evtInfoEmpregador", &event)
}

/// S-2200: admission of a CLT employee.
pub fn build_s2200(ctx: &EventContext<'_>, employee: &Employee) -> Result<String, AppError> {
  let event = EvtAdmissao {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(None),
    ide_empregador: ctx.ide_empregador(),
    trabalhador: Trabalhador {
      cpf_trab: employee.cpf.clone(),
      nm_trab: employee.name.clone(),
      nascimento: employee.birth_date.clone().map(|dt_nascto| Nascimento { dt_nascto }),
    },
    vinculo: Vinculo {
      matricula: employee.matricula.clone(),
      tp_reg_trab: 1,
      tp_reg_prev: 1,
      info_regime_trab: InfoRegimeTrab {
        info_celetista: InfoCeletista {
          dt_adm: employee.admission_date.clone(),
          tp_admissao: 1,
          ind_admissao: 1,
          tp_reg_jor: 1,
          nat_atividade: 1,
        },
      },
      info_contrato: InfoContrato {
        nm_cargo: employee.cargo.clone(),
        cbo_cargo: employee.cbo.clone(),
        cod_categ: employee.esocial_category,
        remuneracao: Remuneracao {
          vr_sal_fx: amount(employee.base_salary),
          und_sal_fixo: 5,
        },
        duracao: Duracao { tp_contr: 1 },
      },
    },
  };
  envelope("evtAdmissao", "evtAdmissao", &event)
}

/// S-1200: remuneration of one employee in the competence.
pub fn build_s1200(
  ctx: &EventContext<'_>,
  competence: Competence,
  payroll: &Payroll,
  employee: &Employee,
) -> Result<String, AppError> {
  let itens = rubrics(&[
    ("1000", payroll.base_salary),
    ("1002", payroll.overtime),
    ("1003", payroll.other_earnings),
    ("9201", payroll.inss),
    ("9203", payroll.irrf),
    ("9299", payroll.other_discounts),
  ]);
  let event = EvtRemun {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(Some(competence)),
    ide_empregador: ctx.ide_empregador(),
    ide_trabalhador: IdeTrabalhador {
      cpf_trab: employee.cpf.clone(),
    },
    dm_dev: DmDev {
      ide_dm_dev: dm_dev_id(competence, employee),
      cod_categ: employee.esocial_category,
      info_per_apur: InfoPerApur {
        ide_estab_lot: IdeEstabLot {
          tp_insc: 1,
          nr_insc: ctx.company.cnpj.clone(),
          cod_lotacao: LOTACAO,
          remun_per_apur: Some(RemunPerApur {
            matricula: employee.matricula.clone(),
            itens_remun: itens,
          }),
          det_verbas: Vec::new(),
        },
      },
    },
  };
  envelope("evtRemun", "evtRemun", &event)
}

/// S-1210: net payment of the payroll, dated on the last day of the competence.
pub fn build_s1210(
  ctx: &EventContext<'_>,
  competence: Competence,
  payroll: &Payroll,
  employee: &Employee,
) -> Result<String, AppError> {
  let event = EvtPgtos {
    id: ctx.event_id.clone(),
    ide_evento: IdeEvento {
      ind_apuracao: None,
      ..ctx.ide_evento(Some(competence))
    },
    ide_empregador: ctx.ide_empregador(),
    ide_benef: IdeBenef {
      cpf_benef: employee.cpf.clone(),
      info_pgto: InfoPgto {
        dt_pgto: competence.last_day().format("%Y-%m-%d").to_string(),
        tp_pgto: 1,
        per_ref: competence.to_string(),
        ide_dm_dev: dm_dev_id(competence, employee),
        vr_liq: amount(payroll.net),
      },
    },
  };
  envelope("evtPgtos", "evtPgtos", &event)
}

/// S-2299: termination with the severance amounts.
pub fn build_s2299(ctx: &EventContext<'_>, employee: &Employee, termination: &Termination) -> Result<String, AppError> {
  let date = validation::parse_date(&termination.termination_date)?;
  let competence = Competence::of_date(date);
  let event = EvtDeslig {
    id: ctx.event_id.clone(),
    ide_evento: ctx.ide_evento(None),
    ide_empregador: ctx.ide_empregador(),
    ide_vinculo: IdeVinculo {
      cpf_trab: employee.cpf.clone(),
      matricula: employee.matricula.clone(),
    },
    info_deslig: InfoDeslig {
      mtv_deslig: mtv_deslig(termination.reason),
      dt_deslig: termination.termination_date.clone(),
      ind_pagto_api: if termination.aviso_previo > 0.0 { "S" } else { "N" },
      pens_alim: 0,
      verbas_resc: VerbasResc {
        dm_dev: DmDev {
          ide_dm_dev: format!("RS{}{:02}{}", competence.year, competence.month, employee.matricula),
          cod_categ: employee.esocial_category,
          info_per_apur: InfoPerApur {
            ide_estab_lot: IdeEstabLot {
              tp_insc: 1,
              nr_insc: ctx.company.cnpj.clone(),
              cod_lotacao: LOTACAO,
              remun_per_apur: None,
              det_verbas: rubrics(&[
                ("1000", termination.saldo_salario),
                ("1010", termination.aviso_previo),
                ("1020", termination.ferias_vencidas),
                ("1021", termination.ferias_proporcionais),
                ("1022", termination.ferias_one_third),
                ("1030", termination.decimo_terceiro),
                ("9201", termination.inss),
                ("9203", termination.irrf),
              ]),
            },
          },
        },
      },
    },
  };
  envelope("evtDeslig", "evtDeslig", &event)
}

/// S-1299: closes the periodic events of the competence.
pub fn build_s1299(ctx: &EventContext<'_>, competence: Competence, has_remun: bool, has_pgtos: bool) -> Result<String, AppError> {
  let flag = |value: bool| if value { "S" } else { "N" };
  let event = EvtFechaEvPer {
    id: ctx.event_id.clone(),
    ide_evento: IdeEvento {
      ind_retif: None,
      ..ctx.ide_evento(Some(competence))
    },
    ide_empregador: ctx.ide_empregador(),
    info_fech: InfoFech {
      evt_remun: flag(has_remun),
      evt_pgtos: flag(has_pgtos),
      evt_com_prod: "N",
      evt_contrat_av_np: "N",
      evt_info_compl_per: "N",
    },
  };
  envelope("evtFechaEvPer", "evtFechaEvPer", &event)
}

/// Stores events of one generation run under a shared timestamp.
struct Batch<'a> {
  conn: &'a Connection,
  company: &'a Company,
  competence: Competence,
  environment: u8,
  stamp: NaiveDateTime,
  sequence: u32,
  ids: Vec<String>,
}

impl Batch<'_> {
  fn store(
    &mut self,
    event_type: EsocialEventType,
    reference_id: Option<&str>,
    build: impl FnOnce(&EventContext<'_>) -> Result<String, AppError>,
  ) -> Result<(), AppError> {
    self.sequence = if self.sequence >= SEQUENCE_LIMIT { 1 } else { self.sequence + 1 };
    let ctx = EventContext {
      company: self.company,
      environment: self.environment,
      event_id: event_id(self.company, self.stamp, self.sequence),
    };
    let xml = build(&ctx)?;
    let id = new_id();
    let ts = now();
    self.conn.execute(
      &format!("INSERT INTO esocial_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'PENDENTE', NULL, NULL, NULL, ?9, ?9)"),
      params![
        id,
        self.company.id,
        event_type.as_str(),
        reference_id,
        self.competence.year,
        self.competence.month,
        ctx.event_id,
        xml,
        ts
      ],
    )?;
    self.ids.push(id);
    Ok(())
  }
}

fn last_sequence(conn: &Connection, company_id: &str) -> Result<u32, AppError> {
  let last: Option<i64> = conn.query_row(
    "SELECT MAX(CAST(substr(event_id, 32, 5) AS INTEGER)) FROM esocial_events WHERE company_id = ?1",
    params![company_id],
    |row| row.get(0),
  )?;
  Ok(last.unwrap_or(0).clamp(0, SEQUENCE_LIMIT as i64) as u32)
}

/// True when an event of this type and reference is already stored and not rejected.
fn already_sent(
  conn: &Connection,
  company_id: &str,
  event_type: EsocialEventType,
  reference_id: Option<&str>,
  competence: Option<Competence>,
) -> Result<bool, AppError> {
  let found: Option<String> = conn
    .query_row(
      "SELECT id FROM esocial_events
       WHERE company_id = ?1 AND event_type = ?2 AND status <> 'REJEITADO'
         AND (?3 IS NULL OR reference_id = ?3)
         AND (?4 IS NULL OR (year = ?4 AND month = ?5))
       LIMIT 1",
      params![
        company_id,
        event_type.as_str(),
        reference_id,
        competence.map(|value| value.year),
        competence.map(|value| value.month)
      ],
      |row| row.get(0),
    )
    .optional()?;
  Ok(found.is_some())
}

/// Generates the pending events of a competence: employer registration once,
/// admissions of the month, remuneration and payment per payroll,
/// terminations, and the periodic closing. Pending periodic events of the
/// same competence are replaced.
pub fn generate_esocial_events(
  conn: &mut Connection,
  company_id: &str,
  competence: Competence,
  actor: Option<&str>,
) -> Result<Vec<EsocialEvent>, AppError> {
  closing::ensure_open(conn, company_id, competence)?;
  let company = companies::get_company(conn, company_id)?;
  let environment = settings::get_settings(conn)?.esocial_environment;
  let employees = people::list_employees(conn, company_id, true)?;
  let payrolls = payroll::list_payrolls(conn, company_id, competence)?;
  let terminations = payroll::terminations_in(conn, company_id, competence)?;
  let employee_of = |id: &str| {
    employees
      .iter()
      .find(|employee| employee.id == id)
      .ok_or_else(|| AppError::not_found("Funcionario nao encontrado"))
  };

  let tx = conn.transaction()?;
  tx.execute(
    "DELETE FROM esocial_events
     WHERE company_id = ?1 AND year = ?2 AND month = ?3 AND status = 'PENDENTE'
       AND event_type IN ('S-1200', 'S-1210', 'S-1299')",
    params![company_id, competence.year, competence.month],
  )?;

  let mut batch = Batch {
    conn: &tx,
    company: &company,
    competence,
    environment,
    stamp: Local::now().naive_local(),
    sequence: last_sequence(&tx, company_id)?,
    ids: Vec::new(),
  };

  if !already_sent(&tx, company_id, EsocialEventType::S1000, None, None)? {
    batch.store(EsocialEventType::S1000, Some(company_id), |ctx| build_s1000(ctx, competence))?;
  }

  for employee in &employees {
    let admission = validation::parse_date(&employee.admission_date)?;
    if Competence::of_date(admission) != competence {
      continue;
    }
    if !already_sent(&tx, company_id, EsocialEventType::S2200, Some(&employee.id), None)? {
      batch.store(EsocialEventType::S2200, Some(&employee.id), |ctx| build_s2200(ctx, employee))?;
    }
  }

  let mut remun = 0;
  for item in &payrolls {
    if already_sent(&tx, company_id, EsocialEventType::S1200, Some(&item.id), Some(competence))? {
      continue;
    }
    let employee = employee_of(&item.employee_id)?;
    batch.store(EsocialEventType::S1200, Some(&item.id), |ctx| {
      build_s1200(ctx, competence, item, employee)
    })?;
    batch.store(EsocialEventType::S1210, Some(&item.id), |ctx| {
      build_s1210(ctx, competence, item, employee)
    })?;
    remun += 1;
  }

  for termination in &terminations {
    if already_sent(&tx, company_id, EsocialEventType::S2299, Some(&termination.id), None)? {
      continue;
    }
    let employee = employee_of(&termination.employee_id)?;
    batch.store(EsocialEventType::S2299, Some(&termination.id), |ctx| {
      build_s2299(ctx, employee, termination)
    })?;
  }

  if !already_sent(&tx, company_id, EsocialEventType::S1299, None, Some(competence))? {
    let has_payroll = !payrolls.is_empty();
    batch.store(EsocialEventType::S1299, None, |ctx| {
      build_s1299(ctx, competence, has_payroll, has_payroll)
    })?;
  }

  let ids = batch.ids;
  append_audit(
    &tx,
    actor,
    "GENERATE_ESOCIAL",
    "ESOCIAL_EVENT",
    None,
    Some(company_id),
    payload(&serde_json::json!({ "competence": competence.to_string(), "events": &ids })),
    None,
  )?;
  tx.commit()?;
  log::info!(
    "event=esocial_generated module=export status=ok company_id={company_id} competence={competence} events={} remuneracoes={remun}",
    ids.len()
  );

  ids.iter().map(|id| get_esocial_event(conn, id)).collect()
}

pub fn get_esocial_event(conn: &Connection, id: &str) -> Result<EsocialEvent, AppError> {
  conn
    .query_row(
      &format!("SELECT {EVENT_COLUMNS} FROM esocial_events WHERE id = ?1"),
      params![id],
      map_event,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Evento nao encontrado"))
}

pub fn list_esocial_events(
  conn: &Connection,
  company_id: &str,
  competence: Option<Competence>,
) -> Result<Vec<EsocialEvent>, AppError> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {EVENT_COLUMNS} FROM esocial_events
     WHERE company_id = ?1 AND (?2 IS NULL OR (year = ?2 AND month = ?3))
     ORDER BY created_at, event_id"
  ))?;
  let rows = stmt.query_map(
    params![
      company_id,
      competence.map(|value| value.year),
      competence.map(|value| value.month)
    ],
    map_event,
  )?;
  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

fn update_status(
  conn: &Connection,
  event: &EsocialEvent,
  status: EventStatus,
  protocol: Option<&str>,
  receipt_number: Option<&str>,
  message: Option<&str>,
  actor: Option<&str>,
) -> Result<EsocialEvent, AppError> {
  conn.execute(
    "UPDATE esocial_events
     SET status = ?1, protocol = COALESCE(?2, protocol), receipt_number = ?3, message = ?4, updated_at = ?5
     WHERE id = ?6",
    params![status.as_str(), protocol, receipt_number, message, now(), event.id],
  )?;
  append_audit(
    conn,
    actor,
    "ESOCIAL_STATUS",
    "ESOCIAL_EVENT",
    Some(&event.id),
    Some(&event.company_id),
    payload(&serde_json::json!({
      "event_id": event.event_id,
      "status": status,
      "protocol": protocol,
      "receipt_number": receipt_number,
    })),
    Some(format!("{} -> {}", event.status, status)),
  )?;
  log::info!(
    "event=esocial_status module=export status=ok event_type={} event_id={} new_status={status}",
    event.event_type,
    event.event_id
  );
  get_esocial_event(conn, &event.id)
}

/// Marks a pending event as sent and assigns a protocol number.
pub fn transmit_event<R: RngCore>(conn: &Connection, id: &str, rng: &mut R, actor: Option<&str>) -> Result<EsocialEvent, AppError> {
  let event = get_esocial_event(conn, id)?;
  if event.status != EventStatus::Pendente {
    return Err(AppError::new(
      "INVALID_STATUS",
      format!("Evento {} ja esta {}", event.event_id, event.status),
    ));
  }
  let environment = settings::get_settings(conn)?.esocial_environment;
  let protocol = format!(
    "1.{environment}.{}{:02}.{:019}",
    event.year,
    event.month,
    rng.next_u64() % 10_000_000_000_000_000_000
  );
  update_status(conn, &event, EventStatus::Enviado, Some(&protocol), None, None, actor)
}

/// Simulated return of a sent event. Events already processed or rejected are
/// returned unchanged.
pub fn poll_event_status<R: RngCore>(conn: &Connection, id: &str, rng: &mut R, actor: Option<&str>) -> Result<EsocialEvent, AppError> {
  let event = get_esocial_event(conn, id)?;
  match event.status {
    EventStatus::Pendente => Err(AppError::new("NOT_TRANSMITTED", "Evento ainda nao foi transmitido")),
    EventStatus::Processado | EventStatus::Rejeitado => Ok(event),
    EventStatus::Enviado => {
      if rng.gen_bool(SUCCESS_PROBABILITY) {
        let receipt = format!("1.{}.{:019}", event.year % 10, rng.next_u64() % 10_000_000_000_000_000_000);
        update_status(conn, &event, EventStatus::Processado, None, Some(&receipt), None, actor)
      } else {
        let message = REJECTIONS[(rng.next_u32() as usize) % REJECTIONS.len()];
        log::warn!(
          "event=esocial_rejected module=export status=error event_id={} message={message}",
          event.event_id
        );
        update_status(conn, &event, EventStatus::Rejeitado, None, None, Some(message), actor)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;
  use rand::rngs::mock::StepRng;

  use crate::models::{TerminationInput, TaxRegime};
  use crate::test_support::{add_employee, setup};

  fn march() -> Competence {
    Competence::new(2025, 3).unwrap()
  }

  fn stamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, 2).unwrap().and_hms_opt(9, 30, 5).unwrap()
  }

  #[test]
  fn event_id_pads_cnpj_root() {
    let (_conn, company) = setup(TaxRegime::LucroPresumido, None);
    let id = event_id(&company, stamp(), 7);
    assert_eq!(id, "ID1112223330000002025040209300500007");
    assert_eq!(id.len(), 36);
  }

  #[test]
  fn s1000_carries_classification() {
    let (_conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::IV));
    let ctx = EventContext {
      company: &company,
      environment: 2,
      event_id: event_id(&company, stamp(), 1),
    };
    let xml = build_s1000(&ctx, march()).unwrap();
    assert!(xml.starts_with("<eSocial xmlns=\"http://www.esocial.gov.br/schema/evt/evtInfoEmpregador/v_S_01_02_00\">"));
    assert!(xml.contains("<evtInfoEmpregador Id=\"ID1112223330000002025040209300500001\">"));
    assert!(xml.contains("<tpAmb>2</tpAmb>"));
    assert!(xml.contains("<nrInsc>11222333</nrInsc>"));
    assert!(xml.contains("<iniValid>2025-03</iniValid>"));
    assert!(xml.contains("<classTrib>02</classTrib>"));
    assert!(!xml.contains("indRetif"));
  }

  #[test]
  fn generates_periodic_events_and_replaces_pending_ones() {
    let (mut conn, company) = setup(TaxRegime::LucroPresumido, None);
    add_employee(&conn, &company.id, "Joana", "52998224725", 3000.0, "2025-03-01");
    crate::payroll::run_payroll(&mut conn, &company.id, march(), &[], None).unwrap();

    let events = generate_esocial_events(&mut conn, &company.id, march(), None).unwrap();
    let types: Vec<EsocialEventType> = events.iter().map(|event| event.event_type).collect();
    assert_eq!(
      types,
      vec![
        EsocialEventType::S1000,
        EsocialEventType::S2200,
        EsocialEventType::S1200,
        EsocialEventType::S1210,
        EsocialEventType::S1299,
      ]
    );
    assert!(events.iter().all(|event| event.status == EventStatus::Pendente));
    let remun = &events[2];
    assert!(remun.xml.contains("<perApur>2025-03</perApur>"));
    assert!(remun.xml.contains("<codRubr>1000</codRubr><ideTabRubr>RUBR</ideTabRubr><vrRubr>3000.00</vrRubr>"));
    assert!(events[4].xml.contains("<evtRemun>S</evtRemun>"));

    let again = generate_esocial_events(&mut conn, &company.id, march(), None).unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(list_esocial_events(&conn, &company.id, Some(march())).unwrap().len(), 5);
  }

  #[test]
  fn termination_event_uses_reason_code() {
    let (mut conn, company) = setup(TaxRegime::LucroPresumido, None);
    let employee = add_employee(&conn, &company.id, "Joana", "52998224725", 3000.0, "2024-01-10");
    crate::payroll::create_termination(
      &mut conn,
      &company.id,
      &TerminationInput {
        employee_id: employee.id.clone(),
        termination_date: "2025-03-15".to_string(),
        reason: TerminationReason::Acordo,
        notice_worked: Some(false),
        vested_vacation_periods: None,
        fgts_balance: Some(1000.0),
      },
      None,
    )
    .unwrap();

    let events = generate_esocial_events(&mut conn, &company.id, march(), None).unwrap();
    let deslig = events
      .iter()
      .find(|event| event.event_type == EsocialEventType::S2299)
      .unwrap();
    assert!(deslig.xml.contains("<mtvDeslig>33</mtvDeslig>"));
    assert!(deslig.xml.contains("<dtDeslig>2025-03-15</dtDeslig>"));
    assert!(deslig.xml.contains("<indPagtoAPI>S</indPagtoAPI>"));
  }

  #[test]
  fn transmission_and_simulated_outcomes() {
    let (mut conn, company) = setup(TaxRegime::LucroPresumido, None);
    let events = generate_esocial_events(&mut conn, &company.id, march(), None).unwrap();
    let first = &events[0];
    let second = &events[1];

    assert_eq!(
      poll_event_status(&conn, &first.id, &mut StepRng::new(0, 0), None).unwrap_err().code,
      "NOT_TRANSMITTED"
    );

    let sent = transmit_event(&conn, &first.id, &mut StepRng::new(42, 0), None).unwrap();
    assert_eq!(sent.status, EventStatus::Enviado);
    assert!(sent.protocol.as_deref().unwrap().starts_with("1.2.202503."));
    assert_eq!(
      transmit_event(&conn, &first.id, &mut StepRng::new(42, 0), None).unwrap_err().code,
      "INVALID_STATUS"
    );

    let processed = poll_event_status(&conn, &first.id, &mut StepRng::new(0, 0), None).unwrap();
    assert_eq!(processed.status, EventStatus::Processado);
    assert!(processed.receipt_number.is_some());

    transmit_event(&conn, &second.id, &mut StepRng::new(1, 0), None).unwrap();
    let rejected = poll_event_status(&conn, &second.id, &mut StepRng::new(u64::MAX, 0), None).unwrap();
    assert_eq!(rejected.status, EventStatus::Rejeitado);
    assert!(rejected.message.unwrap().starts_with("MS"));
    assert!(rejected.protocol.is_some());
    assert!(rejected.receipt_number.is_none());
  }
}
