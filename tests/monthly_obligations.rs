mod common;

use rand::rngs::mock::StepRng;

use common::{sale, setup};
use contabil_fiscal::domain::{closing, Competence};
use contabil_fiscal::export::{esocial, reinf};
use contabil_fiscal::models::{
  Anexo, ContractKind, Direction, EmployeeInput, EsocialEventType, EventStatus, LaunchInput, LaunchKind, Party, TaxAmounts,
  TaxRegime,
};
use contabil_fiscal::{audit, launches, payroll, people, pgdas};
use rusqlite::Connection;

fn employee(name: &str, cpf: &str, salary: f64, admission: &str) -> EmployeeInput {
  EmployeeInput {
    matricula: None,
    name: name.to_string(),
    cpf: cpf.to_string(),
    pis: None,
    birth_date: Some("1992-07-01".to_string()),
    admission_date: admission.to_string(),
    cargo: "Vendedor".to_string(),
    cbo: Some("521110".to_string()),
    base_salary: salary,
    contract_kind: ContractKind::Clt,
    esocial_category: None,
    dependents: Some(1),
  }
}

#[test]
fn simples_company_closes_a_month() {
  let (mut conn, company) = setup(TaxRegime::SimplesNacional, Some(Anexo::I));
  let march = Competence::new(2025, 3).unwrap();

  for month in march.preceding(12) {
    let date = format!("{}-{:02}-05", month.year, month.month);
    sale(&conn, &company.id, &format!("{}{:02}", month.year, month.month), &date, 10_000.0);
  }
  sale(&conn, &company.id, "202503", "2025-03-05", 10_000.0);

  let apuracao = pgdas::calculate_pgdas(&conn, &company.id, march, Some("tester")).unwrap();
  assert_eq!(apuracao.rpa, 10_000.0);
  assert_eq!(apuracao.rbt12, 120_000.0);
  assert_eq!(apuracao.anexo, Anexo::I);
  assert_eq!(apuracao.bracket, 1);
  assert_eq!(apuracao.das, 400.0);
  assert!(pgdas::pgdas_report(&conn, &company.id, march).unwrap().contains("RBT12"));

  let veteran = people::create_employee(&conn, &company.id, &employee("Joana Reis", "52998224725", 3000.0, "2024-01-10"), None).unwrap();
  people::create_employee(&conn, &company.id, &employee("Pedro Alves", "16899535009", 2400.0, "2025-03-01"), None).unwrap();

  let payrolls = payroll::run_payroll(&mut conn, &company.id, march, &[], Some("tester")).unwrap();
  assert_eq!(payrolls.len(), 2);
  let joana = payrolls.iter().find(|item| item.employee_id == veteran.id).unwrap();
  assert_eq!(joana.gross, 3000.0);
  assert!(joana.inss > 0.0);
  assert!((joana.net - (joana.gross - joana.inss - joana.irrf - joana.other_discounts)).abs() < 0.01);

  let events = esocial::generate_esocial_events(&mut conn, &company.id, march, Some("tester")).unwrap();
  let types: Vec<EsocialEventType> = events.iter().map(|event| event.event_type).collect();
  assert_eq!(types[0], EsocialEventType::S1000);
  assert_eq!(types.iter().filter(|kind| **kind == EsocialEventType::S2200).count(), 1);
  assert_eq!(types.iter().filter(|kind| **kind == EsocialEventType::S1200).count(), 2);
  assert_eq!(types.last(), Some(&EsocialEventType::S1299));
  assert!(events.iter().all(|event| event.status == EventStatus::Pendente));

  let first = &events[0];
  let sent = esocial::transmit_event(&conn, &first.id, &mut StepRng::new(7, 1), Some("tester")).unwrap();
  assert_eq!(sent.status, EventStatus::Enviado);
  let processed = esocial::poll_event_status(&conn, &first.id, &mut StepRng::new(0, 0), Some("tester")).unwrap();
  assert_eq!(processed.status, EventStatus::Processado);
  assert!(processed.receipt_number.is_some());

  closing::set_closed(&conn, &company.id, march, true, Some("tester")).unwrap();
  let err = sale_attempt(&conn, &company.id);
  assert_eq!(err, "PERIOD_CLOSED");
  let err = payroll::run_payroll(&mut conn, &company.id, march, &[], None).unwrap_err();
  assert_eq!(err.code, "PERIOD_CLOSED");
  let err = esocial::generate_esocial_events(&mut conn, &company.id, march, None).unwrap_err();
  assert_eq!(err.code, "PERIOD_CLOSED");
  let err = reinf::generate_reinf_file(&conn, &company.id, march, None).unwrap_err();
  assert_eq!(err.code, "PERIOD_CLOSED");
  assert!(reinf::get_reinf_file(&conn, &company.id, march).unwrap().is_none());

  let log = audit::log::list_audit_log(&conn, Some(company.id.as_str()), 1, 200).unwrap();
  assert!(log.items.iter().any(|entry| entry.action == "GENERATE_ESOCIAL"));
  assert!(log.items.iter().any(|entry| entry.action == "CLOSE_COMPETENCE"));
}

fn sale_attempt(conn: &Connection, company_id: &str) -> String {
  let input = LaunchInput {
    kind: LaunchKind::Manual,
    direction: Direction::Saida,
    number: "late".to_string(),
    series: None,
    access_key: None,
    issue_date: "2025-03-28".to_string(),
    emitente: Party {
      document: common::OWN_CNPJ.to_string(),
      name: "Loja Azul Ltda".to_string(),
    },
    destinatario: None,
    service_code: None,
    total: 10.0,
    taxes: TaxAmounts::default(),
    items: Vec::new(),
  };
  launches::create_launch(conn, company_id, &input, None, None)
    .unwrap_err()
    .code
}

#[test]
fn pgdas_rejects_companies_outside_simples() {
  let (conn, company) = setup(TaxRegime::LucroPresumido, None);
  let err = pgdas::calculate_pgdas(&conn, &company.id, Competence::new(2025, 3).unwrap(), None).unwrap_err();
  assert_eq!(err.code, "NOT_SIMPLES");
}
