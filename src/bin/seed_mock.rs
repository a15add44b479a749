use std::path::PathBuf;

use chrono::{Datelike, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use contabil_fiscal::companies;
use contabil_fiscal::db;
use contabil_fiscal::domain::Competence;
use contabil_fiscal::error::AppError;
use contabil_fiscal::launches;
use contabil_fiscal::models::{
  Accountant, Address, CompanyInput, ContractKind, Direction, EmployeeInput, LaunchInput, LaunchKind, PartnerInput,
  Party, TaxAmounts, TaxRegime,
};
use contabil_fiscal::{accounts, payroll, people};

const DEMO_CNPJ: &str = "11222333000181";
const CLIENT_CNPJ: &str = "11444777000161";
const SUPPLIER_CNPJ: &str = "45997418000153";

const EMPLOYEES: &[(&str, &str, f64, &str)] = &[
  ("Ana Souza", "52998224725", 2800.0, "Auxiliar administrativo"),
  ("Bruno Lima", "16899535009", 3600.0, "Mecanico"),
  ("Carla Dias", "11144477735", 4200.0, "Supervisora"),
];

const SERVICES: &[&str] = &[
  "Revisao preventiva",
  "Troca de oleo",
  "Alinhamento e balanceamento",
  "Diagnostico eletronico",
  "Reparo de freios",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let months = std::env::args()
    .nth(1)
    .and_then(|value| value.parse::<usize>().ok())
    .unwrap_or(6)
    .clamp(1, 24);

  let app_dir = match std::env::var("CONTABIL_SEED_DIR") {
    Ok(path) => PathBuf::from(path),
    Err(_) => db::resolve_app_dir()?,
  };
  let (db, _documents_base) = db::init_db(&app_dir)?;

  let launches = db::with_conn(&db, |conn| seed_demo_company(conn, months))?;
  println!("{launches} lancamentos de demonstracao criados em {}", app_dir.display());
  Ok(())
}

fn demo_company() -> CompanyInput {
  CompanyInput {
    cnpj: DEMO_CNPJ.to_string(),
    razao_social: "Oficina Demonstracao Ltda".to_string(),
    nome_fantasia: Some("Oficina Demo".to_string()),
    regime: TaxRegime::LucroPresumido,
    simples_anexo: None,
    activity_start: Some("2020-01-01".to_string()),
    address: Address {
      logradouro: Some("Avenida Brasil".to_string()),
      numero: Some("1500".to_string()),
      bairro: Some("Centro".to_string()),
      cep: Some("30140000".to_string()),
      municipio: Some("Belo Horizonte".to_string()),
      uf: "MG".to_string(),
      codigo_municipio: Some("3106200".to_string()),
      ..Address::default()
    },
    inscricao_estadual: None,
    inscricao_municipal: Some("0012345".to_string()),
    cnae: Some("4520001".to_string()),
    rat_rate: Some(2.0),
    accountant: Accountant {
      nome: Some("Maria Contadora".to_string()),
      cpf: Some("39053344705".to_string()),
      crc: Some("MG-012345/O".to_string()),
    },
    email: Some("contato@oficinademo.com.br".to_string()),
    telefone: Some("3133334444".to_string()),
  }
}

fn seed_demo_company(conn: &mut Connection, months: usize) -> Result<usize, AppError> {
  let actor = Some("seed");
  let company = match companies::find_by_cnpj(conn, DEMO_CNPJ)? {
    Some(company) => company,
    None => companies::create_company(conn, &demo_company(), actor)?,
  };
  companies::set_active_company(conn, &company.id, actor)?;

  if accounts::list_accounts(conn, &company.id)?.is_empty() {
    accounts::seed_default_chart(conn, &company.id, actor)?;
  }
  if people::list_partners(conn, &company.id, true)?.is_empty() {
    people::create_partner(
      conn,
      &company.id,
      &PartnerInput {
        name: "Carlos Socio".to_string(),
        cpf: "98765432100".to_string(),
        share_percent: 100.0,
        pro_labore: 5000.0,
        dependents: Some(1),
        entry_date: Some("2020-01-01".to_string()),
      },
      actor,
    )?;
  }
  if people::list_employees(conn, &company.id, true)?.is_empty() {
    for (name, cpf, salary, cargo) in EMPLOYEES {
      people::create_employee(
        conn,
        &company.id,
        &EmployeeInput {
          matricula: None,
          name: name.to_string(),
          cpf: cpf.to_string(),
          pis: None,
          birth_date: Some("1990-01-15".to_string()),
          admission_date: "2021-03-01".to_string(),
          cargo: cargo.to_string(),
          cbo: None,
          base_salary: *salary,
          contract_kind: ContractKind::Clt,
          esocial_category: None,
          dependents: None,
        },
        actor,
      )?;
    }
  }

  let mut rng = StdRng::seed_from_u64(Local::now().timestamp_millis() as u64);
  let current = Competence::of_date(Local::now().date_naive());
  let partners = people::list_partners(conn, &company.id, false)?;
  let mut created = 0;
  for competence in current.preceding(months) {
    if launches::revenue_for_month(conn, &company.id, competence)? > 0.0 {
      continue;
    }
    created += seed_month(conn, &company.id, competence, &mut rng)?;
    payroll::run_payroll(conn, &company.id, competence, &[], actor)?;
    for partner in &partners {
      payroll::create_rci(conn, &company.id, &partner.id, competence, None, actor)?;
    }
  }
  log::info!("event=seed module=seed status=ok company_id={} launches={created}", company.id);
  Ok(created)
}

fn seed_month(conn: &Connection, company_id: &str, competence: Competence, rng: &mut StdRng) -> Result<usize, AppError> {
  let last_day = competence.last_day().day();
  let mut created = 0;
  for sequence in 0..rng.gen_range(8..16) {
    let day = rng.gen_range(1..=last_day);
    let date = NaiveDate::from_ymd_opt(competence.year, competence.month, day).unwrap_or(competence.first_day());
    let total = (rng.gen_range(150.0..4500.0_f64) * 100.0).round() / 100.0;
    let description = SERVICES[rng.gen_range(0..SERVICES.len())];
    let input = LaunchInput {
      kind: LaunchKind::Nfse,
      direction: Direction::Saida,
      number: format!("{}{:02}{:03}", competence.year, competence.month, sequence + 1),
      series: None,
      access_key: None,
      issue_date: date.format("%Y-%m-%d").to_string(),
      emitente: Party {
        document: DEMO_CNPJ.to_string(),
        name: "Oficina Demonstracao Ltda".to_string(),
      },
      destinatario: Some(Party {
        document: CLIENT_CNPJ.to_string(),
        name: format!("Cliente Frota ({description})"),
      }),
      service_code: Some("14.01".to_string()),
      total,
      taxes: TaxAmounts {
        iss: (total * 0.05 * 100.0).round() / 100.0,
        ..TaxAmounts::default()
      },
      items: Vec::new(),
    };
    launches::create_launch(conn, company_id, &input, None, Some("seed"))?;
    created += 1;
  }

  let cleaning = 1200.0;
  launches::create_launch(
    conn,
    company_id,
    &LaunchInput {
      kind: LaunchKind::Nfse,
      direction: Direction::Entrada,
      number: format!("L{}{:02}", competence.year, competence.month),
      series: None,
      access_key: None,
      issue_date: competence.first_day().format("%Y-%m-%d").to_string(),
      emitente: Party {
        document: SUPPLIER_CNPJ.to_string(),
        name: "Limpeza Total Ltda".to_string(),
      },
      destinatario: Some(Party {
        document: DEMO_CNPJ.to_string(),
        name: "Oficina Demonstracao Ltda".to_string(),
      }),
      service_code: Some("07.10".to_string()),
      total: cleaning,
      taxes: TaxAmounts {
        ret_inss: cleaning * 0.11,
        ret_ir: cleaning * 0.015,
        ret_csll: cleaning * 0.01,
        ret_pis: cleaning * 0.0065,
        ret_cofins: cleaning * 0.03,
        ..TaxAmounts::default()
      },
      items: Vec::new(),
    },
    None,
    Some("seed"),
  )?;
  Ok(created + 1)
}
