//! Fixtures shared by unit tests.

use rusqlite::Connection;

use crate::companies::create_company;
use crate::db::open_db_in_memory;
use crate::launches::create_launch;
use crate::models::{
  Accountant, Address, Anexo, Company, CompanyInput, ContractKind, Direction, Employee, EmployeeInput, Launch,
  LaunchInput, LaunchKind, Partner, PartnerInput, Party, TaxAmounts, TaxRegime,
};
use crate::people::{create_employee, create_partner};

pub const OWN_CNPJ: &str = "11222333000181";
pub const SUPPLIER_CNPJ: &str = "11444777000161";

pub fn company_input(regime: TaxRegime, anexo: Option<Anexo>) -> CompanyInput {
  CompanyInput {
    cnpj: OWN_CNPJ.to_string(),
    razao_social: "Oficina Boa Ltda".to_string(),
    nome_fantasia: Some("Oficina Boa".to_string()),
    regime,
    simples_anexo: anexo,
    activity_start: Some("2020-01-01".to_string()),
    address: Address {
      logradouro: Some("Rua das Flores".to_string()),
      numero: Some("100".to_string()),
      complemento: None,
      bairro: Some("Centro".to_string()),
      cep: Some("30110000".to_string()),
      municipio: Some("Belo Horizonte".to_string()),
      uf: "MG".to_string(),
      codigo_municipio: Some("3106200".to_string()),
    },
    inscricao_estadual: None,
    inscricao_municipal: Some("123456".to_string()),
    cnae: Some("4520001".to_string()),
    rat_rate: Some(2.0),
    accountant: Accountant {
      nome: Some("Maria Contadora".to_string()),
      cpf: Some("39053344705".to_string()),
      crc: Some("MG-012345/O".to_string()),
    },
    email: Some("contato@oficinaboa.com.br".to_string()),
    telefone: Some("3133334444".to_string()),
  }
}

pub fn setup(regime: TaxRegime, anexo: Option<Anexo>) -> (Connection, Company) {
  let conn = open_db_in_memory().unwrap();
  let company = create_company(&conn, &company_input(regime, anexo), None).unwrap();
  (conn, company)
}

pub fn employee_input(name: &str, cpf: &str, salary: f64, admission: &str) -> EmployeeInput {
  EmployeeInput {
    matricula: None,
    name: name.to_string(),
    cpf: cpf.to_string(),
    pis: None,
    birth_date: Some("1990-05-20".to_string()),
    admission_date: admission.to_string(),
    cargo: "Mecanico".to_string(),
    cbo: Some("914405".to_string()),
    base_salary: salary,
    contract_kind: ContractKind::Clt,
    esocial_category: None,
    dependents: None,
  }
}

pub fn add_employee(conn: &Connection, company_id: &str, name: &str, cpf: &str, salary: f64, admission: &str) -> Employee {
  create_employee(conn, company_id, &employee_input(name, cpf, salary, admission), None).unwrap()
}

pub fn add_partner(conn: &Connection, company_id: &str, pro_labore: f64) -> Partner {
  create_partner(
    conn,
    company_id,
    &PartnerInput {
      name: "Carlos Socio".to_string(),
      cpf: "11144477735".to_string(),
      share_percent: 100.0,
      pro_labore,
      dependents: None,
      entry_date: Some("2020-01-01".to_string()),
    },
    None,
  )
  .unwrap()
}

pub fn sale_input(number: &str, date: &str, total: f64) -> LaunchInput {
  LaunchInput {
    kind: LaunchKind::Manual,
    direction: Direction::Saida,
    number: number.to_string(),
    series: Some("1".to_string()),
    access_key: None,
    issue_date: date.to_string(),
    emitente: Party {
      document: OWN_CNPJ.to_string(),
      name: "Oficina Boa Ltda".to_string(),
    },
    destinatario: Some(Party {
      document: SUPPLIER_CNPJ.to_string(),
      name: "Cliente Grande SA".to_string(),
    }),
    service_code: None,
    total,
    taxes: TaxAmounts::default(),
    items: Vec::new(),
  }
}

pub fn add_sale(conn: &Connection, company_id: &str, number: &str, date: &str, total: f64) -> Launch {
  create_launch(conn, company_id, &sale_input(number, date, total), None, None).unwrap()
}

/// Service invoice received from the supplier, with retentions.
pub fn add_service_taken(
  conn: &Connection,
  company_id: &str,
  number: &str,
  date: &str,
  total: f64,
  taxes: TaxAmounts,
) -> Launch {
  let input = LaunchInput {
    kind: LaunchKind::Nfse,
    direction: Direction::Entrada,
    number: number.to_string(),
    series: None,
    access_key: None,
    issue_date: date.to_string(),
    emitente: Party {
      document: SUPPLIER_CNPJ.to_string(),
      name: "Limpeza Total Ltda".to_string(),
    },
    destinatario: Some(Party {
      document: OWN_CNPJ.to_string(),
      name: "Oficina Boa Ltda".to_string(),
    }),
    service_code: Some("07.10".to_string()),
    total,
    taxes,
    items: Vec::new(),
  };
  create_launch(conn, company_id, &input, None, None).unwrap()
}
