use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Enumerations stored as text columns and exchanged as SCREAMING_SNAKE strings.
macro_rules! text_enum {
  ($name:ident, $code:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(
        #[serde(rename = $text)]
        $variant,
      )+
    }

    impl $name {
      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $text,)+
        }
      }

      pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim() {
          $($text => Ok($name::$variant),)+
          other => Err(AppError::new($code, format!("Valor invalido: {other}"))),
        }
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
      }
    }
  };
}

text_enum!(TaxRegime, "INVALID_REGIME", {
  SimplesNacional => "SIMPLES_NACIONAL",
  LucroPresumido => "LUCRO_PRESUMIDO",
  LucroReal => "LUCRO_REAL",
  Mei => "MEI",
});

text_enum!(Anexo, "INVALID_ANEXO", {
  I => "I",
  II => "II",
  III => "III",
  IV => "IV",
  V => "V",
});

text_enum!(ContractKind, "INVALID_CONTRACT", {
  Clt => "CLT",
  Aprendiz => "APRENDIZ",
});

text_enum!(EmployeeStatus, "INVALID_STATUS", {
  Ativo => "ATIVO",
  Afastado => "AFASTADO",
  Desligado => "DESLIGADO",
});

text_enum!(LaunchKind, "INVALID_KIND", {
  Nfe => "NFE",
  Nfse => "NFSE",
  Manual => "MANUAL",
});

text_enum!(Direction, "INVALID_DIRECTION", {
  Entrada => "ENTRADA",
  Saida => "SAIDA",
});

text_enum!(LaunchStatus, "INVALID_STATUS", {
  Ativa => "ATIVA",
  Cancelada => "CANCELADA",
});

text_enum!(TerminationReason, "INVALID_REASON", {
  SemJustaCausa => "SEM_JUSTA_CAUSA",
  JustaCausa => "JUSTA_CAUSA",
  PedidoDemissao => "PEDIDO_DEMISSAO",
  Acordo => "ACORDO",
  TerminoContrato => "TERMINO_CONTRATO",
});

text_enum!(Installment, "INVALID_INSTALLMENT", {
  Primeira => "PRIMEIRA",
  Segunda => "SEGUNDA",
});

text_enum!(EsocialEventType, "INVALID_EVENT", {
  S1000 => "S-1000",
  S1200 => "S-1200",
  S1210 => "S-1210",
  S1299 => "S-1299",
  S2200 => "S-2200",
  S2299 => "S-2299",
});

text_enum!(EventStatus, "INVALID_STATUS", {
  Pendente => "PENDENTE",
  Enviado => "ENVIADO",
  Processado => "PROCESSADO",
  Rejeitado => "REJEITADO",
});

text_enum!(AccountKind, "INVALID_ACCOUNT_KIND", {
  Sintetica => "SINTETICA",
  Analitica => "ANALITICA",
});

text_enum!(AccountNature, "INVALID_NATURE", {
  Devedora => "DEVEDORA",
  Credora => "CREDORA",
});

text_enum!(QuoteStatus, "INVALID_STATUS", {
  Rascunho => "RASCUNHO",
  Enviado => "ENVIADO",
  Aprovado => "APROVADO",
  Recusado => "RECUSADO",
});

text_enum!(UserRole, "INVALID_ROLE", {
  Admin => "ADMIN",
  Usuario => "USUARIO",
});

text_enum!(UserStatus, "INVALID_STATUS", {
  Pendente => "PENDENTE",
  Aprovado => "APROVADO",
  Desativado => "DESATIVADO",
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
  pub active_company_id: Option<String>,
  pub esocial_environment: u8,
  pub cnpj_api_url: String,
  pub documents_base_folder: String,
  pub backup_folder: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Address {
  pub logradouro: Option<String>,
  pub numero: Option<String>,
  pub complemento: Option<String>,
  pub bairro: Option<String>,
  pub cep: Option<String>,
  pub municipio: Option<String>,
  pub uf: String,
  pub codigo_municipio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Accountant {
  pub nome: Option<String>,
  pub cpf: Option<String>,
  pub crc: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Company {
  pub id: String,
  pub cnpj: String,
  pub razao_social: String,
  pub nome_fantasia: Option<String>,
  pub regime: TaxRegime,
  pub simples_anexo: Option<Anexo>,
  pub activity_start: Option<String>,
  pub address: Address,
  pub inscricao_estadual: Option<String>,
  pub inscricao_municipal: Option<String>,
  pub cnae: Option<String>,
  pub rat_rate: f64,
  pub accountant: Accountant,
  pub email: Option<String>,
  pub telefone: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompanyInput {
  pub cnpj: String,
  pub razao_social: String,
  pub nome_fantasia: Option<String>,
  pub regime: TaxRegime,
  pub simples_anexo: Option<Anexo>,
  pub activity_start: Option<String>,
  pub address: Address,
  pub inscricao_estadual: Option<String>,
  pub inscricao_municipal: Option<String>,
  pub cnae: Option<String>,
  pub rat_rate: Option<f64>,
  #[serde(default)]
  pub accountant: Accountant,
  pub email: Option<String>,
  pub telefone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Partner {
  pub id: String,
  pub company_id: String,
  pub name: String,
  pub cpf: String,
  pub share_percent: f64,
  pub pro_labore: f64,
  pub dependents: u32,
  pub entry_date: Option<String>,
  pub is_active: bool,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PartnerInput {
  pub name: String,
  pub cpf: String,
  pub share_percent: f64,
  pub pro_labore: f64,
  pub dependents: Option<u32>,
  pub entry_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Employee {
  pub id: String,
  pub company_id: String,
  pub matricula: String,
  pub name: String,
  pub cpf: String,
  pub pis: Option<String>,
  pub birth_date: Option<String>,
  pub admission_date: String,
  pub cargo: String,
  pub cbo: Option<String>,
  pub base_salary: f64,
  pub contract_kind: ContractKind,
  pub esocial_category: u16,
  pub dependents: u32,
  pub status: EmployeeStatus,
  pub termination_date: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmployeeInput {
  pub matricula: Option<String>,
  pub name: String,
  pub cpf: String,
  pub pis: Option<String>,
  pub birth_date: Option<String>,
  pub admission_date: String,
  pub cargo: String,
  pub cbo: Option<String>,
  pub base_salary: f64,
  pub contract_kind: ContractKind,
  pub esocial_category: Option<u16>,
  pub dependents: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TaxAmounts {
  pub icms: f64,
  pub ipi: f64,
  pub pis: f64,
  pub cofins: f64,
  pub iss: f64,
  pub ret_ir: f64,
  pub ret_inss: f64,
  pub ret_csll: f64,
  pub ret_pis: f64,
  pub ret_cofins: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Party {
  pub document: String,
  pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LaunchItem {
  pub code: Option<String>,
  pub description: String,
  pub ncm: Option<String>,
  pub cfop: Option<String>,
  pub quantity: f64,
  pub unit_price: f64,
  pub total: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Launch {
  pub id: String,
  pub company_id: String,
  pub kind: LaunchKind,
  pub direction: Direction,
  pub number: String,
  pub series: Option<String>,
  pub access_key: Option<String>,
  pub issue_date: String,
  pub year: i32,
  pub month: u32,
  pub emitente: Party,
  pub destinatario: Option<Party>,
  pub service_code: Option<String>,
  pub total: f64,
  pub taxes: TaxAmounts,
  pub status: LaunchStatus,
  pub items: Vec<LaunchItem>,
  pub document_path: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LaunchInput {
  pub kind: LaunchKind,
  pub direction: Direction,
  pub number: String,
  pub series: Option<String>,
  pub access_key: Option<String>,
  pub issue_date: String,
  pub emitente: Party,
  pub destinatario: Option<Party>,
  pub service_code: Option<String>,
  pub total: f64,
  #[serde(default)]
  pub taxes: TaxAmounts,
  #[serde(default)]
  pub items: Vec<LaunchItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LaunchFilter {
  pub year: Option<i32>,
  pub month: Option<u32>,
  pub kind: Option<LaunchKind>,
  pub direction: Option<Direction>,
  pub search: Option<String>,
  pub page: i64,
  pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub total: i64,
  pub items: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payroll {
  pub id: String,
  pub company_id: String,
  pub employee_id: String,
  pub employee_name: String,
  pub year: i32,
  pub month: u32,
  pub base_salary: f64,
  pub overtime: f64,
  pub other_earnings: f64,
  pub gross: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub other_discounts: f64,
  pub net: f64,
  pub employer_cpp: f64,
  pub employer_rat: f64,
  pub employer_terceiros: f64,
  pub created_at: String,
}

/// Variable amounts for one employee in a payroll run.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PayrollEntryInput {
  pub employee_id: String,
  pub overtime: f64,
  pub other_earnings: f64,
  pub other_discounts: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PayrollSummary {
  pub year: i32,
  pub month: u32,
  pub employees: i64,
  pub gross: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub net: f64,
  pub employer_charges: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Rci {
  pub id: String,
  pub company_id: String,
  pub partner_id: String,
  pub partner_name: String,
  pub year: i32,
  pub month: u32,
  pub amount: f64,
  pub inss: f64,
  pub irrf: f64,
  pub net: f64,
  pub employer_cpp: f64,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VacationInput {
  pub employee_id: String,
  pub start_date: String,
  pub days: u32,
  pub sold_days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vacation {
  pub id: String,
  pub company_id: String,
  pub employee_id: String,
  pub start_date: String,
  pub days: u32,
  pub sold_days: u32,
  pub year: i32,
  pub month: u32,
  pub vacation_pay: f64,
  pub one_third: f64,
  pub abono: f64,
  pub abono_one_third: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub net: f64,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThirteenthInput {
  pub employee_id: String,
  pub year: i32,
  pub installment: Installment,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Thirteenth {
  pub id: String,
  pub company_id: String,
  pub employee_id: String,
  pub year: i32,
  pub installment: Installment,
  pub months_worked: u32,
  pub gross: f64,
  pub advance: f64,
  pub inss: f64,
  pub irrf: f64,
  pub fgts: f64,
  pub net: f64,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TerminationInput {
  pub employee_id: String,
  pub termination_date: String,
  pub reason: TerminationReason,
  pub notice_worked: Option<bool>,
  pub vested_vacation_periods: Option<u32>,
  pub fgts_balance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Termination {
  pub id: String,
  pub company_id: String,
  pub employee_id: String,
  pub termination_date: String,
  pub reason: TerminationReason,
  pub notice_days: u32,
  pub saldo_salario: f64,
  pub aviso_previo: f64,
  pub ferias_vencidas: f64,
  pub ferias_proporcionais: f64,
  pub ferias_one_third: f64,
  pub decimo_terceiro: f64,
  pub fgts_deposit: f64,
  pub fgts_fine: f64,
  pub inss: f64,
  pub irrf: f64,
  pub gross: f64,
  pub net: f64,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EsocialEvent {
  pub id: String,
  pub company_id: String,
  pub event_type: EsocialEventType,
  pub reference_id: Option<String>,
  pub year: i32,
  pub month: u32,
  pub event_id: String,
  pub xml: String,
  pub status: EventStatus,
  pub protocol: Option<String>,
  pub receipt_number: Option<String>,
  pub message: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReinfEventPayload {
  pub event_type: String,
  pub event_id: String,
  pub xml: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReinfFile {
  pub id: String,
  pub company_id: String,
  pub year: i32,
  pub month: u32,
  pub events: Vec<ReinfEventPayload>,
  pub total_retained_inss: f64,
  pub total_retained_ir: f64,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PgdasApuracao {
  pub id: String,
  pub company_id: String,
  pub year: i32,
  pub month: u32,
  pub rpa: f64,
  pub rbt12: f64,
  pub anexo: Anexo,
  pub bracket: u32,
  pub nominal_rate: f64,
  pub deduction: f64,
  pub effective_rate: f64,
  pub das: f64,
  pub fator_r: Option<f64>,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContaContabil {
  pub id: String,
  pub company_id: String,
  pub code: String,
  pub name: String,
  pub kind: AccountKind,
  pub nature: AccountNature,
  pub parent_code: Option<String>,
  pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContaContabilInput {
  pub code: String,
  pub name: String,
  pub kind: AccountKind,
  pub nature: AccountNature,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuoteItem {
  pub description: String,
  pub quantity: f64,
  pub unit_price: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Orcamento {
  pub id: String,
  pub company_id: String,
  pub number: i64,
  pub client_name: String,
  pub client_document: Option<String>,
  pub issue_date: String,
  pub valid_until: String,
  pub items: Vec<QuoteItem>,
  pub total: f64,
  pub status: QuoteStatus,
  pub notes: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrcamentoInput {
  pub client_name: String,
  pub client_document: Option<String>,
  pub issue_date: String,
  pub valid_days: Option<u32>,
  pub items: Vec<QuoteItem>,
  pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Recibo {
  pub id: String,
  pub company_id: String,
  pub number: i64,
  pub payer_name: String,
  pub payer_document: Option<String>,
  pub amount: f64,
  pub amount_words: String,
  pub description: String,
  pub issue_date: String,
  pub city: Option<String>,
  pub orcamento_id: Option<String>,
  pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReciboInput {
  pub payer_name: String,
  pub payer_document: Option<String>,
  pub amount: f64,
  pub description: String,
  pub issue_date: String,
  pub city: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppUser {
  pub id: String,
  pub email: String,
  pub display_name: String,
  pub role: UserRole,
  pub status: UserStatus,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CnpjLookupResult {
  pub cnpj: String,
  pub razao_social: String,
  pub nome_fantasia: Option<String>,
  pub situacao: Option<String>,
  pub cnae: Option<String>,
  pub cnae_descricao: Option<String>,
  pub opcao_simples: Option<bool>,
  pub address: Address,
  pub email: Option<String>,
  pub telefone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompetenceStatus {
  pub company_id: String,
  pub year: i32,
  pub month: u32,
  pub is_closed: bool,
  pub closed_at: Option<String>,
  pub closed_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub id: i64,
  pub ts: String,
  pub actor: Option<String>,
  pub action: String,
  pub entity_type: String,
  pub entity_id: Option<String>,
  pub company_id: Option<String>,
  pub payload_json: String,
  pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupRequest {
  pub output_path: Option<String>,
  pub actor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreRequest {
  pub archive_path: String,
  pub actor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompanyBackupRequest {
  pub company_id: String,
  pub collections: Vec<String>,
  pub actor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ImportOutcome {
  #[serde(rename = "IMPORTED")]
  Imported { launch_id: String },
  #[serde(rename = "DUPLICATE")]
  Duplicate { access_key: String },
  #[serde(rename = "FOREIGN")]
  ForeignCompany,
  #[serde(rename = "INVALID")]
  Invalid { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImportFileResult {
  pub file: String,
  pub outcome: ImportOutcome,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ImportSummary {
  pub imported: i64,
  pub duplicates: i64,
  pub foreign: i64,
  pub invalid: i64,
  pub files: Vec<ImportFileResult>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_enums_round_trip_through_strings() {
    assert_eq!(TaxRegime::parse("LUCRO_PRESUMIDO").unwrap(), TaxRegime::LucroPresumido);
    assert_eq!(EsocialEventType::S1200.as_str(), "S-1200");
    assert_eq!(Anexo::parse(" III ").unwrap(), Anexo::III);
    let err = Direction::parse("LATERAL").unwrap_err();
    assert_eq!(err.code, "INVALID_DIRECTION");
  }

  #[test]
  fn text_enums_serialize_with_wire_names() {
    let json = serde_json::to_string(&TerminationReason::SemJustaCausa).unwrap();
    assert_eq!(json, "\"SEM_JUSTA_CAUSA\"");
  }
}
