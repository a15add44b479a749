use std::fs;
use std::path::{Path, PathBuf};

use tauri::State;

use crate::audit::log::{self as audit_log, append_audit, payload};
use crate::db;
use crate::domain::{closing, Competence};
use crate::error::AppError;
use crate::export::efd_contribuicoes::{self, EfdContribuicoes};
use crate::export::{csv, esocial, excel, reinf};
use crate::files::backup::{self, CompanyBackupResult};
use crate::files::documents::{self, DocumentContent};
use crate::import;
use crate::integrations::cnpj;
use crate::models::*;
use crate::settings;
use crate::{accounts, commercial, companies, launches, payroll, people, pgdas, users};
use crate::AppState;

/// Logs a failed command with its error code before it reaches the frontend.
fn logged<T>(command: &str, result: Result<T, AppError>) -> Result<T, AppError> {
  if let Err(err) = &result {
    log::warn!(
      "event=command_failed module=commands status=error command={command} code={} message={}",
      err.code,
      err.message
    );
  }
  result
}

fn competence(value: &str) -> Result<Competence, AppError> {
  Competence::parse(value)
}

fn resolve_documents_base(settings: &Settings, state: &AppState) -> PathBuf {
  let configured = PathBuf::from(&settings.documents_base_folder);
  if settings.documents_base_folder.trim().is_empty() || !configured.exists() {
    state.documents_base.clone()
  } else {
    configured
  }
}

fn resolve_backup_dir(settings: &Settings, state: &AppState) -> PathBuf {
  if settings.backup_folder.trim().is_empty() {
    state.app_dir.join("backups")
  } else {
    PathBuf::from(&settings.backup_folder)
  }
}

fn export_path(state: &AppState, output_path: Option<String>, file_name: &str) -> Result<PathBuf, AppError> {
  let path = match output_path {
    Some(path) if !path.trim().is_empty() => PathBuf::from(path),
    _ => state.app_dir.join("Exports").join(file_name),
  };
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  Ok(path)
}

fn export_dir(state: &AppState, output_dir: Option<String>) -> PathBuf {
  match output_dir {
    Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
    _ => state.app_dir.join("Exports"),
  }
}

// Settings

#[tauri::command]
pub fn get_settings(state: State<AppState>) -> Result<Settings, AppError> {
  logged(
    "get_settings",
    db::with_conn(&state.db, |conn| {
      let mut settings = settings::get_settings(conn)?;
      settings.documents_base_folder = resolve_documents_base(&settings, &state).to_string_lossy().to_string();
      Ok(settings)
    }),
  )
}

#[tauri::command]
pub fn update_settings(state: State<AppState>, settings_input: Settings, actor: Option<String>) -> Result<Settings, AppError> {
  logged(
    "update_settings",
    db::with_conn(&state.db, |conn| {
      for folder in [&settings_input.documents_base_folder, &settings_input.backup_folder] {
        if !folder.trim().is_empty() {
          fs::create_dir_all(folder)?;
        }
      }
      settings::update_settings(conn, &settings_input)?;
      append_audit(
        conn,
        actor.as_deref(),
        "UPDATE_SETTINGS",
        "SETTINGS",
        None,
        None,
        payload(&settings_input),
        None,
      )?;
      Ok(settings_input)
    }),
  )
}

// Companies

#[tauri::command]
pub fn create_company(state: State<AppState>, input: CompanyInput, actor: Option<String>) -> Result<Company, AppError> {
  logged(
    "create_company",
    db::with_conn(&state.db, |conn| companies::create_company(conn, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn update_company(state: State<AppState>, id: String, input: CompanyInput, actor: Option<String>) -> Result<Company, AppError> {
  logged(
    "update_company",
    db::with_conn(&state.db, |conn| companies::update_company(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn get_company(state: State<AppState>, id: String) -> Result<Company, AppError> {
  logged("get_company", db::with_conn(&state.db, |conn| companies::get_company(conn, &id)))
}

#[tauri::command]
pub fn list_companies(state: State<AppState>) -> Result<Vec<Company>, AppError> {
  logged("list_companies", db::with_conn(&state.db, |conn| companies::list_companies(conn)))
}

#[tauri::command]
pub fn delete_company(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_company",
    db::with_conn(&state.db, |conn| companies::delete_company(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn set_active_company(state: State<AppState>, id: String, actor: Option<String>) -> Result<Company, AppError> {
  logged(
    "set_active_company",
    db::with_conn(&state.db, |conn| companies::set_active_company(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn get_active_company(state: State<AppState>) -> Result<Option<Company>, AppError> {
  logged("get_active_company", db::with_conn(&state.db, |conn| companies::get_active_company(conn)))
}

#[tauri::command]
pub fn lookup_cnpj(state: State<AppState>, cnpj: String) -> Result<CnpjLookupResult, AppError> {
  // The HTTP call runs outside the connection lock.
  let base_url = db::with_conn(&state.db, |conn| Ok(settings::get_settings(conn)?.cnpj_api_url))?;
  logged("lookup_cnpj", cnpj::CnpjClient::new(&base_url).and_then(|client| client.lookup(&cnpj)))
}

#[tauri::command]
pub fn prefill_company_from_cnpj(state: State<AppState>, cnpj: String) -> Result<CompanyInput, AppError> {
  let result = lookup_cnpj(state, cnpj)?;
  Ok(companies::company_from_lookup(&result))
}

// People

#[tauri::command]
pub fn create_partner(
  state: State<AppState>,
  company_id: String,
  input: PartnerInput,
  actor: Option<String>,
) -> Result<Partner, AppError> {
  logged(
    "create_partner",
    db::with_conn(&state.db, |conn| people::create_partner(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn update_partner(state: State<AppState>, id: String, input: PartnerInput, actor: Option<String>) -> Result<Partner, AppError> {
  logged(
    "update_partner",
    db::with_conn(&state.db, |conn| people::update_partner(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn deactivate_partner(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "deactivate_partner",
    db::with_conn(&state.db, |conn| people::deactivate_partner(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn delete_partner(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_partner",
    db::with_conn(&state.db, |conn| people::delete_partner(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_partners(state: State<AppState>, company_id: String, include_inactive: Option<bool>) -> Result<Vec<Partner>, AppError> {
  logged(
    "list_partners",
    db::with_conn(&state.db, |conn| {
      people::list_partners(conn, &company_id, include_inactive.unwrap_or(false))
    }),
  )
}

#[tauri::command]
pub fn create_employee(
  state: State<AppState>,
  company_id: String,
  input: EmployeeInput,
  actor: Option<String>,
) -> Result<Employee, AppError> {
  logged(
    "create_employee",
    db::with_conn(&state.db, |conn| people::create_employee(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn update_employee(state: State<AppState>, id: String, input: EmployeeInput, actor: Option<String>) -> Result<Employee, AppError> {
  logged(
    "update_employee",
    db::with_conn(&state.db, |conn| people::update_employee(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn set_employee_status(
  state: State<AppState>,
  id: String,
  status: EmployeeStatus,
  actor: Option<String>,
) -> Result<Employee, AppError> {
  logged(
    "set_employee_status",
    db::with_conn(&state.db, |conn| people::set_employee_status(conn, &id, status, actor.as_deref())),
  )
}

#[tauri::command]
pub fn delete_employee(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_employee",
    db::with_conn(&state.db, |conn| people::delete_employee(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_employees(
  state: State<AppState>,
  company_id: String,
  include_terminated: Option<bool>,
) -> Result<Vec<Employee>, AppError> {
  logged(
    "list_employees",
    db::with_conn(&state.db, |conn| {
      people::list_employees(conn, &company_id, include_terminated.unwrap_or(false))
    }),
  )
}

// Launches

#[tauri::command]
pub fn create_launch(
  state: State<AppState>,
  company_id: String,
  input: LaunchInput,
  actor: Option<String>,
) -> Result<Launch, AppError> {
  logged(
    "create_launch",
    db::with_conn(&state.db, |conn| {
      launches::create_launch(conn, &company_id, &input, None, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn update_launch(state: State<AppState>, id: String, input: LaunchInput, actor: Option<String>) -> Result<Launch, AppError> {
  logged(
    "update_launch",
    db::with_conn(&state.db, |conn| launches::update_launch(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn cancel_launch(state: State<AppState>, id: String, reason: Option<String>, actor: Option<String>) -> Result<Launch, AppError> {
  logged(
    "cancel_launch",
    db::with_conn(&state.db, |conn| {
      launches::cancel_launch(conn, &id, reason.as_deref(), actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn delete_launch(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_launch",
    db::with_conn(&state.db, |conn| launches::delete_launch(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_launches(state: State<AppState>, company_id: String, filter: LaunchFilter) -> Result<Paginated<Launch>, AppError> {
  logged(
    "list_launches",
    db::with_conn(&state.db, |conn| launches::list_launches(conn, &company_id, &filter)),
  )
}

// XML import

#[tauri::command]
pub fn import_xml_files(
  state: State<AppState>,
  company_id: String,
  paths: Vec<String>,
  actor: Option<String>,
) -> Result<ImportSummary, AppError> {
  logged(
    "import_xml_files",
    db::with_conn(&state.db, |conn| {
      let documents_base = resolve_documents_base(&settings::get_settings(conn)?, &state);
      let mut summary = ImportSummary::default();
      for path in &paths {
        let result = import::import_xml_file(conn, &company_id, Path::new(path), &documents_base, actor.as_deref())?;
        match &result.outcome {
          ImportOutcome::Imported { .. } => summary.imported += 1,
          ImportOutcome::Duplicate { .. } => summary.duplicates += 1,
          ImportOutcome::ForeignCompany => summary.foreign += 1,
          ImportOutcome::Invalid { .. } => summary.invalid += 1,
        }
        summary.files.push(result);
      }
      Ok(summary)
    }),
  )
}

#[tauri::command]
pub fn import_xml_directory(
  state: State<AppState>,
  company_id: String,
  dir: String,
  actor: Option<String>,
) -> Result<ImportSummary, AppError> {
  logged(
    "import_xml_directory",
    db::with_conn(&state.db, |conn| {
      let documents_base = resolve_documents_base(&settings::get_settings(conn)?, &state);
      import::import_xml_directory(conn, &company_id, Path::new(&dir), &documents_base, actor.as_deref())
    }),
  )
}

// Payroll

#[tauri::command]
pub fn run_payroll(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  entries: Option<Vec<PayrollEntryInput>>,
  actor: Option<String>,
) -> Result<Vec<Payroll>, AppError> {
  logged(
    "run_payroll",
    db::with_conn(&state.db, |conn| {
      let entries = entries.unwrap_or_default();
      payroll::run_payroll(conn, &company_id, competence(&competence_value)?, &entries, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn list_payrolls(state: State<AppState>, company_id: String, competence_value: String) -> Result<Vec<Payroll>, AppError> {
  logged(
    "list_payrolls",
    db::with_conn(&state.db, |conn| {
      payroll::list_payrolls(conn, &company_id, competence(&competence_value)?)
    }),
  )
}

#[tauri::command]
pub fn get_payroll_summary(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
) -> Result<PayrollSummary, AppError> {
  logged(
    "get_payroll_summary",
    db::with_conn(&state.db, |conn| {
      payroll::get_payroll_summary(conn, &company_id, competence(&competence_value)?)
    }),
  )
}

#[tauri::command]
pub fn create_rci(
  state: State<AppState>,
  company_id: String,
  partner_id: String,
  competence_value: String,
  amount: Option<f64>,
  actor: Option<String>,
) -> Result<Rci, AppError> {
  logged(
    "create_rci",
    db::with_conn(&state.db, |conn| {
      payroll::create_rci(
        conn,
        &company_id,
        &partner_id,
        competence(&competence_value)?,
        amount,
        actor.as_deref(),
      )
    }),
  )
}

#[tauri::command]
pub fn list_rcis(state: State<AppState>, company_id: String, competence_value: String) -> Result<Vec<Rci>, AppError> {
  logged(
    "list_rcis",
    db::with_conn(&state.db, |conn| payroll::list_rcis(conn, &company_id, competence(&competence_value)?)),
  )
}

#[tauri::command]
pub fn create_vacation(
  state: State<AppState>,
  company_id: String,
  input: VacationInput,
  actor: Option<String>,
) -> Result<Vacation, AppError> {
  logged(
    "create_vacation",
    db::with_conn(&state.db, |conn| payroll::create_vacation(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_vacations(state: State<AppState>, company_id: String, employee_id: Option<String>) -> Result<Vec<Vacation>, AppError> {
  logged(
    "list_vacations",
    db::with_conn(&state.db, |conn| {
      payroll::list_vacations(conn, &company_id, employee_id.as_deref())
    }),
  )
}

#[tauri::command]
pub fn create_thirteenth(
  state: State<AppState>,
  company_id: String,
  input: ThirteenthInput,
  actor: Option<String>,
) -> Result<Thirteenth, AppError> {
  logged(
    "create_thirteenth",
    db::with_conn(&state.db, |conn| payroll::create_thirteenth(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_thirteenths(state: State<AppState>, company_id: String, year: i32) -> Result<Vec<Thirteenth>, AppError> {
  logged(
    "list_thirteenths",
    db::with_conn(&state.db, |conn| payroll::list_thirteenths(conn, &company_id, year)),
  )
}

#[tauri::command]
pub fn create_termination(
  state: State<AppState>,
  company_id: String,
  input: TerminationInput,
  actor: Option<String>,
) -> Result<Termination, AppError> {
  logged(
    "create_termination",
    db::with_conn(&state.db, |conn| payroll::create_termination(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_terminations(state: State<AppState>, company_id: String) -> Result<Vec<Termination>, AppError> {
  logged(
    "list_terminations",
    db::with_conn(&state.db, |conn| payroll::list_terminations(conn, &company_id)),
  )
}

// Simples Nacional

#[tauri::command]
pub fn calculate_pgdas(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  actor: Option<String>,
) -> Result<PgdasApuracao, AppError> {
  logged(
    "calculate_pgdas",
    db::with_conn(&state.db, |conn| {
      pgdas::calculate_pgdas(conn, &company_id, competence(&competence_value)?, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn list_pgdas(state: State<AppState>, company_id: String, year: i32) -> Result<Vec<PgdasApuracao>, AppError> {
  logged("list_pgdas", db::with_conn(&state.db, |conn| pgdas::list_pgdas(conn, &company_id, year)))
}

#[tauri::command]
pub fn pgdas_report(state: State<AppState>, company_id: String, competence_value: String) -> Result<String, AppError> {
  logged(
    "pgdas_report",
    db::with_conn(&state.db, |conn| pgdas::pgdas_report(conn, &company_id, competence(&competence_value)?)),
  )
}

// Competence closing

#[tauri::command]
pub fn get_competence_status(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
) -> Result<CompetenceStatus, AppError> {
  logged(
    "get_competence_status",
    db::with_conn(&state.db, |conn| closing::get_status(conn, &company_id, competence(&competence_value)?)),
  )
}

#[tauri::command]
pub fn set_competence_closed(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  closed: bool,
  actor: Option<String>,
) -> Result<CompetenceStatus, AppError> {
  logged(
    "set_competence_closed",
    db::with_conn(&state.db, |conn| {
      let competence = competence(&competence_value)?;
      closing::set_closed(conn, &company_id, competence, closed, actor.as_deref())?;
      closing::get_status(conn, &company_id, competence)
    }),
  )
}

// Obligations

#[tauri::command]
pub fn generate_efd_contribuicoes(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  output_dir: Option<String>,
  actor: Option<String>,
) -> Result<EfdContribuicoes, AppError> {
  let dir = export_dir(&state, output_dir);
  logged(
    "generate_efd_contribuicoes",
    db::with_conn(&state.db, |conn| {
      efd_contribuicoes::save_efd_contribuicoes(conn, &company_id, competence(&competence_value)?, &dir, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn generate_esocial_events(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  actor: Option<String>,
) -> Result<Vec<EsocialEvent>, AppError> {
  logged(
    "generate_esocial_events",
    db::with_conn(&state.db, |conn| {
      esocial::generate_esocial_events(conn, &company_id, competence(&competence_value)?, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn list_esocial_events(
  state: State<AppState>,
  company_id: String,
  competence_value: Option<String>,
) -> Result<Vec<EsocialEvent>, AppError> {
  logged(
    "list_esocial_events",
    db::with_conn(&state.db, |conn| {
      let competence = competence_value.as_deref().map(competence).transpose()?;
      esocial::list_esocial_events(conn, &company_id, competence)
    }),
  )
}

#[tauri::command]
pub fn transmit_esocial_event(state: State<AppState>, id: String, actor: Option<String>) -> Result<EsocialEvent, AppError> {
  logged(
    "transmit_esocial_event",
    db::with_conn(&state.db, |conn| {
      esocial::transmit_event(conn, &id, &mut rand::thread_rng(), actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn poll_esocial_event(state: State<AppState>, id: String, actor: Option<String>) -> Result<EsocialEvent, AppError> {
  logged(
    "poll_esocial_event",
    db::with_conn(&state.db, |conn| {
      esocial::poll_event_status(conn, &id, &mut rand::thread_rng(), actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn generate_reinf_file(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  actor: Option<String>,
) -> Result<ReinfFile, AppError> {
  logged(
    "generate_reinf_file",
    db::with_conn(&state.db, |conn| {
      reinf::generate_reinf_file(conn, &company_id, competence(&competence_value)?, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn list_reinf_files(state: State<AppState>, company_id: String, year: Option<i32>) -> Result<Vec<ReinfFile>, AppError> {
  logged(
    "list_reinf_files",
    db::with_conn(&state.db, |conn| reinf::list_reinf_files(conn, &company_id, year)),
  )
}

#[tauri::command]
pub fn save_reinf_xml(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  output_dir: Option<String>,
) -> Result<Vec<String>, AppError> {
  let dir = export_dir(&state, output_dir);
  logged(
    "save_reinf_xml",
    db::with_conn(&state.db, |conn| {
      reinf::save_reinf_xml(conn, &company_id, competence(&competence_value)?, &dir)
    }),
  )
}

// Exports

#[tauri::command]
pub fn export_payroll_excel(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  output_path: Option<String>,
) -> Result<String, AppError> {
  logged(
    "export_payroll_excel",
    db::with_conn(&state.db, |conn| {
      let competence = competence(&competence_value)?;
      let path = export_path(&state, output_path, &format!("folha_{competence}.xlsx"))?;
      excel::export_payroll_ledger(conn, &company_id, competence, &path)?;
      Ok(path.to_string_lossy().to_string())
    }),
  )
}

#[tauri::command]
pub fn export_launches_excel(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  output_path: Option<String>,
  include_documents: Option<bool>,
) -> Result<String, AppError> {
  logged(
    "export_launches_excel",
    db::with_conn(&state.db, |conn| {
      let competence = competence(&competence_value)?;
      let path = export_path(&state, output_path, &format!("lancamentos_{competence}.xlsx"))?;
      let documents_dir = path.parent().map(|parent| parent.join("Documentos"));
      let documents_dir = documents_dir.filter(|_| include_documents.unwrap_or(false));
      excel::export_launches(conn, &company_id, competence, &path, documents_dir.as_deref())?;
      Ok(path.to_string_lossy().to_string())
    }),
  )
}

#[tauri::command]
pub fn export_launches_csv(
  state: State<AppState>,
  company_id: String,
  competence_value: String,
  output_path: Option<String>,
) -> Result<String, AppError> {
  logged(
    "export_launches_csv",
    db::with_conn(&state.db, |conn| {
      let competence = competence(&competence_value)?;
      let path = export_path(&state, output_path, &format!("lancamentos_{competence}.csv"))?;
      csv::export_launches_csv(conn, &company_id, competence, &path)?;
      Ok(path.to_string_lossy().to_string())
    }),
  )
}

// Chart of accounts

#[tauri::command]
pub fn create_account(
  state: State<AppState>,
  company_id: String,
  input: ContaContabilInput,
  actor: Option<String>,
) -> Result<ContaContabil, AppError> {
  logged(
    "create_account",
    db::with_conn(&state.db, |conn| accounts::create_account(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn update_account(
  state: State<AppState>,
  id: String,
  input: ContaContabilInput,
  actor: Option<String>,
) -> Result<ContaContabil, AppError> {
  logged(
    "update_account",
    db::with_conn(&state.db, |conn| accounts::update_account(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn set_account_active(state: State<AppState>, id: String, active: bool, actor: Option<String>) -> Result<ContaContabil, AppError> {
  logged(
    "set_account_active",
    db::with_conn(&state.db, |conn| accounts::set_account_active(conn, &id, active, actor.as_deref())),
  )
}

#[tauri::command]
pub fn delete_account(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_account",
    db::with_conn(&state.db, |conn| accounts::delete_account(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_accounts(state: State<AppState>, company_id: String) -> Result<Vec<ContaContabil>, AppError> {
  logged("list_accounts", db::with_conn(&state.db, |conn| accounts::list_accounts(conn, &company_id)))
}

#[tauri::command]
pub fn seed_default_chart(state: State<AppState>, company_id: String, actor: Option<String>) -> Result<usize, AppError> {
  logged(
    "seed_default_chart",
    db::with_conn(&state.db, |conn| accounts::seed_default_chart(conn, &company_id, actor.as_deref())),
  )
}

// Quotes and receipts

#[tauri::command]
pub fn create_orcamento(
  state: State<AppState>,
  company_id: String,
  input: OrcamentoInput,
  actor: Option<String>,
) -> Result<Orcamento, AppError> {
  logged(
    "create_orcamento",
    db::with_conn(&state.db, |conn| commercial::create_orcamento(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn update_orcamento(state: State<AppState>, id: String, input: OrcamentoInput, actor: Option<String>) -> Result<Orcamento, AppError> {
  logged(
    "update_orcamento",
    db::with_conn(&state.db, |conn| commercial::update_orcamento(conn, &id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn set_orcamento_status(
  state: State<AppState>,
  id: String,
  status: QuoteStatus,
  actor: Option<String>,
) -> Result<Orcamento, AppError> {
  logged(
    "set_orcamento_status",
    db::with_conn(&state.db, |conn| commercial::set_orcamento_status(conn, &id, status, actor.as_deref())),
  )
}

#[tauri::command]
pub fn delete_orcamento(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_orcamento",
    db::with_conn(&state.db, |conn| commercial::delete_orcamento(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_orcamentos(
  state: State<AppState>,
  company_id: String,
  status: Option<QuoteStatus>,
) -> Result<Vec<Orcamento>, AppError> {
  logged(
    "list_orcamentos",
    db::with_conn(&state.db, |conn| commercial::list_orcamentos(conn, &company_id, status)),
  )
}

#[tauri::command]
pub fn create_recibo(
  state: State<AppState>,
  company_id: String,
  input: ReciboInput,
  actor: Option<String>,
) -> Result<Recibo, AppError> {
  logged(
    "create_recibo",
    db::with_conn(&state.db, |conn| commercial::create_recibo(conn, &company_id, &input, actor.as_deref())),
  )
}

#[tauri::command]
pub fn receipt_from_quote(
  state: State<AppState>,
  orcamento_id: String,
  issue_date: String,
  actor: Option<String>,
) -> Result<Recibo, AppError> {
  logged(
    "receipt_from_quote",
    db::with_conn(&state.db, |conn| {
      commercial::receipt_from_quote(conn, &orcamento_id, &issue_date, actor.as_deref())
    }),
  )
}

#[tauri::command]
pub fn delete_recibo(state: State<AppState>, id: String, actor: Option<String>) -> Result<(), AppError> {
  logged(
    "delete_recibo",
    db::with_conn(&state.db, |conn| commercial::delete_recibo(conn, &id, actor.as_deref())),
  )
}

#[tauri::command]
pub fn list_recibos(state: State<AppState>, company_id: String) -> Result<Vec<Recibo>, AppError> {
  logged("list_recibos", db::with_conn(&state.db, |conn| commercial::list_recibos(conn, &company_id)))
}

#[tauri::command]
pub fn render_recibo_text(state: State<AppState>, id: String) -> Result<String, AppError> {
  logged("render_recibo_text", db::with_conn(&state.db, |conn| commercial::render_recibo_text(conn, &id)))
}

// Users

#[tauri::command]
pub fn register_user(state: State<AppState>, email: String, display_name: String) -> Result<AppUser, AppError> {
  logged(
    "register_user",
    db::with_conn(&state.db, |conn| users::register_user(conn, &email, &display_name)),
  )
}

#[tauri::command]
pub fn list_users(state: State<AppState>, actor_id: String) -> Result<Vec<AppUser>, AppError> {
  logged("list_users", db::with_conn(&state.db, |conn| users::list_users(conn, &actor_id)))
}

#[tauri::command]
pub fn set_user_status(
  state: State<AppState>,
  actor_id: String,
  user_id: String,
  status: UserStatus,
) -> Result<AppUser, AppError> {
  logged(
    "set_user_status",
    db::with_conn(&state.db, |conn| users::set_user_status(conn, &actor_id, &user_id, status)),
  )
}

#[tauri::command]
pub fn set_user_role(state: State<AppState>, actor_id: String, user_id: String, role: UserRole) -> Result<AppUser, AppError> {
  logged(
    "set_user_role",
    db::with_conn(&state.db, |conn| users::set_user_role(conn, &actor_id, &user_id, role)),
  )
}

// Files, backup and audit

#[tauri::command]
pub fn backup_company_data(state: State<AppState>, request: CompanyBackupRequest) -> Result<CompanyBackupResult, AppError> {
  logged(
    "backup_company_data",
    db::with_conn(&state.db, |conn| {
      let backup_dir = resolve_backup_dir(&settings::get_settings(conn)?, &state);
      backup::backup_company_data(
        conn,
        &request.company_id,
        &request.collections,
        &backup_dir,
        request.actor.as_deref(),
      )
    }),
  )
}

#[tauri::command]
pub fn create_backup(state: State<AppState>, request: BackupRequest) -> Result<String, AppError> {
  logged(
    "create_backup",
    db::with_conn(&state.db, |conn| {
      db::checkpoint(conn)?;
      let settings = settings::get_settings(conn)?;
      let path = backup::create_backup(
        &resolve_backup_dir(&settings, &state),
        &state.db.db_path,
        &resolve_documents_base(&settings, &state),
        true,
        request.output_path.clone(),
      )?;
      append_audit(
        conn,
        request.actor.as_deref(),
        "BACKUP",
        "DATABASE",
        Some(&path),
        None,
        payload(&request),
        None,
      )?;
      Ok(path)
    }),
  )
}

#[tauri::command]
pub fn restore_backup(state: State<AppState>, request: RestoreRequest) -> Result<(), AppError> {
  let result = (|| -> Result<(), AppError> {
    let documents_base = db::with_conn(&state.db, |conn| {
      Ok(resolve_documents_base(&settings::get_settings(conn)?, &state))
    })?;
    backup::restore_backup(&request.archive_path, &state.db.db_path, &documents_base)?;
    db::reload_connection(&state.db)?;
    db::with_conn(&state.db, |conn| {
      append_audit(
        conn,
        request.actor.as_deref(),
        "RESTORE",
        "DATABASE",
        Some(&request.archive_path),
        None,
        payload(&request),
        None,
      )
    })
  })();
  logged("restore_backup", result)
}

#[tauri::command]
pub fn open_document(state: State<AppState>, path: String, actor: Option<String>) -> Result<(), AppError> {
  logged("open_document", documents::open_document(&path))?;
  db::with_conn(&state.db, |conn| {
    append_audit(
      conn,
      actor.as_deref(),
      "OPEN_DOCUMENT",
      "DOCUMENT",
      Some(&path),
      None,
      payload(&serde_json::json!({ "path": path })),
      None,
    )
  })
}

#[tauri::command]
pub fn read_document(path: String) -> Result<DocumentContent, AppError> {
  logged("read_document", documents::read_document(&path))
}

#[tauri::command]
pub fn list_audit_log(
  state: State<AppState>,
  company_id: Option<String>,
  page: Option<i64>,
  page_size: Option<i64>,
) -> Result<Paginated<AuditLogEntry>, AppError> {
  logged(
    "list_audit_log",
    db::with_conn(&state.db, |conn| {
      audit_log::list_audit_log(conn, company_id.as_deref(), page.unwrap_or(1), page_size.unwrap_or(50))
    }),
  )
}
