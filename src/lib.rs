pub mod accounts;
pub mod audit;
pub mod commands;
pub mod commercial;
pub mod companies;
pub mod db;
pub mod domain;
pub mod error;
pub mod export;
pub mod files;
pub mod import;
pub mod integrations;
pub mod launches;
pub mod logging;
pub mod models;
pub mod payroll;
pub mod people;
pub mod pgdas;
pub mod settings;
pub mod users;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use db::Db;

pub struct AppState {
  pub db: Db,
  pub app_dir: PathBuf,
  pub documents_base: PathBuf,
}

/// Starts the desktop application: logging, database, then the Tauri runtime.
pub fn run() {
  let app_dir = match db::resolve_app_dir() {
    Ok(dir) => dir,
    Err(err) => {
      eprintln!("Falha ao resolver diretorio de dados: {err}");
      std::process::exit(1);
    }
  };
  if let Err(err) = logging::init_logging(&app_dir) {
    eprintln!("Falha ao iniciar log: {err}");
  }
  let (db, documents_base) = match db::init_db(&app_dir) {
    Ok(value) => value,
    Err(err) => {
      log::error!("event=startup module=app status=error code={} message={}", err.code, err.message);
      std::process::exit(1);
    }
  };
  log::info!("event=startup module=app status=ok app_dir={}", app_dir.to_string_lossy());

  let result = tauri::Builder::default()
    .plugin(tauri_plugin_dialog::init())
    .manage(AppState {
      db,
      app_dir,
      documents_base,
    })
    .invoke_handler(tauri::generate_handler![
      commands::get_settings,
      commands::update_settings,
      commands::create_company,
      commands::update_company,
      commands::get_company,
      commands::list_companies,
      commands::delete_company,
      commands::set_active_company,
      commands::get_active_company,
      commands::lookup_cnpj,
      commands::prefill_company_from_cnpj,
      commands::create_partner,
      commands::update_partner,
      commands::deactivate_partner,
      commands::delete_partner,
      commands::list_partners,
      commands::create_employee,
      commands::update_employee,
      commands::set_employee_status,
      commands::delete_employee,
      commands::list_employees,
      commands::create_launch,
      commands::update_launch,
      commands::cancel_launch,
      commands::delete_launch,
      commands::list_launches,
      commands::import_xml_files,
      commands::import_xml_directory,
      commands::run_payroll,
      commands::list_payrolls,
      commands::get_payroll_summary,
      commands::create_rci,
      commands::list_rcis,
      commands::create_vacation,
      commands::list_vacations,
      commands::create_thirteenth,
      commands::list_thirteenths,
      commands::create_termination,
      commands::list_terminations,
      commands::calculate_pgdas,
      commands::list_pgdas,
      commands::pgdas_report,
      commands::get_competence_status,
      commands::set_competence_closed,
      commands::generate_efd_contribuicoes,
      commands::generate_esocial_events,
      commands::list_esocial_events,
      commands::transmit_esocial_event,
      commands::poll_esocial_event,
      commands::generate_reinf_file,
      commands::list_reinf_files,
      commands::save_reinf_xml,
      commands::export_payroll_excel,
      commands::export_launches_excel,
      commands::export_launches_csv,
      commands::create_account,
      commands::update_account,
      commands::set_account_active,
      commands::delete_account,
      commands::list_accounts,
      commands::seed_default_chart,
      commands::create_orcamento,
      commands::update_orcamento,
      commands::set_orcamento_status,
      commands::delete_orcamento,
      commands::list_orcamentos,
      commands::create_recibo,
      commands::receipt_from_quote,
      commands::delete_recibo,
      commands::list_recibos,
      commands::render_recibo_text,
      commands::register_user,
      commands::list_users,
      commands::set_user_status,
      commands::set_user_role,
      commands::backup_company_data,
      commands::create_backup,
      commands::restore_backup,
      commands::open_document,
      commands::read_document,
      commands::list_audit_log,
    ])
    .run(tauri::generate_context!());
  if let Err(err) = result {
    log::error!("event=shutdown module=app status=error error={err}");
    std::process::exit(1);
  }
}
