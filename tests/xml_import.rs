mod common;

use std::fs;

use common::{nfe_xml, nfse_xml, setup, OTHER_CNPJ, OWN_CNPJ, SUPPLIER_CNPJ};
use contabil_fiscal::domain::Competence;
use contabil_fiscal::export::{efd_contribuicoes, reinf};
use contabil_fiscal::import::import_xml_directory;
use contabil_fiscal::launches::launches_for_competence;
use contabil_fiscal::models::{Direction, ImportOutcome, LaunchKind, TaxRegime};

fn key(number: u32) -> String {
  format!("3525031122233300018155001{number:09}{number:010}")
}

#[test]
fn imports_a_folder_and_feeds_the_monthly_obligations() {
  let (conn, company) = setup(TaxRegime::LucroPresumido, None);
  let inbox = tempfile::tempdir().unwrap();
  let documents = tempfile::tempdir().unwrap();

  fs::write(inbox.path().join("a_venda.xml"), nfe_xml(&key(1), "1", OWN_CNPJ, SUPPLIER_CNPJ, "1000.00")).unwrap();
  fs::create_dir_all(inbox.path().join("servicos")).unwrap();
  fs::write(
    inbox.path().join("servicos").join("b_tomado.xml"),
    nfse_xml("778", SUPPLIER_CNPJ, OWN_CNPJ),
  )
  .unwrap();
  fs::write(inbox.path().join("c_alheia.xml"), nfe_xml(&key(2), "2", SUPPLIER_CNPJ, OTHER_CNPJ, "50.00")).unwrap();
  fs::write(inbox.path().join("d_quebrada.xml"), "<html>nada</html>").unwrap();
  fs::write(inbox.path().join("leia-me.txt"), "ignorado").unwrap();

  let summary = import_xml_directory(&conn, &company.id, inbox.path(), documents.path(), Some("tester")).unwrap();
  assert_eq!(summary.imported, 2);
  assert_eq!(summary.foreign, 1);
  assert_eq!(summary.invalid, 1);
  assert_eq!(summary.duplicates, 0);
  assert_eq!(summary.files.len(), 4);

  let again = import_xml_directory(&conn, &company.id, inbox.path(), documents.path(), None).unwrap();
  assert_eq!(again.imported, 0);
  assert_eq!(again.duplicates, 2);
  assert!(again
    .files
    .iter()
    .any(|file| matches!(&file.outcome, ImportOutcome::Duplicate { access_key } if *access_key == key(1))));

  let march = Competence::new(2025, 3).unwrap();
  let items = launches_for_competence(&conn, &company.id, march, None).unwrap();
  assert_eq!(items.len(), 2);
  let sale = items.iter().find(|launch| launch.direction == Direction::Saida).unwrap();
  assert_eq!(sale.kind, LaunchKind::Nfe);
  assert!(sale.document_path.as_deref().map(|path| std::path::Path::new(path).exists()).unwrap_or(false));
  let taken = items.iter().find(|launch| launch.direction == Direction::Entrada).unwrap();
  assert_eq!(taken.taxes.ret_inss, 220.0);

  let reinf_file = reinf::generate_reinf_file(&conn, &company.id, march, None).unwrap();
  assert_eq!(reinf_file.total_retained_inss, 220.0);
  assert_eq!(reinf_file.total_retained_ir, 30.0);
  assert!(reinf_file.events.iter().any(|event| event.event_type == "R-2010"));
  assert!(reinf_file.events.iter().any(|event| event.event_type == "R-4020"));

  let efd = efd_contribuicoes::generate_efd_contribuicoes(&conn, &company.id, march).unwrap();
  assert_eq!(efd.revenue, 1000.0);
  assert_eq!(efd.pis_due, 6.5);
  assert_eq!(efd.cofins_due, 30.0);
  assert!(efd.content.contains("|C100|"));
  assert!(efd.content.ends_with("\r\n"));
}

#[test]
fn missing_folder_is_an_error() {
  let (conn, company) = setup(TaxRegime::LucroPresumido, None);
  let documents = tempfile::tempdir().unwrap();
  let err = import_xml_directory(
    &conn,
    &company.id,
    &documents.path().join("nao-existe"),
    documents.path(),
    None,
  )
  .unwrap_err();
  assert_eq!(err.code, "DIR_NOT_FOUND");
}
