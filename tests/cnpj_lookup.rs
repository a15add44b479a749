use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiny_http::{Header, Method, Response, Server, StatusCode};

use contabil_fiscal::companies::{company_from_lookup, create_company};
use contabil_fiscal::db::open_db_in_memory;
use contabil_fiscal::integrations::cnpj::{cnpj_lookup, CnpjClient};
use contabil_fiscal::models::{Anexo, TaxRegime};
use contabil_fiscal::settings;

const REGISTERED: &str = "11222333000181";

fn registry_body() -> String {
  serde_json::json!({
    "cnpj": REGISTERED,
    "razao_social": "LOJA AZUL LTDA",
    "nome_fantasia": "Loja Azul",
    "descricao_situacao_cadastral": "ATIVA",
    "cnae_fiscal": 4744099,
    "cnae_fiscal_descricao": "Comercio varejista de materiais de construcao",
    "opcao_pelo_simples": true,
    "logradouro": "RUA AUGUSTA",
    "numero": "500",
    "bairro": "CONSOLACAO",
    "cep": "01305-000",
    "municipio": "SAO PAULO",
    "uf": "SP",
    "codigo_municipio_ibge": 3550308,
    "ddd_telefone_1": "(11) 3333-4444"
  })
  .to_string()
}

fn spawn_registry() -> (String, Arc<AtomicUsize>, thread::JoinHandle<()>) {
  let server = Server::http("127.0.0.1:0").expect("http server");
  let base = format!("http://{}/api", server.server_addr());
  let hits = Arc::new(AtomicUsize::new(0));
  let hits_clone = Arc::clone(&hits);
  let handle = thread::spawn(move || loop {
    let req = match server.recv_timeout(Duration::from_millis(500)) {
      Ok(Some(req)) => req,
      Ok(None) => break,
      Err(_) => break,
    };
    hits_clone.fetch_add(1, Ordering::Relaxed);
    if req.method() != &Method::Get {
      let _ = req.respond(Response::empty(StatusCode(405)));
      continue;
    }
    match req.url() {
      "/api/cnpj/v1/11222333000181" => {
        let _ = req.respond(Response::from_data(registry_body().into_bytes()).with_header(
          Header::from_bytes("Content-Type", "application/json").expect("content type"),
        ));
      }
      "/api/cnpj/v1/45997418000153" => {
        let _ = req.respond(Response::empty(StatusCode(503)));
      }
      _ => {
        let _ = req.respond(Response::empty(StatusCode(404)));
      }
    }
  });
  (base, hits, handle)
}

#[test]
fn lookup_maps_registry_answers_and_errors() {
  let (base, hits, handle) = spawn_registry();
  let client = CnpjClient::new(&base).expect("client");

  let found = client.lookup("11.222.333/0001-81").expect("lookup");
  assert_eq!(found.cnpj, REGISTERED);
  assert_eq!(found.razao_social, "LOJA AZUL LTDA");
  assert_eq!(found.cnae.as_deref(), Some("4744099"));
  assert_eq!(found.address.cep.as_deref(), Some("01305000"));
  assert_eq!(found.address.uf, "SP");
  assert_eq!(found.opcao_simples, Some(true));

  let missing = client.lookup("11444777000161").unwrap_err();
  assert_eq!(missing.code, "CNPJ_NOT_FOUND");
  let unavailable = client.lookup("45997418000153").unwrap_err();
  assert_eq!(unavailable.code, "CNPJ_LOOKUP");
  let invalid = client.lookup("11222333000182").unwrap_err();
  assert_eq!(invalid.code, "INVALID_CNPJ");

  assert_eq!(hits.load(Ordering::Relaxed), 3);
  drop(client);
  handle.join().expect("server thread");
}

#[test]
fn configured_registry_prefills_a_company() {
  let (base, _hits, handle) = spawn_registry();
  let conn = open_db_in_memory().expect("db");
  let mut current = settings::get_settings(&conn).expect("settings");
  current.cnpj_api_url = format!("{base}/");
  settings::update_settings(&conn, &current).expect("update settings");

  let found = cnpj_lookup(&conn, REGISTERED).expect("lookup");
  let mut draft = company_from_lookup(&found);
  assert_eq!(draft.cnpj, REGISTERED);
  assert_eq!(draft.nome_fantasia.as_deref(), Some("Loja Azul"));
  assert_eq!(draft.regime, TaxRegime::SimplesNacional);

  draft.simples_anexo = Some(Anexo::I);
  let company = create_company(&conn, &draft, Some("tester")).expect("company");
  assert_eq!(company.address.codigo_municipio.as_deref(), Some("3550308"));

  handle.join().expect("server thread");
}
