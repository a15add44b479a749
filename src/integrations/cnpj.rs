//! Company registry lookup (BrasilAPI compatible).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use rusqlite::Connection;
use serde::Deserialize;

use crate::domain::validation;
use crate::error::AppError;
use crate::models::{Address, CnpjLookupResult};
use crate::settings;

const TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("contabil-fiscal/", env!("CARGO_PKG_VERSION"));

/// Registry record as returned by `/cnpj/v1/{cnpj}`.
#[derive(Debug, Deserialize)]
struct RegistryCompany {
  cnpj: String,
  razao_social: String,
  #[serde(default)]
  nome_fantasia: Option<String>,
  #[serde(default)]
  descricao_situacao_cadastral: Option<String>,
  #[serde(default)]
  cnae_fiscal: Option<u64>,
  #[serde(default)]
  cnae_fiscal_descricao: Option<String>,
  #[serde(default)]
  opcao_pelo_simples: Option<bool>,
  #[serde(default)]
  logradouro: Option<String>,
  #[serde(default)]
  numero: Option<String>,
  #[serde(default)]
  complemento: Option<String>,
  #[serde(default)]
  bairro: Option<String>,
  #[serde(default)]
  cep: Option<String>,
  #[serde(default)]
  municipio: Option<String>,
  #[serde(default)]
  uf: Option<String>,
  #[serde(default)]
  codigo_municipio_ibge: Option<u64>,
  #[serde(default)]
  email: Option<String>,
  #[serde(default)]
  ddd_telefone_1: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn into_result(record: RegistryCompany) -> CnpjLookupResult {
  CnpjLookupResult {
    cnpj: validation::only_digits(&record.cnpj),
    razao_social: record.razao_social.trim().to_string(),
    nome_fantasia: non_empty(record.nome_fantasia),
    situacao: non_empty(record.descricao_situacao_cadastral),
    cnae: record.cnae_fiscal.map(|code| format!("{code:07}")),
    cnae_descricao: non_empty(record.cnae_fiscal_descricao),
    opcao_simples: record.opcao_pelo_simples,
    address: Address {
      logradouro: non_empty(record.logradouro),
      numero: non_empty(record.numero),
      complemento: non_empty(record.complemento),
      bairro: non_empty(record.bairro),
      cep: non_empty(record.cep).map(|cep| validation::only_digits(&cep)),
      municipio: non_empty(record.municipio),
      uf: record.uf.unwrap_or_default().trim().to_uppercase(),
      codigo_municipio: record.codigo_municipio_ibge.map(|code| format!("{code:07}")),
    },
    email: non_empty(record.email).map(|email| email.to_lowercase()),
    telefone: non_empty(record.ddd_telefone_1).map(|phone| validation::only_digits(&phone)),
  }
}

pub struct CnpjClient {
  base_url: String,
  client: Client,
}

impl CnpjClient {
  pub fn new(base_url: &str) -> Result<Self, AppError> {
    let client = Client::builder().timeout(TIMEOUT).user_agent(USER_AGENT).build()?;
    Ok(Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      client,
    })
  }

  pub fn lookup(&self, cnpj: &str) -> Result<CnpjLookupResult, AppError> {
    let digits = validation::ensure_cnpj(cnpj)?;
    let url = format!("{}/cnpj/v1/{digits}", self.base_url);
    let response = self.client.get(&url).send().map_err(|err| {
      log::warn!("event=cnpj_lookup module=integrations status=error cnpj={digits} error={err}");
      AppError::new("CNPJ_LOOKUP", format!("Falha ao consultar CNPJ: {err}"))
    })?;

    match response.status() {
      StatusCode::OK => {
        let record: RegistryCompany = response
          .json()
          .map_err(|err| AppError::new("CNPJ_LOOKUP", format!("Resposta invalida da consulta: {err}")))?;
        log::info!("event=cnpj_lookup module=integrations status=ok cnpj={digits}");
        Ok(into_result(record))
      }
      StatusCode::NOT_FOUND => Err(AppError::new("CNPJ_NOT_FOUND", format!("CNPJ {digits} nao encontrado"))),
      other => {
        log::warn!("event=cnpj_lookup module=integrations status=error cnpj={digits} http_status={other}");
        Err(AppError::new(
          "CNPJ_LOOKUP",
          format!("Consulta de CNPJ retornou HTTP {}", other.as_u16()),
        ))
      }
    }
  }
}

/// Looks a CNPJ up against the registry URL configured in settings.
pub fn cnpj_lookup(conn: &Connection, cnpj: &str) -> Result<CnpjLookupResult, AppError> {
  let settings = settings::get_settings(conn)?;
  CnpjClient::new(&settings.cnpj_api_url)?.lookup(cnpj)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_registry_record() {
    let json = r#"{
      "cnpj": "11222333000181",
      "razao_social": "OFICINA BOA LTDA",
      "nome_fantasia": "",
      "descricao_situacao_cadastral": "ATIVA",
      "cnae_fiscal": 4520001,
      "cnae_fiscal_descricao": "Servicos de manutencao e reparacao mecanica de veiculos automotores",
      "opcao_pelo_simples": true,
      "logradouro": "RUA DAS FLORES",
      "numero": "100",
      "complemento": null,
      "bairro": "CENTRO",
      "cep": "30110-000",
      "municipio": "BELO HORIZONTE",
      "uf": "mg",
      "codigo_municipio_ibge": 3106200,
      "ddd_telefone_1": "(31) 3333-4444"
    }"#;
    let record: RegistryCompany = serde_json::from_str(json).unwrap();
    let result = into_result(record);
    assert_eq!(result.nome_fantasia, None);
    assert_eq!(result.cnae.as_deref(), Some("4520001"));
    assert_eq!(
      result.address,
      Address {
        logradouro: Some("RUA DAS FLORES".to_string()),
        numero: Some("100".to_string()),
        complemento: None,
        bairro: Some("CENTRO".to_string()),
        cep: Some("30110000".to_string()),
        municipio: Some("BELO HORIZONTE".to_string()),
        uf: "MG".to_string(),
        codigo_municipio: Some("3106200".to_string()),
      }
    );
    assert_eq!(result.telefone.as_deref(), Some("3133334444"));
    assert_eq!(result.opcao_simples, Some(true));
  }

  #[test]
  fn invalid_cnpj_fails_before_request() {
    let client = CnpjClient::new("http://127.0.0.1:9").unwrap();
    assert_eq!(client.lookup("11222333000100").unwrap_err().code, "INVALID_CNPJ");
  }
}
