//! NFS-e in the ABRASF 2.x layout (`CompNfse`), as returned by most municipal
//! web services.

use serde::Deserialize;

use super::{decimal, issue_date, party, FiscalDocument, ImportError};
use crate::models::{LaunchItem, LaunchKind, TaxAmounts};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompNfse {
  nfse: Nfse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Nfse {
  inf_nfse: InfNfse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfNfse {
  numero: String,
  data_emissao: String,
  valores_nfse: Option<ValoresNfse>,
  prestador_servico: Option<PrestadorServico>,
  declaracao_prestacao_servico: DeclaracaoPrestacaoServico,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValoresNfse {
  valor_iss: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PrestadorServico {
  identificacao_prestador: Option<Identificacao>,
  razao_social: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeclaracaoPrestacaoServico {
  inf_declaracao_prestacao_servico: InfDeclaracao,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfDeclaracao {
  servico: Servico,
  prestador: Option<Identificacao>,
  #[serde(alias = "Tomador")]
  tomador_servico: Option<Tomador>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Servico {
  valores: Valores,
  item_lista_servico: Option<String>,
  discriminacao: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Valores {
  valor_servicos: String,
  valor_pis: Option<String>,
  valor_cofins: Option<String>,
  valor_inss: Option<String>,
  valor_ir: Option<String>,
  valor_csll: Option<String>,
  valor_iss: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Identificacao {
  cpf_cnpj: Option<CpfCnpj>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CpfCnpj {
  cnpj: Option<String>,
  cpf: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tomador {
  identificacao_tomador: Option<Identificacao>,
  razao_social: Option<String>,
}

fn documents(id: Option<Identificacao>) -> (Option<String>, Option<String>) {
  match id.and_then(|id| id.cpf_cnpj) {
    Some(doc) => (doc.cnpj, doc.cpf),
    None => (None, None),
  }
}

/// Extracts the `CompNfse` element when it comes wrapped in a web service
/// response envelope.
fn comp_nfse_fragment(xml: &str) -> &str {
  match (xml.find("<CompNfse"), xml.rfind("</CompNfse>")) {
    (Some(start), Some(end)) if end > start => &xml[start..end + "</CompNfse>".len()],
    _ => xml,
  }
}

pub fn parse_nfse(xml: &str) -> Result<FiscalDocument, ImportError> {
  let comp: CompNfse = quick_xml::de::from_str(comp_nfse_fragment(xml))?;
  let inf = comp.nfse.inf_nfse;
  let decl = inf.declaracao_prestacao_servico.inf_declaracao_prestacao_servico;

  // Prestador name lives in InfNfse; the document may appear in either place.
  let (mut cnpj, mut cpf) = documents(decl.prestador);
  let mut name = None;
  if let Some(prestador) = inf.prestador_servico {
    if cnpj.is_none() && cpf.is_none() {
      (cnpj, cpf) = documents(prestador.identificacao_prestador);
    }
    name = prestador.razao_social;
  }
  let emitente = party("prestador", cnpj, cpf, name)?.ok_or(ImportError::Missing("CNPJ/CPF do prestador"))?;

  let destinatario = match decl.tomador_servico {
    Some(tomador) => {
      let (cnpj, cpf) = documents(tomador.identificacao_tomador);
      party("tomador", cnpj, cpf, tomador.razao_social)?
    }
    None => None,
  };

  let valores = &decl.servico.valores;
  let total = decimal("ValorServicos", Some(&valores.valor_servicos))?;
  let iss = match valores.valor_iss.as_deref() {
    Some(value) => decimal("ValorIss", Some(value))?,
    None => decimal("ValorIss", inf.valores_nfse.as_ref().and_then(|v| v.valor_iss.as_deref()))?,
  };
  let taxes = TaxAmounts {
    iss,
    ret_ir: decimal("ValorIr", valores.valor_ir.as_deref())?,
    ret_inss: decimal("ValorInss", valores.valor_inss.as_deref())?,
    ret_csll: decimal("ValorCsll", valores.valor_csll.as_deref())?,
    ret_pis: decimal("ValorPis", valores.valor_pis.as_deref())?,
    ret_cofins: decimal("ValorCofins", valores.valor_cofins.as_deref())?,
    ..TaxAmounts::default()
  };

  let items = decl
    .servico
    .discriminacao
    .as_deref()
    .map(str::trim)
    .filter(|text| !text.is_empty())
    .map(|text| {
      vec![LaunchItem {
        code: decl.servico.item_lista_servico.clone(),
        description: text.to_string(),
        ncm: None,
        cfop: None,
        quantity: 1.0,
        unit_price: total,
        total,
      }]
    })
    .unwrap_or_default();

  Ok(FiscalDocument {
    kind: LaunchKind::Nfse,
    number: inf.numero.trim().to_string(),
    series: None,
    access_key: None,
    issue_date: issue_date(Some(&inf.data_emissao))?,
    emitente,
    destinatario,
    service_code: decl.servico.item_lista_servico,
    total,
    taxes,
    items,
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn sample(prestador: &str, tomador: &str) -> String {
    format!(
      r#"<?xml version="1.0" encoding="UTF-8"?>
<ConsultarNfseRpsResposta xmlns="http://www.abrasf.org.br/nfse.xsd">
<CompNfse>
  <Nfse versao="2.04">
    <InfNfse Id="nfse-778">
      <Numero>778</Numero>
      <CodigoVerificacao>AB12CD</CodigoVerificacao>
      <DataEmissao>2025-03-15T14:30:00</DataEmissao>
      <ValoresNfse><BaseCalculo>2000.00</BaseCalculo><Aliquota>5.00</Aliquota><ValorIss>100.00</ValorIss></ValoresNfse>
      <PrestadorServico>
        <IdentificacaoPrestador><CpfCnpj><Cnpj>{prestador}</Cnpj></CpfCnpj></IdentificacaoPrestador>
        <RazaoSocial>Consultoria Norte Ltda</RazaoSocial>
      </PrestadorServico>
      <DeclaracaoPrestacaoServico>
        <InfDeclaracaoPrestacaoServico>
          <Competencia>2025-03-01</Competencia>
          <Servico>
            <Valores>
              <ValorServicos>2000.00</ValorServicos>
              <ValorPis>13.00</ValorPis>
              <ValorCofins>60.00</ValorCofins>
              <ValorInss>220.00</ValorInss>
              <ValorIr>30.00</ValorIr>
              <ValorCsll>20.00</ValorCsll>
            </Valores>
            <IssRetido>2</IssRetido>
            <ItemListaServico>17.01</ItemListaServico>
            <Discriminacao>Assessoria contabil mensal</Discriminacao>
            <CodigoMunicipio>3550308</CodigoMunicipio>
          </Servico>
          <Prestador><CpfCnpj><Cnpj>{prestador}</Cnpj></CpfCnpj></Prestador>
          <TomadorServico>
            <IdentificacaoTomador><CpfCnpj><Cnpj>{tomador}</Cnpj></CpfCnpj></IdentificacaoTomador>
            <RazaoSocial>Loja Azul Ltda</RazaoSocial>
          </TomadorServico>
        </InfDeclaracaoPrestacaoServico>
      </DeclaracaoPrestacaoServico>
    </InfNfse>
  </Nfse>
</CompNfse>
</ConsultarNfseRpsResposta>"#
    )
  }

  #[test]
  fn parses_wrapped_comp_nfse() {
    let doc = parse_nfse(&sample("11444777000161", "11222333000181")).unwrap();
    assert_eq!(doc.number, "778");
    assert_eq!(doc.issue_date, "2025-03-15");
    assert_eq!(doc.emitente.name, "Consultoria Norte Ltda");
    assert_eq!(doc.destinatario.as_ref().unwrap().document, "11222333000181");
    assert_eq!(doc.total, 2000.0);
    assert_eq!(doc.taxes.iss, 100.0);
    assert_eq!(doc.taxes.ret_inss, 220.0);
    assert_eq!(doc.taxes.ret_ir, 30.0);
    assert_eq!(doc.service_code.as_deref(), Some("17.01"));
    assert_eq!(doc.items[0].description, "Assessoria contabil mensal");
  }
}
