//! NF-e (modelo 55/65) as published by SEFAZ: `nfeProc` with the
//! authorization protocol, or the bare signed `NFe`.

use serde::Deserialize;

use super::{decimal, issue_date, party, FiscalDocument, ImportError};
use crate::models::{LaunchItem, LaunchKind, TaxAmounts};

#[derive(Debug, Deserialize)]
struct NfeProc {
  #[serde(rename = "NFe")]
  nfe: Nfe,
  #[serde(rename = "protNFe")]
  prot: Option<ProtNfe>,
}

#[derive(Debug, Deserialize)]
struct ProtNfe {
  #[serde(rename = "infProt")]
  inf: Option<InfProt>,
}

#[derive(Debug, Deserialize)]
struct InfProt {
  #[serde(rename = "chNFe")]
  access_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nfe {
  #[serde(rename = "infNFe")]
  inf: InfNfe,
}

#[derive(Debug, Deserialize)]
struct InfNfe {
  #[serde(rename = "@Id")]
  id: Option<String>,
  ide: Ide,
  emit: Participant,
  dest: Option<Participant>,
  #[serde(default)]
  det: Vec<Det>,
  total: Total,
}

#[derive(Debug, Deserialize)]
struct Ide {
  #[serde(rename = "nNF")]
  number: String,
  serie: Option<String>,
  #[serde(rename = "dhEmi")]
  issued_at: Option<String>,
  #[serde(rename = "dEmi")]
  issued_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Participant {
  #[serde(rename = "CNPJ")]
  cnpj: Option<String>,
  #[serde(rename = "CPF")]
  cpf: Option<String>,
  #[serde(rename = "xNome")]
  name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Det {
  prod: Prod,
}

#[derive(Debug, Deserialize)]
struct Prod {
  #[serde(rename = "cProd")]
  code: Option<String>,
  #[serde(rename = "xProd")]
  description: String,
  #[serde(rename = "NCM")]
  ncm: Option<String>,
  #[serde(rename = "CFOP")]
  cfop: Option<String>,
  #[serde(rename = "qCom")]
  quantity: Option<String>,
  #[serde(rename = "vUnCom")]
  unit_price: Option<String>,
  #[serde(rename = "vProd")]
  total: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Total {
  #[serde(rename = "ICMSTot")]
  icms_tot: IcmsTot,
  #[serde(rename = "retTrib")]
  ret_trib: Option<RetTrib>,
}

#[derive(Debug, Deserialize)]
struct IcmsTot {
  #[serde(rename = "vICMS")]
  icms: Option<String>,
  #[serde(rename = "vIPI")]
  ipi: Option<String>,
  #[serde(rename = "vPIS")]
  pis: Option<String>,
  #[serde(rename = "vCOFINS")]
  cofins: Option<String>,
  #[serde(rename = "vNF")]
  total: String,
}

#[derive(Debug, Deserialize)]
struct RetTrib {
  #[serde(rename = "vRetPIS")]
  pis: Option<String>,
  #[serde(rename = "vRetCOFINS")]
  cofins: Option<String>,
  #[serde(rename = "vRetCSLL")]
  csll: Option<String>,
  #[serde(rename = "vIRRF")]
  irrf: Option<String>,
  #[serde(rename = "vRetPrev")]
  previdencia: Option<String>,
}

pub fn parse_nfe(xml: &str) -> Result<FiscalDocument, ImportError> {
  let (nfe, protocol_key) = if xml.contains("<nfeProc") {
    let proc: NfeProc = quick_xml::de::from_str(xml)?;
    let key = proc.prot.and_then(|prot| prot.inf).and_then(|inf| inf.access_key);
    (proc.nfe, key)
  } else {
    (quick_xml::de::from_str::<Nfe>(xml)?, None)
  };
  let inf = nfe.inf;

  let access_key = protocol_key
    .or_else(|| inf.id.as_deref().map(|id| id.trim_start_matches("NFe").to_string()))
    .map(|key| key.trim().to_string())
    .filter(|key| key.len() == 44 && key.chars().all(|ch| ch.is_ascii_digit()))
    .ok_or(ImportError::Missing("chave de acesso"))?;

  let issue_date = issue_date(inf.ide.issued_at.as_deref().or(inf.ide.issued_on.as_deref()))?;
  let emitente = party("emitente", inf.emit.cnpj, inf.emit.cpf, inf.emit.name)?
    .ok_or(ImportError::Missing("CNPJ/CPF do emitente"))?;
  let destinatario = match inf.dest {
    Some(dest) => party("destinatario", dest.cnpj, dest.cpf, dest.name)?,
    None => None,
  };

  let mut items = Vec::with_capacity(inf.det.len());
  for det in inf.det {
    let prod = det.prod;
    items.push(LaunchItem {
      code: prod.code,
      description: prod.description,
      ncm: prod.ncm,
      cfop: prod.cfop,
      quantity: decimal("qCom", prod.quantity.as_deref())?,
      unit_price: decimal("vUnCom", prod.unit_price.as_deref())?,
      total: decimal("vProd", prod.total.as_deref())?,
    });
  }

  let tot = &inf.total.icms_tot;
  let ret = inf.total.ret_trib.as_ref();
  let taxes = TaxAmounts {
    icms: decimal("vICMS", tot.icms.as_deref())?,
    ipi: decimal("vIPI", tot.ipi.as_deref())?,
    pis: decimal("vPIS", tot.pis.as_deref())?,
    cofins: decimal("vCOFINS", tot.cofins.as_deref())?,
    iss: 0.0,
    ret_ir: decimal("vIRRF", ret.and_then(|r| r.irrf.as_deref()))?,
    ret_inss: decimal("vRetPrev", ret.and_then(|r| r.previdencia.as_deref()))?,
    ret_csll: decimal("vRetCSLL", ret.and_then(|r| r.csll.as_deref()))?,
    ret_pis: decimal("vRetPIS", ret.and_then(|r| r.pis.as_deref()))?,
    ret_cofins: decimal("vRetCOFINS", ret.and_then(|r| r.cofins.as_deref()))?,
  };

  Ok(FiscalDocument {
    kind: LaunchKind::Nfe,
    number: inf.ide.number.trim().to_string(),
    series: inf.ide.serie.map(|serie| serie.trim().to_string()),
    access_key: Some(access_key),
    issue_date,
    emitente,
    destinatario,
    service_code: None,
    total: decimal("vNF", Some(&tot.total))?,
    taxes,
    items,
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const KEY: &str = "35250311222333000181550010000012341000012345";

  pub(crate) fn sample(emit: &str, dest: &str) -> String {
    format!(
      r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{KEY}" versao="4.00">
      <ide><cUF>35</cUF><mod>55</mod><serie>1</serie><nNF>1234</nNF><dhEmi>2025-03-10T09:15:00-03:00</dhEmi><tpNF>1</tpNF></ide>
      <emit><CNPJ>{emit}</CNPJ><xNome>Loja Azul Ltda</xNome></emit>
      <dest><CNPJ>{dest}</CNPJ><xNome>Cliente Verde SA</xNome></dest>
      <det nItem="1">
        <prod><cProd>001</cProd><xProd>Parafuso</xProd><NCM>73181500</NCM><CFOP>5102</CFOP><qCom>10.0000</qCom><vUnCom>1.5000</vUnCom><vProd>15.00</vProd></prod>
      </det>
      <det nItem="2">
        <prod><cProd>002</cProd><xProd>Porca</xProd><NCM>73181600</NCM><CFOP>5102</CFOP><qCom>5</qCom><vUnCom>1.00</vUnCom><vProd>5.00</vProd></prod>
      </det>
      <total><ICMSTot><vICMS>3.60</vICMS><vIPI>0.00</vIPI><vPIS>0.13</vPIS><vCOFINS>0.60</vCOFINS><vNF>20.00</vNF></ICMSTot></total>
    </infNFe>
  </NFe>
  <protNFe versao="4.00"><infProt><chNFe>{KEY}</chNFe><cStat>100</cStat></infProt></protNFe>
</nfeProc>"#
    )
  }

  #[test]
  fn parses_authorized_nfe() {
    let doc = parse_nfe(&sample("11222333000181", "11444777000161")).unwrap();
    assert_eq!(doc.access_key.as_deref(), Some(KEY));
    assert_eq!(doc.number, "1234");
    assert_eq!(doc.issue_date, "2025-03-10");
    assert_eq!(doc.emitente.document, "11222333000181");
    assert_eq!(doc.destinatario.as_ref().unwrap().name, "Cliente Verde SA");
    assert_eq!(doc.items.len(), 2);
    assert_eq!(doc.items[0].quantity, 10.0);
    assert_eq!(doc.total, 20.0);
    assert_eq!(doc.taxes.icms, 3.6);
  }

  #[test]
  fn bare_nfe_takes_key_from_id() {
    let xml = sample("11222333000181", "11444777000161");
    let start = xml.find("<NFe>").unwrap();
    let end = xml.find("</NFe>").unwrap() + "</NFe>".len();
    let doc = parse_nfe(&xml[start..end]).unwrap();
    assert_eq!(doc.access_key.as_deref(), Some(KEY));
  }

  #[test]
  fn rejects_non_numeric_total() {
    let xml = sample("11222333000181", "11444777000161").replace("<vNF>20.00</vNF>", "<vNF>vinte</vNF>");
    assert!(matches!(parse_nfe(&xml), Err(ImportError::InvalidValue { field: "vNF", .. })));
  }
}
