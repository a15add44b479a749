#![allow(dead_code)]

use rusqlite::Connection;

use contabil_fiscal::companies::create_company;
use contabil_fiscal::db::open_db_in_memory;
use contabil_fiscal::launches::create_launch;
use contabil_fiscal::models::{
  Accountant, Address, Anexo, Company, CompanyInput, Direction, Launch, LaunchInput, LaunchKind, Party, TaxAmounts,
  TaxRegime,
};

pub const OWN_CNPJ: &str = "11222333000181";
pub const SUPPLIER_CNPJ: &str = "11444777000161";
pub const OTHER_CNPJ: &str = "45997418000153";

pub fn company_input(regime: TaxRegime, anexo: Option<Anexo>) -> CompanyInput {
  CompanyInput {
    cnpj: OWN_CNPJ.to_string(),
    razao_social: "Loja Azul Ltda".to_string(),
    nome_fantasia: None,
    regime,
    simples_anexo: anexo,
    activity_start: Some("2020-01-01".to_string()),
    address: Address {
      logradouro: Some("Rua Augusta".to_string()),
      numero: Some("500".to_string()),
      municipio: Some("Sao Paulo".to_string()),
      uf: "SP".to_string(),
      codigo_municipio: Some("3550308".to_string()),
      ..Address::default()
    },
    inscricao_estadual: None,
    inscricao_municipal: None,
    cnae: Some("4744099".to_string()),
    rat_rate: None,
    accountant: Accountant {
      nome: Some("Maria Contadora".to_string()),
      cpf: Some("39053344705".to_string()),
      crc: Some("SP-123456/O".to_string()),
    },
    email: None,
    telefone: None,
  }
}

pub fn setup(regime: TaxRegime, anexo: Option<Anexo>) -> (Connection, Company) {
  let conn = open_db_in_memory().expect("in-memory db");
  let company = create_company(&conn, &company_input(regime, anexo), Some("tester")).expect("company");
  (conn, company)
}

pub fn sale(conn: &Connection, company_id: &str, number: &str, date: &str, total: f64) -> Launch {
  let input = LaunchInput {
    kind: LaunchKind::Manual,
    direction: Direction::Saida,
    number: number.to_string(),
    series: None,
    access_key: None,
    issue_date: date.to_string(),
    emitente: Party {
      document: OWN_CNPJ.to_string(),
      name: "Loja Azul Ltda".to_string(),
    },
    destinatario: None,
    service_code: None,
    total,
    taxes: TaxAmounts::default(),
    items: Vec::new(),
  };
  create_launch(conn, company_id, &input, None, Some("tester")).expect("sale")
}

pub fn nfe_xml(key: &str, number: &str, emit: &str, dest: &str, total: &str) -> String {
  format!(
    r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{key}" versao="4.00">
      <ide><mod>55</mod><serie>1</serie><nNF>{number}</nNF><dhEmi>2025-03-10T09:15:00-03:00</dhEmi></ide>
      <emit><CNPJ>{emit}</CNPJ><xNome>Emitente Ltda</xNome></emit>
      <dest><CNPJ>{dest}</CNPJ><xNome>Destinatario SA</xNome></dest>
      <det nItem="1">
        <prod><cProd>001</cProd><xProd>Mercadoria</xProd><NCM>73181500</NCM><CFOP>5102</CFOP><qCom>1</qCom><vUnCom>{total}</vUnCom><vProd>{total}</vProd></prod>
      </det>
      <total><ICMSTot><vICMS>0.00</vICMS><vIPI>0.00</vIPI><vPIS>0.00</vPIS><vCOFINS>0.00</vCOFINS><vNF>{total}</vNF></ICMSTot></total>
    </infNFe>
  </NFe>
  <protNFe versao="4.00"><infProt><chNFe>{key}</chNFe><cStat>100</cStat></infProt></protNFe>
</nfeProc>"#
  )
}

pub fn nfse_xml(number: &str, prestador: &str, tomador: &str) -> String {
  format!(
    r#"<?xml version="1.0" encoding="UTF-8"?>
<CompNfse xmlns="http://www.abrasf.org.br/nfse.xsd">
  <Nfse versao="2.04">
    <InfNfse Id="nfse-{number}">
      <Numero>{number}</Numero>
      <DataEmissao>2025-03-15T14:30:00</DataEmissao>
      <PrestadorServico>
        <IdentificacaoPrestador><CpfCnpj><Cnpj>{prestador}</Cnpj></CpfCnpj></IdentificacaoPrestador>
        <RazaoSocial>Consultoria Norte Ltda</RazaoSocial>
      </PrestadorServico>
      <DeclaracaoPrestacaoServico>
        <InfDeclaracaoPrestacaoServico>
          <Servico>
            <Valores>
              <ValorServicos>2000.00</ValorServicos>
              <ValorPis>13.00</ValorPis>
              <ValorCofins>60.00</ValorCofins>
              <ValorInss>220.00</ValorInss>
              <ValorIr>30.00</ValorIr>
              <ValorCsll>20.00</ValorCsll>
            </Valores>
            <ItemListaServico>17.01</ItemListaServico>
            <Discriminacao>Assessoria mensal</Discriminacao>
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
</CompNfse>"#
  )
}
