pub mod cnpj;
