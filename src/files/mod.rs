pub mod backup;
pub mod documents;
