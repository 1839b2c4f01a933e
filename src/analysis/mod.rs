pub mod parser;
pub mod strategy;
pub mod vision;
