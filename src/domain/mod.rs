pub mod meal;
pub mod nutrition;
