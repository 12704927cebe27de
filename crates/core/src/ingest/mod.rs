pub mod provider;
pub mod types;
pub mod universe;
pub mod yahoo;
