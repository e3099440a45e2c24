pub mod columns;
pub mod data_models;

pub use data_models::*;
