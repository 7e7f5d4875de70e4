pub(crate) mod common;
pub mod completions;
pub mod health;
pub mod models;
