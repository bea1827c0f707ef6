//! Database models module
//!
//! All database entity structs are consolidated in models.rs,
//! with table.rs kept separate as the generic DAO handle.

mod models;
mod table;

pub use models::*;

pub use table::Table;
