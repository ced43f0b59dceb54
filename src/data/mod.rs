//! Data layer module
//!
//! SQLite persistence for the forge entities federation reads and writes:
//! users and their settings, follows, repositories, stars, issues, pull
//! requests and comments.

mod database;
mod models;

pub use database::Database;
pub use models::*;
