pub mod catalog;
pub mod models;
pub mod runs;
pub mod sqlite;

pub use sqlite::Database;
