pub mod models;
pub mod queries;
pub mod sqlite;

pub use queries::ReportStore;
pub use sqlite::Database;
