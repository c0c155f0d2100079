pub mod flatfile;
pub mod sqlite;

pub use flatfile::FlatFileIndex;
pub use sqlite::SqliteStore;
