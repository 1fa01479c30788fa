pub mod models;
pub mod store;
pub mod writer;

pub use store::{PredictionStore, SqliteStore};
pub use writer::PersistenceWriter;
