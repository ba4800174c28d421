pub mod config;
pub mod error;
pub mod record;
pub mod schedule;
pub mod schema;

pub use config::Config;
pub use error::*;
pub use record::*;
pub use schema::SaleSchema;
