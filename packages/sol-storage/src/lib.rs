pub mod models;
pub mod solr;
pub mod topology;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
