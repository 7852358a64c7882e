pub mod document;
pub mod query;
pub mod schema;

mod error;

pub use error::{Error, Result};
