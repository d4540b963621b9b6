pub mod api_types;
pub mod client;
pub mod error;
pub mod types;

pub use client::{ContentApi, HttpContentApi};
pub use error::FetchError;
pub use types::{Book, Collection, Record, RecordPage, RecordQuery};
