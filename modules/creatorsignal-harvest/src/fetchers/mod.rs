pub mod search;

pub use search::{SearchHit, SerperFetcher};
