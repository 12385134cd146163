pub mod carrier;
pub mod detail;
pub mod etl;
pub mod executor;
pub mod fetcher;
pub mod filter;
pub mod partition;
pub mod pipeline;
pub mod projector;
pub mod scheduler;
pub mod serializer;

pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
