//! Shared types used across the request pipeline crates.

mod types;

pub use types::AggregateId;
