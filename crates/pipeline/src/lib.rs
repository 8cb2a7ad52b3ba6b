//! Request pipeline.
//!
//! Every request goes through the [`Mediator`], which runs a fixed chain of
//! behaviors around the request's handler:
//!
//! 1. logging: request span, outcome, metrics
//! 2. validation: all registered validators, failures accumulated
//! 3. caching: serves [`Cacheable`] requests from the [`CacheStore`]
//! 4. invalidation: deletes the keys an [`Invalidating`] request names,
//!    once its write has committed
//!
//! Handlers write through a [`domain::UnitOfWork`] begun from the
//! [`RequestContext`]. The commit, its event publication and the cache
//! invalidation run on a spawned task, so they finish even if the caller
//! drops the request after the store commit.
//!
//! [`CacheStore`]: cache::CacheStore

pub mod behavior;
pub mod behaviors;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod mediator;
pub mod request;
pub mod telemetry;
pub mod validation;

pub use behavior::{Behavior, Next};
pub use config::{Environment, LogFormat, PipelineConfig};
pub use context::RequestContext;
pub use error::{PipelineError, RegistryError};
pub use handler::RequestHandler;
pub use mediator::{Mediator, MediatorBuilder};
pub use request::{Cacheable, Invalidating, Request};
pub use validation::{ValidationErrors, ValidationFailure, Validator, rules};
