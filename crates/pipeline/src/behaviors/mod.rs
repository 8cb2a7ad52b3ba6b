//! Built-in behaviors, in the order the mediator chains them.

mod caching;
mod invalidation;
mod logging;
mod validation;

pub use caching::CachingBehavior;
pub use invalidation::InvalidationBehavior;
pub use logging::LoggingBehavior;
pub use validation::ValidationBehavior;
