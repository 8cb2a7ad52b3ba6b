//! Request dispatcher.
//!
//! Handlers, validators and extra behaviors are registered per request type
//! on a [`MediatorBuilder`]. `build` assembles one behavior chain per type
//! and rejects inconsistent registrations up front, so a running
//! [`Mediator`] only ever fails lookup for types nobody registered.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use cache::{CacheStore, InMemoryCacheStore};

use crate::behavior::{Behavior, Next};
use crate::behaviors::{CachingBehavior, InvalidationBehavior, LoggingBehavior, ValidationBehavior};
use crate::config::PipelineConfig;
use crate::context::RequestContext;
use crate::error::{PipelineError, RegistryError};
use crate::handler::RequestHandler;
use crate::request::{Request, short_type_name};
use crate::validation::Validator;

type Erased = Box<dyn Any + Send + Sync>;

/// Dependencies shared by every assembled chain.
struct Shared {
    cache: Arc<dyn CacheStore>,
    config: PipelineConfig,
}

/// Everything registered for one request type.
struct Registration<R: Request> {
    handlers: Vec<Arc<dyn RequestHandler<R>>>,
    validators: Vec<Arc<dyn Validator<R>>>,
    behaviors: Vec<Arc<dyn Behavior<R>>>,
}

impl<R: Request> Default for Registration<R> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            validators: Vec::new(),
            behaviors: Vec::new(),
        }
    }
}

/// A type-erased [`Registration`] plus the function that turns it into a
/// [`Chain`] of the same request type.
struct Slot {
    registration: Erased,
    assemble: fn(Erased, &Shared) -> Result<Erased, RegistryError>,
}

impl Slot {
    fn new<R: Request>() -> Self {
        Self {
            registration: Box::new(Registration::<R>::default()),
            assemble: assemble::<R>,
        }
    }
}

/// The assembled pipeline for one request type.
struct Chain<R: Request> {
    behaviors: Vec<Arc<dyn Behavior<R>>>,
    handler: Arc<dyn RequestHandler<R>>,
}

fn assemble<R: Request>(registration: Erased, shared: &Shared) -> Result<Erased, RegistryError> {
    let request_type = short_type_name::<R>();
    let Ok(registration) = registration.downcast::<Registration<R>>() else {
        return Err(RegistryError::HandlerNotFound { request_type });
    };
    let Registration {
        mut handlers,
        validators,
        behaviors: custom,
    } = *registration;

    let handler = match handlers.len() {
        0 => return Err(RegistryError::HandlerNotFound { request_type }),
        1 => handlers.remove(0),
        count => {
            return Err(RegistryError::HandlerAmbiguous {
                request_type,
                count,
            });
        }
    };

    let mut behaviors: Vec<Arc<dyn Behavior<R>>> = vec![Arc::new(LoggingBehavior)];
    if !validators.is_empty() {
        behaviors.push(Arc::new(ValidationBehavior::new(validators)));
    }
    behaviors.push(Arc::new(CachingBehavior::new(
        shared.cache.clone(),
        shared.config.cache_default_ttl,
        shared.config.environment,
    )));
    behaviors.push(Arc::new(InvalidationBehavior::new(shared.cache.clone())));
    behaviors.extend(custom);

    Ok(Box::new(Chain { behaviors, handler }))
}

/// Collects registrations and builds a [`Mediator`].
pub struct MediatorBuilder {
    slots: HashMap<TypeId, Slot>,
    cache: Option<Arc<dyn CacheStore>>,
    config: PipelineConfig,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            cache: None,
            config: PipelineConfig::default(),
        }
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn registration<R: Request>(&mut self) -> Option<&mut Registration<R>> {
        self.slots
            .entry(TypeId::of::<R>())
            .or_insert_with(Slot::new::<R>)
            .registration
            .downcast_mut::<Registration<R>>()
    }

    /// Registers the handler for `R`. Registering a second one makes
    /// [`MediatorBuilder::build`] fail.
    pub fn handler<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        if let Some(registration) = self.registration::<R>() {
            registration.handlers.push(Arc::new(handler));
        }
        self
    }

    /// Adds a validator for `R`. Validators run in registration order.
    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R> + 'static,
    {
        if let Some(registration) = self.registration::<R>() {
            registration.validators.push(Arc::new(validator));
        }
        self
    }

    /// Appends a behavior for `R`, run after the built-in behaviors and
    /// just before the handler.
    pub fn behavior<R, B>(mut self, behavior: B) -> Self
    where
        R: Request,
        B: Behavior<R> + 'static,
    {
        if let Some(registration) = self.registration::<R>() {
            registration.behaviors.push(Arc::new(behavior));
        }
        self
    }

    /// Sets the cache store. Defaults to a fresh [`InMemoryCacheStore`].
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Mediator, RegistryError> {
        let shared = Shared {
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new())),
            config: self.config,
        };

        let mut chains = HashMap::with_capacity(self.slots.len());
        for (type_id, slot) in self.slots {
            let chain = (slot.assemble)(slot.registration, &shared)?;
            chains.insert(type_id, chain);
        }

        tracing::debug!(request_types = chains.len(), "mediator built");
        Ok(Mediator {
            chains: Arc::new(chains),
            config: Arc::new(shared.config),
        })
    }
}

/// Dispatches requests to their handler through the behavior chain
/// Logging, Validation, Caching, Invalidation, then any custom behaviors.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Mediator {
    chains: Arc<HashMap<TypeId, Erased>>,
    config: Arc<PipelineConfig>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns true if a handler is registered for `R`.
    pub fn handles<R: Request>(&self) -> bool {
        self.chains.contains_key(&TypeId::of::<R>())
    }

    /// Dispatches `request` as an anonymous caller.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, PipelineError> {
        self.send_with(request, RequestContext::default()).await
    }

    /// Dispatches `request` with the caller's context.
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        ctx: RequestContext,
    ) -> Result<R::Response, PipelineError> {
        let request_type = short_type_name::<R>();
        let Some(chain) = self
            .chains
            .get(&TypeId::of::<R>())
            .and_then(|chain| chain.downcast_ref::<Chain<R>>())
        else {
            tracing::error!(request_type, "no handler registered");
            return Err(PipelineError::HandlerNotFound { request_type });
        };

        Next::new(&chain.behaviors, chain.handler.as_ref())
            .run(&request, &ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Cacheable;
    use crate::validation::{ValidationErrors, rules};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        text: String,
    }

    impl Request for Echo {
        type Response = String;
    }

    struct Unregistered;

    impl Request for Unregistered {
        type Response = ();
    }

    #[derive(Default)]
    struct EchoHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, request: &Echo, _ctx: &RequestContext) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request.text.clone())
        }
    }

    struct Shout;

    #[async_trait]
    impl Behavior<Echo> for Shout {
        async fn handle(
            &self,
            request: &Echo,
            ctx: &RequestContext,
            next: Next<'_, Echo>,
        ) -> Result<String, PipelineError> {
            Ok(next.run(request, ctx).await?.to_uppercase())
        }
    }

    #[tokio::test]
    async fn dispatches_to_the_registered_handler() {
        let mediator = Mediator::builder()
            .handler::<Echo, _>(EchoHandler::default())
            .build()
            .unwrap();

        let reply = mediator.send(Echo { text: "hi".into() }).await.unwrap();
        assert_eq!(reply, "hi");
        assert!(mediator.handles::<Echo>());
    }

    #[tokio::test]
    async fn unregistered_request_fails_with_handler_not_found() {
        let mediator = Mediator::builder().build().unwrap();
        let err = mediator.send(Unregistered).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::HandlerNotFound {
                request_type: "Unregistered"
            }
        ));
    }

    #[test]
    fn two_handlers_for_one_type_is_ambiguous() {
        let err = Mediator::builder()
            .handler::<Echo, _>(EchoHandler::default())
            .handler::<Echo, _>(EchoHandler::default())
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::HandlerAmbiguous {
                request_type: "Echo",
                count: 2
            }
        );
    }

    #[test]
    fn validator_without_handler_fails_build() {
        let err = Mediator::builder()
            .validator::<Echo, _>(|_: &Echo, _: &mut ValidationErrors| {})
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::HandlerNotFound {
                request_type: "Echo"
            }
        );
    }

    #[tokio::test]
    async fn validation_short_circuits_before_the_handler() {
        let handler = Arc::new(EchoHandler::default());
        let mediator = Mediator::builder()
            .handler::<Echo, _>(handler.clone())
            .validator::<Echo, _>(|r: &Echo, e: &mut ValidationErrors| {
                e.check(rules::not_blank("text", &r.text));
            })
            .validator::<Echo, _>(|r: &Echo, e: &mut ValidationErrors| {
                e.check(rules::min_length("text", &r.text, 3));
            })
            .build()
            .unwrap();

        let err = mediator.send(Echo { text: " ".into() }).await.unwrap_err();
        match err {
            PipelineError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn custom_behaviors_run_inside_the_built_ins() {
        let mediator = Mediator::builder()
            .handler::<Echo, _>(EchoHandler::default())
            .behavior::<Echo, _>(Shout)
            .build()
            .unwrap();

        let reply = mediator.send(Echo { text: "hi".into() }).await.unwrap();
        assert_eq!(reply, "HI");
    }

    #[tokio::test]
    async fn cancelled_context_never_reaches_the_handler() {
        let handler = Arc::new(EchoHandler::default());
        let mediator = Mediator::builder()
            .handler::<Echo, _>(handler.clone())
            .build()
            .unwrap();

        let ctx = RequestContext::default();
        ctx.cancellation().cancel();
        let err = mediator
            .send_with(Echo { text: "hi".into() }, ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    struct CachedEcho;

    impl Request for CachedEcho {
        type Response = String;

        fn as_cacheable(&self) -> Option<&dyn Cacheable> {
            Some(self)
        }
    }

    impl Cacheable for CachedEcho {
        fn cache_key(&self) -> String {
            "echo".to_string()
        }
    }

    #[async_trait]
    impl RequestHandler<CachedEcho> for EchoHandler {
        async fn handle(&self, _: &CachedEcho, _ctx: &RequestContext) -> Result<String, PipelineError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst).to_string())
        }
    }

    #[tokio::test]
    async fn builder_uses_the_supplied_cache_store() {
        let cache = InMemoryCacheStore::new();
        let mediator = Mediator::builder()
            .handler::<CachedEcho, _>(EchoHandler::default())
            .cache_store(Arc::new(cache.clone()))
            .build()
            .unwrap();

        assert_eq!(mediator.send(CachedEcho).await.unwrap(), "0");
        assert_eq!(mediator.send(CachedEcho).await.unwrap(), "0");
        assert!(cache.contains("echo").await);
    }
}
