//! Request abstraction and the optional capabilities a request can declare.

use std::borrow::Cow;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

/// A message dispatched through the mediator.
///
/// Requests are immutable once sent. Capabilities are opted into by
/// overriding [`Request::as_cacheable`] or [`Request::as_invalidating`];
/// the defaults make both behaviors a pass-through.
pub trait Request: Send + Sync + 'static {
    /// What the handler returns. Must round-trip through serde so it can be cached.
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        None
    }

    /// Label stored next to a cached response so an entry written for a
    /// different response type is recognised.
    ///
    /// Defaults to the response type's name without module paths. Override
    /// it when the tag must survive renames or be shared across services.
    fn response_tag() -> Cow<'static, str> {
        Cow::Owned(unqualified_type_name::<Self::Response>())
    }
}

/// A query whose response may be served from the cache.
pub trait Cacheable: Send + Sync {
    /// Key the response is stored under. An empty key disables caching.
    fn cache_key(&self) -> String;

    /// Idle time after which the entry expires. `None` uses the configured default.
    fn sliding_ttl(&self) -> Option<Duration> {
        None
    }
}

/// A command that makes cached responses stale once it commits.
pub trait Invalidating: Send + Sync {
    /// Exact keys to delete.
    fn invalidated_keys(&self) -> Vec<String>;

    /// Every key starting with one of these prefixes is deleted.
    fn invalidated_prefixes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Returns the unqualified type name of `T`, for logs and metric labels.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Returns the type name of `T` with module paths removed from every
/// segment, e.g. `Vec<String>` for `alloc::vec::Vec<alloc::string::String>`.
pub fn unqualified_type_name<T: ?Sized>() -> String {
    let is_path = |c: char| c.is_alphanumeric() || c == '_' || c == ':';
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut rest = full;
    while let Some(start) = rest.find(|c: char| c.is_alphanumeric() || c == '_') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(|c: char| !is_path(c)).unwrap_or(tail.len());
        let path = &tail[..end];
        out.push_str(path.rsplit("::").next().unwrap_or(path));
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl Request for Ping {
        type Response = ();
    }

    #[test]
    fn capabilities_default_to_none() {
        assert!(Ping.as_cacheable().is_none());
        assert!(Ping.as_invalidating().is_none());
    }

    #[test]
    fn response_tag_defaults_to_unqualified_response_type() {
        struct Lookup;
        impl Request for Lookup {
            type Response = Vec<std::collections::HashMap<String, Option<u32>>>;
        }

        assert_eq!(Ping::response_tag(), "()");
        assert_eq!(Lookup::response_tag(), "Vec<HashMap<String, Option<u32>>>");
    }

    #[test]
    fn unqualified_type_name_keeps_references_and_tuples() {
        assert_eq!(unqualified_type_name::<&str>(), "&str");
        assert_eq!(unqualified_type_name::<(String, usize)>(), "(String, usize)");
        assert_eq!(unqualified_type_name::<Ping>(), "Ping");
    }

    #[test]
    fn short_type_name_strips_module_path() {
        assert_eq!(short_type_name::<Ping>(), "Ping");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
