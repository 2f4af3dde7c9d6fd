use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::{NetworkError, Processor, Result};

/// One API operation: what it sends and what it gets back.
///
/// Routing metadata for a kind is registered in a [`RouteRegistry`].
pub trait RequestKind: Send + Sync + 'static {
    type Payload: Serialize + Send + Sync;
    type Output: DeserializeOwned + Send;
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the payload is also passed as a query fragment.
    pub fn carries_query(&self) -> bool {
        !matches!(self, Self::Post)
    }

    /// Whether a body is attached when the caller does not say.
    pub fn includes_body_by_default(&self) -> bool {
        !matches!(self, Self::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Routing metadata for one request kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestDescriptor {
    kind: &'static str,
    route: String,
    method: HttpMethod,
    max_retries: Option<u32>,
}

impl RequestDescriptor {
    /// Creates a descriptor. `route` may contain `{name}` placeholders.
    pub fn new(method: HttpMethod, route: impl Into<String>) -> Self {
        Self {
            kind: "",
            route: route.into(),
            method,
            max_retries: None,
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, route)
    }

    pub fn put(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, route)
    }

    pub fn patch(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, route)
    }

    /// Overrides the configured status 0 retry budget for this kind.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Type name of the request kind this descriptor was registered for.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }
}

pub(crate) type ProcessorFactory<K> = Arc<dyn Fn() -> Box<dyn Processor<K>> + Send + Sync>;

#[cfg(feature = "fake-data")]
pub(crate) type FakeResponse<K> =
    Arc<dyn Fn() -> <K as RequestKind>::Output + Send + Sync>;

struct Entry {
    descriptor: RequestDescriptor,
    factory: Box<dyn Any + Send + Sync>,
    #[cfg(feature = "fake-data")]
    fake: Option<Box<dyn Any + Send + Sync>>,
}

/// Static table from request kind to its descriptor and processor factory.
///
/// Built once through [`RouteRegistry::builder`]; templates are validated then.
#[derive(Default)]
pub struct RouteRegistry {
    entries: HashMap<TypeId, Entry>,
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|entry| &entry.descriptor))
            .finish()
    }
}

impl RouteRegistry {
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    /// Returns the descriptor for `K` or a configuration error.
    pub fn resolve<K: RequestKind>(&self) -> Result<&RequestDescriptor> {
        self.entry::<K>().map(|entry| &entry.descriptor)
    }

    /// Fails fast when `K` has no registered route. Meant for startup checks.
    pub fn require<K: RequestKind>(&self) -> Result<()> {
        self.entry::<K>().map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn processor<K: RequestKind>(&self) -> Result<Box<dyn Processor<K>>> {
        let entry = self.entry::<K>()?;
        let factory = entry
            .factory
            .downcast_ref::<ProcessorFactory<K>>()
            .ok_or_else(|| {
                NetworkError::Configuration(format!(
                    "processor factory for {} has the wrong type",
                    type_name::<K>()
                ))
            })?;
        Ok(factory())
    }

    #[cfg(feature = "fake-data")]
    pub(crate) fn fake_response<K: RequestKind>(&self) -> Option<K::Output> {
        let fake = self.entry::<K>().ok()?.fake.as_ref()?;
        fake.downcast_ref::<FakeResponse<K>>().map(|make| make())
    }

    fn entry<K: RequestKind>(&self) -> Result<&Entry> {
        self.entries.get(&TypeId::of::<K>()).ok_or_else(|| {
            NetworkError::Configuration(format!(
                "request {} has no route registered",
                type_name::<K>()
            ))
        })
    }
}

/// Collects registrations; errors are reported together by [`build`](Self::build).
#[derive(Default)]
pub struct RouteRegistryBuilder {
    entries: HashMap<TypeId, Entry>,
    errors: Vec<String>,
}

impl RouteRegistryBuilder {
    /// Registers `K` with its descriptor and a processor factory.
    pub fn route<K, F, P>(mut self, descriptor: RequestDescriptor, factory: F) -> Self
    where
        K: RequestKind,
        F: Fn() -> P + Send + Sync + 'static,
        P: Processor<K> + 'static,
    {
        let kind = type_name::<K>();
        if let Err(message) = validate_template(descriptor.route()) {
            self.errors.push(format!("{kind}: {message}"));
        }
        if self.entries.contains_key(&TypeId::of::<K>()) {
            self.errors.push(format!("{kind}: registered more than once"));
        }

        let factory: ProcessorFactory<K> =
            Arc::new(move || Box::new(factory()) as Box<dyn Processor<K>>);
        self.entries.insert(
            TypeId::of::<K>(),
            Entry {
                descriptor: RequestDescriptor {
                    kind,
                    ..descriptor
                },
                factory: Box::new(factory),
                #[cfg(feature = "fake-data")]
                fake: None,
            },
        );
        self
    }

    /// Registers a canned result that replaces the network exchange for `K`.
    #[cfg(feature = "fake-data")]
    pub fn fake_response<K, F>(mut self, make: F) -> Self
    where
        K: RequestKind,
        F: Fn() -> K::Output + Send + Sync + 'static,
    {
        let make: FakeResponse<K> = Arc::new(make);
        match self.entries.get_mut(&TypeId::of::<K>()) {
            Some(entry) => entry.fake = Some(Box::new(make)),
            None => self.errors.push(format!(
                "{}: fake response registered before its route",
                type_name::<K>()
            )),
        }
        self
    }

    pub fn build(self) -> Result<RouteRegistry> {
        if !self.errors.is_empty() {
            return Err(NetworkError::Configuration(self.errors.join("; ")));
        }
        Ok(RouteRegistry {
            entries: self.entries,
        })
    }
}

fn validate_template(route: &str) -> std::result::Result<(), String> {
    let mut rest = route;
    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(format!("unmatched '}}' in route '{route}'"));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in route '{route}'"))?;
        let name = &after[..close];
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid placeholder '{{{name}}}' in route '{route}'"));
        }
        rest = &after[close + 1..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_template, HttpMethod, RequestDescriptor, RouteRegistry};
    use crate::{NetworkError, NoopProcessor, RequestKind};

    struct Login;
    impl RequestKind for Login {
        type Payload = ();
        type Output = ();
    }

    struct Unregistered;
    impl RequestKind for Unregistered {
        type Payload = ();
        type Output = ();
    }

    #[test]
    fn resolves_registered_descriptor() {
        let registry = RouteRegistry::builder()
            .route::<Login, _, _>(
                RequestDescriptor::post("/auth/{session}").with_max_retries(2),
                || NoopProcessor,
            )
            .build()
            .expect("must build");

        let descriptor = registry.resolve::<Login>().expect("registered");
        assert_eq!(descriptor.method(), HttpMethod::Post);
        assert_eq!(descriptor.route(), "/auth/{session}");
        assert_eq!(descriptor.max_retries(), Some(2));
        assert!(descriptor.kind().ends_with("Login"));
        assert!(registry.processor::<Login>().is_ok());
    }

    #[test]
    fn missing_kind_is_configuration_error() {
        let registry = RouteRegistry::builder().build().expect("empty builds");
        let err = registry.resolve::<Unregistered>().expect_err("must fail");
        assert!(matches!(err, NetworkError::Configuration(_)));
        assert!(registry.require::<Unregistered>().is_err());
    }

    #[test]
    fn duplicate_registration_fails_build() {
        let err = RouteRegistry::builder()
            .route::<Login, _, _>(RequestDescriptor::get("/a"), || NoopProcessor)
            .route::<Login, _, _>(RequestDescriptor::get("/b"), || NoopProcessor)
            .build()
            .expect_err("must fail");
        assert!(matches!(err, NetworkError::Configuration(_)));
    }

    #[test]
    fn template_validation() {
        assert!(validate_template("/users/{id}/items/{item_id}").is_ok());
        assert!(validate_template("").is_ok());
        assert!(validate_template("/users/{id").is_err());
        assert!(validate_template("/users/id}").is_err());
        assert!(validate_template("/users/{}").is_err());
        assert!(validate_template("/users/{a b}").is_err());
    }

    #[test]
    fn method_defaults() {
        assert!(!HttpMethod::Post.carries_query());
        assert!(HttpMethod::Get.carries_query());
        assert!(!HttpMethod::Put.includes_body_by_default());
        assert!(HttpMethod::Delete.includes_body_by_default());
    }
}
