// ── API registry ──
//
// Name -> client factory, with lazily constructed clients cached per name.
// Every client a registry builds shares the registry's directory cache and
// transport.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::auth::{Authenticator, NoAuth};
use crate::call::ApiCall;
use crate::client::{ApiClient, ApiFlavor};
use crate::directory::Directory;
use crate::envelope::{RequestEnvelope, RequestOptions, Verb, scalar_to_string};
use crate::error::Error;
use crate::transport::{HttpTransport, Transport};

// ── Factories ────────────────────────────────────────────────────────

/// Shared resources handed to a factory when it builds a client.
pub struct FactoryContext<'a> {
    pub name: &'a str,
    pub directory: &'a Arc<Directory>,
    pub transport: &'a Arc<dyn Transport>,
}

/// Builds the client for one registered API name.
pub trait ClientFactory: Send + Sync {
    fn build(&self, ctx: FactoryContext<'_>) -> Result<ApiClient, Error>;
}

struct FnFactory<F>(F);

impl<F> ClientFactory for FnFactory<F>
where
    F: Fn(FactoryContext<'_>) -> Result<ApiClient, Error> + Send + Sync,
{
    fn build(&self, ctx: FactoryContext<'_>) -> Result<ApiClient, Error> {
        (self.0)(ctx)
    }
}

/// Declarative factory: endpoint, flavor, defaults and auth hook.
#[derive(Debug, Clone)]
pub struct ApiDescriptor {
    pub endpoint: Url,
    pub flavor: ApiFlavor,
    pub defaults: RequestOptions,
    pub authenticator: Arc<dyn Authenticator>,
}

impl ApiDescriptor {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            flavor: ApiFlavor::default(),
            defaults: RequestOptions::default(),
            authenticator: Arc::new(NoAuth),
        }
    }

    pub fn with_flavor(mut self, flavor: ApiFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }
}

impl ClientFactory for ApiDescriptor {
    fn build(&self, ctx: FactoryContext<'_>) -> Result<ApiClient, Error> {
        Ok(
            ApiClient::new(ctx.name, self.endpoint.clone(), Arc::clone(ctx.transport))
                .with_flavor(self.flavor)
                .with_defaults(self.defaults.clone())
                .with_authenticator(Arc::clone(&self.authenticator))
                .with_directory(Arc::clone(ctx.directory)),
        )
    }
}

// ── Registry ─────────────────────────────────────────────────────────

static GLOBAL: LazyLock<ApiRegistry> = LazyLock::new(ApiRegistry::default);

/// Maps API names to client factories and caches one client per name.
pub struct ApiRegistry {
    factories: DashMap<String, Arc<dyn ClientFactory>>,
    clients: DashMap<String, Arc<ApiClient>>,
    directory: Arc<Directory>,
    transport: Arc<dyn Transport>,
}

impl ApiRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            factories: DashMap::new(),
            clients: DashMap::new(),
            directory: Arc::new(Directory::new()),
            transport,
        }
    }

    /// The process-wide registry, using a default [`HttpTransport`].
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register (or replace) the factory for `name`.
    ///
    /// Replacing a factory evicts the cached client and directory for that
    /// name, so the next `get` builds from the new factory.
    pub fn register(&self, name: impl Into<String>, factory: impl ClientFactory + 'static) {
        let name = name.into();
        if self.clients.remove(&name).is_some() {
            self.directory.remove(&name);
            debug!(api = %name, "replaced api factory, evicted cached client");
        }
        self.factories.insert(name, Arc::new(factory));
    }

    /// Register a closure as the factory for `name`.
    pub fn register_fn<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(FactoryContext<'_>) -> Result<ApiClient, Error> + Send + Sync + 'static,
    {
        self.register(name, FnFactory(factory));
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Get a handle to the client for `name`, building it on first use.
    ///
    /// `defaults` apply to every call made through the returned handle.
    pub fn get(&self, name: &str, defaults: Option<RequestOptions>) -> Result<ApiHandle, Error> {
        let client = self.client(name)?;
        Ok(ApiHandle {
            client,
            defaults: defaults.unwrap_or_default(),
        })
    }

    /// The cached client for `name`, building it on first use.
    pub fn client(&self, name: &str) -> Result<Arc<ApiClient>, Error> {
        if let Some(client) = self.clients.get(name) {
            return Ok(Arc::clone(client.value()));
        }

        let Some(factory) = self.factories.get(name).map(|f| Arc::clone(f.value())) else {
            error!("Api client for {name} is not available");
            return Err(Error::UnknownApi {
                name: name.to_owned(),
            });
        };

        let entry = self
            .clients
            .entry(name.to_owned())
            .or_try_insert_with(|| {
                debug!(api = name, "building api client");
                factory
                    .build(FactoryContext {
                        name,
                        directory: &self.directory,
                        transport: &self.transport,
                    })
                    .map(Arc::new)
            })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Drop cached clients and directories. Factories stay registered.
    pub fn reset(&self) {
        self.clients.clear();
        self.directory.reset();
    }
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::default()))
    }
}

impl fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("apis", &self.names())
            .field("cached_clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// A client plus per-handle default options.
///
/// Cheap to clone. Each verb method returns a cold [`ApiCall`].
#[derive(Debug, Clone)]
pub struct ApiHandle {
    client: Arc<ApiClient>,
    defaults: RequestOptions,
}

impl ApiHandle {
    pub fn new(client: Arc<ApiClient>, defaults: RequestOptions) -> Self {
        Self { client, defaults }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    /// Dispatch `verb` with `options` merged over this handle's defaults.
    pub fn request(&self, verb: Verb, options: RequestOptions, data: Option<Value>) -> ApiCall {
        let options = options.merged_over(&self.defaults);
        let client = Arc::clone(&self.client);
        ApiCall::new(async move {
            client
                .dispatch(RequestEnvelope::new(verb, options, data))
                .await
        })
    }

    pub fn get(&self, options: RequestOptions, params: Option<Value>) -> ApiCall {
        self.request(Verb::Get, options, params)
    }

    pub fn head(&self, options: RequestOptions, params: Option<Value>) -> ApiCall {
        self.request(Verb::Head, options, params)
    }

    pub fn delete(&self, options: RequestOptions, params: Option<Value>) -> ApiCall {
        self.request(Verb::Delete, options, params)
    }

    pub fn post(&self, options: RequestOptions, data: Option<Value>) -> ApiCall {
        self.request(Verb::Post, options, data)
    }

    pub fn put(&self, options: RequestOptions, data: Option<Value>) -> ApiCall {
        self.request(Verb::Put, options, data)
    }

    pub fn patch(&self, options: RequestOptions, data: Option<Value>) -> ApiCall {
        self.request(Verb::Patch, options, data)
    }

    /// Save a model: POST to `{path}/{id}` when it has an `id`, else to `{path}`.
    pub fn save(&self, options: RequestOptions, model: Value) -> ApiCall {
        let id = model
            .get("id")
            .filter(|id| !id.is_null())
            .map(scalar_to_string)
            .filter(|id| !id.is_empty());
        let mut options = options;
        if let Some(id) = id {
            let base = options.path.take().or_else(|| self.defaults.path.clone());
            options.path = Some(match base {
                Some(path) => format!("{}/{id}", path.trim_end_matches('/')),
                None => id,
            });
        }
        self.request(Verb::Post, options, Some(model))
    }
}
