//! Connection registry.
//!
//! Maps uppercase reference names to backends and routes operations to the
//! default backend or to an explicitly named one. Each backend sits behind its
//! own mutex so statements on one connection never interleave, while routing
//! only takes the registry lock briefly.

use crate::db::backend::Backend;
use crate::db::dispatch::{Operation, Outcome};
use crate::db::driver::DriverFactory;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionParams, ConnectionReference};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type SharedBackend = Arc<Mutex<Backend>>;

#[derive(Debug, Default)]
struct RegistryState {
    pool: HashMap<ConnectionReference, SharedBackend>,
    /// Once set, always names a pool member
    default: Option<ConnectionReference>,
}

#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    factory: Arc<DriverFactory>,
    state: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    /// Create a registry that builds drivers with `factory`.
    pub fn new(factory: DriverFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    /// Register a backend for `uri` under `reference`, replacing any backend
    /// already registered there.
    ///
    /// The first successful registration becomes the default. The replaced
    /// backend, if any, is disconnected.
    pub async fn register(&self, reference: &str, uri: &str) -> DbResult<ConnectionParams> {
        let key = ConnectionReference::new(reference)
            .map_err(|e| DbError::registration(reference, e.to_string()))?;
        let params = ConnectionParams::parse(uri)
            .map_err(|e| DbError::registration(reference, e.to_string()))?;
        let driver = self
            .factory
            .create(&params)
            .map_err(|e| DbError::registration(reference, e.to_string()))?;

        let mut backend = Backend::new(driver);
        let params = backend.set_connection_params(params);
        let backend = Arc::new(Mutex::new(backend));

        let (replaced, is_default) = {
            let mut state = self.state.write().await;
            let replaced = state.pool.insert(key.clone(), backend);
            if state.default.is_none() {
                state.default = Some(key.clone());
            }
            (replaced, state.default.as_ref() == Some(&key))
        }; // Lock released here

        info!(
            reference = %key,
            scheme = %params.scheme,
            host = ?params.host,
            database = ?params.database,
            is_default,
            "Registered connection"
        );

        if let Some(previous) = replaced {
            warn!(reference = %key, "Replaced existing connection");
            if !previous.lock().await.disconnect().await {
                warn!(reference = %key, "Replaced connection did not close cleanly");
            }
        }

        Ok(params)
    }

    /// Make `reference` the default. Fails, leaving the default unchanged,
    /// unless the reference is registered.
    pub async fn set_default(&self, reference: &str) -> DbResult<ConnectionReference> {
        let key = ConnectionReference::new(reference)?;
        let mut state = self.state.write().await;
        if !state.pool.contains_key(&key) {
            return Err(DbError::connection_not_found(key.as_str()));
        }
        state.default = Some(key.clone());
        info!(reference = %key, "Default connection changed");
        Ok(key)
    }

    pub async fn default_reference(&self) -> Option<ConnectionReference> {
        self.state.read().await.default.clone()
    }

    /// Connect the default backend.
    pub async fn connect(&self) -> bool {
        match self.backend(None).await {
            Ok(backend) => backend.lock().await.connect().await,
            Err(_) => false,
        }
    }

    /// Whether the default backend holds a live connection.
    pub async fn is_connected(&self) -> bool {
        match self.backend(None).await {
            Ok(backend) => backend.lock().await.is_connected().await,
            Err(_) => false,
        }
    }

    /// Disconnect the default backend. Nothing to close counts as success.
    pub async fn disconnect(&self) -> bool {
        match self.backend(None).await {
            Ok(backend) => backend.lock().await.disconnect().await,
            Err(_) => true,
        }
    }

    /// Resolve a backend by reference, or the default when `reference` is `None`.
    pub async fn backend(&self, reference: Option<&str>) -> DbResult<SharedBackend> {
        let state = self.state.read().await;
        match reference {
            Some(reference) => {
                let key = ConnectionReference::new(reference)?;
                state
                    .pool
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| DbError::connection_not_found(key.as_str()))
            }
            None => state
                .default
                .as_ref()
                .and_then(|key| state.pool.get(key))
                .cloned()
                .ok_or(DbError::NoDefaultConnection),
        }
    }

    /// Run an operation on the named backend, or on the default.
    pub async fn call(&self, reference: Option<&str>, operation: Operation) -> DbResult<Outcome> {
        let backend = self.backend(reference).await?; // Registry lock released here
        debug!(
            reference = reference.unwrap_or("<default>"),
            operation = operation.name(),
            "Dispatching operation"
        );
        let mut backend = backend.lock().await;
        operation.apply(&mut backend).await
    }

    /// Run an operation given by name.
    ///
    /// When the first argument is exactly a registered (uppercase) reference,
    /// the operation goes to that backend with the argument removed; otherwise
    /// all arguments go to the default backend. A lowercase `"primary"` is
    /// data, not a reference.
    pub async fn dispatch(&self, name: &str, args: &[String]) -> DbResult<Outcome> {
        let (reference, rest) = match args.split_first() {
            Some((first, rest)) => {
                if self.is_reference_key(first).await {
                    (Some(first.as_str()), rest)
                } else {
                    (None, args)
                }
            }
            None => (None, args),
        };
        let operation = Operation::parse(name, rest)?;
        self.call(reference, operation).await
    }

    /// Registered references, sorted.
    pub async fn references(&self) -> Vec<ConnectionReference> {
        let state = self.state.read().await;
        let mut references: Vec<ConnectionReference> = state.pool.keys().cloned().collect();
        references.sort();
        references
    }

    /// Check if a reference is registered (case-insensitive).
    pub async fn contains(&self, reference: &str) -> bool {
        let Ok(key) = ConnectionReference::new(reference) else {
            return false;
        };
        self.state.read().await.pool.contains_key(&key)
    }

    async fn is_reference_key(&self, candidate: &str) -> bool {
        self.state
            .read()
            .await
            .pool
            .keys()
            .any(|key| key.as_str() == candidate)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.pool.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.pool.is_empty()
    }

    /// Disconnect every backend. Registrations and the default are kept.
    pub async fn close_all(&self) {
        let backends: Vec<(ConnectionReference, SharedBackend)> = {
            let state = self.state.read().await;
            state
                .pool
                .iter()
                .map(|(key, backend)| (key.clone(), Arc::clone(backend)))
                .collect()
        }; // Lock released here

        for (key, backend) in backends {
            info!(reference = %key, "Closing connection");
            if !backend.lock().await.disconnect().await {
                warn!(reference = %key, "Connection did not close cleanly");
            }
        }
        info!("All connections closed");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DriverFactory::with_sqlx_drivers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry = ConnectionRegistry::default();
        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
        assert!(registry.default_reference().await.is_none());
    }

    #[tokio::test]
    async fn test_no_default_behaviour() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.connect().await);
        assert!(!registry.is_connected().await);
        assert!(registry.disconnect().await);
        assert!(matches!(
            registry.call(None, Operation::Connect).await,
            Err(DbError::NoDefaultConnection)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let registry = ConnectionRegistry::default();
        assert!(registry.register("main", "not a uri").await.is_err());
        assert!(registry.register("main", "oracle://u:p@host/db").await.is_err());
        assert!(registry.register("", "sqlite::memory:").await.is_err());
        assert!(registry.is_empty().await);
        assert!(registry.default_reference().await.is_none());
    }

    #[tokio::test]
    async fn test_first_registration_is_default() {
        let registry = ConnectionRegistry::default();
        registry.register("main", "sqlite::memory:").await.unwrap();
        registry.register("other", "sqlite::memory:").await.unwrap();

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.default_reference().await.unwrap(), "MAIN");
        assert!(registry.contains("Main").await);
        assert!(!registry.contains("").await);
    }

    #[tokio::test]
    async fn test_set_default_unknown_keeps_default() {
        let registry = ConnectionRegistry::default();
        registry.register("main", "sqlite::memory:").await.unwrap();

        assert!(registry.set_default("missing").await.is_err());
        assert_eq!(registry.default_reference().await.unwrap(), "MAIN");

        registry.register("other", "sqlite::memory:").await.unwrap();
        let key = registry.set_default("other").await.unwrap();
        assert_eq!(key.as_str(), "OTHER");
    }

    #[tokio::test]
    async fn test_close_all_keeps_registrations() {
        let registry = ConnectionRegistry::default();
        registry.register("main", "sqlite::memory:").await.unwrap();
        assert!(registry.connect().await);

        registry.close_all().await;
        assert!(!registry.is_connected().await);
        assert_eq!(registry.len().await, 1);
    }
}
