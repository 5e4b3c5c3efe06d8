//! The process-wide connection to the document store.
//!
//! [`ConnectionManager`] owns the live store handle and the shared
//! [`ConnectionState`]. Every other component holds the manager and asks it
//! for the store per operation, so a closed or never-opened connection is
//! caught before any I/O happens.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::ConnectOptions;
use crate::error::{ConnectionError, StorageResult};

use super::backend::DocumentStore;

/// Dials a document store.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Opens a connection and returns once the store has confirmed it is
    /// reachable.
    async fn connect(&self, options: &ConnectOptions) -> StorageResult<Arc<dyn DocumentStore>>;
}

/// Whether the process currently holds an open connection.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
}

impl ConnectionState {
    /// Creates a disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` between a successful `connect` and the next `close`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

/// Owns the single connection to the document store.
///
/// # Example
///
/// ```
/// use parkline_persistence::backends::memory::{MemoryConnector, MemoryStore};
/// use parkline_persistence::config::ConnectOptions;
/// use parkline_persistence::core::ConnectionManager;
///
/// # tokio_test::block_on(async {
/// let manager = ConnectionManager::new(MemoryConnector::new(MemoryStore::new()));
/// assert!(!manager.is_connected());
///
/// assert!(manager.connect(&ConnectOptions::default()).await);
/// assert!(manager.is_connected());
///
/// manager.close(false).await;
/// assert!(!manager.is_connected());
/// # });
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    state: Arc<ConnectionState>,
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    dial_lock: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    /// Creates a disconnected manager that dials through `connector`.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    /// Creates a disconnected manager from a shared connector.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: Arc::new(ConnectionState::new()),
            store: RwLock::new(None),
            dial_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the shared connection state.
    pub fn state(&self) -> Arc<ConnectionState> {
        self.state.clone()
    }

    /// Returns `true` while connected.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Connects to the store.
    ///
    /// A no-op returning `true` if already connected. Failures are logged and
    /// reported as `false`, never returned as errors.
    pub async fn connect(&self, options: &ConnectOptions) -> bool {
        let _guard = self.dial_lock.lock().await;

        if self.state.is_connected() {
            debug!("Already connected, skipping dial");
            return true;
        }

        match self.connector.connect(options).await {
            Ok(store) => {
                let kind = store.kind();
                *self.store.write() = Some(store);
                self.state.set_connected(true);
                info!(backend = %kind, tls = options.tls.enabled, "Connected to document store");
                true
            }
            Err(e) => {
                error!(error = %e, tls = options.tls.enabled, "Failed to connect to document store");
                false
            }
        }
    }

    /// Closes the connection.
    ///
    /// Always leaves the manager disconnected, and is safe to call when not
    /// connected. Driver shutdown errors are logged only.
    pub async fn close(&self, force: bool) -> bool {
        let _guard = self.dial_lock.lock().await;

        let store = self.store.write().take();
        self.state.set_connected(false);

        match store {
            Some(store) => {
                if let Err(e) = store.shutdown(force).await {
                    warn!(error = %e, force, "Error while shutting down document store client");
                }
                info!(force, "Document store connection closed");
            }
            None => debug!("Close requested without an open connection"),
        }
        true
    }

    /// Returns the live store, or [`ConnectionError::NotConnected`] without
    /// touching the network.
    pub fn store(&self) -> StorageResult<Arc<dyn DocumentStore>> {
        if !self.state.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        self.store
            .read()
            .clone()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }
}
