//! Scheme Registry / Dispatcher
//!
//! Maps a URI scheme to a client factory and lazily creates one client per
//! scheme, handing it the shared event sink.
//!
//! ## Usage
//!
//! Adding a new downstream protocol requires only 2 changes:
//! 1. Implement `DownstreamClient` for the protocol
//! 2. Register a factory for its scheme before the gateway starts

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::client::DownstreamClient;
use super::events::EventSink;
use super::reference::scheme_of;
use crate::error::Result;

// ============================================================================
// Client Factory Trait
// ============================================================================

/// Factory creating a client for one scheme
pub trait ClientFactory: Send + Sync {
    fn create(&self, events: EventSink) -> Result<Box<dyn DownstreamClient>>;
}

impl<F> ClientFactory for F
where
    F: Fn(EventSink) -> Result<Box<dyn DownstreamClient>> + Send + Sync,
{
    fn create(&self, events: EventSink) -> Result<Box<dyn DownstreamClient>> {
        self(events)
    }
}

// ============================================================================
// Client Registry
// ============================================================================

/// Registry of scheme factories and the clients created from them
///
/// Clients are kept in creation order; every iteration over them (polling)
/// follows that order.
pub struct ClientRegistry {
    factories: HashMap<String, Arc<dyn ClientFactory>>,
    clients: Vec<Box<dyn DownstreamClient>>,
    by_scheme: HashMap<String, usize>,
    events: EventSink,
}

impl ClientRegistry {
    pub fn new(events: EventSink) -> Self {
        Self {
            factories: HashMap::new(),
            clients: Vec::new(),
            by_scheme: HashMap::new(),
            events,
        }
    }

    /// Register a factory; a later registration for the same scheme replaces it
    pub fn register_scheme(&mut self, scheme: &str, factory: impl ClientFactory + 'static) {
        let scheme = scheme.to_ascii_lowercase();
        debug!("Registered client factory for scheme '{}'", scheme);
        self.factories.insert(scheme, Arc::new(factory));
    }

    /// Client responsible for `uri`, creating it on first use of its scheme
    ///
    /// Unknown schemes and factory failures are logged and yield `None`;
    /// nothing is cached for them.
    pub fn resolve(&mut self, uri: &str) -> Option<&mut (dyn DownstreamClient + 'static)> {
        let scheme = match scheme_of(uri) {
            Ok(s) => s,
            Err(e) => {
                error!("Cannot dispatch {}: {}", uri, e);
                return None;
            },
        };

        if let Some(&idx) = self.by_scheme.get(&scheme) {
            return self.clients.get_mut(idx).map(|c| &mut **c);
        }

        let Some(factory) = self.factories.get(&scheme) else {
            error!("Unknown scheme '{}' in {}", scheme, uri);
            return None;
        };

        match factory.create(self.events.clone()) {
            Ok(client) => {
                info!("Created {} client", scheme);
                let idx = self.clients.len();
                self.clients.push(client);
                self.by_scheme.insert(scheme, idx);
                self.clients.get_mut(idx).map(|c| &mut **c)
            },
            Err(e) => {
                error!("Failed to create {} client: {}", scheme, e);
                None
            },
        }
    }

    /// Instantiated clients in creation order
    pub fn clients_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn DownstreamClient>> {
        self.clients.iter_mut()
    }

    /// Schemes of the instantiated clients in creation order
    pub fn active_schemes(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.scheme().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
