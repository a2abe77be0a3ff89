//! Connection pool: at most one live transport per `"host:port"`
//!
//! Connectivity failures are logged once per transition: the first failure
//! after a good state logs an error, repeated failures stay quiet, and the
//! first success after a failure logs "reconnected".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info};

use super::transport::{RegisterTransport, TransportConnector};

#[derive(Default)]
struct Endpoint {
    transport: Option<Box<dyn RegisterTransport>>,
    /// Set once a connect attempt failed; cleared on the next success
    failed: bool,
}

pub struct ConnectionPool {
    connector: Arc<dyn TransportConnector>,
    connect_timeout: Duration,
    endpoints: HashMap<String, Endpoint>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn TransportConnector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            endpoints: HashMap::new(),
        }
    }

    /// Live transport for `endpoint`, connecting if needed
    ///
    /// Returns `None` when no connection could be made.
    pub async fn acquire(&mut self, endpoint: &str) -> Option<&mut (dyn RegisterTransport + 'static)> {
        let reusable = self
            .endpoints
            .get(endpoint)
            .and_then(|e| e.transport.as_ref())
            .is_some_and(|t| t.is_connected());

        if !reusable {
            let attempt = timeout(self.connect_timeout, self.connector.connect(endpoint)).await;
            let entry = self.endpoints.entry(endpoint.to_string()).or_default();

            if let Some(mut stale) = entry.transport.take() {
                stale.close().await;
            }

            match attempt {
                Ok(Ok(transport)) => {
                    if entry.failed {
                        info!("Modbus reconnected to {}", endpoint);
                    } else {
                        debug!("Modbus connected to {}", endpoint);
                    }
                    entry.failed = false;
                    entry.transport = Some(transport);
                },
                Ok(Err(e)) => {
                    Self::mark_failed(entry, endpoint, &e.to_string());
                    return None;
                },
                Err(_) => {
                    let reason = format!("connect timed out after {:?}", self.connect_timeout);
                    Self::mark_failed(entry, endpoint, &reason);
                    return None;
                },
            }
        }

        self.endpoints
            .get_mut(endpoint)
            .and_then(|e| e.transport.as_deref_mut())
    }

    fn mark_failed(entry: &mut Endpoint, endpoint: &str, reason: &str) {
        if entry.failed {
            debug!("connect to {} failed again: {}", endpoint, reason);
        } else {
            error!("no valid modbus connection with {}: {}", endpoint, reason);
        }
        entry.failed = true;
    }

    /// Close and drop the transport for `endpoint`; the next acquire reconnects
    pub async fn evict(&mut self, endpoint: &str) {
        if let Some(mut transport) = self
            .endpoints
            .get_mut(endpoint)
            .and_then(|e| e.transport.take())
        {
            transport.close().await;
            debug!("Evicted connection to {}", endpoint);
        }
    }

    pub fn is_cached(&self, endpoint: &str) -> bool {
        self.endpoints
            .get(endpoint)
            .is_some_and(|e| e.transport.is_some())
    }

    pub fn is_failed(&self, endpoint: &str) -> bool {
        self.endpoints.get(endpoint).is_some_and(|e| e.failed)
    }
}
