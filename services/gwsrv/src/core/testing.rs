//! In-memory client used by the core unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::DownstreamClient;
use super::events::EventSink;
use super::value::PointValue;
use crate::error::{GwError, Result};

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Scripted client: registered references report whatever `readings` holds
pub struct StubClient {
    scheme: String,
    pub registered: Vec<String>,
    pub readings: HashMap<String, PointValue>,
    log: CallLog,
    events: Option<EventSink>,
    poll_delay: Option<Duration>,
}

impl StubClient {
    pub fn new(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            registered: Vec::new(),
            readings: HashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            events: None,
            poll_delay: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_reading(mut self, key: &str, value: PointValue) -> Self {
        self.readings.insert(key.to_string(), value);
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

#[async_trait]
impl DownstreamClient for StubClient {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn register_read_value(&mut self, reference: &str) -> Result<()> {
        self.record(format!("register {}", reference));
        self.registered.push(reference.to_string());
        Ok(())
    }

    async fn register_write_value(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        self.record(format!("write {} {}", reference, value));
        Ok(())
    }

    async fn read_value(&mut self, reference: &str) -> Option<PointValue> {
        self.readings.get(reference).cloned()
    }

    async fn operate(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        self.record(format!("operate {} {}", reference, value));
        match value {
            PointValue::Text(t) if t == "true" || t == "false" => Ok(()),
            other => Err(GwError::InvalidValue(other.to_string())),
        }
    }

    async fn select(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        self.record(format!("select {} {}", reference, value));
        Err(GwError::unsupported("select"))
    }

    async fn cancel(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        self.record(format!("cancel {} {}", reference, value));
        Err(GwError::unsupported("cancel"))
    }

    async fn poll(&mut self) {
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("poll {}", self.scheme));
        if let Some(events) = &self.events {
            for key in &self.registered {
                if let Some(value) = self.readings.get(key) {
                    events.value_changed(key.clone(), value.clone());
                }
            }
        }
    }

    fn error_text(&self, code: i32) -> String {
        format!("stub error: {}", code)
    }
}
