//! Gateway context
//!
//! Owns everything the scheduler task touches: the client registry, the
//! datapoint directory, the upstream server and the receiving end of the event
//! channel. Built once at startup; no global state.

use std::collections::BTreeMap;

use errors::VoltageErrorTrait;
use tracing::{debug, error, info, warn};

use super::client::CommandReply;
use super::directory::{DatapointDirectory, ItemType};
use super::events::{EventReceiver, GatewayEvent};
use super::registry::ClientRegistry;
use super::upstream::{UpstreamRequest, UpstreamServer};
use super::value::PointValue;
use crate::error::{result_code, GwError, CODE_GENERAL};

pub struct Gateway<U> {
    registry: ClientRegistry,
    directory: DatapointDirectory,
    upstream: U,
    events: EventReceiver,
    /// Latest value per key delivered by unsolicited reports, drained each tick
    pending_reports: BTreeMap<String, PointValue>,
    terminations: Vec<String>,
}

impl<U: UpstreamServer> Gateway<U> {
    /// Register every configured point and instantiate the clients in use
    ///
    /// Each IOA is declared upstream first; a duplicate is logged and skipped.
    /// Monitoring points are then subscribed for polling on their client.
    pub async fn start(
        directory: DatapointDirectory,
        mut registry: ClientRegistry,
        events: EventReceiver,
        mut upstream: U,
    ) -> Self {
        for point in directory.datapoints() {
            if let Err(e) = upstream.add_ioa(point.ioa, point.item_type) {
                error!("duplicate IOA: {}, IOA not added to list ({})", point.ioa, e);
                continue;
            }

            let Some(client) = registry.resolve(point.reference) else {
                continue;
            };

            if point.item_type.is_monitoring() {
                match client.register_read_value(point.reference).await {
                    Ok(()) => debug!("register datapoint: {} -> {}", point.ioa, point.reference),
                    Err(e) => error!("could not register {}: {}", point.reference, e),
                }
            } else {
                debug!("{} {} registered", point.item_type, point.ioa);
            }
        }

        info!(
            "Gateway started: {} points, clients: {:?}",
            directory.len(),
            registry.active_schemes()
        );

        Self {
            registry,
            directory,
            upstream,
            events,
            pending_reports: BTreeMap::new(),
            terminations: Vec::new(),
        }
    }

    /// Apply every queued event to the upstream server; returns the number handled
    pub fn propagate(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            handled += 1;
            match event {
                GatewayEvent::ValueChanged { key, value } => self.update(&key, &value),
                GatewayEvent::Report { key, value } => {
                    self.update(&key, &value);
                    self.pending_reports.insert(key, value);
                },
                GatewayEvent::CommandTermination { message } => self.terminations.push(message),
            }
        }
        handled
    }

    fn update(&mut self, key: &str, value: &PointValue) {
        debug!("callback: {} - {}", key, value);
        match self.directory.reverse_lookup(key) {
            Some(ioa) => self.upstream.update_ioa(ioa, value),
            None => warn!("could not find IOA for key: {}", key),
        }
    }

    /// Log and clear the reports and command terminations seen since the last tick
    pub fn drain_reports(&mut self) {
        for key in std::mem::take(&mut self.pending_reports).into_keys() {
            debug!("{} updated via report", key);
        }
        for message in self.terminations.drain(..) {
            info!("command termination: {}", message);
        }
    }

    /// Execute an upstream command and return its code
    pub async fn command(&mut self, ioa: u32, value: i64, select: bool) -> i32 {
        let Some((item_type, reference)) = self.directory.lookup(ioa) else {
            warn!("command for unknown IOA {}", ioa);
            return GwError::UnknownIoa(ioa).code();
        };
        if item_type.is_monitoring() {
            warn!("IOA {} is a {} point, not a command", ioa, item_type);
            return CODE_GENERAL;
        }

        let reference = reference.to_string();
        let semantic = command_value(item_type, value);
        let Some(client) = self.registry.resolve(&reference) else {
            return CODE_GENERAL;
        };

        let result = if select {
            debug!("select: {} v: {}", reference, semantic);
            client.select(&reference, &semantic).await
        } else {
            debug!("operate: {} v: {}", reference, semantic);
            client.operate(&reference, &semantic).await
        };

        match &result {
            Err(e) if e.is_transient() => {
                warn!("command on IOA {} ({}) failed [{}]: {}", ioa, reference, e.error_code(), e)
            },
            Err(e) => {
                error!("command on IOA {} ({}) failed [{}]: {}", ioa, reference, e.error_code(), e)
            },
            Ok(()) => {},
        }
        result_code(&result)
    }

    /// General-interrogation read of one IOA
    pub async fn read(&mut self, ioa: u32) -> Option<PointValue> {
        let (_, reference) = self.directory.lookup(ioa)?;
        let reference = reference.to_string();
        debug!("read value: {}", reference);
        self.registry.resolve(&reference)?.read_value(&reference).await
    }

    /// Immediate write to the point configured for `ioa`
    pub async fn write(&mut self, ioa: u32, value: &PointValue) -> CommandReply {
        let Some((_, reference)) = self.directory.lookup(ioa) else {
            let err = GwError::UnknownIoa(ioa);
            return CommandReply {
                code: err.code(),
                message: err.to_string(),
            };
        };
        let reference = reference.to_string();
        let Some(client) = self.registry.resolve(&reference) else {
            let err = GwError::UnknownScheme(reference);
            return CommandReply {
                code: err.code(),
                message: err.to_string(),
            };
        };

        debug!("write value: {}, element: {}", value, reference);
        let result = client.register_write_value(&reference, value).await;
        CommandReply::from_result(&result, client)
    }

    /// Answer one request from the upstream server
    pub async fn serve(&mut self, request: UpstreamRequest) {
        match request {
            UpstreamRequest::Command {
                ioa,
                value,
                select,
                reply,
            } => {
                let code = self.command(ioa, value, select).await;
                let _ = reply.send(code);
            },
            UpstreamRequest::Read { ioa, reply } => {
                let value = self.read(ioa).await;
                let _ = reply.send(value);
            },
        }
    }

    pub fn registry_mut(&mut self) -> &mut ClientRegistry {
        &mut self.registry
    }

    pub fn directory(&self) -> &DatapointDirectory {
        &self.directory
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }
}

/// Translate an upstream command value into the semantic breaker value
///
/// Single commands: `1` on, `0` off. Double commands: `2` on, `1` off.
/// Anything else is passed through undecoded.
pub fn command_value(item_type: ItemType, value: i64) -> PointValue {
    match (item_type, value) {
        (ItemType::SinglePointCommand, 1) | (ItemType::DoublePointCommand, 2) => {
            PointValue::from("true")
        },
        (ItemType::SinglePointCommand, 0) | (ItemType::DoublePointCommand, 1) => {
            PointValue::from("false")
        },
        (_, other) => PointValue::Int(other),
    }
}
