//! Modbus TCP master
//!
//! Implements the downstream client contract for `modbus://` references:
//! FC03/FC04 reads dispatched by address range, FC06 writes, breaker
//! operate commands and change detection for polled registers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use super::address::{ModbusReference, RegisterKind, HOLDING_REGISTER_MAX, HOLDING_REGISTER_MIN};
use super::pool::ConnectionPool;
use super::transport::{TokioModbusConnector, TransportConnector};
use crate::config::ModbusConfig;
use crate::core::client::DownstreamClient;
use crate::core::events::EventSink;
use crate::core::registry::ClientFactory;
use crate::core::value::PointValue;
use crate::error::{GwError, Result, CODE_OK};

/// Register value written by `operate` to open a breaker
pub const BREAKER_OPEN: u16 = 1;
/// Register value written by `operate` to close a breaker
pub const BREAKER_CLOSE: u16 = 2;

#[derive(Debug)]
struct RegisteredPoint {
    key: String,
    last: Option<u16>,
}

pub struct ModbusMaster {
    pool: ConnectionPool,
    default_port: u16,
    events: EventSink,
    points: Vec<RegisteredPoint>,
    /// Next point `poll` reads; survives a poll abandoned by its timeout
    cursor: usize,
    /// Endpoint with a request on the wire; still set if that request was dropped
    in_flight: Option<String>,
}

impl ModbusMaster {
    pub fn new(
        events: EventSink,
        connector: Arc<dyn TransportConnector>,
        default_port: u16,
        connect_timeout: Duration,
    ) -> Self {
        info!("Modbus master initialised");
        Self {
            pool: ConnectionPool::new(connector, connect_timeout),
            default_port,
            events,
            points: Vec::new(),
            cursor: 0,
            in_flight: None,
        }
    }

    /// Drop a connection whose last request never completed
    ///
    /// The stream may still hold part of the abandoned response.
    async fn recover_interrupted(&mut self) {
        if let Some(endpoint) = self.in_flight.take() {
            warn!("request to {} was interrupted, dropping the connection", endpoint);
            self.pool.evict(&endpoint).await;
        }
    }

    fn parse(&self, key: &str) -> Result<ModbusReference> {
        ModbusReference::parse(key, self.default_port)
    }

    /// Single register read; `NoConnection` is kept apart from read failures
    async fn fetch(&mut self, key: &str) -> Result<u16> {
        self.recover_interrupted().await;
        let reference = self.parse(key)?;
        let Some(kind) = reference.kind() else {
            error!(
                "address {} in {} is outside supported ranges (3xxxx / 4xxxx)",
                reference.address, key
            );
            return Err(GwError::invalid_address(reference.address, "expected 3xxxx or 4xxxx"));
        };
        let protocol_address = reference.protocol_address()?;

        let Some(transport) = self.pool.acquire(&reference.endpoint).await else {
            debug!("could not read from {}: no connection to modbus node", key);
            return Err(GwError::NoConnection(reference.endpoint));
        };

        self.in_flight = Some(reference.endpoint.clone());
        let response = match kind {
            RegisterKind::Holding => {
                transport
                    .read_holding_registers(reference.device_id, protocol_address, 1)
                    .await
            },
            RegisterKind::Input => {
                transport
                    .read_input_registers(reference.device_id, protocol_address, 1)
                    .await
            },
        };
        self.in_flight = None;

        match response {
            Ok(registers) => registers.first().copied().ok_or_else(|| {
                error!("{} read returned no registers for {}", kind.read_function(), key);
                GwError::Protocol("empty response".to_string())
            }),
            Err(e) if e.is_connection_lost() => {
                error!("Connection lost during {} read: {}", kind.read_function(), e);
                self.pool.evict(&reference.endpoint).await;
                Err(GwError::Transport(e.to_string()))
            },
            Err(e) => {
                error!(
                    "{} read failed at address {} (protocol {}), device_id {}: {}",
                    kind.read_function(),
                    reference.address,
                    protocol_address,
                    reference.device_id,
                    e
                );
                Err(GwError::Protocol(e.to_string()))
            },
        }
    }

    /// Read and run change detection for registered keys
    ///
    /// A failed register read clears the cached value; a missing connection
    /// leaves it untouched.
    async fn read_tracked(&mut self, key: &str) -> Result<u16> {
        let outcome = self.fetch(key).await;
        if matches!(outcome, Err(GwError::NoConnection(_))) {
            return outcome;
        }
        let value = outcome.as_ref().ok().copied();

        if let Some(point) = self.points.iter_mut().find(|p| p.key == key) {
            if let Some(v) = value {
                if point.last != Some(v) {
                    self.events.value_changed(key, PointValue::from(v));
                }
            }
            point.last = value;
        }
        outcome
    }

    /// FC06 to a holding register; the range is checked before any transport use
    async fn write_register(&mut self, key: &str, value: u16) -> Result<()> {
        self.recover_interrupted().await;
        let reference = self.parse(key)?;
        if reference.kind() != Some(RegisterKind::Holding) {
            error!(
                "FC06 write rejected: address {} is not in holding register range (4xxxx)",
                reference.address
            );
            return Err(GwError::invalid_address(
                reference.address,
                format!("FC06 requires {}..={}", HOLDING_REGISTER_MIN, HOLDING_REGISTER_MAX),
            ));
        }
        let protocol_address = reference.protocol_address()?;

        let Some(transport) = self.pool.acquire(&reference.endpoint).await else {
            error!("could not write to {}: no connection to modbus node", key);
            return Err(GwError::NoConnection(reference.endpoint));
        };

        self.in_flight = Some(reference.endpoint.clone());
        let response = transport
            .write_single_register(reference.device_id, protocol_address, value)
            .await;
        self.in_flight = None;

        match response {
            Ok(()) => Ok(()),
            Err(e) if e.is_connection_lost() => {
                error!("Connection lost during FC06 write: {}", e);
                self.pool.evict(&reference.endpoint).await;
                Err(GwError::Transport(e.to_string()))
            },
            Err(e) => {
                error!(
                    "FC06 write failed at address {} (protocol {}), device_id {}: {}",
                    reference.address, protocol_address, reference.device_id, e
                );
                Err(GwError::Protocol(e.to_string()))
            },
        }
    }
}

/// Encode a value for a single 16-bit register
fn encode_register(value: &PointValue) -> Result<u16> {
    value
        .as_i64()
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| GwError::InvalidValue(value.to_string()))
}

/// Decode a breaker command: `Some(0)` no action, `Some(1)` open, `Some(2)` close
///
/// Only the semantic values are accepted; raw register codes 1 and 2 are not.
fn decode_breaker(value: &PointValue) -> Option<u16> {
    match value {
        PointValue::Text(t) if t.trim() == "true" => Some(BREAKER_CLOSE),
        PointValue::Text(t) if t.trim() == "false" => Some(BREAKER_OPEN),
        PointValue::Bool(true) => Some(BREAKER_CLOSE),
        PointValue::Bool(false) => Some(BREAKER_OPEN),
        PointValue::Int(0) => Some(0),
        _ => None,
    }
}

#[async_trait]
impl DownstreamClient for ModbusMaster {
    fn scheme(&self) -> &str {
        super::address::SCHEME
    }

    async fn register_read_value(&mut self, reference: &str) -> Result<()> {
        let parsed = self.parse(reference).inspect_err(|e| {
            error!("could not register {}: {}", reference, e);
        })?;
        if parsed.kind().is_none() {
            error!(
                "could not register {}: address {} is outside supported ranges (3xxxx / 4xxxx)",
                reference, parsed.address
            );
            return Err(GwError::invalid_address(parsed.address, "expected 3xxxx or 4xxxx"));
        }

        if self.points.iter().any(|p| p.key == reference) {
            debug!("{} already registered", reference);
            return Ok(());
        }
        self.points.push(RegisteredPoint {
            key: reference.to_string(),
            last: None,
        });
        debug!("registered {} for polling", reference);
        Ok(())
    }

    async fn register_write_value(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        let result = match encode_register(value) {
            Ok(word) => self.write_register(reference, word).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(()) => debug!("Value '{}' written to {}", value, reference),
            Err(e) => error!("could not write '{}' to {} with error: {}", value, reference, e),
        }
        result
    }

    async fn read_value(&mut self, reference: &str) -> Option<PointValue> {
        self.read_tracked(reference).await.ok().map(PointValue::from)
    }

    async fn operate(&mut self, reference: &str, value: &PointValue) -> Result<()> {
        let Some(command) = decode_breaker(value) else {
            error!(
                "operate: invalid value {} for {}, expected \"true\" (close), \"false\" (open) or 0 (no action)",
                value, reference
            );
            return Err(GwError::InvalidValue(value.to_string()));
        };
        if command == 0 {
            debug!("operate called with value 0 (no action) for {}, ignoring", reference);
            return Ok(());
        }

        let parsed = self.parse(reference)?;
        if parsed.kind() != Some(RegisterKind::Holding) {
            error!(
                "operate: address {} in {} is not a holding register (4xxxx)",
                parsed.address, reference
            );
            return Err(GwError::invalid_reference(
                reference,
                "operate requires a holding register (4xxxx)",
            ));
        }

        let action = if command == BREAKER_OPEN { "open" } else { "close" };
        info!(
            "operate: {}, writing {} to address {}, device_id {} ({})",
            action, command, parsed.address, parsed.device_id, reference
        );

        self.write_register(reference, command).await.inspect_err(|_| {
            error!("operate FC06 write failed for {}", reference);
        })?;
        debug!("operate command written successfully to {}", reference);
        Ok(())
    }

    async fn select(&mut self, reference: &str, _value: &PointValue) -> Result<()> {
        error!("select is not implemented for modbus ({})", reference);
        Err(GwError::unsupported("select"))
    }

    async fn cancel(&mut self, reference: &str, _value: &PointValue) -> Result<()> {
        error!("cancel is not implemented for modbus ({})", reference);
        Err(GwError::unsupported("cancel"))
    }

    /// One pass over every registered point
    ///
    /// The pass starts at the cursor, so a pass cut short by the scheduler's
    /// poll timeout resumes with the next point instead of restarting. An
    /// endpoint that cannot be connected is tried once per pass; its other
    /// points are skipped until the next pass.
    async fn poll(&mut self) {
        let total = self.points.len();
        let mut unreachable: HashSet<String> = HashSet::new();

        for _ in 0..total {
            let index = self.cursor % total;
            self.cursor = index + 1;
            let key = self.points[index].key.clone();

            if let Ok(reference) = self.parse(&key) {
                if unreachable.contains(&reference.endpoint) {
                    trace!("skipping {}: {} unreachable this pass", key, reference.endpoint);
                    continue;
                }
            }

            if let Err(GwError::NoConnection(endpoint)) = self.read_tracked(&key).await {
                unreachable.insert(endpoint);
            }
        }
    }

    fn error_text(&self, code: i32) -> String {
        if code == CODE_OK {
            "no error".to_string()
        } else {
            format!("general error: {}", code)
        }
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Factory for the `modbus` scheme backed by real TCP connections
pub fn factory(config: &ModbusConfig) -> impl ClientFactory + 'static {
    let connector: Arc<dyn TransportConnector> =
        Arc::new(TokioModbusConnector::new(config.request_timeout()));
    factory_with_connector(connector, config)
}

/// Factory for the `modbus` scheme using a caller-supplied connector
pub fn factory_with_connector(
    connector: Arc<dyn TransportConnector>,
    config: &ModbusConfig,
) -> impl ClientFactory + 'static {
    let default_port = config.default_port;
    let connect_timeout = config.connect_timeout();
    move |events: EventSink| -> Result<Box<dyn DownstreamClient>> {
        Ok(Box::new(ModbusMaster::new(
            events,
            connector.clone(),
            default_port,
            connect_timeout,
        )))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::events::{EventReceiver, GatewayEvent};
    use crate::error::{CODE_GENERAL, CODE_PROTOCOL};
    use crate::protocols::modbus::address::DEFAULT_PORT;
    use crate::protocols::modbus::testing::{ScriptedConnector, ScriptedDevice};

    const INPUT_REF: &str = "modbus://10.0.0.3:502/1/30005";
    const HOLDING_REF: &str = "modbus://10.0.0.3:502/1/40001";

    fn master() -> (ModbusMaster, ScriptedConnector, EventReceiver) {
        let connector = ScriptedConnector::new(ScriptedDevice::default());
        let (sink, rx) = EventSink::channel();
        let master = ModbusMaster::new(
            sink,
            Arc::new(connector.clone()),
            DEFAULT_PORT,
            Duration::from_millis(100),
        );
        (master, connector, rx)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn test_same_value_twice_emits_once() {
        let (mut master, connector, mut rx) = master();
        connector.set_input(4, 42);
        master.register_read_value(INPUT_REF).await.unwrap();

        master.poll().await;
        master.poll().await;

        assert_eq!(
            drain(&mut rx),
            vec![GatewayEvent::ValueChanged {
                key: INPUT_REF.to_string(),
                value: PointValue::Int(42)
            }]
        );

        connector.set_input(4, 43);
        master.poll().await;
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_read_dispatches_by_range() {
        let (mut master, connector, _rx) = master();
        connector.set_input(4, 11);
        connector.set_holding(0, 22);

        assert_eq!(master.read_value(INPUT_REF).await, Some(PointValue::Int(11)));
        assert_eq!(master.read_value(HOLDING_REF).await, Some(PointValue::Int(22)));
        assert_eq!(master.read_value("modbus://10.0.0.3/1/10001").await, None);
        assert_eq!(connector.requests(), 2);
    }

    #[tokio::test]
    async fn test_failed_read_clears_cache() {
        let (mut master, connector, mut rx) = master();
        connector.set_input(4, 42);
        master.register_read_value(INPUT_REF).await.unwrap();

        master.poll().await;
        connector.exception_on_next_request();
        master.poll().await;
        master.poll().await;

        // cache cleared by the exception, so 42 is reported again
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_no_connection_leaves_cache() {
        let (mut master, connector, mut rx) = master();
        connector.set_input(4, 42);
        master.register_read_value(INPUT_REF).await.unwrap();

        master.poll().await;
        master.pool.evict("10.0.0.3:502").await;
        connector.set_reachable(false);
        master.poll().await;
        connector.set_reachable(true);
        master.poll().await;

        // 42 is still cached after the offline tick, so no second event
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test]
    async fn test_transport_exception_evicts_and_reconnects() {
        let (mut master, connector, _rx) = master();
        connector.set_input(4, 1);

        assert!(master.read_value(INPUT_REF).await.is_some());
        connector.drop_on_next_request();
        assert!(master.read_value(INPUT_REF).await.is_none());
        assert!(master.read_value(INPUT_REF).await.is_some());

        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_read_drops_connection() {
        let (mut master, connector, _rx) = master();
        connector.set_input(4, 5);
        assert!(master.read_value(INPUT_REF).await.is_some());

        connector.hang_on_next_request();
        let cut = tokio::time::timeout(Duration::from_millis(20), master.read_value(INPUT_REF)).await;
        assert!(cut.is_err());

        // the half-used connection is not reused
        assert_eq!(master.read_value(INPUT_REF).await, Some(PointValue::Int(5)));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_cut_short_poll_resumes_at_next_point() {
        let (mut master, connector, mut rx) = master();
        connector.set_input(4, 1);
        connector.set_input(5, 2);
        master.register_read_value(INPUT_REF).await.unwrap();
        master.register_read_value("modbus://10.0.0.3:502/1/30006").await.unwrap();

        connector.hang_on_next_request();
        assert!(tokio::time::timeout(Duration::from_millis(20), master.poll()).await.is_err());
        master.poll().await;

        let keys: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                GatewayEvent::ValueChanged { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["modbus://10.0.0.3:502/1/30006".to_string(), INPUT_REF.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_tried_once_per_poll() {
        let (mut master, connector, _rx) = master();
        connector.set_reachable(false);
        for address in ["30001", "30002", "40003"] {
            master
                .register_read_value(&format!("modbus://10.0.0.3:502/1/{}", address))
                .await
                .unwrap();
        }

        master.poll().await;
        assert_eq!(connector.connects(), 1);
        master.poll().await;
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_exception_response_keeps_connection() {
        let (mut master, connector, _rx) = master();
        connector.set_input(4, 1);

        connector.exception_on_next_request();
        assert!(master.read_value(INPUT_REF).await.is_none());
        assert!(master.read_value(INPUT_REF).await.is_some());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_write_to_input_register_is_rejected_without_transport() {
        let (mut master, connector, _rx) = master();

        let result = master
            .register_write_value(INPUT_REF, &PointValue::Int(7))
            .await;

        assert_eq!(result.unwrap_err().code(), CODE_PROTOCOL);
        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.requests(), 0);
    }

    #[tokio::test]
    async fn test_write_holding_register() {
        let (mut master, connector, _rx) = master();

        master
            .register_write_value("modbus://10.0.0.3/3/40010", &PointValue::from("1234"))
            .await
            .unwrap();
        assert_eq!(connector.writes(), vec![(3, 9, 1234)]);
    }

    #[tokio::test]
    async fn test_write_error_codes() {
        let (mut master, connector, _rx) = master();

        let err = master
            .register_write_value(HOLDING_REF, &PointValue::Int(70000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_GENERAL);

        connector.drop_on_next_request();
        let err = master
            .register_write_value(HOLDING_REF, &PointValue::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GwError::Transport(_)));
        assert_eq!(err.code(), CODE_PROTOCOL);

        connector.exception_on_next_request();
        let err = master
            .register_write_value(HOLDING_REF, &PointValue::Int(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_PROTOCOL);

        connector.set_reachable(false);
        master.pool.evict("10.0.0.3:502").await;
        let err = master
            .register_write_value(HOLDING_REF, &PointValue::Int(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_GENERAL);
    }

    #[tokio::test]
    async fn test_operate_breaker_values() {
        let (mut master, connector, _rx) = master();

        master.operate(HOLDING_REF, &PointValue::from("true")).await.unwrap();
        master.operate(HOLDING_REF, &PointValue::from("false")).await.unwrap();
        master.operate(HOLDING_REF, &PointValue::Bool(true)).await.unwrap();

        assert_eq!(connector.writes(), vec![(1, 0, 2), (1, 0, 1), (1, 0, 2)]);
    }

    #[tokio::test]
    async fn test_operate_no_action_skips_transport() {
        let (mut master, connector, _rx) = master();

        assert!(master.operate(HOLDING_REF, &PointValue::Int(0)).await.is_ok());
        assert_eq!(connector.connects(), 0);
        assert!(connector.writes().is_empty());
    }

    #[tokio::test]
    async fn test_operate_invalid_value_skips_transport() {
        let (mut master, connector, _rx) = master();

        let err = master
            .operate(HOLDING_REF, &PointValue::from("maybe"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_GENERAL);

        // raw register codes are not commands
        for raw in [1, 2, 3] {
            let err = master.operate(HOLDING_REF, &PointValue::Int(raw)).await.unwrap_err();
            assert_eq!(err.code(), CODE_GENERAL);
        }

        assert_eq!(connector.connects(), 0);
        assert!(connector.writes().is_empty());
    }

    #[tokio::test]
    async fn test_operate_requires_holding_register() {
        let (mut master, connector, _rx) = master();

        let err = master
            .operate(INPUT_REF, &PointValue::from("true"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_GENERAL);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_select_and_cancel_unsupported() {
        let (mut master, connector, _rx) = master();

        let err = master.select(HOLDING_REF, &PointValue::from("true")).await.unwrap_err();
        assert!(matches!(err, GwError::Unsupported(_)));
        let err = master.cancel(HOLDING_REF, &PointValue::from("true")).await.unwrap_err();
        assert!(matches!(err, GwError::Unsupported(_)));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_references() {
        let (mut master, _connector, _rx) = master();

        assert!(master.register_read_value("modbus://10.0.0.3/1/50001").await.is_err());
        assert!(master.register_read_value("iec61850://ied/LD0").await.is_err());
        assert!(master.register_read_value("modbus:///1/30001").await.is_err());
        assert!(master.register_read_value(INPUT_REF).await.is_ok());
        assert!(master.register_read_value(INPUT_REF).await.is_ok());
        assert_eq!(master.points.len(), 1);
    }

    #[test]
    fn test_error_text() {
        let (sink, _rx) = EventSink::channel();
        let master = ModbusMaster::new(
            sink,
            Arc::new(ScriptedConnector::new(ScriptedDevice::default())),
            DEFAULT_PORT,
            Duration::from_millis(100),
        );
        assert_eq!(master.error_text(0), "no error");
        assert_eq!(master.error_text(1), "general error: 1");
        assert_eq!(master.error_text(-1), "general error: -1");
    }

    #[test]
    fn test_decode_breaker() {
        assert_eq!(decode_breaker(&PointValue::from("true")), Some(BREAKER_CLOSE));
        assert_eq!(decode_breaker(&PointValue::from("false")), Some(BREAKER_OPEN));
        assert_eq!(decode_breaker(&PointValue::Bool(true)), Some(BREAKER_CLOSE));
        assert_eq!(decode_breaker(&PointValue::Int(0)), Some(0));
        assert_eq!(decode_breaker(&PointValue::Int(1)), None);
        assert_eq!(decode_breaker(&PointValue::Int(2)), None);
        assert_eq!(decode_breaker(&PointValue::from("2")), None);
        assert_eq!(decode_breaker(&PointValue::from("on")), None);
    }
}
