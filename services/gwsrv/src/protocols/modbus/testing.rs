//! Scripted in-memory Modbus device for unit tests

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{RegisterTransport, TransportConnector, TransportError, TransportResult};

/// Register contents keyed by 0-based protocol address
#[derive(Debug, Default, Clone)]
pub struct ScriptedDevice {
    pub holding: HashMap<u16, u16>,
    pub input: HashMap<u16, u16>,
}

#[derive(Debug)]
struct State {
    device: ScriptedDevice,
    reachable: bool,
    connect_delay: Option<Duration>,
    connects: usize,
    requests: usize,
    writes: Vec<(u8, u16, u16)>,
    drop_next: bool,
    exception_next: bool,
    hang_next: bool,
}

#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<State>>,
}

impl ScriptedConnector {
    pub fn new(device: ScriptedDevice) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                device,
                reachable: true,
                connect_delay: None,
                connects: 0,
                requests: 0,
                writes: Vec::new(),
                drop_next: false,
                exception_next: false,
                hang_next: false,
            })),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    pub fn set_input(&self, address: u16, value: u16) {
        self.state.lock().device.input.insert(address, value);
    }

    pub fn set_holding(&self, address: u16, value: u16) {
        self.state.lock().device.holding.insert(address, value);
    }

    /// Next request fails as if the peer reset the connection
    pub fn drop_on_next_request(&self) {
        self.state.lock().drop_next = true;
    }

    /// Next request gets an exception response
    pub fn exception_on_next_request(&self) {
        self.state.lock().exception_next = true;
    }

    /// Next read never gets a response
    pub fn hang_on_next_request(&self) {
        self.state.lock().hang_next = true;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Requests that reached a connected transport
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    pub fn writes(&self) -> Vec<(u8, u16, u16)> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, _endpoint: &str) -> io::Result<Box<dyn RegisterTransport>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.connects += 1;
        if !state.reachable {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        Ok(Box::new(ScriptedTransport {
            state: self.state.clone(),
            open: true,
        }))
    }
}

struct ScriptedTransport {
    state: Arc<Mutex<State>>,
    open: bool,
}

impl ScriptedTransport {
    async fn stall(&self) {
        let hang = std::mem::take(&mut self.state.lock().hang_next);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    fn begin(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.requests += 1;
        if state.drop_next {
            state.drop_next = false;
            self.open = false;
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)));
        }
        if state.exception_next {
            state.exception_next = false;
            return Err(TransportError::Exception("ServerDeviceFailure".into()));
        }
        Ok(())
    }

    fn read(&mut self, input: bool, address: u16) -> TransportResult<Vec<u16>> {
        self.begin()?;
        let state = self.state.lock();
        let table = if input {
            &state.device.input
        } else {
            &state.device.holding
        };
        table
            .get(&address)
            .map(|v| vec![*v])
            .ok_or_else(|| TransportError::Exception("IllegalDataAddress".into()))
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn read_holding_registers(
        &mut self,
        _device_id: u8,
        address: u16,
        _count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.stall().await;
        self.read(false, address)
    }

    async fn read_input_registers(
        &mut self,
        _device_id: u8,
        address: u16,
        _count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.stall().await;
        self.read(true, address)
    }

    async fn write_single_register(
        &mut self,
        device_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        self.begin()?;
        let mut state = self.state.lock();
        state.writes.push((device_id, address, value));
        state.device.holding.insert(address, value);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
