//! Scriptable in-memory backend for tests.

use {
    crate::{
        error::{Error, OpenError, Result},
        port::{Port, PortBackend, PortInfo, PortKind, SerialConfig},
    },
    std::{
        collections::VecDeque,
        io::{self, Write},
        sync::{Arc, Mutex},
        time::Duration,
    },
};

/// Outcome of one scripted write call.
#[derive(Debug, Clone)]
pub(crate) enum WriteOutcome {
    /// Accept at most this many bytes.
    Accept(usize),
    /// Fail with the given error kind.
    Fail(io::ErrorKind),
}

/// State shared between a backend and the ports it opened.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub ports: Vec<PortInfo>,
    /// Names that open but never show up in `list_ports`.
    pub unlisted: Vec<String>,
    pub list_error: bool,
    pub reject_open: Option<String>,
    pub open_calls: usize,
    pub write_calls: usize,
    pub written: Vec<u8>,
    pub script: VecDeque<WriteOutcome>,
    pub live_handles: usize,
    pub last_config: Option<SerialConfig>,
    pub timeouts: Vec<Duration>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

pub(crate) struct MockPort {
    name: String,
    baud_rate: u32,
    timeout: Duration,
    state: Arc<Mutex<MockState>>,
}

pub(crate) fn usb_port(name: &str, product: &str) -> PortInfo {
    PortInfo {
        name: name.to_string(),
        kind: PortKind::Usb,
        vid: Some(0x2E8A),
        pid: Some(0x000A),
        manufacturer: Some("Raspberry Pi".to_string()),
        product: Some(product.to_string()),
        serial_number: Some("E6614C311B".to_string()),
    }
}

pub(crate) fn plain_port(name: &str) -> PortInfo {
    PortInfo {
        name: name.to_string(),
        ..PortInfo::default()
    }
}

impl MockBackend {
    pub fn with_ports(ports: Vec<PortInfo>) -> Self {
        let backend = Self::default();
        backend.lock().ports = ports;
        backend
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn script(&self, outcome: WriteOutcome) {
        self.lock().script.push_back(outcome);
    }
}

impl PortBackend for MockBackend {
    type Port = MockPort;

    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let state = self.lock();
        if state.list_error {
            return Err(Error::Io(io::Error::other("enumeration failed")));
        }
        Ok(state.ports.clone())
    }

    fn open(&self, config: &SerialConfig) -> std::result::Result<MockPort, OpenError> {
        let mut state = self.lock();
        state.open_calls += 1;
        let exists = state.ports.iter().any(|p| p.name == config.port_name)
            || state.unlisted.contains(&config.port_name);
        if !exists {
            return Err(OpenError::NotFound(config.port_name.clone()));
        }
        if let Some(reason) = state.reject_open.clone() {
            return Err(OpenError::OsRejected {
                port: config.port_name.clone(),
                reason,
            });
        }
        state.live_handles += 1;
        state.last_config = Some(config.clone());
        drop(state);

        Ok(MockPort {
            name: config.port_name.clone(),
            baud_rate: config.baud_rate,
            timeout: config.timeout,
            state: Arc::clone(&self.state),
        })
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.state.lock().unwrap().timeouts.push(timeout);
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.write_calls += 1;
        match state.script.pop_front() {
            Some(WriteOutcome::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(WriteOutcome::Accept(limit)) => {
                let n = limit.min(buf.len());
                state.written.extend_from_slice(&buf[..n]);
                Ok(n)
            },
            None => {
                state.written.extend_from_slice(buf);
                Ok(buf.len())
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_handles -= 1;
        }
    }
}
